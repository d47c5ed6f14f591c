//! Chunking dispatcher & language adapters (§4.1).
//!
//! Kept from the teacher's Markdown/JSON/HTML heuristics and tree-sitter JS
//! chunking, generalized in three ways the spec requires that the teacher
//! didn't: (1) an exact byte-accurate sliding window instead of a
//! line-accumulate-until-target heuristic, (2) Rust/Python/Go tree-sitter
//! adapters alongside JS/TS, and (3) a process-wide adapter registry for
//! unknown extensions.

use crate::model::{Chunk, ChunkKind, CodeSymbol, Import, SymbolKind};
use crate::util::{estimate_tokens, sha256_hex, short_id, slugify};
use regex::Regex;
use std::collections::BTreeMap;
#[cfg(feature = "treesitter")]
use tree_sitter::{Language, Node, Parser};

/// Sliding-window parameters (§4.1). Defaults: S=768, O=100.
#[derive(Debug, Clone, Copy)]
pub struct ChunkOptions {
    pub size: usize,
    pub overlap: usize,
}

impl Default for ChunkOptions {
    fn default() -> Self {
        Self {
            size: 768,
            overlap: 100,
        }
    }
}

impl ChunkOptions {
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.overlap >= self.size {
            return Err("overlap must be smaller than chunk size");
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct ChunkDraft {
    kind: ChunkKind,
    start_offset: usize,
    end_offset: usize,
    start_line: usize,
    end_line: usize,
    content: String,
    heading_path: Vec<String>,
    section_header: Option<String>,
    symbol_name: Option<String>,
    symbol_kind: Option<SymbolKind>,
}

/// The capability set an adapter offers for one extension (§9 design note).
pub trait LanguageAdapter: Send + Sync {
    fn language_id(&self) -> &'static str;
    fn parse(&self, path: &str, content: &str) -> Vec<crate::model::CodeSymbol>;
    fn extract_imports(&self, path: &str, content: &str) -> Vec<Import>;
    fn chunk(&self, _path: &str, _content: &str, _options: &ChunkOptions) -> Option<Vec<Chunk>> {
        None
    }
    fn analyze_call_relationships(&self, _path: &str, _content: &str) -> Option<Vec<(String, String, f32)>> {
        None
    }
}

/// Process-wide-shaped but explicitly owned: lives on `CoreContext`, not a
/// lazy global (§9).
#[derive(Default)]
pub struct AdapterRegistry {
    by_extension: BTreeMap<String, String>, // extension -> language_id
    by_language: BTreeMap<String, std::sync::Arc<dyn LanguageAdapter>>,
}

/// Extensions the built-in dispatcher already owns; an adapter registered
/// for one of these is accepted (for its parse/call-analysis capability)
/// but built-in chunking still preempts it, per §4.1.
const BUILTIN_EXTENSIONS: &[&str] = &[
    "md", "mdx", "ts", "tsx", "js", "jsx", "py", "rs", "go", "json", "html", "htm",
];

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent on matching language id; rejects a conflicting extension
    /// already bound to a *different* language id.
    pub fn register(
        &mut self,
        extension: &str,
        adapter: std::sync::Arc<dyn LanguageAdapter>,
    ) -> Result<(), crate::error::CoreError> {
        let ext = extension.trim_start_matches('.').to_ascii_lowercase();
        let language_id = adapter.language_id().to_string();
        if let Some(existing) = self.by_extension.get(&ext) {
            if *existing != language_id {
                return Err(crate::error::CoreError::conflict(
                    "adapter",
                    ext,
                    format!("already registered for language '{existing}'"),
                ));
            }
            return Ok(()); // idempotent re-registration
        }
        self.by_extension.insert(ext, language_id.clone());
        self.by_language.entry(language_id).or_insert(adapter);
        Ok(())
    }

    pub fn get(&self, extension: &str) -> Option<&std::sync::Arc<dyn LanguageAdapter>> {
        let ext = extension.trim_start_matches('.').to_ascii_lowercase();
        let language_id = self.by_extension.get(&ext)?;
        self.by_language.get(language_id)
    }

    pub fn is_builtin(extension: &str) -> bool {
        let ext = extension.trim_start_matches('.').to_ascii_lowercase();
        BUILTIN_EXTENSIONS.contains(&ext.as_str())
    }
}

// ---------------------------------------------------------------------
// Sliding window — exact byte overlap (§4.1, §8 invariant 1)
// ---------------------------------------------------------------------

/// Snap a byte offset backward to the nearest char boundary so windows
/// never split a multi-byte UTF-8 sequence.
fn snap_to_char_boundary(content: &str, mut offset: usize) -> usize {
    while offset > 0 && !content.is_char_boundary(offset) {
        offset -= 1;
    }
    offset
}

/// Window k covers `[k*(S-O), k*(S-O)+S)`; the last window is truncated at
/// end-of-content. Returns byte offset pairs.
pub fn sliding_window_offsets(content: &str, options: &ChunkOptions) -> Vec<(usize, usize)> {
    let len = content.len();
    if len == 0 {
        return vec![(0, 0)];
    }
    let step = options.size - options.overlap;
    let mut windows = Vec::new();
    let mut k = 0usize;
    loop {
        let raw_start = k * step;
        if raw_start >= len {
            break;
        }
        let start = snap_to_char_boundary(content, raw_start);
        let raw_end = (start + options.size).min(len);
        let end = snap_to_char_boundary(content, raw_end);
        windows.push((start, end));
        if end >= len {
            break;
        }
        k += 1;
    }
    if windows.is_empty() {
        windows.push((0, len));
    }
    windows
}

fn line_of_offset(content: &str, offset: usize) -> usize {
    content[..offset.min(content.len())].matches('\n').count() + 1
}

fn sliding_window_drafts(
    content: &str,
    kind: ChunkKind,
    options: &ChunkOptions,
    heading_path: &[String],
    section_header: Option<&str>,
    symbol_name: Option<&str>,
    symbol_kind: Option<SymbolKind>,
) -> Vec<ChunkDraft> {
    sliding_window_offsets(content, options)
        .into_iter()
        .map(|(start, end)| ChunkDraft {
            kind,
            start_offset: start,
            end_offset: end,
            start_line: line_of_offset(content, start),
            end_line: line_of_offset(content, end.saturating_sub(1).max(start)),
            content: content[start..end].to_string(),
            heading_path: heading_path.to_vec(),
            section_header: section_header.map(str::to_string),
            symbol_name: symbol_name.map(str::to_string),
            symbol_kind,
        })
        .collect()
}

// ---------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------

pub fn chunk_file(
    path: &str,
    content: &str,
    kind: ChunkKind,
    options: &ChunkOptions,
    adapters: &AdapterRegistry,
) -> Vec<Chunk> {
    let drafts = if content.is_empty() {
        vec![ChunkDraft {
            kind,
            start_offset: 0,
            end_offset: 0,
            start_line: 1,
            end_line: 1,
            content: String::new(),
            heading_path: Vec::new(),
            section_header: None,
            symbol_name: None,
            symbol_kind: None,
        }]
    } else {
        match kind {
            ChunkKind::Markdown => chunk_markdown(content, options),
            ChunkKind::JavaScript => chunk_code(path, content, options),
            _ => {
                let ext = extension_of(path);
                // `detect_kind` only classifies `.js/.ts/.tsx` as
                // `ChunkKind::JavaScript`; `.jsx/.py/.rs/.go` land here with
                // `Unknown` but are still in `extension_for_code`'s set, so
                // route them through the same tree-sitter code path (§4.1)
                // instead of a plain sliding window. Built-in dispatch
                // preempts any adapter registered for an extension it
                // already owns (§4.1).
                if AdapterRegistry::is_builtin(&ext) {
                    if extension_for_code(path) {
                        chunk_code(path, content, options)
                    } else {
                        sliding_window_drafts(content, kind, options, &[], None, None, None)
                    }
                } else if let Some(chunks) = adapters.get(&ext).and_then(|adapter| adapter.chunk(path, content, options)) {
                    return finalize_chunks(path, chunks_to_drafts(chunks));
                } else {
                    sliding_window_drafts(content, kind, options, &[], None, None, None)
                }
            }
        }
    };
    finalize_chunks(path, drafts)
}

fn chunks_to_drafts(chunks: Vec<Chunk>) -> Vec<ChunkDraft> {
    chunks
        .into_iter()
        .map(|c| ChunkDraft {
            kind: c.kind,
            start_offset: c.start_offset,
            end_offset: c.end_offset,
            start_line: c.start_line,
            end_line: c.end_line,
            content: c.content,
            heading_path: c.heading_path,
            section_header: c.section_header,
            symbol_name: c.symbol_name,
            symbol_kind: c.symbol_kind,
        })
        .collect()
}

fn extension_of(path: &str) -> String {
    path.rsplit('.').next().unwrap_or("").to_ascii_lowercase()
}

pub fn extension_for_code(path: &str) -> bool {
    matches!(
        extension_of(path).as_str(),
        "ts" | "tsx" | "js" | "jsx" | "py" | "rs" | "go"
    )
}

fn finalize_chunks(path: &str, drafts: Vec<ChunkDraft>) -> Vec<Chunk> {
    let total = drafts.len();
    let mut chunks = Vec::with_capacity(total);
    let mut hash_counts: BTreeMap<String, usize> = BTreeMap::new();
    for (index, draft) in drafts.into_iter().enumerate() {
        let content_hash = sha256_hex(draft.content.as_bytes());
        let occurrence = {
            let count = hash_counts.entry(content_hash.clone()).or_insert(0);
            let occurrence = *count;
            *count += 1;
            occurrence
        };
        let id_seed = format!("{path}\n{content_hash}\n{occurrence}");
        let id = sha256_hex(id_seed.as_bytes());
        let token_estimate = estimate_tokens(&draft.content);
        let slug = make_slug(
            path,
            draft.kind,
            &draft.heading_path,
            &draft.symbol_name,
            draft.start_line,
            draft.end_line,
        );
        chunks.push(Chunk {
            id: id.clone(),
            short_id: short_id(&id, 12),
            slug,
            path: path.to_string(),
            kind: draft.kind,
            chunk_index: index,
            total_chunks: total,
            start_offset: draft.start_offset,
            end_offset: draft.end_offset,
            start_line: draft.start_line,
            end_line: draft.end_line,
            content: draft.content,
            content_hash,
            token_estimate,
            heading_path: draft.heading_path,
            section_header: draft.section_header,
            symbol_name: draft.symbol_name,
            symbol_kind: draft.symbol_kind,
            address: None,
            asset_path: None,
        });
    }
    chunks
}

// ---------------------------------------------------------------------
// Markdown: ATX-heading sections, re-split by sliding window if oversize
// ---------------------------------------------------------------------

fn chunk_markdown(content: &str, options: &ChunkOptions) -> Vec<ChunkDraft> {
    let heading_re = Regex::new(r"^(#{1,6})\s+(.+)").unwrap();
    let mut sections: Vec<(Vec<String>, usize, usize)> = Vec::new(); // (heading stack, start_off, end_off)
    let mut heading_stack: Vec<String> = Vec::new();
    let mut section_start = 0usize;
    let mut in_fence = false;
    let mut offset = 0usize;

    for line in content.split_inclusive('\n') {
        let trimmed = line.trim();
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            in_fence = !in_fence;
        }
        if !in_fence {
            if let Some(caps) = heading_re.captures(line.trim_end_matches('\n')) {
                if offset > section_start {
                    sections.push((heading_stack.clone(), section_start, offset));
                }
                let level = caps.get(1).unwrap().as_str().len();
                let title = caps.get(2).unwrap().as_str().trim().to_string();
                while heading_stack.len() >= level {
                    heading_stack.pop();
                }
                heading_stack.push(title);
                section_start = offset;
            }
        }
        offset += line.len();
    }
    if offset > section_start {
        sections.push((heading_stack.clone(), section_start, offset));
    }
    if sections.is_empty() {
        sections.push((Vec::new(), 0, content.len()));
    }

    let mut drafts = Vec::new();
    for (heading_path, start, end) in sections {
        let section_header = heading_path.last().cloned();
        let section_text = &content[start..end];
        if section_text.len() <= options.size {
            drafts.push(ChunkDraft {
                kind: ChunkKind::Markdown,
                start_offset: start,
                end_offset: end,
                start_line: line_of_offset(content, start),
                end_line: line_of_offset(content, end.saturating_sub(1).max(start)),
                content: section_text.trim_end().to_string(),
                heading_path: heading_path.clone(),
                section_header: section_header.clone(),
                symbol_name: None,
                symbol_kind: None,
            });
        } else {
            for mut draft in sliding_window_drafts(
                section_text,
                ChunkKind::Markdown,
                options,
                &heading_path,
                section_header.as_deref(),
                None,
                None,
            ) {
                draft.start_offset += start;
                draft.end_offset += start;
                draft.start_line = line_of_offset(content, draft.start_offset);
                draft.end_line = line_of_offset(content, draft.end_offset.saturating_sub(1).max(draft.start_offset));
                drafts.push(draft);
            }
        }
    }
    drafts
}

// ---------------------------------------------------------------------
// Code: top-level declarations via tree-sitter, sliding-window fallback
// ---------------------------------------------------------------------

fn chunk_code(path: &str, content: &str, options: &ChunkOptions) -> Vec<ChunkDraft> {
    #[cfg(feature = "treesitter")]
    {
        if let Some(drafts) = chunk_code_treesitter(path, content, options) {
            if !drafts.is_empty() {
                return drafts;
            }
        }
    }
    #[allow(unreachable_code)]
    sliding_window_drafts(content, ChunkKind::JavaScript, options, &[], None, None, None)
}

#[cfg(feature = "treesitter")]
fn select_language(path: &str) -> Option<(Language, &'static str)> {
    let ext = extension_of(path);
    Some(match ext.as_str() {
        "ts" => (tree_sitter_typescript::language_typescript(), "typescript"),
        "tsx" => (tree_sitter_typescript::language_tsx(), "typescript"),
        "js" | "jsx" => (tree_sitter_javascript::language(), "javascript"),
        "py" => (tree_sitter_python::language(), "python"),
        "rs" => (tree_sitter_rust::language(), "rust"),
        "go" => (tree_sitter_go::language(), "go"),
        _ => return None,
    })
}

#[cfg(feature = "treesitter")]
fn is_top_level_symbol_node(node: Node, language: &str) -> bool {
    match language {
        "rust" => matches!(
            node.kind(),
            "function_item"
                | "struct_item"
                | "enum_item"
                | "trait_item"
                | "impl_item"
                | "type_item"
                | "const_item"
                | "static_item"
        ),
        "python" => matches!(node.kind(), "function_definition" | "class_definition"),
        "go" => matches!(
            node.kind(),
            "function_declaration" | "method_declaration" | "type_declaration" | "const_declaration" | "var_declaration"
        ),
        _ => matches!(
            node.kind(),
            "function_declaration" | "class_declaration" | "lexical_declaration" | "variable_declaration" | "interface_declaration" | "type_alias_declaration" | "enum_declaration"
        ),
    }
}

#[cfg(feature = "treesitter")]
fn symbol_name_of(text: &str, node: Node) -> Option<String> {
    node.child_by_field_name("name")
        .and_then(|n| text.get(n.start_byte()..n.end_byte()))
        .map(str::to_string)
}

/// Maps a tree-sitter node kind to the symbol taxonomy (§3), instead of
/// labelling every top-level declaration `Function` regardless of what it
/// actually declares.
#[cfg(feature = "treesitter")]
fn symbol_kind_of(node_kind: &str) -> SymbolKind {
    match node_kind {
        "function_item" | "function_definition" | "function_declaration" | "method_declaration" => SymbolKind::Function,
        "class_definition" | "class_declaration" => SymbolKind::Class,
        "struct_item" | "enum_item" | "enum_declaration" => SymbolKind::Class,
        "trait_item" | "interface_declaration" => SymbolKind::Interface,
        "type_item" | "type_alias_declaration" | "type_declaration" => SymbolKind::Type,
        "const_item" | "static_item" | "const_declaration" => SymbolKind::Constant,
        "impl_item" => SymbolKind::Object,
        "lexical_declaration" | "variable_declaration" | "var_declaration" => SymbolKind::Global,
        _ => SymbolKind::Function,
    }
}

/// Public code-symbol dispatcher (§4.2): parses a file's top-level
/// declarations into `CodeSymbol`s for the code-graph builder. Unknown
/// extensions consult `adapters` before falling back to an empty list.
pub fn parse_file(path: &str, content: &str, adapters: &AdapterRegistry) -> Vec<CodeSymbol> {
    #[cfg(feature = "treesitter")]
    {
        if let Some(symbols) = parse_file_treesitter(path, content) {
            return symbols;
        }
    }
    let ext = extension_of(path);
    if let Some(adapter) = adapters.get(&ext) {
        return adapter.parse(path, content);
    }
    Vec::new()
}

#[cfg(feature = "treesitter")]
fn parse_file_treesitter(path: &str, content: &str) -> Option<Vec<CodeSymbol>> {
    let (language, language_id) = select_language(path)?;
    let mut parser = Parser::new();
    parser.set_language(language).ok()?;
    let tree = parser.parse(content, None)?;
    let mut cursor = tree.root_node().walk();
    let mut symbols = Vec::new();

    for child in tree.root_node().children(&mut cursor) {
        if !is_top_level_symbol_node(child, language_id) {
            continue;
        }
        let text = content.get(child.start_byte()..child.end_byte())?;
        let name = symbol_name_of(content, child).unwrap_or_else(|| "<anonymous>".to_string());
        let signature = text.lines().next().map(str::trim).map(str::to_string);
        let exported = match language_id {
            "rust" => text.trim_start().starts_with("pub "),
            "go" => name.chars().next().is_some_and(|c| c.is_uppercase()),
            "python" => !name.starts_with('_'),
            _ => text.trim_start().starts_with("export "),
        };
        let is_async = text.trim_start().starts_with("async") || text.contains("async fn") || text.contains("async function");
        let nested_methods = if child.kind() == "impl_item" || child.kind() == "class_definition" || child.kind() == "class_declaration" {
            let mut inner_cursor = child.walk();
            child
                .children(&mut inner_cursor)
                .filter_map(|inner| {
                    if matches!(inner.kind(), "function_item" | "function_definition" | "method_definition") {
                        symbol_name_of(content, inner)
                    } else {
                        None
                    }
                })
                .collect()
        } else {
            Vec::new()
        };

        symbols.push(CodeSymbol {
            kind: symbol_kind_of(child.kind()),
            name,
            exported,
            is_async,
            start_line: child.start_position().row + 1,
            end_line: child.end_position().row + 1,
            signature,
            nested_methods,
        });
    }
    Some(symbols)
}

#[cfg(feature = "treesitter")]
fn chunk_code_treesitter(path: &str, content: &str, options: &ChunkOptions) -> Option<Vec<ChunkDraft>> {
    let (language, language_id) = select_language(path)?;
    let mut parser = Parser::new();
    parser.set_language(language).ok()?;
    let tree = parser.parse(content, None)?;
    let mut cursor = tree.root_node().walk();
    let mut drafts = Vec::new();

    for child in tree.root_node().children(&mut cursor) {
        if !is_top_level_symbol_node(child, language_id) {
            continue;
        }
        let start = child.start_byte();
        let end = child.end_byte();
        let text = content.get(start..end)?;
        let symbol_name = symbol_name_of(content, child);
        let symbol_kind = symbol_kind_of(child.kind());

        if text.len() <= options.size {
            drafts.push(ChunkDraft {
                kind: ChunkKind::JavaScript,
                start_offset: start,
                end_offset: end,
                start_line: child.start_position().row + 1,
                end_line: child.end_position().row + 1,
                content: text.to_string(),
                heading_path: Vec::new(),
                section_header: None,
                symbol_name: symbol_name.clone(),
                symbol_kind: Some(symbol_kind),
            });
        } else {
            // Oversize declaration: re-split by sliding window, preserving
            // the outer symbol's name on every sub-chunk. Per the resolved
            // open question in SPEC_FULL.md §9, nested declarations inside
            // are not re-discovered.
            for mut draft in sliding_window_drafts(
                text,
                ChunkKind::JavaScript,
                options,
                &[],
                None,
                symbol_name.as_deref(),
                Some(symbol_kind),
            ) {
                draft.start_offset += start;
                draft.end_offset += start;
                draft.start_line = line_of_offset(content, draft.start_offset);
                draft.end_line = line_of_offset(content, draft.end_offset.saturating_sub(1).max(draft.start_offset));
                drafts.push(draft);
            }
        }
    }
    Some(drafts)
}

// ---------------------------------------------------------------------
// Import extraction — lexical, language-agnostic enough for the
// extensions this crate dispatches on directly.
// ---------------------------------------------------------------------

pub fn extract_imports(path: &str, content: &str) -> Vec<Import> {
    let ext = extension_of(path);
    match ext.as_str() {
        "ts" | "tsx" | "js" | "jsx" => extract_js_imports(content),
        "py" => extract_py_imports(content),
        "rs" => extract_rs_imports(content),
        "go" => extract_go_imports(content),
        _ => Vec::new(),
    }
}

fn extract_js_imports(content: &str) -> Vec<Import> {
    let re = Regex::new(r#"import\s+(?:type\s+)?(?:\{([^}]*)\}|(\*\s+as\s+\w+)|(\w+))?\s*(?:,\s*\{([^}]*)\})?\s*from\s+['"]([^'"]+)['"]"#).unwrap();
    let mut imports = Vec::new();
    for caps in re.captures_iter(content) {
        let is_type = caps.get(0).map(|m| m.as_str().contains("import type")).unwrap_or(false);
        let source = caps.get(5).map(|m| m.as_str().to_string()).unwrap_or_default();
        let mut specifiers = Vec::new();
        for group in [caps.get(1), caps.get(2), caps.get(3), caps.get(4)] {
            if let Some(m) = group {
                specifiers.extend(m.as_str().split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()));
            }
        }
        if !source.is_empty() {
            imports.push(Import { source, specifiers, is_type });
        }
    }
    imports
}

fn extract_py_imports(content: &str) -> Vec<Import> {
    let from_re = Regex::new(r"^\s*from\s+(\S+)\s+import\s+(.+)$").unwrap();
    let import_re = Regex::new(r"^\s*import\s+(\S+)").unwrap();
    let mut imports = Vec::new();
    for line in content.lines() {
        if let Some(caps) = from_re.captures(line) {
            let source = caps[1].to_string();
            let specifiers = caps[2]
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            imports.push(Import { source, specifiers, is_type: false });
        } else if let Some(caps) = import_re.captures(line) {
            imports.push(Import {
                source: caps[1].to_string(),
                specifiers: Vec::new(),
                is_type: false,
            });
        }
    }
    imports
}

fn extract_rs_imports(content: &str) -> Vec<Import> {
    let re = Regex::new(r"^\s*use\s+([\w:]+)(?:::\{([^}]*)\})?;").unwrap();
    let mut imports = Vec::new();
    for line in content.lines() {
        if let Some(caps) = re.captures(line) {
            let source = caps[1].to_string();
            let specifiers = caps
                .get(2)
                .map(|m| m.as_str().split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or_default();
            imports.push(Import { source, specifiers, is_type: false });
        }
    }
    imports
}

fn extract_go_imports(content: &str) -> Vec<Import> {
    let re = Regex::new(r#""([^"]+)""#).unwrap();
    let mut imports = Vec::new();
    let mut in_block = false;
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("import (") {
            in_block = true;
            continue;
        }
        if in_block && trimmed == ")" {
            in_block = false;
            continue;
        }
        if in_block || trimmed.starts_with("import ") {
            if let Some(caps) = re.captures(trimmed) {
                imports.push(Import {
                    source: caps[1].to_string(),
                    specifiers: Vec::new(),
                    is_type: false,
                });
            }
        }
    }
    imports
}

// ---------------------------------------------------------------------
// Slug generation (kept from the teacher almost verbatim)
// ---------------------------------------------------------------------

fn make_slug(
    path: &str,
    kind: ChunkKind,
    heading_path: &[String],
    symbol_name: &Option<String>,
    start_line: usize,
    end_line: usize,
) -> String {
    let base_name = path.rsplit('/').next().unwrap_or(path);
    let base_stem = strip_extension(base_name);
    let base_slug = truncate_slug(&slugify(base_stem), 28);

    let raw_context = heading_path
        .last()
        .map(String::as_str)
        .or(symbol_name.as_deref());

    let context_slug = raw_context
        .map(slugify)
        .map(|ctx| strip_redundant_prefix(&ctx, &base_slug))
        .map(|ctx| truncate_slug(&ctx, 44))
        .filter(|ctx| !ctx.is_empty() && ctx != "chunk" && *ctx != base_slug);

    let mut slug = match context_slug {
        Some(ctx) => format!("{base_slug}--{ctx}"),
        None => base_slug,
    };
    if kind == ChunkKind::Text || kind == ChunkKind::Unknown {
        slug = format!("{slug}-l{start_line}-{end_line}");
    }
    truncate_slug(&slug, 96)
}

fn strip_extension(name: &str) -> &str {
    match name.rsplit_once('.') {
        Some((stem, _ext)) if !stem.is_empty() => stem,
        _ => name,
    }
}

fn truncate_slug(input: &str, max_len: usize) -> String {
    let mut out = if input.len() <= max_len {
        input.to_string()
    } else {
        input.chars().take(max_len).collect()
    };
    while out.ends_with('-') {
        out.pop();
    }
    while out.starts_with('-') {
        out.remove(0);
    }
    out
}

fn strip_redundant_prefix(context: &str, base: &str) -> String {
    let mut ctx = context.to_string();
    loop {
        match ctx.strip_prefix(base) {
            Some(rest) => ctx = rest.trim_start_matches('-').to_string(),
            None => break,
        }
    }
    ctx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_content_yields_one_empty_chunk() {
        let adapters = AdapterRegistry::new();
        let chunks = chunk_file("empty.txt", "", ChunkKind::Text, &ChunkOptions::default(), &adapters);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "");
        assert_eq!(chunks[0].total_chunks, 1);
    }

    #[test]
    fn sliding_window_overlap_is_exact() {
        let options = ChunkOptions { size: 10, overlap: 3 };
        let content = "a".repeat(25);
        let windows = sliding_window_offsets(&content, &options);
        for pair in windows.windows(2) {
            let (_, end_a) = pair[0];
            let (start_b, _) = pair[1];
            if end_a < content.len() {
                assert_eq!(end_a - start_b, options.overlap);
            }
        }
    }

    #[test]
    fn file_of_exact_size_is_one_chunk() {
        let options = ChunkOptions { size: 10, overlap: 3 };
        let content = "a".repeat(10);
        let windows = sliding_window_offsets(&content, &options);
        assert_eq!(windows, vec![(0, 10)]);
    }

    #[test]
    fn file_of_size_plus_one_is_two_chunks_with_exact_overlap() {
        let options = ChunkOptions { size: 10, overlap: 3 };
        let content = "a".repeat(11);
        let windows = sliding_window_offsets(&content, &options);
        assert_eq!(windows.len(), 2);
        let (_, end_a) = windows[0];
        let (start_b, _) = windows[1];
        assert_eq!(end_a - start_b, options.overlap);
    }

    #[test]
    fn markdown_chunk_carries_section_header_on_resplit() {
        let options = ChunkOptions { size: 20, overlap: 5 };
        let content = format!("# Title\n{}\n", "word ".repeat(20));
        let drafts = chunk_markdown(&content, &options);
        assert!(drafts.iter().all(|d| d.section_header.as_deref() == Some("Title")));
    }

    #[test]
    fn adapter_registration_is_idempotent() {
        struct Dummy;
        impl LanguageAdapter for Dummy {
            fn language_id(&self) -> &'static str {
                "zil"
            }
            fn parse(&self, _path: &str, _content: &str) -> Vec<crate::model::CodeSymbol> {
                Vec::new()
            }
            fn extract_imports(&self, _path: &str, _content: &str) -> Vec<Import> {
                Vec::new()
            }
        }
        let mut registry = AdapterRegistry::new();
        let adapter = std::sync::Arc::new(Dummy);
        registry.register("zil", adapter.clone()).unwrap();
        registry.register("zil", adapter).unwrap();
        assert!(registry.get("zil").is_some());
    }

    #[test]
    fn conflicting_adapter_registration_is_rejected() {
        struct A;
        struct B;
        impl LanguageAdapter for A {
            fn language_id(&self) -> &'static str {
                "a"
            }
            fn parse(&self, _: &str, _: &str) -> Vec<crate::model::CodeSymbol> {
                Vec::new()
            }
            fn extract_imports(&self, _: &str, _: &str) -> Vec<Import> {
                Vec::new()
            }
        }
        impl LanguageAdapter for B {
            fn language_id(&self) -> &'static str {
                "b"
            }
            fn parse(&self, _: &str, _: &str) -> Vec<crate::model::CodeSymbol> {
                Vec::new()
            }
            fn extract_imports(&self, _: &str, _: &str) -> Vec<Import> {
                Vec::new()
            }
        }
        let mut registry = AdapterRegistry::new();
        registry.register("zz", std::sync::Arc::new(A)).unwrap();
        assert!(registry.register("zz", std::sync::Arc::new(B)).is_err());
    }

    #[cfg(feature = "treesitter")]
    #[test]
    fn parse_file_maps_rust_symbol_kinds() {
        let content = "pub fn greet() {}\nstruct Thing;\ntrait Doer {}\n";
        let adapters = AdapterRegistry::new();
        let symbols = parse_file("src/lib.rs", content, &adapters);
        assert_eq!(symbols.len(), 3);
        assert_eq!(symbols[0].name, "greet");
        assert_eq!(symbols[0].kind, SymbolKind::Function);
        assert!(symbols[0].exported);
        assert_eq!(symbols[1].kind, SymbolKind::Class);
        assert_eq!(symbols[2].kind, SymbolKind::Interface);
    }

    #[test]
    fn parse_file_falls_back_to_adapter_for_unknown_extension() {
        struct Fixed;
        impl LanguageAdapter for Fixed {
            fn language_id(&self) -> &'static str {
                "zil"
            }
            fn parse(&self, _path: &str, _content: &str) -> Vec<crate::model::CodeSymbol> {
                vec![crate::model::CodeSymbol {
                    kind: SymbolKind::Routine,
                    name: "go-north".to_string(),
                    exported: true,
                    is_async: false,
                    start_line: 1,
                    end_line: 1,
                    signature: None,
                    nested_methods: Vec::new(),
                }]
            }
            fn extract_imports(&self, _path: &str, _content: &str) -> Vec<Import> {
                Vec::new()
            }
        }
        let mut adapters = AdapterRegistry::new();
        adapters.register("zil", std::sync::Arc::new(Fixed)).unwrap();
        let symbols = parse_file("world.zil", "anything", &adapters);
        assert_eq!(symbols.len(), 1);
        assert_eq!(symbols[0].name, "go-north");
    }

    #[cfg(feature = "treesitter")]
    #[test]
    fn chunk_file_routes_py_rs_go_through_code_chunking_not_sliding_window() {
        // `detect_kind` classifies these as `ChunkKind::Unknown`, not
        // `JavaScript`; `chunk_file` must still dispatch them to
        // `chunk_code` via `extension_for_code`, not a plain sliding
        // window, or top-level declarations never become one chunk each.
        let adapters = AdapterRegistry::new();
        let options = ChunkOptions::default();

        let rs = chunk_file("src/lib.rs", "pub fn a() {}\npub fn b() {}\n", ChunkKind::Unknown, &options, &adapters);
        assert_eq!(rs.len(), 2);
        assert_eq!(rs[0].symbol_name.as_deref(), Some("a"));
        assert_eq!(rs[1].symbol_name.as_deref(), Some("b"));

        let py = chunk_file("a.py", "def f():\n    pass\n\n\ndef g():\n    pass\n", ChunkKind::Unknown, &options, &adapters);
        assert_eq!(py.len(), 2);
        assert_eq!(py[0].symbol_name.as_deref(), Some("f"));

        let go = chunk_file("a.go", "func F() {}\nfunc G() {}\n", ChunkKind::Unknown, &options, &adapters);
        assert_eq!(go.len(), 2);
        assert_eq!(go[0].symbol_name.as_deref(), Some("F"));
    }
}
