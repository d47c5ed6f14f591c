//! Code-graph construction (§4.2): walks a store's tree, extracts symbols
//! and imports per file via [`crate::chunk::parse_file`]/
//! [`crate::chunk::extract_imports`], and resolves a call graph across
//! files.
//!
//! Grounded on the same `ignore`-crate walk the indexer uses
//! (`indexer.rs::index_directory`), generalized from document-writing to
//! graph-node/edge emission. The call-resolution pass has no counterpart
//! in the retrieval pack to imitate line-for-line, so it follows the
//! resolved open question in SPEC_FULL.md §9: local symbols first, then
//! imported specifiers, with anything left over kept as a low-confidence
//! `<unknown>` node rather than silently dropped.

use crate::chunk::{extract_imports, parse_file, AdapterRegistry};
use crate::error::{CoreError, Result};
use crate::graph::CodeGraph;
use crate::model::EdgeKind;
use ignore::WalkBuilder;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::path::Path;

const MODULE_SYMBOL: &str = "<module>";

/// Identifiers that precede `(` in every language this builder scans but
/// are never callables: control-flow/declaration keywords. Kept as one
/// combined set since the call scan is a best-effort lexical pass, not a
/// per-language parser.
const SPECIAL_FORMS: &[&str] = &[
    "if", "else", "for", "while", "match", "switch", "case", "return", "fn", "function", "def",
    "class", "struct", "impl", "enum", "trait", "interface", "type", "use", "import", "export",
    "pub", "let", "const", "var", "try", "catch", "finally", "new", "typeof", "instanceof", "in",
    "of", "as", "async", "await", "yield", "with", "do", "break", "continue", "throw", "package",
    "go", "defer", "range", "select", "chan", "map", "make", "println", "print", "super", "self",
    "this", "static", "pub(crate)", "mod", "unsafe", "where", "loop",
];

fn is_special_form(name: &str) -> bool {
    SPECIAL_FORMS.contains(&name)
}

fn call_sites(text: &str) -> Vec<String> {
    let re = Regex::new(r"\b([A-Za-z_][A-Za-z0-9_]*)\s*\(").unwrap();
    re.captures_iter(text)
        .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
        .filter(|name| !is_special_form(name))
        .collect()
}

/// Best-effort resolution of an import's `source` to one of the files this
/// build pass walked, matching on relative path with any of the built-in
/// code extensions and an `index`-file fallback for directory imports.
fn resolve_import_target(importing_file: &str, source: &str, known_files: &HashSet<String>) -> Option<String> {
    if !source.starts_with('.') {
        return None; // external package; nothing in this tree resolves it
    }
    let base_dir = Path::new(importing_file).parent().unwrap_or_else(|| Path::new(""));
    let joined = base_dir.join(source);
    let candidates = [
        joined.clone(),
        joined.with_extension("ts"),
        joined.with_extension("tsx"),
        joined.with_extension("js"),
        joined.with_extension("jsx"),
        joined.with_extension("py"),
        joined.join("index.ts"),
        joined.join("index.js"),
        joined.join("__init__.py"),
    ];
    for candidate in candidates {
        let normalized = normalize_path(&candidate);
        if known_files.contains(&normalized) {
            return Some(normalized);
        }
    }
    None
}

fn normalize_path(path: &Path) -> String {
    let mut parts: Vec<&std::ffi::OsStr> = Vec::new();
    for component in path.components() {
        match component {
            std::path::Component::ParentDir => {
                parts.pop();
            }
            std::path::Component::CurDir => {}
            std::path::Component::Normal(p) => parts.push(p),
            _ => {}
        }
    }
    parts
        .into_iter()
        .map(|p| p.to_string_lossy().to_string())
        .collect::<Vec<_>>()
        .join("/")
}

/// Builds a `CodeGraph` over every file under `root`, skipping the same
/// segments the indexer ignores.
pub fn build(root: &Path, adapters: &AdapterRegistry) -> Result<CodeGraph> {
    let mut builder = WalkBuilder::new(root);
    builder.hidden(false).git_ignore(true).git_global(true).git_exclude(true).ignore(true).follow_links(false);

    let mut contents: HashMap<String, String> = HashMap::new();
    for entry in builder.build() {
        let Ok(entry) = entry else { continue };
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let ignored = path
            .components()
            .any(|c| matches!(c.as_os_str().to_str(), Some(".git") | Some("node_modules") | Some("dist") | Some("build")));
        if ignored {
            continue;
        }
        let relative = path.strip_prefix(root).unwrap_or(path).to_string_lossy().to_string();
        let Ok(data) = std::fs::read(path) else { continue };
        let Ok(text) = String::from_utf8(data) else { continue };
        contents.insert(relative, text);
    }

    let known_files: HashSet<String> = contents.keys().cloned().collect();
    let mut symbols_by_file: HashMap<String, Vec<crate::model::CodeSymbol>> = HashMap::new();
    let mut imports_by_file: HashMap<String, Vec<crate::model::Import>> = HashMap::new();

    for (file, text) in &contents {
        symbols_by_file.insert(file.clone(), parse_file(file, text, adapters));
        imports_by_file.insert(file.clone(), extract_imports(file, text));
    }

    // specifier resolution: (file, specifier) -> target file
    let mut specifier_targets: HashMap<(String, String), String> = HashMap::new();
    let mut import_edges: Vec<(String, String)> = Vec::new();
    for (file, imports) in &imports_by_file {
        for import in imports {
            if let Some(target) = resolve_import_target(file, &import.source, &known_files) {
                import_edges.push((file.clone(), target.clone()));
                for specifier in &import.specifiers {
                    specifier_targets.insert((file.clone(), specifier.clone()), target.clone());
                }
            }
        }
    }

    let mut graph = CodeGraph::new();
    for (file, symbols) in &symbols_by_file {
        graph.get_or_insert_node(file, MODULE_SYMBOL);
        for symbol in symbols {
            graph.get_or_insert_node(file, &symbol.name);
        }
    }
    for (from_file, to_file) in import_edges {
        let from = graph.get_or_insert_node(&from_file, MODULE_SYMBOL);
        let to = graph.get_or_insert_node(&to_file, MODULE_SYMBOL);
        graph.insert_edge(from, to, EdgeKind::Imports, 1.0);
    }

    for (file, symbols) in &symbols_by_file {
        let Some(text) = contents.get(file) else { continue };
        let lines: Vec<&str> = text.lines().collect();
        let local_names: HashSet<&str> = symbols.iter().map(|s| s.name.as_str()).collect();

        let extension = Path::new(file).extension().and_then(|e| e.to_str()).unwrap_or("");
        if let Some(adapter) = adapters.get(extension) {
            if let Some(pairs) = adapter.analyze_call_relationships(file, text) {
                for (caller, callee, confidence) in pairs {
                    let from = graph.get_or_insert_node(file, &caller);
                    let to = if local_names.contains(callee.as_str()) {
                        graph.get_or_insert_node(file, &callee)
                    } else {
                        graph.get_or_insert_node(file, &format!("<unknown>:{callee}"))
                    };
                    graph.insert_edge(from, to, EdgeKind::Calls, confidence);
                }
                continue;
            }
        }

        for symbol in symbols {
            let start = symbol.start_line.saturating_sub(1).min(lines.len());
            let end = symbol.end_line.min(lines.len());
            if start >= end {
                continue;
            }
            let body = lines[start..end].join("\n");
            let caller = graph.get_or_insert_node(file, &symbol.name);
            for call_name in call_sites(&body) {
                if call_name == symbol.name {
                    continue; // recursive self-call carries no retrieval signal
                }
                if local_names.contains(call_name.as_str()) {
                    let callee = graph.get_or_insert_node(file, &call_name);
                    graph.insert_edge(caller, callee, EdgeKind::Calls, 0.9);
                } else if let Some(target_file) = specifier_targets.get(&(file.clone(), call_name.clone())) {
                    let target_symbols = symbols_by_file.get(target_file);
                    let callee = if target_symbols.is_some_and(|s| s.iter().any(|sym| sym.name == call_name)) {
                        graph.get_or_insert_node(target_file, &call_name)
                    } else {
                        graph.get_or_insert_node(target_file, &format!("<unknown>:{call_name}"))
                    };
                    graph.insert_edge(caller, callee, EdgeKind::Calls, 0.6);
                } else {
                    let callee = graph.get_or_insert_node(file, &format!("<unknown>:{call_name}"));
                    graph.insert_edge(caller, callee, EdgeKind::Calls, 0.3);
                }
            }
        }
    }

    Ok(graph)
}

pub fn write_graph(root: &Path, graph: &CodeGraph) -> Result<()> {
    let path = root.join("graph.json");
    let body = graph.to_json().map_err(|e| CoreError::corruption(path.display().to_string(), e.to_string()))?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, body).map_err(|e| CoreError::io(tmp.display().to_string(), e))?;
    std::fs::rename(&tmp, &path).map_err(|e| CoreError::io(path.display().to_string(), e))?;
    Ok(())
}

pub fn load_graph(root: &Path) -> Result<CodeGraph> {
    let path = root.join("graph.json");
    if !path.exists() {
        return Ok(CodeGraph::new());
    }
    let raw = std::fs::read_to_string(&path).map_err(|e| CoreError::io(path.display().to_string(), e))?;
    CodeGraph::from_json(&raw).map_err(|e| CoreError::corruption(path.display().to_string(), e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_import_and_call_edges_across_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("util.rs"), "pub fn helper() {}\n").unwrap();
        std::fs::write(
            dir.path().join("main.rs"),
            "fn main() {\n    helper();\n}\n",
        )
        .unwrap();
        let adapters = AdapterRegistry::new();
        let graph = build(dir.path(), &adapters).unwrap();
        assert!(graph.node_count() > 0);
    }

    #[test]
    fn local_calls_resolve_to_sibling_symbol_in_same_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("a.rs"),
            "fn helper() {}\nfn main() {\n    helper();\n}\n",
        )
        .unwrap();
        let adapters = AdapterRegistry::new();
        let graph = build(dir.path(), &adapters).unwrap();
        let caller = graph.find_node("a.rs", "main").unwrap();
        let callee = graph.find_node("a.rs", "helper").unwrap();
        assert!(graph.has_path(caller, callee, EdgeKind::Calls));
    }

    #[test]
    fn special_form_keywords_are_never_treated_as_calls() {
        let sites = call_sites("if condition() { return value(); }");
        assert!(!sites.contains(&"if".to_string()));
        assert!(!sites.contains(&"return".to_string()));
        assert!(sites.contains(&"condition".to_string()));
        assert!(sites.contains(&"value".to_string()));
    }
}
