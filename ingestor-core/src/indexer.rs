//! Indexer (§4.5): walks a store's directory, hashes/chunks/embeds each
//! file, and writes documents to its `DocumentStore` in batches.
//!
//! The walk itself is lifted close to verbatim from the teacher's
//! `handlers/safety.rs::dynamic_walk` (the `ignore` crate, same traversal
//! rules ripgrep uses) and generalized to the spec's ignore-pattern list
//! and project-root safety check.

use crate::chunk::{chunk_file, extract_imports, AdapterRegistry, ChunkOptions};
use crate::embeddings::EmbeddingClient;
use crate::error::{CoreError, Result};
use crate::ids::{DocumentId, StoreId};
use crate::model::{Document, DocumentKind, DocumentMetadata, FileType};
use crate::store::DocumentStore;
use crate::util::{detect_kind, md5_hex};
use ignore::WalkBuilder;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::time::Instant;

const BATCH_SIZE: usize = 256;
const IGNORE_SEGMENTS: &[&str] = &[".git", "node_modules", "dist", "build"];

/// Paths a directory walk refuses to descend into outright (§4.5 "Safety").
const DANGEROUS_ROOTS: &[&str] = &[
    "/", "/bin", "/boot", "/dev", "/etc", "/home", "/lib", "/lib64", "/opt", "/proc", "/root", "/run", "/sbin",
    "/srv", "/sys", "/tmp", "/usr", "/var",
];

const PROJECT_MARKERS: &[&str] = &[
    ".git",
    "Cargo.toml",
    "package.json",
    "pyproject.toml",
    "go.mod",
    "Makefile",
];

pub fn is_dangerous_root(path: &Path) -> bool {
    let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    let as_str = canonical.to_string_lossy();
    DANGEROUS_ROOTS.iter().any(|d| as_str == *d)
}

/// Walks up from `start` looking for the nearest project marker, so the
/// indexer's notion of "project root" prefers `.git`/`Cargo.toml` etc. over
/// the literal store path.
pub fn find_project_root(start: &Path) -> Option<PathBuf> {
    let canonical = start.canonicalize().ok()?;
    let mut current = canonical.as_path();
    loop {
        if PROJECT_MARKERS.iter().any(|m| current.join(m).exists()) {
            return Some(current.to_path_buf());
        }
        current = current.parent()?;
    }
}

#[derive(Debug, Clone)]
pub struct IndexProgress {
    pub files_seen: usize,
    pub files_indexed: usize,
    pub chunks_written: usize,
    pub current_path: Option<String>,
}

/// Progress is delivered over an mpsc channel, not a stored callback
/// (§4.5), so a cancelled job's sender can simply be dropped.
pub struct IndexOptions {
    pub chunk_options: ChunkOptions,
    pub progress: Option<tokio::sync::mpsc::UnboundedSender<IndexProgress>>,
    pub cancel: Option<tokio::sync::watch::Receiver<bool>>,
    /// When true, a file whose stored `file_hash` already matches is
    /// skipped instead of re-chunked and re-embedded (§4.5 step 2).
    pub incremental: bool,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            chunk_options: ChunkOptions::default(),
            progress: None,
            cancel: None,
            incremental: false,
        }
    }
}

fn is_cancelled(cancel: &Option<tokio::sync::watch::Receiver<bool>>) -> bool {
    cancel.as_ref().is_some_and(|rx| *rx.borrow())
}

fn ignored_by_segment(path: &Path) -> bool {
    path.components().any(|c| {
        let s = c.as_os_str().to_string_lossy();
        IGNORE_SEGMENTS.contains(&s.as_ref())
    })
}

const DOC_PRIMARY_NAMES: &[&str] = &["readme.md", "migration.md", "contributing.md"];
const CONFIG_NAME_PREFIXES: &[&str] = &["tsconfig", "package", ".eslint", ".prettier", "vite.config", "next.config"];

fn file_name_lower(path: &str) -> String {
    path.rsplit('/').next().unwrap_or(path).to_ascii_lowercase()
}

fn has_segment(lower_path: &str, segment: &str) -> bool {
    lower_path.split('/').any(|s| s == segment)
}

/// Implements the file-classification rules (§4.7) by filename and path
/// shape rather than by extension, since a config file is identified by
/// what it's named, not what it ends in.
fn classify_file_type(path: &str) -> FileType {
    let lower = path.to_ascii_lowercase();
    let name = file_name_lower(&lower);

    if DOC_PRIMARY_NAMES.contains(&name.as_str()) {
        return FileType::DocumentationPrimary;
    }
    if name.ends_with(".md") {
        if Regex::new(r"changelog").unwrap().is_match(&name) {
            return FileType::Changelog;
        }
        return FileType::Documentation;
    }
    if Regex::new(r"\.(test|spec)\.[tj]sx?$").unwrap().is_match(&name)
        || has_segment(&lower, "test")
        || has_segment(&lower, "tests")
        || name.starts_with("test_")
        || name.ends_with("_test.py")
        || name.ends_with("_test.go")
    {
        return FileType::Test;
    }
    if has_segment(&lower, "example") || has_segment(&lower, "examples") || name.contains("example") {
        return FileType::Example;
    }
    if CONFIG_NAME_PREFIXES.iter().any(|prefix| name.starts_with(prefix)) {
        return FileType::Config;
    }
    if name != "index.ts" && name != "index.js" && name != "readme.md" {
        let monorepo_internal = Regex::new(r"packages/[^/]+/src/").unwrap().is_match(&lower)
            || has_segment(&lower, "internal")
            || Regex::new(r"(compiler|transforms?|parse|codegen)").unwrap().is_match(&lower);
        if monorepo_internal {
            return FileType::SourceInternal;
        }
    }
    if name.ends_with(".rs")
        || name.ends_with(".ts")
        || name.ends_with(".tsx")
        || name.ends_with(".js")
        || name.ends_with(".jsx")
        || name.ends_with(".py")
        || name.ends_with(".go")
    {
        return FileType::Source;
    }
    FileType::Other
}

/// Indexes `root` into `store`, embedding with `embedder` and chunking with
/// `adapters`. Returns the number of documents written.
pub async fn index_directory(
    store_id: &StoreId,
    root: &Path,
    store: &mut DocumentStore,
    embedder: &dyn EmbeddingClient,
    adapters: &AdapterRegistry,
    options: &IndexOptions,
) -> Result<usize> {
    if is_dangerous_root(root) {
        return Err(CoreError::invalid("index_root", format!("refusing to index {}", root.display())));
    }

    let start = Instant::now();
    let mut builder = WalkBuilder::new(root);
    builder
        .hidden(false)
        .git_ignore(true)
        .git_global(true)
        .git_exclude(true)
        .ignore(true)
        .follow_links(false);

    let mut batch: Vec<Document> = Vec::new();
    let mut written = 0usize;
    let mut seen = 0usize;

    for entry in builder.build() {
        if is_cancelled(&options.cancel) {
            return Err(CoreError::Cancelled);
        }
        let entry = match entry {
            Ok(e) => e,
            Err(_) => continue,
        };
        let path = entry.path();
        if !path.is_file() || ignored_by_segment(path) {
            continue;
        }
        seen += 1;

        let relative = path.strip_prefix(root).unwrap_or(path).to_string_lossy().to_string();
        let data = match std::fs::read(path) {
            Ok(d) => d,
            Err(_) => continue,
        };
        let text = match String::from_utf8(data) {
            Ok(t) => t,
            Err(_) => continue,
        };

        let kind = detect_kind(&relative);
        let file_hash = md5_hex(text.as_bytes());

        // Incremental mode (§4.5 step 2): a file whose single-chunk or
        // first-chunk document already carries this hash is unchanged;
        // skip re-chunking/re-embedding it entirely.
        if options.incremental {
            let single_id = DocumentId::new(format!("{}-{}", store_id.as_str(), file_hash));
            let first_id = DocumentId::new(format!("{}-{}-0", store_id.as_str(), file_hash));
            let unchanged = store.get(&single_id).is_some_and(|d| d.metadata.source_path.as_deref() == Some(relative.as_str()))
                || store.get(&first_id).is_some_and(|d| d.metadata.source_path.as_deref() == Some(relative.as_str()));
            if unchanged {
                continue;
            }
        }

        let imports = extract_imports(&relative, &text);
        let import_sources: Vec<String> = imports.iter().map(|i| i.source.clone()).collect();
        let chunks = chunk_file(&relative, &text, kind, &options.chunk_options, adapters);
        let contents: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let vectors = embed_in_batches(embedder, &contents)?;

        for (chunk, vector) in chunks.into_iter().zip(vectors) {
            // §6: single-chunk files get `<store>-<hash>`, multi-chunk files
            // get `<store>-<hash>-<index>` so sibling lookups stay stable
            // across re-indexes of an unchanged file.
            let id = if chunk.total_chunks <= 1 {
                format!("{}-{}", store_id.as_str(), file_hash)
            } else {
                format!("{}-{}-{}", store_id.as_str(), file_hash, chunk.chunk_index)
            };
            let doc = Document {
                id: DocumentId::new(id),
                content: chunk.content,
                vector,
                metadata: DocumentMetadata {
                    store_id: store_id.clone(),
                    kind: DocumentKind::Chunk,
                    indexed_at: crate::model::now_ms(),
                    source_path: Some(chunk.path.clone()),
                    source_url: None,
                    file_hash: file_hash.clone(),
                    chunk_index: chunk.chunk_index,
                    total_chunks: chunk.total_chunks,
                    file_type: classify_file_type(&chunk.path),
                    section_header: chunk.section_header,
                    symbol_name: chunk.symbol_name,
                    has_doc_comments: false,
                    imports: import_sources.clone(),
                },
            };
            batch.push(doc);
            if batch.len() >= BATCH_SIZE {
                written += batch.len();
                store.upsert_batch(std::mem::take(&mut batch))?;
            }
        }

        if let Some(tx) = &options.progress {
            let _ = tx.send(IndexProgress {
                files_seen: seen,
                files_indexed: seen,
                chunks_written: written + batch.len(),
                current_path: Some(relative),
            });
        }
    }

    if !batch.is_empty() {
        written += batch.len();
        store.upsert_batch(batch)?;
    }

    let _elapsed = start.elapsed();
    Ok(written)
}

fn embed_in_batches(embedder: &dyn EmbeddingClient, texts: &[String]) -> Result<Vec<Vec<f32>>> {
    let mut out = Vec::with_capacity(texts.len());
    for chunk in texts.chunks(crate::embeddings::MAX_BATCH_SIZE) {
        out.extend(embedder.embed_batch(chunk)?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::HashingEmbeddingClient;

    #[tokio::test]
    async fn indexes_a_small_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.md"), "# Hello\nworld\n").unwrap();
        std::fs::write(dir.path().join("b.rs"), "fn main() {}\n").unwrap();

        let mut store = DocumentStore::empty(dir.path().join(".store"));
        let embedder = HashingEmbeddingClient::new(32);
        let adapters = AdapterRegistry::new();
        let store_id = StoreId::from("s1");
        let written = index_directory(&store_id, dir.path(), &mut store, &embedder, &adapters, &IndexOptions::default())
            .await
            .unwrap();
        assert!(written >= 2);
        assert_eq!(store.len(), written);
    }

    #[test]
    fn classifies_readme_as_primary_documentation() {
        assert_eq!(classify_file_type("README.md"), FileType::DocumentationPrimary);
        assert_eq!(classify_file_type("src/lib.rs"), FileType::Source);
        assert_eq!(classify_file_type("tests/it_test.rs"), FileType::Test);
        assert_eq!(classify_file_type("examples/basic.rs"), FileType::Example);
        assert_eq!(classify_file_type("package.json"), FileType::Config);
        assert_eq!(classify_file_type("CHANGELOG.md"), FileType::Changelog);
    }

    #[test]
    fn refuses_to_index_system_root() {
        assert!(is_dangerous_root(Path::new("/")));
    }

    #[tokio::test]
    async fn single_chunk_document_id_follows_store_hash_scheme() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.rs"), "fn tiny() {}\n").unwrap();
        let mut store = DocumentStore::empty(dir.path().join(".store"));
        let embedder = HashingEmbeddingClient::new(16);
        let adapters = AdapterRegistry::new();
        let store_id = StoreId::from("s1");
        index_directory(&store_id, dir.path(), &mut store, &embedder, &adapters, &IndexOptions::default())
            .await
            .unwrap();
        let hash = md5_hex(b"fn tiny() {}\n");
        let expected = DocumentId::new(format!("{}-{}", store_id.as_str(), hash));
        assert!(store.get(&expected).is_some());
    }

    #[tokio::test]
    async fn incremental_mode_skips_unchanged_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.rs"), "fn tiny() {}\n").unwrap();
        let mut store = DocumentStore::empty(dir.path().join(".store"));
        let embedder = HashingEmbeddingClient::new(16);
        let adapters = AdapterRegistry::new();
        let store_id = StoreId::from("s1");
        let options = IndexOptions {
            incremental: true,
            ..IndexOptions::default()
        };
        index_directory(&store_id, dir.path(), &mut store, &embedder, &adapters, &options)
            .await
            .unwrap();
        let written_again = index_directory(&store_id, dir.path(), &mut store, &embedder, &adapters, &options)
            .await
            .unwrap();
        assert_eq!(written_again, 0);
    }
}
