//! Core data types (§3). Representations favor what the store/search/job
//! modules need; transport-facing request/response shapes (CLI flags, any
//! tool-call schema) are a caller concern layered on top of these, not
//! duplicated here.

use crate::ids::{DocumentId, JobId, StoreId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// ---------------------------------------------------------------------
// Chunk-level content classification (coarse, used by the chunker itself)
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ChunkKind {
    Markdown,
    Json,
    JavaScript,
    Html,
    Text,
    Image,
    Unknown,
}

/// §4.7 classification used by the ranker's file-type bonus table. Distinct
/// from `ChunkKind`: `ChunkKind` picks a chunking *strategy*, `FileType`
/// picks a ranking *bonus*.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "kebab-case")]
pub enum FileType {
    DocumentationPrimary,
    Documentation,
    Source,
    Example,
    Test,
    SourceInternal,
    Changelog,
    Config,
    Other,
}

impl FileType {
    /// The multiplier from the bonus table in §4.4 step 6.
    pub fn bonus(self) -> f64 {
        match self {
            FileType::DocumentationPrimary => 1.25,
            FileType::Documentation => 1.15,
            FileType::Source => 1.00,
            FileType::Example => 0.95,
            FileType::Test => 0.85,
            FileType::SourceInternal => 0.80,
            FileType::Changelog => 0.70,
            FileType::Config => 0.90,
            FileType::Other => 0.85,
        }
    }
}

// ---------------------------------------------------------------------
// Chunk
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    Function,
    Class,
    Interface,
    Type,
    Constant,
    Object,
    Room,
    Global,
    Routine,
    Verb,
    Syntax,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeSymbol {
    pub kind: SymbolKind,
    pub name: String,
    pub exported: bool,
    pub is_async: bool,
    pub start_line: usize,
    pub end_line: usize,
    pub signature: Option<String>,
    pub nested_methods: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Import {
    pub source: String,
    pub specifiers: Vec<String>,
    pub is_type: bool,
}

/// A pre-document value produced by the chunker (§4.1). `chunk_index` /
/// `total_chunks` are filled in retroactively once the final count is
/// known; `total_chunks` is 0 until then.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub short_id: String,
    pub slug: String,
    pub path: String,
    pub kind: ChunkKind,
    pub chunk_index: usize,
    pub total_chunks: usize,
    pub start_offset: usize,
    pub end_offset: usize,
    pub start_line: usize,
    pub end_line: usize,
    pub content: String,
    pub content_hash: String,
    pub token_estimate: usize,
    pub heading_path: Vec<String>,
    pub section_header: Option<String>,
    pub symbol_name: Option<String>,
    pub symbol_kind: Option<SymbolKind>,
    pub address: Option<String>,
    #[serde(default)]
    pub asset_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileMeta {
    pub path: String,
    pub kind: ChunkKind,
    pub bytes: usize,
    pub sha256: String,
    pub file_hash: String,
    pub line_count: usize,
    #[serde(default)]
    pub mtime_ms: Option<u64>,
}

// ---------------------------------------------------------------------
// Document (the unit of retrieval, §3)
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    File,
    Chunk,
    Web,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub store_id: StoreId,
    pub kind: DocumentKind,
    pub indexed_at: u64,
    pub source_path: Option<String>,
    pub source_url: Option<String>,
    pub file_hash: String,
    pub chunk_index: usize,
    pub total_chunks: usize,
    pub file_type: FileType,
    pub section_header: Option<String>,
    pub symbol_name: Option<String>,
    pub has_doc_comments: bool,
    /// Flattened `source` entries of every import statement the chunk's
    /// file declares, used to populate search's contextual `imports` field
    /// without re-parsing the file at query time.
    #[serde(default)]
    pub imports: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub content: String,
    pub vector: Vec<f32>,
    pub metadata: DocumentMetadata,
}

// ---------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum StoreKind {
    LocalDirectory,
    ClonedRepo,
    WebCollection,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StoreStatus {
    Pending,
    Ready,
    Indexing,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Store {
    pub id: StoreId,
    pub name: String,
    pub kind: StoreKind,
    pub path: Option<String>,
    pub url: Option<String>,
    pub branch: Option<String>,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub created_at: u64,
    pub updated_at: u64,
    pub status: StoreStatus,
    pub dimension: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSpec {
    pub name: String,
    pub kind: StoreKind,
    pub path: Option<String>,
    pub url: Option<String>,
    pub branch: Option<String>,
    pub description: Option<String>,
    pub tags: Vec<String>,
}

// ---------------------------------------------------------------------
// Code graph (§4.2)
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeIndex(pub u32);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNode {
    pub label: String, // "<file>:<symbol-name>"
    pub file: String,
    pub symbol_name: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    Imports,
    Calls,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphEdge {
    pub from: NodeIndex,
    pub to: NodeIndex,
    pub kind: EdgeKind,
    pub confidence: f32,
}

// ---------------------------------------------------------------------
// Job (§4.6)
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// Whether `from -> to` is a legal transition (§3 invariant: monotonic
    /// except pending/running -> cancelled).
    pub fn can_transition_to(self, to: JobStatus) -> bool {
        use JobStatus::*;
        match (self, to) {
            (Pending, Running) | (Pending, Cancelled) | (Pending, Failed) => true,
            (Running, Completed) | (Running, Failed) | (Running, Cancelled) => true,
            (a, b) if a == b => true,
            _ => false,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

/// Tagged variant per job kind (§9) instead of an open `details` map.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum JobDetails {
    Clone {
        store_id: StoreId,
    },
    Index {
        store_id: StoreId,
    },
    Crawl {
        store_id: StoreId,
        url: String,
        max_pages: usize,
    },
}

impl JobDetails {
    pub fn store_id(&self) -> &StoreId {
        match self {
            JobDetails::Clone { store_id }
            | JobDetails::Index { store_id }
            | JobDetails::Crawl { store_id, .. } => store_id,
        }
    }

    /// The `kind` tag this variant serializes under, usable as a filter key
    /// without matching on the full enum shape (§4.6 `list(filter?)`).
    pub fn kind_tag(&self) -> &'static str {
        match self {
            JobDetails::Clone { .. } => "clone",
            JobDetails::Index { .. } => "index",
            JobDetails::Crawl { .. } => "crawl",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub status: JobStatus,
    pub progress: u8,
    pub message: String,
    pub details: JobDetails,
    pub error: Option<JobError>,
    pub created_at: u64,
    pub started_at: Option<u64>,
    pub completed_at: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobError {
    pub message: String,
    pub stack: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobPatch {
    pub status: Option<JobStatus>,
    pub progress: Option<u8>,
    pub message: Option<String>,
    pub error: Option<JobError>,
}

// ---------------------------------------------------------------------
// Search (§4.4)
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    Vector,
    Fts,
    Hybrid,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DetailLevel {
    Minimal,
    Contextual,
    Full,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SearchFilters {
    pub path_prefix: Option<String>,
    pub file_type: Option<FileType>,
    pub symbol_prefix: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchQuery {
    pub text: String,
    pub store_ids: Vec<StoreId>,
    pub mode: SearchMode,
    pub limit: usize,
    pub threshold: Option<f64>,
    pub min_raw_relevance: Option<f64>,
    pub include_content: bool,
    pub detail: DetailLevel,
    pub filters: SearchFilters,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchSummary {
    pub kind: DocumentKind,
    pub name: String,
    pub location: String,
    pub purpose: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SearchContext {
    pub imports: Vec<String>,
    pub related: Vec<String>,
    pub preview: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SearchFull {
    pub content: String,
    pub previous_chunk: Option<String>,
    pub next_chunk: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: DocumentId,
    pub score: f64,
    pub raw_cosine: f64,
    pub summary: SearchSummary,
    pub context: Option<SearchContext>,
    pub full: Option<SearchFull>,
    pub metadata: DocumentMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchEnvelope {
    pub mode: SearchMode,
    pub results: Vec<SearchResult>,
    pub total_results: usize,
    pub elapsed_ms: u64,
    pub confidence: Confidence,
}

// ---------------------------------------------------------------------
// Lexical index internals (BM25 postings)
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Posting {
    pub doc_id: DocumentId,
    pub tf: usize,
    pub doc_len: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TermEntry {
    pub df: usize,
    pub postings: Vec<Posting>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct IndexStats {
    pub total_files: usize,
    pub total_documents: usize,
    pub avg_chunk_chars: usize,
    pub avg_chunk_tokens: usize,
}

// ---------------------------------------------------------------------
// Crawl (§4.9)
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawledPage {
    pub url: String,
    pub title: String,
    pub markdown: String,
    pub extracted_summary: Option<String>,
}

// ---------------------------------------------------------------------
// Checkpoint (ancillary, §3 — inert in this document)
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub store_id: StoreId,
    pub taken_at: u64,
    pub file_contents: BTreeMap<String, String>,
    pub scores: BTreeMap<String, f64>,
}
