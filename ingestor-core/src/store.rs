//! Document store (§4.3): vector + lexical index over one store's
//! documents, persisted as flat JSON files and rebuilt into an in-memory
//! inverted index on load — the inverted index itself is never serialized.
//!
//! Grounded on the teacher's `index.rs` BM25 math (`k1 = 1.5`, `b = 0.75`)
//! and atomic-write pattern, generalized from per-chunk scoring to the
//! spec's `Document`/`DocumentId` shape and given an explicit on-disk
//! layout plus dimension-fixed-at-initialize contract.

use crate::error::{CoreError, Result};
use crate::ids::DocumentId;
use crate::model::{Document, Posting, TermEntry};
use crate::util::tokenize_counts;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

const K1: f32 = 1.5;
const B: f32 = 0.75;
const BATCH_WRITE_LIMIT: usize = 256;

/// One store's persisted documents plus a lazily-built lexical index.
pub struct DocumentStore {
    root: PathBuf,
    dimension: Option<usize>,
    documents: BTreeMap<DocumentId, Document>,
    inverted: BTreeMap<String, TermEntry>,
    avg_doc_len: f32,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, Default)]
struct DocumentsFile {
    dimension: Option<usize>,
    documents: Vec<Document>,
}

impl DocumentStore {
    fn documents_path(root: &Path) -> PathBuf {
        root.join("documents.json")
    }

    pub fn empty(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            dimension: None,
            documents: BTreeMap::new(),
            inverted: BTreeMap::new(),
            avg_doc_len: 0.0,
        }
    }

    /// Loads documents from disk if present and rebuilds the inverted
    /// index in memory (§4.3: "not persisted to disk").
    pub fn load(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let path = Self::documents_path(&root);
        if !path.exists() {
            return Ok(Self::empty(root));
        }
        let raw = fs::read_to_string(&path).map_err(|e| CoreError::io(path.display().to_string(), e))?;
        let file: DocumentsFile = serde_json::from_str(&raw)
            .map_err(|e| CoreError::corruption(path.display().to_string(), e.to_string()))?;
        let mut store = Self {
            root,
            dimension: file.dimension,
            documents: BTreeMap::new(),
            inverted: BTreeMap::new(),
            avg_doc_len: 0.0,
        };
        for doc in file.documents {
            store.documents.insert(doc.id.clone(), doc);
        }
        store.rebuild_inverted_index();
        Ok(store)
    }

    fn rebuild_inverted_index(&mut self) {
        let mut term_map: BTreeMap<String, Vec<Posting>> = BTreeMap::new();
        let mut total_len = 0usize;
        for doc in self.documents.values() {
            let mut counts: HashMap<String, usize> = HashMap::new();
            let doc_len = tokenize_counts(&doc.content, &mut counts);
            total_len += doc_len;
            for (token, tf) in counts {
                term_map.entry(token).or_default().push(Posting {
                    doc_id: doc.id.clone(),
                    tf,
                    doc_len,
                });
            }
        }
        self.avg_doc_len = if self.documents.is_empty() {
            0.0
        } else {
            total_len as f32 / self.documents.len() as f32
        };
        self.inverted = term_map
            .into_iter()
            .map(|(term, mut postings)| {
                postings.sort_by(|a, b| a.doc_id.as_str().cmp(b.doc_id.as_str()));
                (
                    term,
                    TermEntry {
                        df: postings.len(),
                        postings,
                    },
                )
            })
            .collect();
    }

    fn persist(&self) -> Result<()> {
        fs::create_dir_all(&self.root).map_err(|e| CoreError::io(self.root.display().to_string(), e))?;
        let path = Self::documents_path(&self.root);
        let file = DocumentsFile {
            dimension: self.dimension,
            documents: self.documents.values().cloned().collect(),
        };
        let body = serde_json::to_string_pretty(&file)
            .map_err(|e| CoreError::corruption(path.display().to_string(), e.to_string()))?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, body).map_err(|e| CoreError::io(tmp.display().to_string(), e))?;
        fs::rename(&tmp, &path).map_err(|e| CoreError::io(path.display().to_string(), e))?;
        Ok(())
    }

    /// Dimension is fixed the first time a non-empty batch is written; a
    /// later batch with mismatched vector width is rejected wholesale.
    pub fn upsert_batch(&mut self, docs: Vec<Document>) -> Result<()> {
        if docs.len() > BATCH_WRITE_LIMIT {
            return Err(CoreError::invalid(
                "document_batch",
                format!("batch of {} exceeds max {}", docs.len(), BATCH_WRITE_LIMIT),
            ));
        }
        // Validate the whole batch against a local `effective_dim` before
        // touching `self` at all: a mismatch partway through the batch
        // must leave the store — including its fixed dimension — exactly
        // as it was (§4.3 "a failed batch leaves the store unchanged").
        let mut effective_dim = self.dimension;
        for doc in &docs {
            let width = doc.vector.len();
            match effective_dim {
                None => effective_dim = Some(width),
                Some(expected) if expected != width => {
                    return Err(CoreError::invalid(
                        "document",
                        format!("vector width {width} does not match store dimension {expected}"),
                    ));
                }
                _ => {}
            }
        }
        self.dimension = effective_dim;
        for doc in docs {
            self.documents.insert(doc.id.clone(), doc);
        }
        self.rebuild_inverted_index();
        self.persist()
    }

    pub fn delete(&mut self, id: &DocumentId) -> Result<bool> {
        let removed = self.documents.remove(id).is_some();
        if removed {
            self.rebuild_inverted_index();
            self.persist()?;
        }
        Ok(removed)
    }

    pub fn get(&self, id: &DocumentId) -> Option<&Document> {
        self.documents.get(id)
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    pub fn iter(&self) -> impl Iterator<Item = &Document> {
        self.documents.values()
    }

    /// Cosine similarity against every document's vector. Returns
    /// `(doc_id, raw_cosine)` pairs, unsorted.
    pub fn vector_scores(&self, query_vector: &[f32]) -> Vec<(DocumentId, f64)> {
        self.documents
            .values()
            .map(|doc| (doc.id.clone(), cosine_similarity(query_vector, &doc.vector) as f64))
            .collect()
    }

    /// Finds the sibling chunk at `chunk_index` within the same source file
    /// (matched by path + `file_hash`, so a stale sibling from a previous
    /// version of the file is never returned), used for `full` detail's
    /// `previous_chunk`/`next_chunk` (§4.4 step 7).
    pub fn sibling_chunk(&self, source_path: &str, file_hash: &str, chunk_index: usize) -> Option<&Document> {
        self.documents.values().find(|doc| {
            doc.metadata.source_path.as_deref() == Some(source_path)
                && doc.metadata.file_hash == file_hash
                && doc.metadata.chunk_index == chunk_index
        })
    }

    /// BM25 (`k1 = 1.5`, `b = 0.75`) over the in-memory inverted index.
    /// Returns `(doc_id, bm25_score)` pairs, unsorted.
    pub fn lexical_scores(&self, query: &str) -> Vec<(DocumentId, f64)> {
        let tokens = crate::util::tokenize(query);
        if tokens.is_empty() || self.documents.is_empty() {
            return Vec::new();
        }
        let doc_count = self.documents.len() as f32;
        let mut scores: HashMap<DocumentId, f32> = HashMap::new();
        for token in tokens {
            let Some(entry) = self.inverted.get(&token) else {
                continue;
            };
            let df = entry.df as f32;
            let idf = ((doc_count - df + 0.5) / (df + 0.5) + 1.0).ln().max(0.0);
            for posting in &entry.postings {
                let tf = posting.tf as f32;
                let norm = 1.0 - B + B * (posting.doc_len as f32 / self.avg_doc_len.max(1.0));
                let score = idf * (tf * (K1 + 1.0)) / (tf + K1 * norm);
                *scores.entry(posting.doc_id.clone()).or_insert(0.0) += score;
            }
        }
        scores.into_iter().map(|(id, score)| (id, score as f64)).collect()
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a <= f32::EPSILON || norm_b <= f32::EPSILON {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::StoreId;
    use crate::model::{DocumentKind, DocumentMetadata, FileType};

    fn doc(id: &str, content: &str, vector: Vec<f32>) -> Document {
        Document {
            id: DocumentId::from(id),
            content: content.to_string(),
            vector,
            metadata: DocumentMetadata {
                store_id: StoreId::from("store-1"),
                kind: DocumentKind::Chunk,
                indexed_at: 0,
                source_path: Some("a.rs".to_string()),
                source_url: None,
                file_hash: "deadbeef".to_string(),
                chunk_index: 0,
                total_chunks: 1,
                file_type: FileType::Source,
                section_header: None,
                symbol_name: None,
                has_doc_comments: false,
                imports: Vec::new(),
            },
        }
    }

    #[test]
    fn upsert_then_get_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = DocumentStore::empty(dir.path());
        store.upsert_batch(vec![doc("d1", "hello world", vec![1.0, 0.0])]).unwrap();
        assert_eq!(store.len(), 1);
        assert!(store.get(&DocumentId::from("d1")).is_some());
    }

    #[test]
    fn mismatched_dimension_is_rejected_wholesale() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = DocumentStore::empty(dir.path());
        store.upsert_batch(vec![doc("d1", "hello", vec![1.0, 0.0])]).unwrap();
        let result = store.upsert_batch(vec![doc("d2", "world", vec![1.0, 0.0, 0.0])]);
        assert!(result.is_err());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn mismatched_dimension_within_first_batch_leaves_dimension_unset() {
        // A dimension-mismatch failure partway through the very first
        // batch must not leave the store with a dimension fixed from a
        // doc that was never actually committed.
        let dir = tempfile::tempdir().unwrap();
        let mut store = DocumentStore::empty(dir.path());
        let result = store.upsert_batch(vec![doc("d1", "hello", vec![1.0, 0.0]), doc("d2", "world", vec![1.0, 0.0, 0.0])]);
        assert!(result.is_err());
        assert_eq!(store.len(), 0);
        assert!(store.dimension().is_none());

        // The store must still accept either width afterward, since
        // nothing was actually fixed.
        store.upsert_batch(vec![doc("d3", "ok", vec![1.0, 0.0, 0.0])]).unwrap();
        assert_eq!(store.dimension(), Some(3));
    }

    #[test]
    fn bm25_favors_documents_with_more_term_occurrences() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = DocumentStore::empty(dir.path());
        store
            .upsert_batch(vec![
                doc("d1", "rust rust rust memory safety", vec![1.0]),
                doc("d2", "python memory safety", vec![1.0]),
            ])
            .unwrap();
        let scores = store.lexical_scores("rust");
        let d1 = scores.iter().find(|(id, _)| id.as_str() == "d1").unwrap().1;
        let d2 = scores.iter().find(|(id, _)| id.as_str() == "d2");
        assert!(d1 > 0.0);
        assert!(d2.is_none());
    }

    #[test]
    fn reload_rebuilds_inverted_index_from_documents() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut store = DocumentStore::empty(dir.path());
            store.upsert_batch(vec![doc("d1", "hello world", vec![1.0])]).unwrap();
        }
        let reloaded = DocumentStore::load(dir.path()).unwrap();
        assert_eq!(reloaded.len(), 1);
        assert!(!reloaded.lexical_scores("hello").is_empty());
    }

    #[test]
    fn delete_removes_document_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = DocumentStore::empty(dir.path());
        store.upsert_batch(vec![doc("d1", "hello", vec![1.0])]).unwrap();
        assert!(store.delete(&DocumentId::from("d1")).unwrap());
        let reloaded = DocumentStore::load(dir.path()).unwrap();
        assert_eq!(reloaded.len(), 0);
    }

    #[test]
    fn sibling_chunk_matches_on_path_and_file_hash() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = DocumentStore::empty(dir.path());
        let mut first = doc("d1", "part one", vec![1.0]);
        first.metadata.chunk_index = 0;
        first.metadata.total_chunks = 2;
        let mut second = doc("d2", "part two", vec![1.0]);
        second.metadata.chunk_index = 1;
        second.metadata.total_chunks = 2;
        store.upsert_batch(vec![first, second]).unwrap();
        let found = store.sibling_chunk("a.rs", "deadbeef", 1).unwrap();
        assert_eq!(found.id.as_str(), "d2");
        assert!(store.sibling_chunk("a.rs", "deadbeef", 2).is_none());
    }

    #[test]
    fn cosine_similarity_of_identical_vectors_is_one() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }
}
