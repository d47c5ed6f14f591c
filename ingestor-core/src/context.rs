//! `CoreContext` (§9 "process-wide singletons", §10.1): the single owned
//! handle every operation threads through instead of reaching for
//! `lazy_static`/`OnceCell` globals.
//!
//! Grounded on the teacher's `McpServerState`-style bundle of shared
//! handles (registry, adapters, cache) constructed once at process start
//! and passed by reference into every tool handler.

use crate::cache::ResultCache;
use crate::chunk::AdapterRegistry;
use crate::embeddings::EmbeddingClient;
use crate::error::Result;
use crate::ids::{DocumentId, StoreId};
use crate::jobs::JobEngine;
use crate::model::{DetailLevel, SearchResult};
use crate::registry::StoreRegistry;
use crate::watcher::Watcher;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Tunable defaults (§10.4): plain constructor parameters, never parsed
/// from a config file by this crate.
#[derive(Debug, Clone, Copy)]
pub struct CoreConfig {
    pub chunk_window: usize,
    pub chunk_overlap: usize,
    pub weight_vector: f64,
    pub weight_fts: f64,
    pub overfetch: usize,
    pub debounce_ms: u64,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            chunk_window: 768,
            chunk_overlap: 100,
            weight_vector: crate::search::WEIGHT_VECTOR,
            weight_fts: crate::search::WEIGHT_FTS,
            overfetch: 4,
            debounce_ms: 1000,
        }
    }
}

/// Owns the handles every §4 operation needs (§10.1). Constructing a
/// second `CoreContext` against the same data directory in the same
/// process is legal — each gets its own in-memory registries/cache, and
/// both still serialize through the same on-disk atomic-rename writers.
pub struct CoreContext {
    data_dir: PathBuf,
    config: CoreConfig,
    stores: Mutex<StoreRegistry>,
    jobs: JobEngine,
    adapters: Arc<AdapterRegistry>,
    embedder: Arc<dyn EmbeddingClient>,
    cache: Mutex<ResultCache>,
    watcher: Watcher,
}

impl CoreContext {
    pub fn new(data_dir: impl Into<PathBuf>, embedder: Arc<dyn EmbeddingClient>, config: CoreConfig) -> Result<Self> {
        let data_dir = data_dir.into();
        let stores = StoreRegistry::load(&data_dir)?;
        let jobs = JobEngine::load(&data_dir)?;
        Ok(Self {
            data_dir,
            config,
            stores: Mutex::new(stores),
            jobs,
            adapters: Arc::new(AdapterRegistry::new()),
            embedder,
            cache: Mutex::new(ResultCache::new()),
            watcher: Watcher::new(),
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn stores(&self) -> &Mutex<StoreRegistry> {
        &self.stores
    }

    pub fn jobs(&self) -> &JobEngine {
        &self.jobs
    }

    pub fn adapters(&self) -> &Arc<AdapterRegistry> {
        &self.adapters
    }

    pub fn embedder(&self) -> &Arc<dyn EmbeddingClient> {
        &self.embedder
    }

    pub fn watcher(&self) -> &Watcher {
        &self.watcher
    }

    /// Root `index/` directory for one Store's `DocumentStore` (§6 layout
    /// `<data>/stores/<store-id>/index/`).
    pub fn store_index_root(&self, store_id: &StoreId) -> PathBuf {
        self.data_dir.join("stores").join(store_id.as_str()).join("index")
    }

    /// Root directory for one Store's persisted code graph (§6 layout
    /// `<data>/stores/<store-id>/graph.json`).
    pub fn store_graph_root(&self, store_id: &StoreId) -> PathBuf {
        self.data_dir.join("stores").join(store_id.as_str())
    }

    pub fn worker_binary_path(&self) -> PathBuf {
        std::env::current_exe().ok().and_then(|p| p.parent().map(|d| d.join("ingestor-worker"))).unwrap_or_else(|| PathBuf::from("ingestor-worker"))
    }

    /// Get-or-upgrade cached-result lookup (§4.11): a hit at `>= detail`
    /// is returned directly; a miss or a hit at lower detail falls through
    /// to `materialize`, which the caller supplies since only it knows how
    /// to re-run a constrained, single-document search.
    pub fn cached_or_else(
        &self,
        id: &DocumentId,
        detail: DetailLevel,
        materialize: impl FnOnce() -> Result<SearchResult>,
    ) -> Result<SearchResult> {
        if let Some(hit) = self.cache.lock().unwrap().get(id, detail) {
            return Ok(hit);
        }
        let result = materialize()?;
        self.cache.lock().unwrap().put(id.clone(), detail, result.clone());
        Ok(result)
    }

    /// Removes a Store's on-disk documents and code graph before removing
    /// its registry entry (§4.10), so a crash mid-delete never leaves a
    /// registry entry pointing at nothing.
    pub fn delete_store(&self, store_id: &StoreId) -> Result<()> {
        let store_dir = self.store_graph_root(store_id);
        if store_dir.exists() {
            std::fs::remove_dir_all(&store_dir).map_err(|e| crate::error::CoreError::io(store_dir.display().to_string(), e))?;
        }
        self.watcher.unwatch(store_id);
        self.stores.lock().unwrap().delete(store_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::HashingEmbeddingClient;
    use crate::model::{StoreKind, StoreSpec};

    fn context(dir: &Path) -> CoreContext {
        CoreContext::new(dir, Arc::new(HashingEmbeddingClient::new(16)), CoreConfig::default()).unwrap()
    }

    #[test]
    fn delete_store_removes_on_disk_data_and_registry_entry() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let store = ctx
            .stores()
            .lock()
            .unwrap()
            .create(StoreSpec {
                name: "proj".to_string(),
                kind: StoreKind::LocalDirectory,
                path: Some(dir.path().to_string_lossy().to_string()),
                url: None,
                branch: None,
                description: None,
                tags: Vec::new(),
            })
            .unwrap();
        std::fs::create_dir_all(ctx.store_graph_root(&store.id)).unwrap();
        ctx.delete_store(&store.id).unwrap();
        assert!(!ctx.store_graph_root(&store.id).exists());
        assert!(ctx.stores().lock().unwrap().get(&store.id).is_err());
    }

    #[test]
    fn cached_or_else_only_invokes_materialize_on_miss() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let id = DocumentId::from("d1");
        let mut calls = 0;
        let make = |calls: &mut i32| {
            *calls += 1;
            crate::model::SearchResult {
                id: id.clone(),
                score: 1.0,
                raw_cosine: 1.0,
                summary: crate::model::SearchSummary {
                    kind: crate::model::DocumentKind::Chunk,
                    name: "x".to_string(),
                    location: "x.rs".to_string(),
                    purpose: "x".to_string(),
                },
                context: None,
                full: None,
                metadata: crate::model::DocumentMetadata {
                    store_id: StoreId::from("s"),
                    kind: crate::model::DocumentKind::Chunk,
                    indexed_at: 0,
                    source_path: None,
                    source_url: None,
                    file_hash: "h".to_string(),
                    chunk_index: 0,
                    total_chunks: 1,
                    file_type: crate::model::FileType::Source,
                    section_header: None,
                    symbol_name: None,
                    has_doc_comments: false,
                    imports: Vec::new(),
                },
            }
        };
        ctx.cached_or_else(&id, DetailLevel::Minimal, || Ok(make(&mut calls))).unwrap();
        ctx.cached_or_else(&id, DetailLevel::Minimal, || Ok(make(&mut calls))).unwrap();
        assert_eq!(calls, 1);
    }
}
