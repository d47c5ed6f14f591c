//! Per-Store filesystem watcher with debounced re-indexing (§4.8).
//!
//! Event loop shape lifted from the pack's `cocode-file-watch` crate: a
//! single `tokio::select!` per watch holds a raw `notify` event receiver
//! next to a debounce deadline future (far-future sleep when nothing is
//! pending), generalized from "emit a coalesced domain event" to "drive the
//! indexer and report success/failure through callbacks".

use crate::chunk::AdapterRegistry;
use crate::embeddings::EmbeddingClient;
use crate::error::{CoreError, Result};
use crate::ids::StoreId;
use crate::indexer::{index_directory, IndexOptions};
use crate::model::Store;
use crate::store::DocumentStore;
use notify::Watcher as _;
use regex::Regex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep_until, Instant};
use tracing::warn;

/// Matches `.git`, `node_modules`, `dist`, `build` path segments (§6).
fn ignore_pattern() -> Regex {
    Regex::new(r"(^|[/\\])\.(git|node_modules|dist|build)").expect("static ignore regex")
}

struct WatchHandle {
    _watcher: notify::RecommendedWatcher,
    stop: oneshot::Sender<()>,
}

/// Owns at most one active watch per Store (§4.8 "idempotent").
pub struct Watcher {
    handles: Mutex<HashMap<StoreId, WatchHandle>>,
}

impl Default for Watcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Watcher {
    pub fn new() -> Self {
        Self {
            handles: Mutex::new(HashMap::new()),
        }
    }

    /// Starts watching `store`'s root directory. A no-op if this Store is
    /// already watched. `store_index_root` is where the Store's
    /// `DocumentStore` lives on disk; the indexer re-runs there, in
    /// incremental mode, whenever the debounce timer fires.
    pub fn watch<F, G>(
        &self,
        store: Store,
        store_index_root: PathBuf,
        debounce_ms: u64,
        embedder: Arc<dyn EmbeddingClient>,
        adapters: Arc<AdapterRegistry>,
        on_reindex: F,
        on_error: G,
    ) -> Result<()>
    where
        F: Fn(StoreId) + Send + Sync + 'static,
        G: Fn(StoreId, CoreError) + Send + Sync + 'static,
    {
        let mut handles = self.handles.lock().unwrap();
        if handles.contains_key(&store.id) {
            return Ok(());
        }

        let root = store
            .path
            .as_ref()
            .ok_or_else(|| CoreError::invalid("watch", "store has no local root to watch"))?;
        let root = PathBuf::from(root);

        let (raw_tx, raw_rx) = mpsc::unbounded_channel();
        let mut watcher = notify::recommended_watcher(move |res| {
            let _ = raw_tx.send(res);
        })
        .map_err(|e| CoreError::invalid("watch", e.to_string()))?;
        watcher
            .watch(&root, notify::RecursiveMode::Recursive)
            .map_err(|e| CoreError::invalid("watch", e.to_string()))?;

        let (stop_tx, stop_rx) = oneshot::channel();
        let store_id = store.id.clone();
        tokio::spawn(run_loop(
            store_id,
            root,
            store_index_root,
            Duration::from_millis(debounce_ms),
            embedder,
            adapters,
            raw_rx,
            stop_rx,
            on_reindex,
            on_error,
        ));

        handles.insert(
            store.id,
            WatchHandle {
                _watcher: watcher,
                stop: stop_tx,
            },
        );
        Ok(())
    }

    /// Stops watching one Store, cancelling any pending debounce timer.
    pub fn unwatch(&self, store_id: &StoreId) {
        if let Some(handle) = self.handles.lock().unwrap().remove(store_id) {
            let _ = handle.stop.send(());
        }
    }

    pub fn unwatch_all(&self) {
        let mut handles = self.handles.lock().unwrap();
        for (_, handle) in handles.drain() {
            let _ = handle.stop.send(());
        }
    }

    pub fn is_watching(&self, store_id: &StoreId) -> bool {
        self.handles.lock().unwrap().contains_key(store_id)
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_loop<F, G>(
    store_id: StoreId,
    root: PathBuf,
    store_index_root: PathBuf,
    debounce: Duration,
    embedder: Arc<dyn EmbeddingClient>,
    adapters: Arc<AdapterRegistry>,
    mut raw_rx: mpsc::UnboundedReceiver<notify::Result<notify::Event>>,
    mut stop_rx: oneshot::Receiver<()>,
    on_reindex: F,
    on_error: G,
) where
    F: Fn(StoreId) + Send + Sync + 'static,
    G: Fn(StoreId, CoreError) + Send + Sync + 'static,
{
    let ignore = ignore_pattern();
    let mut pending = false;
    let mut deadline = Instant::now();

    loop {
        let timer_deadline = if pending {
            deadline
        } else {
            Instant::now() + Duration::from_secs(60 * 60 * 24 * 365)
        };
        let timer = sleep_until(timer_deadline);
        tokio::pin!(timer);

        tokio::select! {
            _ = &mut stop_rx => {
                break;
            }
            res = raw_rx.recv() => {
                match res {
                    Some(Ok(event)) => {
                        if event_is_relevant(&event, &ignore) {
                            pending = true;
                            deadline = Instant::now() + debounce;
                        }
                    }
                    Some(Err(err)) => {
                        on_error(store_id.clone(), CoreError::invalid("watch", err.to_string()));
                    }
                    None => break,
                }
            }
            _ = &mut timer, if pending => {
                pending = false;
                match run_reindex(&store_id, &root, &store_index_root, &embedder, &adapters).await {
                    Ok(()) => on_reindex(store_id.clone()),
                    Err(err) => on_error(store_id.clone(), err),
                }
            }
        }
    }
}

fn event_is_relevant(event: &notify::Event, ignore: &Regex) -> bool {
    event.paths.iter().any(|p| !ignore.is_match(&p.to_string_lossy()))
}

async fn run_reindex(
    store_id: &StoreId,
    root: &Path,
    store_index_root: &Path,
    embedder: &Arc<dyn EmbeddingClient>,
    adapters: &Arc<AdapterRegistry>,
) -> Result<()> {
    let mut store = DocumentStore::load(store_index_root)?;
    let options = IndexOptions {
        incremental: true,
        ..IndexOptions::default()
    };
    index_directory(store_id, root, &mut store, embedder.as_ref(), adapters, &options).await?;
    Ok(())
}
