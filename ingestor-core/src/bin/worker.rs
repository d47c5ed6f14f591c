//! Worker binary (§4.6 "Worker lifecycle"): the detached subprocess one
//! `JobEngine::spawn_worker` call starts per job. Reads its job id and data
//! directory from argv/env — the exact contract `jobs.rs::spawn_worker`
//! writes on the supervisor side — executes the job by kind, and reports
//! status back through the same `JobEngine` the supervisor reads.

#[cfg(unix)]
mod unix {
    use ingestor_core::chunk::AdapterRegistry;
    use ingestor_core::clone::clone_or_update;
    use ingestor_core::embeddings::HashingEmbeddingClient;
    use ingestor_core::error::{CoreError, Result};
    use ingestor_core::ids::JobId;
    use ingestor_core::indexer::{index_directory, IndexOptions};
    use ingestor_core::jobs::{JobEngine, DATA_DIR_ENV};
    use ingestor_core::model::{JobDetails, JobError, JobPatch, JobStatus};
    use ingestor_core::registry::StoreRegistry;
    use ingestor_core::store::DocumentStore;
    use std::path::{Path, PathBuf};

    pub async fn main() -> i32 {
        let job_id_raw = match std::env::args().nth(1) {
            Some(v) => v,
            None => {
                eprintln!("usage: ingestor-worker <job-id>");
                return 2;
            }
        };
        let data_dir = match std::env::var(DATA_DIR_ENV) {
            Ok(v) => v,
            Err(_) => {
                eprintln!("{DATA_DIR_ENV} is not set");
                return 2;
            }
        };
        run(JobId::new(job_id_raw), PathBuf::from(data_dir)).await
    }

    async fn run(job_id: JobId, data_dir: PathBuf) -> i32 {
        let engine = match JobEngine::load(&data_dir) {
            Ok(e) => e,
            Err(err) => {
                tracing::error!(%err, "worker failed to load job engine");
                return 1;
            }
        };

        // Step 1 (§4.6): write the PID file; failure to write is fatal.
        let _pid_guard = match engine.write_pid_file(&job_id) {
            Ok(guard) => guard,
            Err(err) => {
                tracing::error!(%err, "failed to write pid file");
                return 1;
            }
        };

        let job = match engine.get(&job_id) {
            Ok(job) => job,
            Err(err) => {
                tracing::error!(%err, "worker could not load its own job record");
                return 1;
            }
        };

        let _ = engine.update(
            &job_id,
            JobPatch {
                status: Some(JobStatus::Running),
                message: Some("running".to_string()),
                ..Default::default()
            },
        );

        // Step 2 (§4.6): a termination signal marks the job cancelled and
        // flips the in-process token the execution loop polls at tick
        // boundaries, converging OS-signal preemption with cooperative
        // cancellation behind one watch channel.
        let (cancel_tx, cancel_rx) = tokio::sync::watch::channel(false);
        let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(s) => s,
            Err(err) => {
                tracing::error!(%err, "failed to install termination handler");
                return 1;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => {
                let _ = cancel_tx.send(true);
                let _ = engine.update(&job_id, JobPatch {
                    status: Some(JobStatus::Cancelled),
                    message: Some("cancelled".to_string()),
                    ..Default::default()
                });
                0
            }
            result = execute(&data_dir, &job.details, cancel_rx) => {
                report(&engine, &job_id, result)
            }
        }
    }

    // Step 3 (§4.6): execute the job based on its kind.
    async fn execute(data_dir: &Path, details: &JobDetails, cancel: tokio::sync::watch::Receiver<bool>) -> Result<()> {
        let adapters = AdapterRegistry::new();
        let embedder = HashingEmbeddingClient::default();
        match details {
            JobDetails::Index { store_id } => {
                let registry = StoreRegistry::load(data_dir)?;
                let store = registry.get(store_id)?;
                let root = store
                    .path
                    .as_ref()
                    .ok_or_else(|| CoreError::invalid("index_job", "store has no local root"))?;
                let index_root = data_dir.join("stores").join(store_id.as_str()).join("index");
                let mut doc_store = DocumentStore::load(&index_root)?;
                let options = IndexOptions {
                    cancel: Some(cancel),
                    incremental: true,
                    ..IndexOptions::default()
                };
                index_directory(store_id, Path::new(root), &mut doc_store, &embedder, &adapters, &options).await?;
                Ok(())
            }
            JobDetails::Clone { store_id } => {
                let registry = StoreRegistry::load(data_dir)?;
                let store = registry.get(store_id)?;
                let store_root = data_dir.join("stores").join(store_id.as_str());
                let checkout = clone_or_update(store, &store_root)?;
                let index_root = store_root.join("index");
                let mut doc_store = DocumentStore::load(&index_root)?;
                let options = IndexOptions {
                    cancel: Some(cancel),
                    ..IndexOptions::default()
                };
                index_directory(store_id, &checkout, &mut doc_store, &embedder, &adapters, &options).await?;
                Ok(())
            }
            JobDetails::Crawl { store_id, .. } => {
                // The external crawler feeds pages through
                // `crawl::ingest_page` directly (§4.9); there is no
                // per-tick work for this worker to drive itself, only the
                // job bookkeeping already performed by the caller that
                // dispatched the crawl.
                let _ = (store_id, cancel);
                Ok(())
            }
        }
    }

    fn report(engine: &JobEngine, job_id: &JobId, result: Result<()>) -> i32 {
        match result {
            Ok(()) => {
                let _ = engine.update(
                    job_id,
                    JobPatch {
                        status: Some(JobStatus::Completed),
                        progress: Some(100),
                        message: Some("completed".to_string()),
                        ..Default::default()
                    },
                );
                0
            }
            Err(CoreError::Cancelled) => {
                let _ = engine.update(
                    job_id,
                    JobPatch {
                        status: Some(JobStatus::Cancelled),
                        message: Some("cancelled".to_string()),
                        ..Default::default()
                    },
                );
                0
            }
            Err(err) => {
                let _ = engine.update(
                    job_id,
                    JobPatch {
                        status: Some(JobStatus::Failed),
                        message: Some("failed".to_string()),
                        error: Some(JobError {
                            message: err.to_string(),
                            stack: None,
                        }),
                        ..Default::default()
                    },
                );
                1
            }
        }
    }
}

#[tokio::main]
async fn main() {
    // Logging to stderr (§10.2): stdout stays clean for any line-protocol
    // transport built on top of this binary's exit code.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("ingestor_worker=info".parse().unwrap()),
        )
        .init();

    #[cfg(unix)]
    let code = unix::main().await;
    #[cfg(not(unix))]
    let code = {
        eprintln!("ingestor-worker requires process-group/signal semantics only available on unix");
        2
    };

    std::process::exit(code);
}
