//! Durable background job engine (§4.6).
//!
//! The registry/spawn shape is grounded on
//! `cognitive-glitch-agcodex/codex-rs/core/src/subagents/worktree.rs`'s
//! `WorktreeManager` (`Arc<RwLock<HashMap<_, _>>>` plus
//! `tokio::process::Command`); nothing in the retrieval pack writes PID
//! files or sends termination signals, so that half is grounded on the
//! `libc` crate directly (present in that same sibling repo's
//! dependency stack) rather than invented from nothing. Unix-only:
//! process-group/signal semantics diverge too much on Windows to address
//! here.

use crate::cleanup::CleanupGuard;
use crate::error::{CoreError, Result};
use crate::ids::JobId;
use crate::model::{Job, JobDetails, JobError, JobPatch, JobStatus};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

/// Environment variable the supervisor hands a worker its data directory
/// through (§6 "Worker invocation").
pub const DATA_DIR_ENV: &str = "INGESTOR_DATA_DIR";

/// Filter criteria for `JobEngine::list` (§4.6): every `Some` field
/// narrows the result; `None` leaves that dimension unconstrained.
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    pub kind: Option<&'static str>,
}

/// Converges in-process cooperative cancellation (a worker polling a
/// token at tick boundaries) with cross-process termination (the engine
/// sending a signal to a detached worker's PID) behind one call site.
#[derive(Clone)]
pub enum CancelSource {
    InProcess(tokio::sync::watch::Sender<bool>),
    OsSignal,
}

pub struct JobEngine {
    root: PathBuf,
    jobs: Arc<RwLock<HashMap<JobId, Job>>>,
    cancel_sources: Arc<RwLock<HashMap<JobId, CancelSource>>>,
}

impl JobEngine {
    fn jobs_dir(root: &Path) -> PathBuf {
        root.join("jobs")
    }

    fn job_path(root: &Path, id: &JobId) -> PathBuf {
        Self::jobs_dir(root).join(format!("{}.json", id.as_str()))
    }

    fn pid_path(root: &Path, id: &JobId) -> PathBuf {
        Self::jobs_dir(root).join(format!("{}.pid", id.as_str()))
    }

    /// Loads every job record found on disk (a restart recovers job
    /// history; it does not resume a `running` job, which is left for the
    /// caller to reconcile by checking whether its PID file's process is
    /// still alive).
    pub fn load(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let dir = Self::jobs_dir(&root);
        let mut jobs = HashMap::new();
        if dir.exists() {
            for entry in fs::read_dir(&dir).map_err(|e| CoreError::io(dir.display().to_string(), e))? {
                let entry = entry.map_err(|e| CoreError::io(dir.display().to_string(), e))?;
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some("json") {
                    continue;
                }
                let raw = fs::read_to_string(&path).map_err(|e| CoreError::io(path.display().to_string(), e))?;
                let job: Job = serde_json::from_str(&raw)
                    .map_err(|e| CoreError::corruption(path.display().to_string(), e.to_string()))?;
                jobs.insert(job.id.clone(), job);
            }
        }
        Ok(Self {
            root,
            jobs: Arc::new(RwLock::new(jobs)),
            cancel_sources: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    fn persist(&self, job: &Job) -> Result<()> {
        let dir = Self::jobs_dir(&self.root);
        fs::create_dir_all(&dir).map_err(|e| CoreError::io(dir.display().to_string(), e))?;
        let path = Self::job_path(&self.root, &job.id);
        let body = serde_json::to_string_pretty(job)
            .map_err(|e| CoreError::corruption(path.display().to_string(), e.to_string()))?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, body).map_err(|e| CoreError::io(tmp.display().to_string(), e))?;
        fs::rename(&tmp, &path).map_err(|e| CoreError::io(path.display().to_string(), e))?;
        Ok(())
    }

    pub fn create(&self, details: JobDetails) -> Result<Job> {
        let job = Job {
            id: JobId::new(crate::ids::generate_id("job")),
            status: JobStatus::Pending,
            progress: 0,
            message: "queued".to_string(),
            details,
            error: None,
            created_at: crate::model::now_ms(),
            started_at: None,
            completed_at: None,
        };
        self.persist(&job)?;
        self.jobs.write().unwrap().insert(job.id.clone(), job.clone());
        Ok(job)
    }

    pub fn get(&self, id: &JobId) -> Result<Job> {
        self.jobs
            .read()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| CoreError::not_found("job", id.as_str()))
    }

    pub fn list(&self, filter: Option<&JobFilter>) -> Vec<Job> {
        self.jobs
            .read()
            .unwrap()
            .values()
            .filter(|job| match filter {
                None => true,
                Some(f) => {
                    f.status.map_or(true, |s| s == job.status) && f.kind.map_or(true, |k| job.details.kind_tag() == k)
                }
            })
            .cloned()
            .collect()
    }

    /// Applies a patch, enforcing the monotonic status transition table.
    pub fn update(&self, id: &JobId, patch: JobPatch) -> Result<Job> {
        let mut guard = self.jobs.write().unwrap();
        let job = guard.get_mut(id).ok_or_else(|| CoreError::not_found("job", id.as_str()))?;
        if let Some(status) = patch.status {
            if !job.status.can_transition_to(status) {
                return Err(CoreError::invalid(
                    "job",
                    format!("illegal transition {:?} -> {:?}", job.status, status),
                ));
            }
            if job.status == JobStatus::Pending && status == JobStatus::Running {
                job.started_at = Some(crate::model::now_ms());
            }
            if status.is_terminal() {
                job.completed_at = Some(crate::model::now_ms());
            }
            job.status = status;
        }
        if let Some(progress) = patch.progress {
            job.progress = progress;
        }
        if let Some(message) = patch.message {
            job.message = message;
        }
        if let Some(error) = patch.error {
            job.error = Some(error);
        }
        let snapshot = job.clone();
        drop(guard);
        self.persist(&snapshot)?;
        Ok(snapshot)
    }

    pub fn register_cancel_source(&self, id: JobId, source: CancelSource) {
        self.cancel_sources.write().unwrap().insert(id, source);
    }

    /// Cancels a job regardless of which process is running it: an
    /// in-process worker is signalled cooperatively via its watch channel;
    /// a detached worker is sent `SIGTERM` via its PID file.
    pub fn cancel(&self, id: &JobId) -> Result<Job> {
        let job = self.get(id)?;
        if job.status.is_terminal() {
            return Ok(job);
        }

        let source = self.cancel_sources.read().unwrap().get(id).cloned();
        match source {
            Some(CancelSource::InProcess(tx)) => {
                let _ = tx.send(true);
            }
            Some(CancelSource::OsSignal) | None => {
                self.send_sigterm(id)?;
            }
        }

        self.update(
            id,
            JobPatch {
                status: Some(JobStatus::Cancelled),
                message: Some("cancelled".to_string()),
                ..Default::default()
            },
        )
    }

    #[cfg(unix)]
    fn send_sigterm(&self, id: &JobId) -> Result<()> {
        let path = Self::pid_path(&self.root, id);
        let Ok(raw) = fs::read_to_string(&path) else {
            return Ok(()); // no detached worker running; nothing to signal
        };
        let Ok(pid) = raw.trim().parse::<i32>() else {
            return Ok(());
        };
        // SAFETY: `pid` is read from a PID file this engine itself wrote;
        // sending SIGTERM to a process that has already exited is a
        // harmless ESRCH, not undefined behavior.
        unsafe {
            libc::kill(pid, libc::SIGTERM);
        }
        Ok(())
    }

    #[cfg(not(unix))]
    fn send_sigterm(&self, _id: &JobId) -> Result<()> {
        Err(CoreError::invalid("job_engine", "OS-signal cancellation is Unix-only"))
    }

    pub fn pid_file_path(&self, id: &JobId) -> PathBuf {
        Self::pid_path(&self.root, id)
    }

    /// Spawns one detached worker subprocess for `id` (§4.6 "Supervisor").
    /// `spawn()` itself is non-blocking; the returned child handle is
    /// dropped immediately rather than awaited, since ownership of the
    /// worker's lifecycle passes to the PID file / signal protocol, not to
    /// this process's `Child`.
    #[cfg(unix)]
    pub fn spawn_worker(&self, id: &JobId, worker_binary: &Path) -> Result<()> {
        let mut command = tokio::process::Command::new(worker_binary);
        command
            .arg(id.as_str())
            .env(DATA_DIR_ENV, &self.root)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null());
        let child = command
            .spawn()
            .map_err(|e| CoreError::io(worker_binary.display().to_string(), e))?;
        drop(child);
        self.register_cancel_source(id.clone(), CancelSource::OsSignal);
        Ok(())
    }

    /// Worker-side lifecycle helper: write the PID file, returning a guard
    /// that removes it on drop regardless of how the worker exits.
    pub fn write_pid_file(&self, id: &JobId) -> Result<CleanupGuard<impl FnMut() -> std::io::Result<()>>> {
        let dir = Self::jobs_dir(&self.root);
        fs::create_dir_all(&dir).map_err(|e| CoreError::io(dir.display().to_string(), e))?;
        let path = self.pid_file_path(id);
        fs::write(&path, std::process::id().to_string()).map_err(|e| CoreError::io(path.display().to_string(), e))?;
        let cleanup_path = path.clone();
        Ok(CleanupGuard::new("job pid file", move || {
            if cleanup_path.exists() {
                fs::remove_file(&cleanup_path)?;
            }
            Ok(())
        }))
    }
}
