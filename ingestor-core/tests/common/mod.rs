//! Shared test helpers for `ingestor-core`'s integration suite.

use ingestor_core::embeddings::HashingEmbeddingClient;
use ingestor_core::{CoreConfig, CoreContext};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// Writes `files` (relative path, content) under a fresh temp directory and
/// returns it, so callers get a realistic store root to index.
pub fn create_test_project(files: &[(&str, &str)]) -> TempDir {
    let dir = TempDir::new().expect("failed to create temp dir");
    for (path, content) in files {
        let full = dir.path().join(path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&full, content).unwrap();
    }
    dir
}

/// A `CoreContext` over a fresh data directory with a deterministic
/// feature-hashing embedder, for tests that don't care which embedding
/// model backs the vectors.
pub fn context(data_dir: &Path) -> CoreContext {
    CoreContext::new(data_dir, Arc::new(HashingEmbeddingClient::new(32)), CoreConfig::default()).unwrap()
}

/// Resolves the path of the `ingestor` CLI binary built alongside the test
/// suite, for tests that drive the process rather than the library.
#[allow(dead_code)]
pub fn ingestor_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_ingestor"))
}
