//! Cloned-repo acquisition for the `clone` job kind (§3 "cloned-repo
//! requires a path or a url"; §8 job kinds). Shells out to the system
//! `git`, the same process-spawn shape `jobs.rs::spawn_worker` uses for
//! the worker subprocess itself, rather than vendoring a Git
//! implementation into this crate.

use crate::error::{CoreError, Result};
use crate::model::Store;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Clones (or, if already present, fetches and fast-forwards) `store`'s
/// remote into `<data>/stores/<store-id>/repo`, returning the working
/// directory the indexer should then walk. Requires `store.url`; `Clone`
/// jobs are only ever created for a `cloned-repo` Store that has one.
pub fn clone_or_update(store: &Store, dest_root: &Path) -> Result<PathBuf> {
    let url = store
        .url
        .as_ref()
        .ok_or_else(|| CoreError::invalid("clone", "cloned-repo store has no url to clone"))?;
    let dest = dest_root.join("repo");

    if dest.join(".git").exists() {
        run_git(&dest, &["fetch", "--depth", "1", "origin"])?;
        let branch = store.branch.as_deref().unwrap_or("HEAD");
        run_git(&dest, &["reset", "--hard", &format!("origin/{branch}")])?;
    } else {
        std::fs::create_dir_all(dest_root).map_err(|e| CoreError::io(dest_root.display().to_string(), e))?;
        let mut args = vec!["clone".to_string(), "--depth".to_string(), "1".to_string()];
        if let Some(branch) = &store.branch {
            args.push("--branch".to_string());
            args.push(branch.clone());
        }
        args.push(url.clone());
        args.push(dest.to_string_lossy().to_string());
        run_git(dest_root, &args.iter().map(String::as_str).collect::<Vec<_>>())?;
    }
    Ok(dest)
}

fn run_git(cwd: &Path, args: &[&str]) -> Result<()> {
    let output = Command::new("git")
        .args(args)
        .current_dir(cwd)
        .output()
        .map_err(|e| CoreError::io("git".to_string(), e))?;
    if !output.status.success() {
        return Err(CoreError::transient(
            "clone",
            String::from_utf8_lossy(&output.stderr).to_string(),
        ));
    }
    Ok(())
}
