//! Best-effort cleanup, isolated so a teardown failure can never propagate.
//!
//! Per §9's design note, best-effort cleanup (PID file removal, subprocess
//! teardown) is expressed as a scoped guard rather than scattered
//! `let _ = fs::remove_file(...)` calls: the guard runs its closure on drop,
//! logs any error, and is infallible by construction because `Drop::drop`
//! cannot return a `Result`.

use tracing::warn;

pub struct CleanupGuard<F: FnMut() -> std::io::Result<()>> {
    action: Option<F>,
    armed: bool,
    what: &'static str,
}

impl<F: FnMut() -> std::io::Result<()>> CleanupGuard<F> {
    pub fn new(what: &'static str, action: F) -> Self {
        Self {
            action: Some(action),
            armed: true,
            what,
        }
    }

    /// Disarm the guard: its action will not run on drop. Used when the
    /// owning code performs the cleanup itself on a success path and wants
    /// to avoid a redundant attempt.
    pub fn disarm(&mut self) {
        self.armed = false;
    }
}

impl<F: FnMut() -> std::io::Result<()>> Drop for CleanupGuard<F> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Some(mut action) = self.action.take() {
            if let Err(err) = action() {
                warn!(what = self.what, error = %err, "best-effort cleanup failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn runs_action_on_drop() {
        let ran = Cell::new(false);
        {
            let _guard = CleanupGuard::new("test", || {
                ran.set(true);
                Ok(())
            });
        }
        assert!(ran.get());
    }

    #[test]
    fn disarmed_guard_skips_action() {
        let ran = Cell::new(false);
        {
            let mut guard = CleanupGuard::new("test", || {
                ran.set(true);
                Ok(())
            });
            guard.disarm();
        }
        assert!(!ran.get());
    }

    #[test]
    fn failing_action_never_panics() {
        let _guard = CleanupGuard::new("test", || {
            Err(std::io::Error::other("boom"))
        });
    }
}
