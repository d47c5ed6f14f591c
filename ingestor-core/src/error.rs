//! The core error taxonomy.
//!
//! One variant per kind named in the error handling design: `NotFound`,
//! `Invalid`, `Conflict`, `Corruption`, `Cancelled`, `Transient`, and
//! `FatalForJob`. `BestEffortCleanup` failures never reach this type — they
//! are logged and swallowed at the point of failure (see `cleanup::guard`).

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("invalid {entity}: {reason}")]
    Invalid { entity: &'static str, reason: String },

    #[error("conflict on {entity} {id}: {reason}")]
    Conflict {
        entity: &'static str,
        id: String,
        reason: String,
    },

    #[error("corrupt {file}: {reason}")]
    Corruption { file: String, reason: String },

    #[error("cancelled")]
    Cancelled,

    #[error("transient failure in {context}: {reason}")]
    Transient { context: String, reason: String },

    #[error("job failed: {reason}")]
    FatalForJob { reason: String, details: String },

    #[error("io error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl CoreError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn invalid(entity: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            entity,
            reason: reason.into(),
        }
    }

    pub fn conflict(entity: &'static str, id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Conflict {
            entity,
            id: id.into(),
            reason: reason.into(),
        }
    }

    pub fn corruption(file: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Corruption {
            file: file.into(),
            reason: reason.into(),
        }
    }

    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn transient(context: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Transient {
            context: context.into(),
            reason: reason.into(),
        }
    }

    /// Whether this kind is one a worker should surface to its job record
    /// as `failed` with details, per §4.6 step 3.
    pub fn is_fatal_for_job(&self) -> bool {
        !matches!(self, Self::Cancelled)
    }
}
