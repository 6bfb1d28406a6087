// error.rs — Error types for the reconcile subsystem.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by a collaborator store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The record a read or mutation refers to does not exist.
    #[error("{kind} '{id}' not found")]
    NotFound { kind: String, id: String },

    /// The store refused the mutation (permission, validation, locking).
    #[error("store rejected the change: {0}")]
    Rejected(String),

    /// A snapshot file could not be read or written.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A snapshot file could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn not_found(kind: impl Into<String>, id: impl Into<String>) -> Self {
        StoreError::NotFound {
            kind: kind.into(),
            id: id.into(),
        }
    }
}

/// Errors from the access grant reconciler.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The grant store rejected a share or membership mutation.
    /// Surfaced to the caller as-is; never retried.
    #[error("grant conflict for '{assignee}' on project '{project}': {source}")]
    GrantConflict {
        assignee: String,
        project: String,
        source: StoreError,
    },

    /// A read needed to compute the target state failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}
