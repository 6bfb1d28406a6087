// error.rs — Error types for the provision log.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while writing or checking the provision log.
#[derive(Debug, Error)]
pub enum ProvisionLogError {
    /// Failed to open or create the log file (or its directory).
    #[error("failed to open provision log at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to write or read a line.
    #[error("provision log I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// A line is not a valid record.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A record does not link to the one before it.
    #[error("chain broken at line {line}: expected previous hash {expected}, got {actual}")]
    ChainBroken {
        line: usize,
        expected: String,
        actual: String,
    },

    /// A record's plan no longer matches its recorded hash.
    #[error("plan hash mismatch at line {line}: recorded {recorded}, computed {computed}")]
    PlanHashMismatch {
        line: usize,
        recorded: String,
        computed: String,
    },
}
