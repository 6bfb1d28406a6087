// error.rs — Error types for the policy subsystem.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while loading or validating policy.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// A policy document (or one of its layers) is invalid. Loading stops;
    /// nothing from a partially-read document is ever used.
    #[error("malformed policy in {origin}: {reason}")]
    MalformedPolicy { origin: String, reason: String },

    /// A policy, sites map or site config file could not be read.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The site config (.zv/site.toml) could not be parsed.
    #[error("invalid site config at {path}: {reason}")]
    InvalidSiteConfig { path: PathBuf, reason: String },
}

impl PolicyError {
    pub(crate) fn malformed(origin: impl Into<String>, reason: impl ToString) -> Self {
        PolicyError::MalformedPolicy {
            origin: origin.into(),
            reason: reason.to_string(),
        }
    }
}
