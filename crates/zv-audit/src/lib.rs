//! # zv-audit
//!
//! Append-only provision log for onboarding reconciliation runs.
//!
//! Every `zv` run that reconciles a site (or dry-runs a reconciliation)
//! appends a [`ProvisionRecord`] to a JSONL file. Records are hash-chained and
//! carry a SHA-256 of their plan, so [`ProvisionLog::verify_chain`] detects
//! inserted, deleted or edited lines.
//!
//! ## Quick Example
//!
//! ```rust,no_run
//! use zv_audit::{ProvisionLog, ProvisionRecord, ProvisionStatus};
//!
//! let mut log = ProvisionLog::open(".zv/provision.jsonl").unwrap();
//! let mut record = ProvisionRecord::new(
//!     "privacy sync: 1 field, 1 role",
//!     serde_json::json!({"fields_changed": ["margin"]}),
//!     ProvisionStatus::Success,
//! );
//! log.append(&mut record).unwrap();
//! ```

pub mod error;
pub mod hasher;
pub mod log;
pub mod record;

pub use error::ProvisionLogError;
pub use log::ProvisionLog;
pub use record::{ProvisionRecord, ProvisionStatus};
