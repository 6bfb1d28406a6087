// record.rs — Provision record data model.
//
// One ProvisionRecord per reconciliation run: what was planned, whether it was
// a dry run, and how it ended. Records form a chain through `previous_hash`,
// set by the log on append.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::hasher;

/// How a run ended.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProvisionStatus {
    /// Everything planned was applied (or would be, for a dry run).
    Success,
    /// Some changes applied, some failed.
    Partial,
    /// Nothing could be applied.
    Failed,
}

impl ProvisionStatus {
    /// Status for a run with `applied` successful changes and `failed` failures.
    pub fn from_counts(applied: usize, failed: usize) -> Self {
        match (applied, failed) {
            (_, 0) => ProvisionStatus::Success,
            (0, _) => ProvisionStatus::Failed,
            _ => ProvisionStatus::Partial,
        }
    }
}

impl std::fmt::Display for ProvisionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProvisionStatus::Success => f.pad("success"),
            ProvisionStatus::Partial => f.pad("partial"),
            ProvisionStatus::Failed => f.pad("failed"),
        }
    }
}

/// A single provision record: one line in the JSONL provision log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProvisionRecord {
    pub log_id: Uuid,

    /// When the run finished (UTC).
    pub timestamp: DateTime<Utc>,

    pub site: Option<String>,

    /// Blueprint slug whose policy drove the run.
    pub blueprint: Option<String>,

    pub dry_run: bool,

    /// One-line human summary (e.g., "privacy sync: 2 fields, 1 role").
    pub summary: String,

    /// The plan or report of the run, as JSON.
    pub plan: serde_json::Value,

    /// SHA-256 of `plan` (see [`hasher::hash_json`]).
    pub plan_hash: String,

    pub status: ProvisionStatus,

    /// Commit of the blueprints checkout the run used, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_sha: Option<String>,

    /// Hash of the previous record's line. `None` for the first record.
    #[serde(default)]
    pub previous_hash: Option<String>,
}

impl ProvisionRecord {
    pub fn new(summary: impl Into<String>, plan: serde_json::Value, status: ProvisionStatus) -> Self {
        Self {
            log_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            site: None,
            blueprint: None,
            dry_run: false,
            summary: summary.into(),
            plan_hash: hasher::hash_json(&plan),
            plan,
            status,
            commit_sha: None,
            previous_hash: None,
        }
    }

    /// Set the site name (builder pattern).
    pub fn with_site(mut self, site: Option<String>) -> Self {
        self.site = site;
        self
    }

    pub fn with_blueprint(mut self, blueprint: Option<String>) -> Self {
        self.blueprint = blueprint;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_commit_sha(mut self, sha: impl Into<String>) -> Self {
        self.commit_sha = Some(sha.into());
        self
    }

    /// Whether `plan_hash` still matches `plan`.
    pub fn plan_matches_hash(&self) -> bool {
        hasher::hash_json(&self.plan) == self.plan_hash
    }
}
