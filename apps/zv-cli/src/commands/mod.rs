// commands — one module per `zv` subcommand group, plus helpers they share.

pub mod collab;
pub mod guard;
pub mod log;
pub mod policy;
pub mod privacy;
pub mod scope;

use anyhow::Context;
use zv_audit::{ProvisionLog, ProvisionRecord, ProvisionStatus};
use zv_policy::{CallerScope, LoadedPolicy, PolicyDocument, PolicyLoader, SiteConfig};
use zv_reconcile::{IdentityProvider, SnapshotStore};

/// Load the layered policy for the configured site.
pub fn load_policy(config: &SiteConfig) -> anyhow::Result<LoadedPolicy> {
    let loaded = PolicyLoader::for_site(config)
        .load()
        .context("failed to load site policy")?;
    tracing::info!(
        layers = loaded.layers.len(),
        blueprint = ?loaded.blueprint,
        "policy loaded"
    );
    Ok(loaded)
}

/// Open the site snapshot the reconcilers run against.
pub fn open_state(config: &SiteConfig) -> anyhow::Result<SnapshotStore> {
    SnapshotStore::open(&config.state_path)
        .with_context(|| format!("failed to read state at {}", config.state_path.display()))
}

/// Build a caller from the snapshot's identity data, with the dimension
/// values the policy's rule for `entity_type` looks at.
pub fn caller_from_state(
    state: &SnapshotStore,
    policy: &PolicyDocument,
    entity_type: &str,
    user: &str,
) -> anyhow::Result<CallerScope> {
    let mut caller = CallerScope::new(user).with_roles(state.roles_of(user)?);
    for field in policy.dimension_fields(entity_type) {
        caller = caller.with_dimension(field, state.dimension_values_of(user, field)?);
    }
    Ok(caller)
}

/// Append a record of this run to the provision log. `commit_sha` names the
/// blueprint revision the run was made from, when the caller knows it.
pub fn record_run(
    config: &SiteConfig,
    loaded: &LoadedPolicy,
    summary: String,
    plan: serde_json::Value,
    status: ProvisionStatus,
    dry_run: bool,
    commit_sha: Option<&str>,
) -> anyhow::Result<ProvisionRecord> {
    let mut record = ProvisionRecord::new(summary, plan, status)
        .with_site(config.site.clone())
        .with_blueprint(loaded.blueprint.clone())
        .with_dry_run(dry_run);
    if let Some(sha) = commit_sha {
        record = record.with_commit_sha(sha);
    }
    let mut log = ProvisionLog::open(&config.provision_log).with_context(|| {
        format!(
            "failed to open provision log at {}",
            config.provision_log.display()
        )
    })?;
    log.append(&mut record)?;
    tracing::info!(log_id = %record.log_id, status = %status, dry_run, "run recorded");
    Ok(record)
}
