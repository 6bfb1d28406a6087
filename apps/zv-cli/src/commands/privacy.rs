// privacy.rs — Privacy subcommands: sync.

use anyhow::Context;
use clap::Subcommand;
use zv_audit::ProvisionStatus;
use zv_policy::SiteConfig;
use zv_reconcile::privacy;

#[derive(Subcommand)]
pub enum PrivacyCommands {
    /// Move protected fields behind their permission level and sync who may read it.
    Sync {
        /// Compute and log the changes without saving them.
        #[arg(long)]
        dry_run: bool,
        /// Blueprint revision to record in the provision log.
        #[arg(long)]
        commit_sha: Option<String>,
    },
}

pub fn execute(cmd: &PrivacyCommands, config: &SiteConfig) -> anyhow::Result<()> {
    match cmd {
        PrivacyCommands::Sync {
            dry_run,
            commit_sha,
        } => {
            let loaded = super::load_policy(config)?;
            let policy = &loaded.document.field_privacy;
            if !policy.enabled {
                println!("Field privacy is disabled for this site; nothing to do.");
                super::record_run(
                    config,
                    &loaded,
                    "privacy sync: field privacy disabled".to_string(),
                    serde_json::json!({ "enabled": false }),
                    ProvisionStatus::Success,
                    *dry_run,
                    commit_sha.as_deref(),
                )?;
                return Ok(());
            }

            let mut state = super::open_state(config)?;
            let report = if *dry_run {
                privacy::reconcile(&mut state.clone(), policy)
            } else {
                let report = privacy::reconcile(&mut state, policy);
                if !report.is_noop() {
                    state.save(&config.state_path).with_context(|| {
                        format!("failed to save state at {}", config.state_path.display())
                    })?;
                }
                report
            };

            for change in &report.fields_changed {
                let from = change
                    .from
                    .map_or_else(|| "new".to_string(), |l| l.to_string());
                println!("  field  {:<28} {} -> {}", change.field, from, change.to);
            }
            for role in &report.roles_granted {
                println!("  grant  {:<28} read @ {}", role, report.perm_level);
            }
            for role in &report.roles_revoked {
                println!("  revoke {:<28} read @ {}", role, report.perm_level);
            }
            for skip in &report.skipped {
                println!("  skip   {:<28} {:?}", skip.target, skip.reason);
            }
            for failure in &report.failures {
                println!("  FAIL   {:<28} {}", failure.target, failure.error);
            }

            let summary = format!(
                "privacy sync on {}: {} field(s), {} granted, {} revoked, {} skipped, {} failed",
                report.entity_type,
                report.fields_changed.len(),
                report.roles_granted.len(),
                report.roles_revoked.len(),
                report.skipped.len(),
                report.failures.len()
            );
            println!("{}{}", if *dry_run { "[dry run] " } else { "" }, summary);

            let status =
                ProvisionStatus::from_counts(report.mutation_count(), report.failures.len());
            super::record_run(
                config,
                &loaded,
                summary,
                serde_json::to_value(&report)?,
                status,
                *dry_run,
                commit_sha.as_deref(),
            )?;
            if status == ProvisionStatus::Failed {
                anyhow::bail!("field privacy sync failed");
            }
        }
    }

    Ok(())
}
