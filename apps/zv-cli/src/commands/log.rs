// log.rs — Log subcommands: verify, tail.

use std::path::PathBuf;

use clap::Subcommand;
use zv_audit::{ProvisionLog, ProvisionLogError};
use zv_policy::SiteConfig;

#[derive(Subcommand)]
pub enum LogCommands {
    /// Verify the provision log hash chain and plan hashes.
    Verify {
        /// Path to the log (defaults to .zv/provision.jsonl).
        #[arg(long)]
        log: Option<PathBuf>,
    },
    /// Show recent provision records.
    Tail {
        /// Path to the log (defaults to .zv/provision.jsonl).
        #[arg(long)]
        log: Option<PathBuf>,
        /// Number of records to show.
        #[arg(short, default_value = "10")]
        n: usize,
    },
}

pub fn execute(cmd: &LogCommands, config: &SiteConfig) -> anyhow::Result<()> {
    match cmd {
        LogCommands::Verify { log } => {
            let path = log.clone().unwrap_or_else(|| config.provision_log.clone());
            if !path.exists() {
                println!("No provision log found at {}", path.display());
                return Ok(());
            }

            match ProvisionLog::verify_chain(&path) {
                Ok(count) => println!(
                    "Provision log verified: {} record(s), hash chain intact.",
                    count
                ),
                Err(ProvisionLogError::ChainBroken {
                    line,
                    expected,
                    actual,
                }) => {
                    println!("CHAIN BROKEN at line {}:", line);
                    println!("  Expected previous_hash: {}", expected);
                    println!("  Actual previous_hash:   {}", actual);
                    println!();
                    println!("The provision log may have been tampered with.");
                    anyhow::bail!("Provision log integrity check failed");
                }
                Err(ProvisionLogError::PlanHashMismatch {
                    line,
                    recorded,
                    computed,
                }) => {
                    println!("PLAN EDITED at line {}:", line);
                    println!("  Recorded plan_hash: {}", recorded);
                    println!("  Computed plan_hash: {}", computed);
                    anyhow::bail!("Provision log integrity check failed");
                }
                Err(e) => return Err(e.into()),
            }
        }

        LogCommands::Tail { log, n } => {
            let path = log.clone().unwrap_or_else(|| config.provision_log.clone());
            let recent = ProvisionLog::tail(&path, *n)?;
            if recent.is_empty() {
                println!("No provision records.");
                return Ok(());
            }

            println!(
                "{:<20} {:<10} {:<8} {:<5} SUMMARY",
                "TIMESTAMP", "BLUEPRINT", "STATUS", "DRY"
            );
            println!("{}", "-".repeat(80));
            for record in &recent {
                println!(
                    "{:<20} {:<10} {:<8} {:<5} {}",
                    record.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    record.blueprint.as_deref().unwrap_or("-"),
                    record.status,
                    if record.dry_run { "yes" } else { "no" },
                    record.summary,
                );
            }
        }
    }

    Ok(())
}
