//! # zv-cli
//!
//! Command-line interface for onboarding policy on an ERP site checkout:
//! - `zv policy show/check` — print the layered policy, validate a file
//! - `zv scope <type> --user U` — show the listing filter a user gets
//! - `zv guard <type> --user U` — check record access on a sensitive type
//! - `zv privacy sync` — reconcile field privacy against the site snapshot
//! - `zv collab created/removed` — replay an assignment event
//! - `zv log verify/tail` — inspect the provision log

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use zv_policy::SiteConfig;

const LONG_VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("ZV_BUILD_INFO"), ")");

/// Onboarding policy reconciliation for multi-company ERP sites.
#[derive(Parser)]
#[command(name = "zv", version, long_version = LONG_VERSION, about)]
struct Cli {
    /// Site root directory (defaults to current directory).
    #[arg(long, default_value = ".")]
    site_root: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect and validate policy documents.
    Policy {
        #[command(subcommand)]
        command: commands::policy::PolicyCommands,
    },
    /// Show the listing filter a user gets for an entity type.
    Scope(commands::scope::ScopeArgs),
    /// Check whether a user may open a record of a sensitive entity type.
    Guard(commands::guard::GuardArgs),
    /// Reconcile field privacy.
    Privacy {
        #[command(subcommand)]
        command: commands::privacy::PrivacyCommands,
    },
    /// Replay task assignment events through the access grant reconciler.
    Collab {
        #[command(subcommand)]
        command: commands::collab::CollabCommands,
    },
    /// Inspect the provision log.
    Log {
        #[command(subcommand)]
        command: commands::log::LogCommands,
    },
}

fn main() -> anyhow::Result<()> {
    // Logs go to stderr so command output on stdout stays pipeable.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("zv_policy=info".parse()?)
                .add_directive("zv=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let cli = Cli::parse();
    let site_root = cli.site_root.canonicalize().unwrap_or(cli.site_root);
    let config = SiteConfig::load(&site_root)?;
    tracing::debug!(root = %site_root.display(), site = ?config.site, "site config loaded");

    match &cli.command {
        Commands::Policy { command } => commands::policy::execute(command, &config),
        Commands::Scope(args) => commands::scope::execute(args, &config),
        Commands::Guard(args) => commands::guard::execute(args, &config),
        Commands::Privacy { command } => commands::privacy::execute(command, &config),
        Commands::Collab { command } => commands::collab::execute(command, &config),
        Commands::Log { command } => commands::log::execute(command, &config),
    }
}
