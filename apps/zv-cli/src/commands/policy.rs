// policy.rs — Policy subcommands: show, check.

use std::path::PathBuf;

use anyhow::Context;
use clap::Subcommand;
use zv_policy::{PolicyDocument, SiteConfig};

#[derive(Subcommand)]
pub enum PolicyCommands {
    /// Print the effective (layered) policy for this site as YAML.
    Show,
    /// Validate a single policy file without applying it.
    Check {
        /// Path to the policy file.
        file: PathBuf,
    },
}

pub fn execute(cmd: &PolicyCommands, config: &SiteConfig) -> anyhow::Result<()> {
    match cmd {
        PolicyCommands::Show => {
            let loaded = super::load_policy(config)?;
            println!("# site:      {}", config.site.as_deref().unwrap_or("-"));
            println!(
                "# blueprint: {}",
                loaded.blueprint.as_deref().unwrap_or("-")
            );
            if loaded.layers.is_empty() {
                println!("# layers:    built-in defaults only");
            }
            for layer in &loaded.layers {
                println!("# layer:     {}", layer.display());
            }
            print!("{}", serde_yaml::to_string(&loaded.document)?);
        }

        PolicyCommands::Check { file } => {
            let raw = std::fs::read(file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let doc = PolicyDocument::load_from(&file.display().to_string(), &raw)?;
            let enabled = doc.scope_rules.values().filter(|r| r.enabled).count();
            println!("{} is valid.", file.display());
            println!(
                "  scope rules:   {} ({} enabled)",
                doc.scope_rules.len(),
                enabled
            );
            println!("  bypass roles:  {}", doc.bypass_roles.len());
            println!("  collaboration: {}", doc.collaboration.mode);
            println!(
                "  field privacy: {}",
                if doc.field_privacy.enabled {
                    format!(
                        "{} field(s) at level {}",
                        doc.field_privacy.protected_fields.len(),
                        doc.field_privacy.perm_level
                    )
                } else {
                    "disabled".to_string()
                }
            );
        }
    }

    Ok(())
}
