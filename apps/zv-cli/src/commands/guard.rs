// guard.rs — `zv guard`: record access check for sensitive entity types.

use clap::{Args, ValueEnum};
use zv_policy::{has_permission, Access, GuardDecision, GuardedRecord, SiteConfig};

#[derive(Clone, Copy, ValueEnum)]
enum AccessArg {
    Read,
    Write,
    Create,
    Delete,
}

impl From<AccessArg> for Access {
    fn from(arg: AccessArg) -> Self {
        match arg {
            AccessArg::Read => Access::Read,
            AccessArg::Write => Access::Write,
            AccessArg::Create => Access::Create,
            AccessArg::Delete => Access::Delete,
        }
    }
}

#[derive(Args)]
pub struct GuardArgs {
    /// Entity type of the record (e.g., "Employee").
    entity_type: String,
    #[arg(long)]
    user: String,
    /// User account linked to the record, if any.
    #[arg(long)]
    linked_user: Option<String>,
    #[arg(long, value_enum, default_value = "read")]
    access: AccessArg,
}

pub fn execute(args: &GuardArgs, config: &SiteConfig) -> anyhow::Result<()> {
    let loaded = super::load_policy(config)?;
    let state = super::open_state(config)?;
    let caller = super::caller_from_state(&state, &loaded.document, &args.entity_type, &args.user)?;
    let record = GuardedRecord {
        entity_type: &args.entity_type,
        linked_user: args.linked_user.as_deref(),
    };

    match has_permission(&loaded.document, &record, args.access.into(), &caller) {
        GuardDecision::Allow => println!("allow"),
        GuardDecision::Deny { reason } => {
            println!("deny: {}", reason);
            anyhow::bail!("access denied");
        }
    }
    Ok(())
}
