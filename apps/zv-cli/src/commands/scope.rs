// scope.rs — `zv scope`: show the listing filter a user gets.

use clap::Args;
use zv_policy::{ScopeResolver, SiteConfig};

#[derive(Args)]
pub struct ScopeArgs {
    /// Entity type to resolve (e.g., "Lead", "Project").
    entity_type: String,
    /// User whose roles and dimension values come from the site snapshot.
    #[arg(long)]
    user: String,
    /// Widen projects and tasks with membership and assignment.
    #[arg(long)]
    collaborative: bool,
    /// Print each resolution step.
    #[arg(long)]
    trace: bool,
}

pub fn execute(args: &ScopeArgs, config: &SiteConfig) -> anyhow::Result<()> {
    let loaded = super::load_policy(config)?;
    let state = super::open_state(config)?;
    let caller = super::caller_from_state(&state, &loaded.document, &args.entity_type, &args.user)?;
    let resolver = ScopeResolver::new(&loaded.document);

    let filter = if args.collaborative {
        resolver.resolve_collaborative(&args.entity_type, &caller)
    } else {
        resolver.resolve_for(&args.entity_type, &caller)
    };

    if args.trace {
        let trace = resolver.resolve_with_trace(&args.entity_type, &caller);
        for step in &trace.steps {
            println!(
                "{:<20} {}{}",
                step.check,
                step.outcome,
                if step.terminal { "  [decided]" } else { "" }
            );
        }
        println!();
    }

    let sql = filter.to_sql(&args.entity_type);
    if sql.is_empty() {
        println!("(unrestricted)");
    } else {
        println!("{}", sql);
    }
    Ok(())
}
