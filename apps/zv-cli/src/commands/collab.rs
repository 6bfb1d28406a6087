// collab.rs — Collab subcommands: replay assignment events.
//
// The event is recorded in the site snapshot first (a Created event adds the
// assignment, a Removed event drops it), then the access grant reconciler
// brings the assignee's project access in line.

use anyhow::Context;
use clap::{Args, Subcommand};
use zv_audit::ProvisionStatus;
use zv_policy::SiteConfig;
use zv_reconcile::{
    Assignment, AssignmentEvent, AssignmentKind, GrantReconciler, ReconcileError,
};

#[derive(Subcommand)]
pub enum CollabCommands {
    /// An assignment was created.
    Created(EventArgs),
    /// An assignment was removed.
    Removed(EventArgs),
}

#[derive(Args)]
pub struct EventArgs {
    /// Assignment id.
    #[arg(long)]
    assignment: String,
    #[arg(long)]
    assignee: String,
    /// Entity type the assignment is on.
    #[arg(long, default_value = "Task")]
    parent_type: String,
    /// Id of the assigned record.
    #[arg(long)]
    parent: String,
    /// Reconcile without saving the snapshot.
    #[arg(long)]
    dry_run: bool,
    /// Blueprint revision to record in the provision log.
    #[arg(long)]
    commit_sha: Option<String>,
}

pub fn execute(cmd: &CollabCommands, config: &SiteConfig) -> anyhow::Result<()> {
    let (args, kind) = match cmd {
        CollabCommands::Created(args) => (args, AssignmentKind::Created),
        CollabCommands::Removed(args) => (args, AssignmentKind::Removed),
    };
    let event = AssignmentEvent {
        assignment_id: args.assignment.clone(),
        assignee_id: args.assignee.clone(),
        parent_entity_id: args.parent.clone(),
        parent_entity_type: args.parent_type.clone(),
        kind,
    };

    let loaded = super::load_policy(config)?;
    let mut state = super::open_state(config)?;
    match kind {
        AssignmentKind::Created => state.insert_assignment(
            event.assignment_id.clone(),
            Assignment {
                assignee: event.assignee_id.clone(),
                entity_type: event.parent_entity_type.clone(),
                entity_id: event.parent_entity_id.clone(),
            },
        ),
        AssignmentKind::Removed => {
            if state.remove_assignment(&event.assignment_id).is_none() {
                tracing::warn!(assignment = %event.assignment_id, "assignment not in snapshot");
            }
        }
    }

    let result = GrantReconciler::new(&loaded.document).reconcile(&mut state, &event);
    if !args.dry_run {
        state.save(&config.state_path).with_context(|| {
            format!("failed to save state at {}", config.state_path.display())
        })?;
    }

    match result {
        Ok(report) => {
            println!("{}", serde_json::to_string_pretty(&report)?);
            let summary = format!(
                "collab {:?} {} on {} {}: {:?}",
                kind, event.assignee_id, event.parent_entity_type, event.parent_entity_id,
                report.outcome
            );
            super::record_run(
                config,
                &loaded,
                summary,
                serde_json::to_value(&report)?,
                ProvisionStatus::Success,
                args.dry_run,
                args.commit_sha.as_deref(),
            )?;
            Ok(())
        }
        Err(err @ ReconcileError::GrantConflict { .. }) => {
            tracing::error!(error = %err, "grant conflict");
            super::record_run(
                config,
                &loaded,
                err.to_string(),
                serde_json::to_value(&event)?,
                ProvisionStatus::Failed,
                args.dry_run,
                args.commit_sha.as_deref(),
            )?;
            Err(err.into())
        }
        Err(err) => Err(err.into()),
    }
}
