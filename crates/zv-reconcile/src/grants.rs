// grants.rs — Access grant reconciler.
//
// Keeps an assignee's access to a project in step with their assignments:
//
//   Unassigned ──Created──▶ Assigned ──Removed (last one)──▶ Unassigned
//
// What "access" means comes from the collaboration policy: a read-write share
// on the project, a row in its member list, or nothing. Created ensures the
// grant exists; Removed revokes it once no other assignment on the same
// project remains. Both are idempotent: re-running an event changes nothing.
//
// Rights at or below what this mechanism grants are treated as ours to
// revoke. Strictly higher rights were set by hand and are never touched.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use zv_policy::{CollaborationMode, DimensionValues, PolicyDocument, ScopeResolver, PROJECT, TASK};

use crate::error::{ReconcileError, StoreError};
use crate::store::{EntityQuery, GrantStore, IdentityProvider, Member, ShareRights};

/// Rights this mechanism grants, for shares and member rows alike.
const GRANTED_RIGHTS: ShareRights = ShareRights::ReadWrite;

/// Whether an assignment appeared or went away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentKind {
    Created,
    Removed,
}

/// An assignment was created or removed on some record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentEvent {
    pub assignment_id: String,
    pub assignee_id: String,
    pub parent_entity_id: String,
    pub parent_entity_type: String,
    pub kind: AssignmentKind,
}

/// Target access for an (assignee, project) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessMode {
    None,
    ReadWrite,
    MemberOnly,
}

impl From<CollaborationMode> for AccessMode {
    fn from(mode: CollaborationMode) -> Self {
        match mode {
            CollaborationMode::ShareWrite => AccessMode::ReadWrite,
            CollaborationMode::MembershipGrant => AccessMode::MemberOnly,
            CollaborationMode::None => AccessMode::None,
        }
    }
}

/// The reconciled target state. Derived from the event and the store each
/// time; never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessGrant {
    pub assignee: String,
    pub project: String,
    pub mode: AccessMode,
}

/// What reconciliation did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum GrantOutcome {
    /// A share or member row was created.
    Granted,
    /// A lower share was raised to read-write.
    Upgraded { from: ShareRights },
    /// State already matched the target.
    Unchanged,
    /// The share or member row was deleted.
    Revoked,
    /// Access was deliberately kept.
    Retained { reason: String },
    /// The event does not apply.
    Skipped { reason: String },
}

impl GrantOutcome {
    /// Whether the store was mutated.
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            GrantOutcome::Granted | GrantOutcome::Upgraded { .. } | GrantOutcome::Revoked
        )
    }

    fn skipped(reason: impl Into<String>) -> Self {
        GrantOutcome::Skipped {
            reason: reason.into(),
        }
    }

    fn retained(reason: impl Into<String>) -> Self {
        GrantOutcome::Retained {
            reason: reason.into(),
        }
    }
}

/// Result of reconciling one event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantReport {
    pub event: AssignmentEvent,
    /// Absent when the event was skipped before a project was resolved.
    pub grant: Option<AccessGrant>,
    #[serde(flatten)]
    pub outcome: GrantOutcome,
}

/// Reconciles access grants against a borrowed policy document.
#[derive(Debug, Clone, Copy)]
pub struct GrantReconciler<'a> {
    policy: &'a PolicyDocument,
}

impl<'a> GrantReconciler<'a> {
    pub fn new(policy: &'a PolicyDocument) -> Self {
        Self { policy }
    }

    /// Bring the assignee's access to the event's project to its target state.
    ///
    /// Callers serialize events per (assignee, project) pair.
    pub fn reconcile<S>(
        &self,
        store: &mut S,
        event: &AssignmentEvent,
    ) -> Result<GrantReport, ReconcileError>
    where
        S: EntityQuery + GrantStore + IdentityProvider,
    {
        let collab = &self.policy.collaboration;
        let report = |grant: Option<AccessGrant>, outcome: GrantOutcome| GrantReport {
            event: event.clone(),
            grant,
            outcome,
        };

        if collab.mode == CollaborationMode::None {
            return Ok(report(
                None,
                GrantOutcome::skipped("collaboration on task assignment is disabled"),
            ));
        }
        let assignee = event.assignee_id.as_str();
        if event.kind == AssignmentKind::Removed && collab.never_revoke_users.contains(assignee) {
            return Ok(report(
                None,
                GrantOutcome::retained(format!("'{assignee}' is never revoked")),
            ));
        }
        if !store.is_active(assignee)? {
            return Ok(report(
                None,
                GrantOutcome::skipped(format!("'{assignee}' is not an active user")),
            ));
        }

        let project = if event.parent_entity_type == PROJECT {
            Some(event.parent_entity_id.clone())
        } else {
            store.project_of(&event.parent_entity_type, &event.parent_entity_id)?
        };
        let Some(project) = project else {
            return Ok(report(
                None,
                GrantOutcome::skipped(format!(
                    "{} '{}' has no project",
                    event.parent_entity_type, event.parent_entity_id
                )),
            ));
        };

        let mut grant = AccessGrant {
            assignee: assignee.to_string(),
            project: project.clone(),
            mode: collab.mode.into(),
        };

        let outcome = match event.kind {
            AssignmentKind::Created => {
                let scoped = !(event.parent_entity_type == TASK && collab.ignore_project_scope_on_task);
                if scoped && !self.project_in_scope(store, assignee, &project)? {
                    grant.mode = AccessMode::None;
                    return Ok(report(
                        Some(grant),
                        GrantOutcome::skipped(format!(
                            "project '{project}' is outside '{assignee}''s scope"
                        )),
                    ));
                }
                self.ensure(store, &grant)?
            }
            AssignmentKind::Removed => {
                let others = store
                    .active_assignments(assignee, &project)?
                    .into_iter()
                    .filter(|id| *id != event.assignment_id)
                    .count();
                if others > 0 {
                    return Ok(report(
                        Some(grant),
                        GrantOutcome::retained(format!(
                            "{others} other active assignment(s) on '{project}'"
                        )),
                    ));
                }
                let mode = grant.mode;
                grant.mode = AccessMode::None;
                self.revoke(store, &grant, mode)?
            }
        };
        Ok(report(Some(grant), outcome))
    }

    /// Whether the project passes the assignee's listing scope.
    fn project_in_scope<S>(
        &self,
        store: &S,
        assignee: &str,
        project: &str,
    ) -> Result<bool, StoreError>
    where
        S: EntityQuery + IdentityProvider,
    {
        let roles: BTreeSet<String> = store.roles_of(assignee)?;
        let mut dimensions = DimensionValues::new();
        for field in self.policy.dimension_fields(PROJECT) {
            dimensions.insert(field.to_string(), store.dimension_values_of(assignee, field)?);
        }
        let filter = ScopeResolver::new(self.policy).resolve(PROJECT, &roles, &dimensions);
        if filter.is_unrestricted() {
            return Ok(true);
        }
        if filter.matches_nothing() {
            return Ok(false);
        }
        Ok(store
            .apply_filter(PROJECT, &filter)?
            .iter()
            .any(|id| id == project))
    }

    fn ensure<S: GrantStore>(
        &self,
        store: &mut S,
        grant: &AccessGrant,
    ) -> Result<GrantOutcome, ReconcileError> {
        let (user, project) = (grant.assignee.as_str(), grant.project.as_str());
        match grant.mode {
            AccessMode::None => Ok(GrantOutcome::Unchanged),
            AccessMode::ReadWrite => match store.get_share(PROJECT, project, user)? {
                Some(rights) if rights >= GRANTED_RIGHTS => Ok(GrantOutcome::Unchanged),
                current => {
                    store
                        .upsert_share(PROJECT, project, user, GRANTED_RIGHTS)
                        .map_err(|e| conflict(grant, e))?;
                    Ok(match current {
                        Some(from) => GrantOutcome::Upgraded { from },
                        None => GrantOutcome::Granted,
                    })
                }
            },
            AccessMode::MemberOnly => {
                if store.get_members(project)?.iter().any(|m| m.user == user) {
                    return Ok(GrantOutcome::Unchanged);
                }
                store
                    .add_member(
                        project,
                        Member {
                            user: user.to_string(),
                            rights: GRANTED_RIGHTS,
                        },
                    )
                    .map_err(|e| conflict(grant, e))?;
                Ok(GrantOutcome::Granted)
            }
        }
    }

    fn revoke<S: GrantStore>(
        &self,
        store: &mut S,
        grant: &AccessGrant,
        mode: AccessMode,
    ) -> Result<GrantOutcome, ReconcileError> {
        let (user, project) = (grant.assignee.as_str(), grant.project.as_str());
        let current = match mode {
            AccessMode::None => return Ok(GrantOutcome::Unchanged),
            AccessMode::ReadWrite => store.get_share(PROJECT, project, user)?,
            AccessMode::MemberOnly => store
                .get_members(project)?
                .into_iter()
                .find(|m| m.user == user)
                .map(|m| m.rights),
        };
        match current {
            None => Ok(GrantOutcome::Unchanged),
            Some(rights) if rights > GRANTED_RIGHTS => Ok(GrantOutcome::retained(format!(
                "manually granted {rights:?} rights are kept"
            ))),
            Some(_) => {
                let result = if mode == AccessMode::ReadWrite {
                    store.revoke_share(PROJECT, project, user)
                } else {
                    store.remove_member(project, user)
                };
                result.map_err(|e| conflict(grant, e))?;
                Ok(GrantOutcome::Revoked)
            }
        }
    }
}

fn conflict(grant: &AccessGrant, source: StoreError) -> ReconcileError {
    ReconcileError::GrantConflict {
        assignee: grant.assignee.clone(),
        project: grant.project.clone(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collaboration_mode_maps_to_access_mode() {
        assert_eq!(AccessMode::from(CollaborationMode::ShareWrite), AccessMode::ReadWrite);
        assert_eq!(
            AccessMode::from(CollaborationMode::MembershipGrant),
            AccessMode::MemberOnly
        );
        assert_eq!(AccessMode::from(CollaborationMode::None), AccessMode::None);
    }

    #[test]
    fn only_store_changes_count_as_mutations() {
        assert!(GrantOutcome::Granted.is_mutation());
        assert!(GrantOutcome::Revoked.is_mutation());
        assert!(GrantOutcome::Upgraded {
            from: ShareRights::Read
        }
        .is_mutation());
        assert!(!GrantOutcome::Unchanged.is_mutation());
        assert!(!GrantOutcome::retained("kept").is_mutation());
        assert!(!GrantOutcome::skipped("n/a").is_mutation());
    }

    #[test]
    fn share_rights_are_ordered() {
        assert!(ShareRights::Read < GRANTED_RIGHTS);
        assert!(ShareRights::Full > GRANTED_RIGHTS);
    }
}
