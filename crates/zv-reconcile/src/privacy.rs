// privacy.rs — Field privacy reconciler.
//
// Moves the protected fields of an entity type behind a permission level and
// makes sure exactly the policy's roles can read that level:
//
// 1. Each protected field gets `perm_level` (created when missing, if allowed)
// 2. Each granted role gets a read row at `perm_level`
// 3. Under strict sync, other roles lose read at `perm_level`
//
// Failures are per field / per role: one bad field never stops the others.
// Nothing here logs; callers decide what to do with the report.

use serde::{Deserialize, Serialize};
use zv_policy::FieldPrivacyPolicy;

use crate::store::{PermissionRow, SchemaStore};

/// A protected field whose perm level was changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldChange {
    pub field: String,
    /// `None` when the field override was created.
    pub from: Option<u8>,
    pub to: u8,
}

/// Why a target was left alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The field is not in the schema and creation is disabled.
    SchemaMismatch,
    /// The role has no row at the level and creation is disabled.
    RowMissing,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Skip {
    /// Field or role name.
    pub target: String,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    /// Field or role name, or `permission rows` when the listing failed.
    pub target: String,
    pub error: String,
}

/// Everything one reconciliation run did, in policy order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub entity_type: String,
    pub perm_level: u8,
    pub fields_changed: Vec<FieldChange>,
    pub roles_granted: Vec<String>,
    pub roles_revoked: Vec<String>,
    pub skipped: Vec<Skip>,
    pub failures: Vec<Failure>,
}

impl ReconciliationReport {
    /// No mutation was made (skips and failures aside).
    pub fn is_noop(&self) -> bool {
        self.fields_changed.is_empty()
            && self.roles_granted.is_empty()
            && self.roles_revoked.is_empty()
    }

    /// Number of store mutations performed.
    pub fn mutation_count(&self) -> usize {
        self.fields_changed.len() + self.roles_granted.len() + self.roles_revoked.len()
    }

    fn fail(&mut self, target: impl Into<String>, error: impl ToString) {
        self.failures.push(Failure {
            target: target.into(),
            error: error.to_string(),
        });
    }

    fn skip(&mut self, target: impl Into<String>, reason: SkipReason) {
        self.skipped.push(Skip {
            target: target.into(),
            reason,
        });
    }
}

/// Reconcile the schema of `policy.doctype` with the field privacy policy.
///
/// A disabled policy yields an empty report and touches nothing. Running it
/// again after convergence performs no mutation and returns the same report.
pub fn reconcile<S: SchemaStore>(store: &mut S, policy: &FieldPrivacyPolicy) -> ReconciliationReport {
    let entity_type = policy.doctype.as_str();
    let level = policy.perm_level;
    let mut report = ReconciliationReport {
        entity_type: entity_type.to_string(),
        perm_level: level,
        ..ReconciliationReport::default()
    };
    if !policy.enabled {
        return report;
    }

    for field in &policy.protected_fields {
        let current = match store.get_field_perm_level(entity_type, field) {
            Ok(current) => current,
            Err(e) => {
                report.fail(field.as_str(), e);
                continue;
            }
        };
        match current {
            Some(existing) if existing == level => {}
            None if !policy.create_if_missing => report.skip(field.as_str(), SkipReason::SchemaMismatch),
            from => match store.set_field_perm_level(entity_type, field, level) {
                Ok(()) => report.fields_changed.push(FieldChange {
                    field: field.clone(),
                    from,
                    to: level,
                }),
                Err(e) => report.fail(field.as_str(), e),
            },
        }
    }

    let rows = match store.list_permission_rows(entity_type) {
        Ok(rows) => rows,
        Err(e) => {
            report.fail("permission rows", e);
            return report;
        }
    };
    let at_level = |role: &str| rows.iter().find(|r| r.role == role && r.perm_level == level);

    for role in &policy.granted_roles {
        let row = match at_level(role.as_str()) {
            Some(row) if row.read => continue,
            Some(row) => PermissionRow {
                read: true,
                ..row.clone()
            },
            None if policy.create_if_missing => PermissionRow::read_only(role.as_str(), level),
            None => {
                report.skip(role.as_str(), SkipReason::RowMissing);
                continue;
            }
        };
        match store.upsert_permission_row(entity_type, row) {
            Ok(()) => report.roles_granted.push(role.clone()),
            Err(e) => report.fail(role.as_str(), e),
        }
    }

    if policy.strict_sync {
        let stale = rows
            .iter()
            .filter(|r| r.perm_level == level && r.read && !policy.granted_roles.contains(&r.role));
        for row in stale {
            // A row that still carries write keeps existing with read cleared.
            let result = if row.write {
                store.upsert_permission_row(
                    entity_type,
                    PermissionRow {
                        read: false,
                        ..row.clone()
                    },
                )
            } else {
                store.delete_permission_row(entity_type, &row.role, level)
            };
            match result {
                Ok(()) => report.roles_revoked.push(row.role.clone()),
                Err(e) => report.fail(row.role.as_str(), e),
            }
        }
    }

    report
}
