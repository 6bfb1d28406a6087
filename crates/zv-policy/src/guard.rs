// guard.rs — Record-level guard for sensitive entity types.
//
// Listing scopes decide which rows show up; the guard decides whether one
// already-loaded record of a sensitive type (Employee by default) may be
// opened:
//
// 1. Caller holds a bypass role? → Allow
// 2. Caller holds one of the sensitive roles for the type? → Allow
// 3. Employee record linked to the caller, read access? → Allow (self-service)
// 4. Otherwise → Deny

use serde::{Deserialize, Serialize};

use crate::document::PolicyDocument;
use crate::scope::CallerScope;

/// The kind of access being checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Access {
    Read,
    Write,
    Create,
    Delete,
}

/// The record being opened.
#[derive(Debug, Clone, Copy)]
pub struct GuardedRecord<'a> {
    pub entity_type: &'a str,
    /// The user account linked to the record (Employee.user_id).
    pub linked_user: Option<&'a str>,
}

/// The guard's verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum GuardDecision {
    Allow,
    Deny { reason: String },
}

impl GuardDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, GuardDecision::Allow)
    }
}

const SELF_SERVICE_TYPE: &str = "Employee";

/// Decide whether `caller` may access `record`.
pub fn has_permission(
    policy: &PolicyDocument,
    record: &GuardedRecord<'_>,
    access: Access,
    caller: &CallerScope,
) -> GuardDecision {
    if !policy.bypass_roles.is_disjoint(&caller.roles) {
        return GuardDecision::Allow;
    }

    if let Some(needed) = policy.sensitive_roles.get(record.entity_type) {
        if !needed.is_disjoint(&caller.roles) {
            return GuardDecision::Allow;
        }
    }

    if record.entity_type == SELF_SERVICE_TYPE
        && access == Access::Read
        && record.linked_user == Some(caller.user.as_str())
    {
        return GuardDecision::Allow;
    }

    GuardDecision::Deny {
        reason: format!(
            "'{}' holds none of the roles required for {:?} on {}",
            caller.user, access, record.entity_type
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> PolicyDocument {
        PolicyDocument::load(
            br#"
pqc_bypass_roles: ["System Manager"]
sensitive_roles:
  Employee: ["HR Manager", "HR Assistant"]
  Salary Slip: ["HR Manager"]
"#,
        )
        .unwrap()
    }

    fn employee(linked: Option<&str>) -> GuardedRecord<'_> {
        GuardedRecord {
            entity_type: "Employee",
            linked_user: linked,
        }
    }

    #[test]
    fn sensitive_role_allows() {
        let caller = CallerScope::new("hr@example.com").with_roles(["HR Assistant"]);
        assert!(has_permission(&policy(), &employee(None), Access::Write, &caller).is_allowed());
    }

    #[test]
    fn bypass_role_allows() {
        let caller = CallerScope::new("root").with_roles(["System Manager"]);
        let slip = GuardedRecord {
            entity_type: "Salary Slip",
            linked_user: None,
        };
        assert!(has_permission(&policy(), &slip, Access::Delete, &caller).is_allowed());
    }

    #[test]
    fn employee_may_read_own_record_only() {
        let caller = CallerScope::new("ana@example.com").with_roles(["Employee"]);
        let doc = policy();
        assert!(
            has_permission(&doc, &employee(Some("ana@example.com")), Access::Read, &caller)
                .is_allowed()
        );
        assert!(
            !has_permission(&doc, &employee(Some("ana@example.com")), Access::Write, &caller)
                .is_allowed()
        );
        assert!(
            !has_permission(&doc, &employee(Some("bob@example.com")), Access::Read, &caller)
                .is_allowed()
        );
    }

    #[test]
    fn unlisted_role_is_denied_with_reason() {
        let caller = CallerScope::new("sales@example.com").with_roles(["Sales User"]);
        match has_permission(&policy(), &employee(None), Access::Read, &caller) {
            GuardDecision::Deny { reason } => assert!(reason.contains("sales@example.com")),
            other => panic!("expected Deny, got {:?}", other),
        }
    }
}
