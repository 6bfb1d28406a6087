// document.rs — The parsed, validated onboarding policy.
//
// A PolicyDocument is built once from YAML and never mutated afterwards.
// Reconcilers and the scope resolver borrow it; a policy change produces a
// brand new document (see `PolicyCell`).
//
// The serde field names follow the policy.yaml format used by the site
// blueprints, so the same types serve for parsing and for `zv policy show`.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::PolicyError;

/// Entity type that carries project membership.
pub const PROJECT: &str = "Project";
/// Entity type whose assignments drive collaboration grants.
pub const TASK: &str = "Task";

/// The complete onboarding policy for one site.
///
/// ```yaml
/// strict_default_deny: false
/// pqc_bypass_roles: ["System Manager"]
/// pqc_doctypes:
///   Lead: { enabled: true, company_field: company, brand_field: brand }
/// sensitive_roles:
///   Employee: ["HR Manager"]
/// collab:
///   on_task_assignment: share_write
///   ignore_user_permissions_on_task_project: true
/// project_field_privacy:
///   enabled: true
///   permlevel: 1
///   fields: [estimated_costing, total_billable_amount]
///   level1_roles: ["Projects Manager"]
///   strict_sync: false
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyDocument {
    /// Deny listing for entity types without an enabled scope rule.
    #[serde(default, deserialize_with = "null_as_default")]
    pub strict_default_deny: bool,

    /// Roles that see everything, regardless of scope rules.
    #[serde(
        rename = "pqc_bypass_roles",
        default,
        deserialize_with = "null_as_default"
    )]
    pub bypass_roles: BTreeSet<String>,

    /// Per-entity-type listing scope rules.
    #[serde(rename = "pqc_doctypes", default, deserialize_with = "null_as_default")]
    pub scope_rules: BTreeMap<String, ScopeRule>,

    /// Roles allowed to open records of sensitive entity types.
    #[serde(default, deserialize_with = "null_as_default")]
    pub sensitive_roles: BTreeMap<String, BTreeSet<String>>,

    /// What a task assignment grants on the task's project.
    #[serde(rename = "collab", default, deserialize_with = "null_as_default")]
    pub collaboration: CollaborationPolicy,

    /// Field-level privacy for one entity type.
    #[serde(
        rename = "project_field_privacy",
        default,
        deserialize_with = "null_as_default"
    )]
    pub field_privacy: FieldPrivacyPolicy,
}

/// How listing queries for one entity type are narrowed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeRule {
    /// Required: a rule that omits `enabled` is rejected.
    pub enabled: bool,

    /// Field holding the primary organizational dimension (the company).
    #[serde(rename = "company_field", default = "default_dimension_field")]
    pub dimension_field: String,

    /// Optional secondary dimension (the brand).
    #[serde(
        rename = "brand_field",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub secondary_dimension_field: Option<String>,
}

impl ScopeRule {
    /// An enabled rule on `company` / `brand`, the shape used by the built-in defaults.
    pub fn company_and_brand() -> Self {
        Self {
            enabled: true,
            dimension_field: default_dimension_field(),
            secondary_dimension_field: Some("brand".to_string()),
        }
    }
}

fn default_dimension_field() -> String {
    "company".to_string()
}

/// What a task assignment grants on the parent project.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollaborationMode {
    /// A read-write share on the project.
    ShareWrite,
    /// A row in the project's member list.
    #[serde(rename = "project_user")]
    MembershipGrant,
    /// Assignments grant nothing.
    #[default]
    None,
}

impl std::fmt::Display for CollaborationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CollaborationMode::ShareWrite => write!(f, "share_write"),
            CollaborationMode::MembershipGrant => write!(f, "project_user"),
            CollaborationMode::None => write!(f, "none"),
        }
    }
}

/// Collaboration rule applied by the access grant reconciler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollaborationPolicy {
    #[serde(rename = "on_task_assignment", default)]
    pub mode: CollaborationMode,

    /// Resolve a task's project without the caller's dimension filter.
    #[serde(rename = "ignore_user_permissions_on_task_project", default)]
    pub ignore_project_scope_on_task: bool,

    /// Users whose access is never revoked by this mechanism.
    #[serde(
        default = "default_never_revoke_users",
        deserialize_with = "null_as_default"
    )]
    pub never_revoke_users: BTreeSet<String>,
}

impl Default for CollaborationPolicy {
    fn default() -> Self {
        Self {
            mode: CollaborationMode::None,
            ignore_project_scope_on_task: false,
            never_revoke_users: default_never_revoke_users(),
        }
    }
}

fn default_never_revoke_users() -> BTreeSet<String> {
    BTreeSet::from(["Administrator".to_string()])
}

/// Field privacy: which fields sit behind a permission level and who may read them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldPrivacyPolicy {
    #[serde(default)]
    pub enabled: bool,

    /// Entity type whose schema is reconciled.
    #[serde(default = "default_privacy_doctype")]
    pub doctype: String,

    #[serde(rename = "permlevel", default = "default_perm_level")]
    pub perm_level: u8,

    /// Applied in order; the report lists changes in the same order.
    #[serde(rename = "fields", default, deserialize_with = "null_as_default")]
    pub protected_fields: Vec<String>,

    #[serde(
        rename = "level1_roles",
        default,
        deserialize_with = "null_as_default"
    )]
    pub granted_roles: BTreeSet<String>,

    /// Remove read access at `perm_level` from roles not in `granted_roles`.
    #[serde(default)]
    pub strict_sync: bool,

    /// Create missing field overrides and permission rows.
    #[serde(default = "default_true")]
    pub create_if_missing: bool,
}

impl Default for FieldPrivacyPolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            doctype: default_privacy_doctype(),
            perm_level: default_perm_level(),
            protected_fields: Vec::new(),
            granted_roles: BTreeSet::new(),
            strict_sync: false,
            create_if_missing: true,
        }
    }
}

fn default_privacy_doctype() -> String {
    PROJECT.to_string()
}

fn default_perm_level() -> u8 {
    1
}

fn default_true() -> bool {
    true
}

/// Treat an explicit YAML `null` (`key:` with no value) as the default.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl PolicyDocument {
    /// Parse a single policy document.
    ///
    /// Unknown top-level keys are ignored. An empty document yields the
    /// defaults (no scope rules, no bypass roles, privacy disabled).
    pub fn load(raw: &[u8]) -> Result<Self, PolicyError> {
        Self::load_from("<inline>", raw)
    }

    /// Parse a document, naming `origin` in any error.
    pub fn load_from(origin: &str, raw: &[u8]) -> Result<Self, PolicyError> {
        let value = parse_mapping(origin, raw)?;
        Self::from_value(origin, serde_yaml::Value::Mapping(value))
    }

    /// Build a document from an already-merged YAML value.
    pub(crate) fn from_value(origin: &str, value: serde_yaml::Value) -> Result<Self, PolicyError> {
        let document: PolicyDocument =
            serde_yaml::from_value(value).map_err(|e| PolicyError::malformed(origin, e))?;
        document.validate(origin)?;
        Ok(document)
    }

    /// The in-code baseline every site starts from before its YAML layers.
    ///
    /// Scopes the CRM, sales, projects and HR entity types by company and
    /// brand, and restricts Employee records to HR roles.
    pub fn builtin() -> Self {
        let scoped = [
            "Lead",
            "Opportunity",
            "Customer",
            "Quotation",
            "Sales Order",
            PROJECT,
            TASK,
            "Employee",
            "Job Applicant",
            "Job Opening",
        ];
        Self {
            scope_rules: scoped
                .iter()
                .map(|dt| (dt.to_string(), ScopeRule::company_and_brand()))
                .collect(),
            sensitive_roles: BTreeMap::from([(
                "Employee".to_string(),
                BTreeSet::from(["HR Manager".to_string(), "HR Assistant".to_string()]),
            )]),
            ..Self::default()
        }
    }

    /// The scope rule for an entity type, if one exists and is enabled.
    pub fn enabled_rule(&self, entity_type: &str) -> Option<&ScopeRule> {
        self.scope_rules.get(entity_type).filter(|rule| rule.enabled)
    }

    /// Dimension fields referenced by the rule for `entity_type` (primary first).
    pub fn dimension_fields(&self, entity_type: &str) -> Vec<&str> {
        match self.enabled_rule(entity_type) {
            Some(rule) => std::iter::once(rule.dimension_field.as_str())
                .chain(rule.secondary_dimension_field.as_deref())
                .collect(),
            None => Vec::new(),
        }
    }

    fn validate(&self, origin: &str) -> Result<(), PolicyError> {
        for (entity_type, rule) in &self.scope_rules {
            if !is_identifier(&rule.dimension_field) {
                return Err(PolicyError::malformed(
                    origin,
                    format!(
                        "pqc_doctypes.{entity_type}.company_field '{}' is not a field name",
                        rule.dimension_field
                    ),
                ));
            }
            if let Some(secondary) = &rule.secondary_dimension_field {
                if !is_identifier(secondary) {
                    return Err(PolicyError::malformed(
                        origin,
                        format!(
                            "pqc_doctypes.{entity_type}.brand_field '{secondary}' is not a field name"
                        ),
                    ));
                }
            }
        }

        let privacy = &self.field_privacy;
        if privacy.enabled {
            if !(1..=9).contains(&privacy.perm_level) {
                return Err(PolicyError::malformed(
                    origin,
                    format!(
                        "project_field_privacy.permlevel must be between 1 and 9, got {}",
                        privacy.perm_level
                    ),
                ));
            }
            if privacy.doctype.trim().is_empty() {
                return Err(PolicyError::malformed(
                    origin,
                    "project_field_privacy.doctype must not be empty",
                ));
            }
            if let Some(field) = privacy.protected_fields.iter().find(|f| !is_identifier(f)) {
                return Err(PolicyError::malformed(
                    origin,
                    format!("project_field_privacy.fields entry '{field}' is not a field name"),
                ));
            }
        }
        Ok(())
    }
}

/// Parse raw YAML and require a top-level mapping (an empty document counts as one).
pub(crate) fn parse_mapping(origin: &str, raw: &[u8]) -> Result<serde_yaml::Mapping, PolicyError> {
    if raw.iter().all(u8::is_ascii_whitespace) {
        return Ok(serde_yaml::Mapping::new());
    }
    let value: serde_yaml::Value =
        serde_yaml::from_slice(raw).map_err(|e| PolicyError::malformed(origin, e))?;
    match value {
        serde_yaml::Value::Null => Ok(serde_yaml::Mapping::new()),
        serde_yaml::Value::Mapping(mapping) => Ok(mapping),
        other => Err(PolicyError::malformed(
            origin,
            format!("top level must be a mapping, found {}", value_kind(&other)),
        )),
    }
}

fn value_kind(value: &serde_yaml::Value) -> &'static str {
    match value {
        serde_yaml::Value::Null => "null",
        serde_yaml::Value::Bool(_) => "a boolean",
        serde_yaml::Value::Number(_) => "a number",
        serde_yaml::Value::String(_) => "a string",
        serde_yaml::Value::Sequence(_) => "a sequence",
        serde_yaml::Value::Mapping(_) => "a mapping",
        serde_yaml::Value::Tagged(_) => "a tagged value",
    }
}

/// Field names end up inside SQL identifiers, so only `[A-Za-z0-9_]` is allowed.
fn is_identifier(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let doc = PolicyDocument::load(b"").unwrap();
        assert!(!doc.strict_default_deny);
        assert!(doc.bypass_roles.is_empty());
        assert!(doc.scope_rules.is_empty());
        assert!(!doc.field_privacy.enabled);
        assert_eq!(doc.collaboration.mode, CollaborationMode::None);
    }

    #[test]
    fn comment_only_document_uses_defaults() {
        let doc = PolicyDocument::load(b"# nothing configured yet\n").unwrap();
        assert_eq!(doc, PolicyDocument::default());
    }

    #[test]
    fn parses_full_document() {
        let yaml = r#"
strict_default_deny: true
pqc_bypass_roles: ["System Manager", "Group Auditor"]
pqc_doctypes:
  Lead: { enabled: true, company_field: company, brand_field: brand }
  Customer: { enabled: false }
sensitive_roles:
  Employee: ["HR Manager"]
collab:
  on_task_assignment: share_write
  ignore_user_permissions_on_task_project: true
project_field_privacy:
  enabled: true
  permlevel: 2
  fields: [estimated_costing, margin]
  level1_roles: ["Projects Manager"]
  strict_sync: true
  create_if_missing: false
"#;
        let doc = PolicyDocument::load(yaml.as_bytes()).unwrap();
        assert!(doc.strict_default_deny);
        assert!(doc.bypass_roles.contains("Group Auditor"));
        assert_eq!(doc.scope_rules["Lead"], ScopeRule::company_and_brand());
        let customer = &doc.scope_rules["Customer"];
        assert!(!customer.enabled);
        assert_eq!(customer.dimension_field, "company");
        assert_eq!(customer.secondary_dimension_field, None);
        assert_eq!(doc.collaboration.mode, CollaborationMode::ShareWrite);
        assert!(doc.collaboration.ignore_project_scope_on_task);
        assert_eq!(doc.field_privacy.perm_level, 2);
        assert_eq!(doc.field_privacy.protected_fields, ["estimated_costing", "margin"]);
        assert!(doc.field_privacy.strict_sync);
        assert!(!doc.field_privacy.create_if_missing);
        assert_eq!(doc.field_privacy.doctype, PROJECT);
    }

    #[test]
    fn project_user_maps_to_membership_grant() {
        let doc = PolicyDocument::load(b"collab:\n  on_task_assignment: project_user\n").unwrap();
        assert_eq!(doc.collaboration.mode, CollaborationMode::MembershipGrant);
        assert!(doc.collaboration.never_revoke_users.contains("Administrator"));
    }

    #[test]
    fn unknown_top_level_keys_are_ignored() {
        let doc = PolicyDocument::load(b"letterheads: {brand: x}\nstrict_default_deny: true\n").unwrap();
        assert!(doc.strict_default_deny);
    }

    #[test]
    fn null_sections_fall_back_to_defaults() {
        let doc = PolicyDocument::load(b"pqc_bypass_roles:\ncollab:\nproject_field_privacy:\n").unwrap();
        assert!(doc.bypass_roles.is_empty());
        assert_eq!(doc.collaboration, CollaborationPolicy::default());
        assert_eq!(doc.field_privacy, FieldPrivacyPolicy::default());
    }

    #[test]
    fn rejects_unknown_collab_mode() {
        let err = PolicyDocument::load(b"collab:\n  on_task_assignment: share_everything\n")
            .unwrap_err();
        assert!(matches!(err, PolicyError::MalformedPolicy { .. }));
    }

    #[test]
    fn rejects_non_integer_permlevel() {
        let err = PolicyDocument::load(
            b"project_field_privacy:\n  enabled: true\n  permlevel: high\n",
        )
        .unwrap_err();
        match err {
            PolicyError::MalformedPolicy { origin, .. } => assert_eq!(origin, "<inline>"),
            other => panic!("expected MalformedPolicy, got {:?}", other),
        }
    }

    #[test]
    fn rejects_out_of_range_permlevel_when_enabled() {
        let err =
            PolicyDocument::load(b"project_field_privacy:\n  enabled: true\n  permlevel: 0\n")
                .unwrap_err();
        assert!(err.to_string().contains("between 1 and 9"));

        // Disabled privacy is not validated.
        assert!(
            PolicyDocument::load(b"project_field_privacy:\n  enabled: false\n  permlevel: 0\n")
                .is_ok()
        );
    }

    #[test]
    fn rejects_scope_rule_without_enabled() {
        let err = PolicyDocument::load(b"pqc_doctypes:\n  Lead: { company_field: company }\n")
            .unwrap_err();
        assert!(err.to_string().contains("enabled"));
    }

    #[test]
    fn rejects_dimension_field_with_sql_characters() {
        let err = PolicyDocument::load(
            b"pqc_doctypes:\n  Lead: { enabled: true, company_field: \"company` OR 1=1\" }\n",
        )
        .unwrap_err();
        assert!(matches!(err, PolicyError::MalformedPolicy { .. }));
    }

    #[test]
    fn rejects_non_mapping_top_level() {
        let err = PolicyDocument::load(b"- just\n- a list\n").unwrap_err();
        assert!(err.to_string().contains("top level must be a mapping"));
    }

    #[test]
    fn builtin_scopes_projects_and_tasks() {
        let doc = PolicyDocument::builtin();
        assert_eq!(doc.dimension_fields(PROJECT), ["company", "brand"]);
        assert_eq!(doc.dimension_fields(TASK), ["company", "brand"]);
        assert!(doc.dimension_fields("Item").is_empty());
        assert!(doc.sensitive_roles["Employee"].contains("HR Manager"));
    }

    #[test]
    fn yaml_round_trip_preserves_document() {
        let doc = PolicyDocument::builtin();
        let yaml = serde_yaml::to_string(&doc).unwrap();
        let restored = PolicyDocument::load(yaml.as_bytes()).unwrap();
        assert_eq!(doc, restored);
    }

    #[test]
    fn collaboration_mode_display_matches_yaml() {
        assert_eq!(CollaborationMode::ShareWrite.to_string(), "share_write");
        assert_eq!(CollaborationMode::MembershipGrant.to_string(), "project_user");
        assert_eq!(CollaborationMode::None.to_string(), "none");
    }
}
