// scope.rs — Permission scope resolution.
//
// Every list/link query for a scoped entity type passes through
// `ScopeResolver::resolve()`, which decides how the caller's view is narrowed:
//
// 1. Do the caller's roles intersect the bypass roles? → Unrestricted
// 2. Is there an enabled scope rule for the entity type?
//    → No → Unrestricted, or MatchNone under strict default deny
// 3. → Yes → primary dimension ∈ caller's values, AND secondary dimension ∈
//    caller's values when the rule has one and the caller holds values for it
//
// Resolution is pure: no I/O, no logging. It runs on every query path.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::document::{PolicyDocument, ScopeRule, PROJECT, TASK};
use crate::filter::QueryFilter;

/// Dimension field name → values the caller is permitted to see.
pub type DimensionValues = BTreeMap<String, BTreeSet<String>>;

/// Who is asking: the identity facts scope resolution depends on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerScope {
    pub user: String,
    #[serde(default)]
    pub roles: BTreeSet<String>,
    #[serde(default)]
    pub dimensions: DimensionValues,
}

impl CallerScope {
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            ..Self::default()
        }
    }

    /// Add roles and return self (builder pattern).
    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles.extend(roles.into_iter().map(Into::into));
        self
    }

    /// Add permitted values for one dimension field and return self.
    pub fn with_dimension<I, S>(mut self, field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dimensions
            .entry(field.into())
            .or_default()
            .extend(values.into_iter().map(Into::into));
        self
    }
}

/// One check performed during resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionStep {
    /// Which check ran (e.g., "bypass_roles", "scope_rule").
    pub check: String,
    /// What it found.
    pub outcome: String,
    /// Whether this step decided the filter.
    pub terminal: bool,
}

/// The filter plus the steps that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionTrace {
    pub entity_type: String,
    pub filter: QueryFilter,
    pub steps: Vec<ResolutionStep>,
    /// The rule that applied, if any.
    pub rule: Option<ScopeRule>,
}

/// Resolves listing scopes against a borrowed policy document.
#[derive(Debug, Clone, Copy)]
pub struct ScopeResolver<'a> {
    policy: &'a PolicyDocument,
}

impl<'a> ScopeResolver<'a> {
    pub fn new(policy: &'a PolicyDocument) -> Self {
        Self { policy }
    }

    /// Whether any of `roles` is a bypass role.
    pub fn is_bypassed(&self, roles: &BTreeSet<String>) -> bool {
        !self.policy.bypass_roles.is_disjoint(roles)
    }

    /// Resolve the listing filter for `entity_type`.
    pub fn resolve(
        &self,
        entity_type: &str,
        caller_roles: &BTreeSet<String>,
        caller_dimensions: &DimensionValues,
    ) -> QueryFilter {
        if self.is_bypassed(caller_roles) {
            return QueryFilter::Unrestricted;
        }
        match self.policy.enabled_rule(entity_type) {
            Some(rule) => rule_filter(rule, caller_dimensions),
            None => self.default_filter(),
        }
    }

    /// [`resolve`](Self::resolve) for a [`CallerScope`].
    pub fn resolve_for(&self, entity_type: &str, caller: &CallerScope) -> QueryFilter {
        self.resolve(entity_type, &caller.roles, &caller.dimensions)
    }

    /// Resolve with collaboration widening.
    ///
    /// Projects stay visible to their members; tasks stay visible to members
    /// of their project and to their assignees, whatever the dimension scope.
    pub fn resolve_collaborative(&self, entity_type: &str, caller: &CallerScope) -> QueryFilter {
        let base = self.resolve_for(entity_type, caller);
        if base.is_unrestricted() {
            return base;
        }
        let member = QueryFilter::ProjectMember {
            user: caller.user.clone(),
        };
        match entity_type {
            PROJECT => QueryFilter::any(vec![base, member]),
            TASK => QueryFilter::any(vec![
                base,
                member,
                QueryFilter::Assignee {
                    user: caller.user.clone(),
                },
            ]),
            _ => base,
        }
    }

    /// Same decision as [`resolve_for`](Self::resolve_for), recording each step.
    pub fn resolve_with_trace(&self, entity_type: &str, caller: &CallerScope) -> ResolutionTrace {
        let mut steps = Vec::new();

        let matched: Vec<&String> = caller
            .roles
            .intersection(&self.policy.bypass_roles)
            .collect();
        if !matched.is_empty() {
            steps.push(ResolutionStep {
                check: "bypass_roles".to_string(),
                outcome: format!("bypassed via {:?}", matched),
                terminal: true,
            });
            return ResolutionTrace {
                entity_type: entity_type.to_string(),
                filter: QueryFilter::Unrestricted,
                steps,
                rule: None,
            };
        }
        steps.push(ResolutionStep {
            check: "bypass_roles".to_string(),
            outcome: "no bypass role held".to_string(),
            terminal: false,
        });

        let rule = match self.policy.scope_rules.get(entity_type) {
            Some(rule) if rule.enabled => rule,
            other => {
                let why = if other.is_some() {
                    "rule disabled"
                } else {
                    "no rule"
                };
                let filter = self.default_filter();
                steps.push(ResolutionStep {
                    check: "scope_rule".to_string(),
                    outcome: format!(
                        "{}; strict_default_deny={} → {}",
                        why,
                        self.policy.strict_default_deny,
                        if filter.is_unrestricted() {
                            "unrestricted"
                        } else {
                            "match none"
                        }
                    ),
                    terminal: true,
                });
                return ResolutionTrace {
                    entity_type: entity_type.to_string(),
                    filter,
                    steps,
                    rule: None,
                };
            }
        };
        steps.push(ResolutionStep {
            check: "scope_rule".to_string(),
            outcome: format!("enabled on '{}'", rule.dimension_field),
            terminal: false,
        });

        let primary = caller
            .dimensions
            .get(&rule.dimension_field)
            .map_or(0, BTreeSet::len);
        steps.push(ResolutionStep {
            check: "primary_dimension".to_string(),
            outcome: format!("{} value(s) for '{}'", primary, rule.dimension_field),
            terminal: rule.secondary_dimension_field.is_none(),
        });
        if let Some(secondary) = &rule.secondary_dimension_field {
            let count = caller.dimensions.get(secondary).map_or(0, BTreeSet::len);
            steps.push(ResolutionStep {
                check: "secondary_dimension".to_string(),
                outcome: if count == 0 {
                    format!("no values for '{}'; not applied", secondary)
                } else {
                    format!("{} value(s) for '{}'", count, secondary)
                },
                terminal: true,
            });
        }

        ResolutionTrace {
            entity_type: entity_type.to_string(),
            filter: rule_filter(rule, &caller.dimensions),
            steps,
            rule: Some(rule.clone()),
        }
    }

    fn default_filter(&self) -> QueryFilter {
        if self.policy.strict_default_deny {
            QueryFilter::MatchNone
        } else {
            QueryFilter::Unrestricted
        }
    }
}

/// Resolve the listing filter for `entity_type` under `policy`.
pub fn resolve_scope(
    policy: &PolicyDocument,
    entity_type: &str,
    caller_roles: &BTreeSet<String>,
    caller_dimensions: &DimensionValues,
) -> QueryFilter {
    ScopeResolver::new(policy).resolve(entity_type, caller_roles, caller_dimensions)
}

fn rule_filter(rule: &ScopeRule, dimensions: &DimensionValues) -> QueryFilter {
    let primary = QueryFilter::field_in(
        rule.dimension_field.clone(),
        dimensions
            .get(&rule.dimension_field)
            .cloned()
            .unwrap_or_default(),
    );
    let secondary = rule
        .secondary_dimension_field
        .as_ref()
        .and_then(|field| {
            dimensions
                .get(field)
                .filter(|values| !values.is_empty())
                .map(|values| QueryFilter::field_in(field.clone(), values.clone()))
        });
    match secondary {
        Some(secondary) => QueryFilter::all(vec![primary, secondary]),
        None => primary,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(yaml: &str) -> PolicyDocument {
        PolicyDocument::load(yaml.as_bytes()).unwrap()
    }

    fn set(values: &[&str]) -> BTreeSet<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    const SCOPED: &str = r#"
pqc_bypass_roles: ["System Manager"]
pqc_doctypes:
  Lead: { enabled: true, company_field: company, brand_field: brand }
  Customer: { enabled: false }
  Project: { enabled: true }
  Task: { enabled: true }
"#;

    #[test]
    fn bypass_role_is_unrestricted_even_with_enabled_rule() {
        let doc = policy(SCOPED);
        let caller = CallerScope::new("admin@example.com")
            .with_roles(["System Manager"])
            .with_dimension("company", ["Acme"]);
        assert_eq!(
            ScopeResolver::new(&doc).resolve_for("Lead", &caller),
            QueryFilter::Unrestricted
        );
    }

    #[test]
    fn disabled_rule_is_unrestricted_without_strict_deny() {
        let doc = policy(SCOPED);
        let caller = CallerScope::new("u").with_dimension("company", ["Acme"]);
        let resolver = ScopeResolver::new(&doc);
        assert_eq!(resolver.resolve_for("Customer", &caller), QueryFilter::Unrestricted);
        assert_eq!(resolver.resolve_for("Item", &caller), QueryFilter::Unrestricted);
    }

    #[test]
    fn strict_default_deny_matches_nothing_without_rule() {
        let doc = policy("strict_default_deny: true\npqc_doctypes:\n  Customer: { enabled: false }\n");
        let caller = CallerScope::new("u");
        let resolver = ScopeResolver::new(&doc);
        assert_eq!(resolver.resolve_for("Customer", &caller), QueryFilter::MatchNone);
        assert_eq!(resolver.resolve_for("Item", &caller), QueryFilter::MatchNone);
    }

    #[test]
    fn enabled_rule_requires_primary_dimension() {
        let doc = policy(SCOPED);
        let caller = CallerScope::new("u").with_dimension("company", ["Acme", "Beta"]);
        assert_eq!(
            ScopeResolver::new(&doc).resolve_for("Lead", &caller),
            QueryFilter::field_in("company", set(&["Acme", "Beta"]))
        );
    }

    #[test]
    fn secondary_dimension_conjoined_when_caller_has_values() {
        let doc = policy(SCOPED);
        let caller = CallerScope::new("u")
            .with_dimension("company", ["Acme"])
            .with_dimension("brand", ["Zed"]);
        assert_eq!(
            ScopeResolver::new(&doc).resolve_for("Lead", &caller),
            QueryFilter::all(vec![
                QueryFilter::field_in("company", set(&["Acme"])),
                QueryFilter::field_in("brand", set(&["Zed"])),
            ])
        );
    }

    #[test]
    fn caller_without_primary_values_sees_nothing() {
        let doc = policy(SCOPED);
        let filter = ScopeResolver::new(&doc).resolve_for("Lead", &CallerScope::new("u"));
        assert!(filter.matches_nothing());
    }

    #[test]
    fn resolve_scope_free_function_agrees() {
        let doc = policy(SCOPED);
        let roles = set(&["Sales User"]);
        let dims = DimensionValues::from([("company".to_string(), set(&["Acme"]))]);
        assert_eq!(
            resolve_scope(&doc, "Lead", &roles, &dims),
            ScopeResolver::new(&doc).resolve("Lead", &roles, &dims)
        );
    }

    #[test]
    fn collaborative_project_scope_adds_membership() {
        let doc = policy(SCOPED);
        let caller = CallerScope::new("ana").with_dimension("company", ["Acme"]);
        let filter = ScopeResolver::new(&doc).resolve_collaborative("Project", &caller);
        assert_eq!(
            filter,
            QueryFilter::Any {
                filters: vec![
                    QueryFilter::field_in("company", set(&["Acme"])),
                    QueryFilter::ProjectMember { user: "ana".into() },
                ]
            }
        );
    }

    #[test]
    fn collaborative_task_scope_adds_membership_and_assignment() {
        let doc = policy(SCOPED);
        let filter =
            ScopeResolver::new(&doc).resolve_collaborative("Task", &CallerScope::new("ana"));
        // The empty company scope drops out of the disjunction.
        assert_eq!(
            filter,
            QueryFilter::Any {
                filters: vec![
                    QueryFilter::ProjectMember { user: "ana".into() },
                    QueryFilter::Assignee { user: "ana".into() },
                ]
            }
        );
    }

    #[test]
    fn collaborative_scope_respects_bypass() {
        let doc = policy(SCOPED);
        let caller = CallerScope::new("root").with_roles(["System Manager"]);
        assert!(ScopeResolver::new(&doc)
            .resolve_collaborative("Task", &caller)
            .is_unrestricted());
    }

    #[test]
    fn trace_matches_resolve() {
        let doc = policy(SCOPED);
        let resolver = ScopeResolver::new(&doc);
        let callers = [
            CallerScope::new("a"),
            CallerScope::new("b").with_roles(["System Manager"]),
            CallerScope::new("c")
                .with_dimension("company", ["Acme"])
                .with_dimension("brand", ["Zed"]),
        ];
        for entity_type in ["Lead", "Customer", "Item", "Project"] {
            for caller in &callers {
                let trace = resolver.resolve_with_trace(entity_type, caller);
                assert_eq!(trace.filter, resolver.resolve_for(entity_type, caller));
                assert!(trace.steps.last().unwrap().terminal);
            }
        }
    }

    #[test]
    fn trace_records_bypass_as_single_step() {
        let doc = policy(SCOPED);
        let caller = CallerScope::new("root").with_roles(["System Manager"]);
        let trace = ScopeResolver::new(&doc).resolve_with_trace("Lead", &caller);
        assert_eq!(trace.steps.len(), 1);
        assert_eq!(trace.steps[0].check, "bypass_roles");
        assert!(trace.rule.is_none());
    }
}
