// filter.rs — Listing filters produced by the scope resolver.
//
// A QueryFilter is a small boolean tree. Hosts either evaluate it against
// records (`matches`) or render it as a permission query condition
// (`to_sql`) that gets appended to the WHERE clause of list queries.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::document::PROJECT;

/// A filter over the records of one entity type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QueryFilter {
    /// Every record is visible.
    Unrestricted,
    /// No record is visible.
    MatchNone,
    /// `field` must hold one of `values`. An empty set matches nothing.
    In {
        field: String,
        values: BTreeSet<String>,
    },
    /// All sub-filters must match.
    All { filters: Vec<QueryFilter> },
    /// At least one sub-filter must match.
    Any { filters: Vec<QueryFilter> },
    /// The user is a member of the record's project.
    ProjectMember { user: String },
    /// The record is assigned to the user.
    Assignee { user: String },
}

/// Read access to a record for filter evaluation.
pub trait FilterSubject {
    /// Value of a field, if the record has it.
    fn field(&self, name: &str) -> Option<&str>;
    /// Whether `user` is a member of the project this record belongs to.
    fn has_project_member(&self, user: &str) -> bool;
    /// Whether the record is assigned to `user`.
    fn is_assigned_to(&self, user: &str) -> bool;
}

impl QueryFilter {
    /// `field ∈ values`.
    pub fn field_in(field: impl Into<String>, values: BTreeSet<String>) -> Self {
        QueryFilter::In {
            field: field.into(),
            values,
        }
    }

    /// Conjunction, simplified: `Unrestricted` parts drop out and any part
    /// that matches nothing collapses the whole filter.
    pub fn all(filters: Vec<QueryFilter>) -> Self {
        let mut parts = Vec::with_capacity(filters.len());
        for filter in filters {
            match filter {
                QueryFilter::Unrestricted => {}
                f if f.matches_nothing() => return QueryFilter::MatchNone,
                QueryFilter::All { filters } => parts.extend(filters),
                other => parts.push(other),
            }
        }
        match parts.len() {
            0 => QueryFilter::Unrestricted,
            1 => parts.remove(0),
            _ => QueryFilter::All { filters: parts },
        }
    }

    /// Disjunction, simplified: any `Unrestricted` part wins and parts that
    /// match nothing drop out.
    pub fn any(filters: Vec<QueryFilter>) -> Self {
        let mut parts = Vec::with_capacity(filters.len());
        for filter in filters {
            match filter {
                QueryFilter::Unrestricted => return QueryFilter::Unrestricted,
                f if f.matches_nothing() => {}
                QueryFilter::Any { filters } => parts.extend(filters),
                other => parts.push(other),
            }
        }
        match parts.len() {
            0 => QueryFilter::MatchNone,
            1 => parts.remove(0),
            _ => QueryFilter::Any { filters: parts },
        }
    }

    pub fn is_unrestricted(&self) -> bool {
        matches!(self, QueryFilter::Unrestricted)
    }

    pub fn matches_nothing(&self) -> bool {
        match self {
            QueryFilter::MatchNone => true,
            QueryFilter::In { values, .. } => values.is_empty(),
            _ => false,
        }
    }

    /// Evaluate the filter against one record.
    pub fn matches(&self, subject: &impl FilterSubject) -> bool {
        match self {
            QueryFilter::Unrestricted => true,
            QueryFilter::MatchNone => false,
            QueryFilter::In { field, values } => subject
                .field(field)
                .is_some_and(|value| values.contains(value)),
            QueryFilter::All { filters } => filters.iter().all(|f| f.matches(subject)),
            QueryFilter::Any { filters } => filters.iter().any(|f| f.matches(subject)),
            QueryFilter::ProjectMember { user } => subject.has_project_member(user),
            QueryFilter::Assignee { user } => subject.is_assigned_to(user),
        }
    }

    /// Render as a permission query condition for `entity_type`.
    ///
    /// Unrestricted renders as the empty string (no condition); a filter that
    /// matches nothing renders as `1=0`.
    pub fn to_sql(&self, entity_type: &str) -> String {
        let table = format!("`tab{}`", entity_type.replace('`', ""));
        match self {
            QueryFilter::Unrestricted => String::new(),
            QueryFilter::MatchNone => "1=0".to_string(),
            QueryFilter::In { values, .. } if values.is_empty() => "1=0".to_string(),
            QueryFilter::In { field, values } => {
                let list = values
                    .iter()
                    .map(|v| sql_quote(v))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("{}.`{}` IN ({})", table, field, list)
            }
            QueryFilter::All { filters } => join_sql(filters, entity_type, " AND "),
            QueryFilter::Any { filters } => join_sql(filters, entity_type, " OR "),
            QueryFilter::ProjectMember { user } => {
                let project_ref = if entity_type == PROJECT {
                    format!("{}.`name`", table)
                } else {
                    format!("{}.`project`", table)
                };
                format!(
                    "exists(select 1 from `tabProject User` pu where pu.parent = {} \
                     and pu.parenttype = 'Project' and pu.user = {})",
                    project_ref,
                    sql_quote(user)
                )
            }
            QueryFilter::Assignee { user } => format!(
                "exists(select 1 from `tabToDo` td where td.reference_type = {} \
                 and td.reference_name = {}.`name` and td.allocated_to = {})",
                sql_quote(entity_type),
                table,
                sql_quote(user)
            ),
        }
    }
}

fn join_sql(filters: &[QueryFilter], entity_type: &str, separator: &str) -> String {
    filters
        .iter()
        .map(|f| match f.to_sql(entity_type) {
            sql if sql.is_empty() => "1=1".to_string(),
            sql => format!("({})", sql),
        })
        .collect::<Vec<_>>()
        .join(separator)
}

/// Quote a value as a SQL string literal.
fn sql_quote(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct Row {
        fields: HashMap<&'static str, &'static str>,
        members: Vec<&'static str>,
        assignees: Vec<&'static str>,
    }

    impl FilterSubject for Row {
        fn field(&self, name: &str) -> Option<&str> {
            self.fields.get(name).copied()
        }
        fn has_project_member(&self, user: &str) -> bool {
            self.members.iter().any(|m| *m == user)
        }
        fn is_assigned_to(&self, user: &str) -> bool {
            self.assignees.iter().any(|a| *a == user)
        }
    }

    fn row(company: &'static str, brand: &'static str) -> Row {
        Row {
            fields: HashMap::from([("company", company), ("brand", brand)]),
            members: vec![],
            assignees: vec![],
        }
    }

    fn set(values: &[&str]) -> BTreeSet<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn in_filter_matches_listed_values_only() {
        let filter = QueryFilter::field_in("company", set(&["Acme"]));
        assert!(filter.matches(&row("Acme", "A")));
        assert!(!filter.matches(&row("Globex", "A")));
    }

    #[test]
    fn empty_in_matches_nothing() {
        let filter = QueryFilter::field_in("company", BTreeSet::new());
        assert!(filter.matches_nothing());
        assert!(!filter.matches(&row("Acme", "A")));
        assert_eq!(filter.to_sql("Lead"), "1=0");
    }

    #[test]
    fn all_simplifies() {
        let c = QueryFilter::field_in("company", set(&["Acme"]));
        assert_eq!(
            QueryFilter::all(vec![QueryFilter::Unrestricted, c.clone()]),
            c
        );
        assert_eq!(
            QueryFilter::all(vec![c.clone(), QueryFilter::MatchNone]),
            QueryFilter::MatchNone
        );
        assert_eq!(QueryFilter::all(vec![]), QueryFilter::Unrestricted);
    }

    #[test]
    fn any_simplifies() {
        let c = QueryFilter::field_in("company", set(&["Acme"]));
        assert_eq!(
            QueryFilter::any(vec![QueryFilter::Unrestricted, c.clone()]),
            QueryFilter::Unrestricted
        );
        assert_eq!(QueryFilter::any(vec![QueryFilter::MatchNone, c.clone()]), c);
        assert_eq!(QueryFilter::any(vec![]), QueryFilter::MatchNone);
    }

    #[test]
    fn membership_and_assignment_clauses() {
        let filter = QueryFilter::any(vec![
            QueryFilter::field_in("company", set(&["Acme"])),
            QueryFilter::ProjectMember {
                user: "ana@example.com".into(),
            },
            QueryFilter::Assignee {
                user: "ana@example.com".into(),
            },
        ]);
        let mut other_company = row("Globex", "G");
        assert!(!filter.matches(&other_company));
        other_company.assignees.push("ana@example.com");
        assert!(filter.matches(&other_company));
    }

    #[test]
    fn sql_for_conjunction() {
        let filter = QueryFilter::all(vec![
            QueryFilter::field_in("company", set(&["Acme", "Beta"])),
            QueryFilter::field_in("brand", set(&["Zed"])),
        ]);
        assert_eq!(
            filter.to_sql("Sales Order"),
            "(`tabSales Order`.`company` IN ('Acme', 'Beta')) AND (`tabSales Order`.`brand` IN ('Zed'))"
        );
    }

    #[test]
    fn sql_escapes_quotes() {
        let filter = QueryFilter::field_in("company", set(&["O'Brien \\ Sons"]));
        assert_eq!(
            filter.to_sql("Lead"),
            "`tabLead`.`company` IN ('O''Brien \\\\ Sons')"
        );
    }

    #[test]
    fn sql_for_unrestricted_and_none() {
        assert_eq!(QueryFilter::Unrestricted.to_sql("Lead"), "");
        assert_eq!(QueryFilter::MatchNone.to_sql("Lead"), "1=0");
    }

    #[test]
    fn project_member_sql_depends_on_entity_type() {
        let filter = QueryFilter::ProjectMember { user: "u".into() };
        assert!(filter.to_sql("Project").contains("pu.parent = `tabProject`.`name`"));
        assert!(filter.to_sql("Task").contains("pu.parent = `tabTask`.`project`"));
    }

    #[test]
    fn filter_serializes_with_kind_tag() {
        let json = serde_json::to_string(&QueryFilter::MatchNone).unwrap();
        assert_eq!(json, r#"{"kind":"match_none"}"#);
    }
}
