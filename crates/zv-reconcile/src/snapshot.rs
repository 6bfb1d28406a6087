// snapshot.rs — SnapshotStore: every collaborator trait over one JSON file.
//
// The snapshot models just enough of a site for the reconcilers to run
// against: users with roles and dimension values, entity records with their
// project link, assignments, shares, project member rows, and per-entity-type
// field perm levels and permission rows.
//
// The whole snapshot is read into memory, mutated, and written back with
// `save()`. Mutations that reference a record or entity type the snapshot
// does not hold fail with `StoreError::NotFound`.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use zv_policy::{DimensionValues, FilterSubject, QueryFilter, PROJECT};

use crate::error::StoreError;
use crate::store::{
    EntityQuery, GrantStore, IdentityProvider, Member, PermissionRow, SchemaStore, ShareRights,
};

/// A user account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub roles: BTreeSet<String>,
    #[serde(default)]
    pub dimensions: DimensionValues,
}

impl Default for UserRecord {
    fn default() -> Self {
        Self {
            enabled: true,
            roles: BTreeSet::new(),
            dimensions: DimensionValues::new(),
        }
    }
}

fn default_enabled() -> bool {
    true
}

/// One record of some entity type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRecord {
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
    /// Project link, for records that belong to a project.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    /// Member rows; only projects carry them.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub members: Vec<Member>,
}

impl EntityRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field and return self (builder pattern).
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Link the record to a project and return self.
    pub fn in_project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }
}

/// A live assignment of a record to a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub assignee: String,
    pub entity_type: String,
    pub entity_id: String,
}

/// A per-record share.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Share {
    pub entity_type: String,
    pub entity_id: String,
    pub user: String,
    pub rights: ShareRights,
}

/// Field perm levels and permission rows of one entity type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySchema {
    #[serde(default)]
    pub fields: BTreeMap<String, u8>,
    #[serde(default)]
    pub permissions: Vec<PermissionRow>,
}

/// In-memory site state, persisted as one JSON document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotStore {
    #[serde(default)]
    pub users: BTreeMap<String, UserRecord>,
    /// Entity type → record id → record.
    #[serde(default)]
    pub entities: BTreeMap<String, BTreeMap<String, EntityRecord>>,
    /// Assignment id → assignment.
    #[serde(default)]
    pub assignments: BTreeMap<String, Assignment>,
    #[serde(default)]
    pub shares: Vec<Share>,
    /// Entity type → schema.
    #[serde(default)]
    pub schema: BTreeMap<String, EntitySchema>,
}

impl SnapshotStore {
    /// Read a snapshot file.
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let content = fs::read_to_string(path).map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Read a snapshot file, starting empty when it does not exist yet.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load(path)
    }

    /// Write the snapshot, creating parent directories as needed.
    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn entity(&self, entity_type: &str, id: &str) -> Option<&EntityRecord> {
        self.entities.get(entity_type)?.get(id)
    }

    fn entity_mut(&mut self, entity_type: &str, id: &str) -> Result<&mut EntityRecord, StoreError> {
        self.entities
            .get_mut(entity_type)
            .and_then(|records| records.get_mut(id))
            .ok_or_else(|| StoreError::not_found(entity_type, id))
    }

    fn schema_mut(&mut self, entity_type: &str) -> Result<&mut EntitySchema, StoreError> {
        self.schema
            .get_mut(entity_type)
            .ok_or_else(|| StoreError::not_found("entity type", entity_type))
    }

    /// Record a new assignment. Replaces one with the same id.
    pub fn insert_assignment(&mut self, id: impl Into<String>, assignment: Assignment) {
        self.assignments.insert(id.into(), assignment);
    }

    /// Drop an assignment, returning it if it existed.
    pub fn remove_assignment(&mut self, id: &str) -> Option<Assignment> {
        self.assignments.remove(id)
    }

    // ── Builders ─────────────────────────────────────────────────

    /// Add an enabled user with roles and return self (builder pattern).
    pub fn with_user<I, S>(mut self, user: impl Into<String>, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let record = self.users.entry(user.into()).or_default();
        record.roles.extend(roles.into_iter().map(Into::into));
        self
    }

    /// Grant a user dimension values and return self.
    pub fn with_user_dimension<I, S>(
        mut self,
        user: impl Into<String>,
        field: impl Into<String>,
        values: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.users
            .entry(user.into())
            .or_default()
            .dimensions
            .entry(field.into())
            .or_default()
            .extend(values.into_iter().map(Into::into));
        self
    }

    /// Add a disabled user and return self.
    pub fn with_disabled_user(mut self, user: impl Into<String>) -> Self {
        self.users.insert(
            user.into(),
            UserRecord {
                enabled: false,
                ..UserRecord::default()
            },
        );
        self
    }

    pub fn with_entity(
        mut self,
        entity_type: impl Into<String>,
        id: impl Into<String>,
        record: EntityRecord,
    ) -> Self {
        self.entities
            .entry(entity_type.into())
            .or_default()
            .insert(id.into(), record);
        self
    }

    pub fn with_assignment(
        mut self,
        id: impl Into<String>,
        assignee: impl Into<String>,
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
    ) -> Self {
        self.insert_assignment(
            id,
            Assignment {
                assignee: assignee.into(),
                entity_type: entity_type.into(),
                entity_id: entity_id.into(),
            },
        );
        self
    }

    pub fn with_share(
        mut self,
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
        user: impl Into<String>,
        rights: ShareRights,
    ) -> Self {
        self.shares.push(Share {
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
            user: user.into(),
            rights,
        });
        self
    }

    /// Declare a field of an entity type at `perm_level` and return self.
    pub fn with_field(
        mut self,
        entity_type: impl Into<String>,
        field: impl Into<String>,
        perm_level: u8,
    ) -> Self {
        self.schema
            .entry(entity_type.into())
            .or_default()
            .fields
            .insert(field.into(), perm_level);
        self
    }

    pub fn with_permission_row(mut self, entity_type: impl Into<String>, row: PermissionRow) -> Self {
        self.schema
            .entry(entity_type.into())
            .or_default()
            .permissions
            .push(row);
        self
    }
}

/// A record as seen by filter evaluation.
struct RecordView<'a> {
    store: &'a SnapshotStore,
    entity_type: &'a str,
    id: &'a str,
    record: &'a EntityRecord,
}

impl FilterSubject for RecordView<'_> {
    fn field(&self, name: &str) -> Option<&str> {
        if name == "name" {
            return Some(self.id);
        }
        self.record.fields.get(name).map(String::as_str)
    }

    fn has_project_member(&self, user: &str) -> bool {
        let project = if self.entity_type == PROJECT {
            Some(self.id)
        } else {
            self.record.project.as_deref()
        };
        project
            .and_then(|p| self.store.entity(PROJECT, p))
            .is_some_and(|p| p.members.iter().any(|m| m.user == user))
    }

    fn is_assigned_to(&self, user: &str) -> bool {
        self.store.assignments.values().any(|a| {
            a.assignee == user && a.entity_type == self.entity_type && a.entity_id == self.id
        })
    }
}

impl EntityQuery for SnapshotStore {
    fn apply_filter(
        &self,
        entity_type: &str,
        filter: &QueryFilter,
    ) -> Result<Vec<String>, StoreError> {
        let Some(records) = self.entities.get(entity_type) else {
            return Ok(Vec::new());
        };
        Ok(records
            .iter()
            .filter(|&(id, record)| {
                filter.matches(&RecordView {
                    store: self,
                    entity_type,
                    id: id.as_str(),
                    record,
                })
            })
            .map(|(id, _)| id.clone())
            .collect())
    }

    fn project_of(&self, entity_type: &str, entity_id: &str) -> Result<Option<String>, StoreError> {
        let Some(record) = self.entity(entity_type, entity_id) else {
            return Ok(None);
        };
        if entity_type == PROJECT {
            return Ok(Some(entity_id.to_string()));
        }
        Ok(record.project.clone())
    }

    fn active_assignments(
        &self,
        assignee: &str,
        project: &str,
    ) -> Result<Vec<String>, StoreError> {
        let mut ids = Vec::new();
        for (id, assignment) in &self.assignments {
            if assignment.assignee != assignee {
                continue;
            }
            let linked = self.project_of(&assignment.entity_type, &assignment.entity_id)?;
            if linked.as_deref() == Some(project) {
                ids.push(id.clone());
            }
        }
        Ok(ids)
    }
}

impl GrantStore for SnapshotStore {
    fn get_share(
        &self,
        entity_type: &str,
        entity_id: &str,
        user: &str,
    ) -> Result<Option<ShareRights>, StoreError> {
        Ok(self
            .shares
            .iter()
            .find(|s| s.entity_type == entity_type && s.entity_id == entity_id && s.user == user)
            .map(|s| s.rights))
    }

    fn upsert_share(
        &mut self,
        entity_type: &str,
        entity_id: &str,
        user: &str,
        rights: ShareRights,
    ) -> Result<(), StoreError> {
        self.entity_mut(entity_type, entity_id)?;
        match self
            .shares
            .iter_mut()
            .find(|s| s.entity_type == entity_type && s.entity_id == entity_id && s.user == user)
        {
            Some(share) => share.rights = rights,
            None => self.shares.push(Share {
                entity_type: entity_type.to_string(),
                entity_id: entity_id.to_string(),
                user: user.to_string(),
                rights,
            }),
        }
        Ok(())
    }

    fn revoke_share(
        &mut self,
        entity_type: &str,
        entity_id: &str,
        user: &str,
    ) -> Result<(), StoreError> {
        self.entity_mut(entity_type, entity_id)?;
        self.shares
            .retain(|s| !(s.entity_type == entity_type && s.entity_id == entity_id && s.user == user));
        Ok(())
    }

    fn get_members(&self, project: &str) -> Result<Vec<Member>, StoreError> {
        Ok(self
            .entity(PROJECT, project)
            .map(|p| p.members.clone())
            .unwrap_or_default())
    }

    fn add_member(&mut self, project: &str, member: Member) -> Result<(), StoreError> {
        let record = self.entity_mut(PROJECT, project)?;
        if !record.members.iter().any(|m| m.user == member.user) {
            record.members.push(member);
        }
        Ok(())
    }

    fn remove_member(&mut self, project: &str, user: &str) -> Result<(), StoreError> {
        self.entity_mut(PROJECT, project)?
            .members
            .retain(|m| m.user != user);
        Ok(())
    }
}

impl SchemaStore for SnapshotStore {
    fn get_field_perm_level(
        &self,
        entity_type: &str,
        field: &str,
    ) -> Result<Option<u8>, StoreError> {
        Ok(self
            .schema
            .get(entity_type)
            .and_then(|s| s.fields.get(field))
            .copied())
    }

    fn set_field_perm_level(
        &mut self,
        entity_type: &str,
        field: &str,
        perm_level: u8,
    ) -> Result<(), StoreError> {
        self.schema_mut(entity_type)?
            .fields
            .insert(field.to_string(), perm_level);
        Ok(())
    }

    fn list_permission_rows(&self, entity_type: &str) -> Result<Vec<PermissionRow>, StoreError> {
        Ok(self
            .schema
            .get(entity_type)
            .map(|s| s.permissions.clone())
            .unwrap_or_default())
    }

    fn upsert_permission_row(
        &mut self,
        entity_type: &str,
        row: PermissionRow,
    ) -> Result<(), StoreError> {
        let schema = self.schema_mut(entity_type)?;
        match schema
            .permissions
            .iter_mut()
            .find(|r| r.role == row.role && r.perm_level == row.perm_level)
        {
            Some(existing) => *existing = row,
            None => schema.permissions.push(row),
        }
        Ok(())
    }

    fn delete_permission_row(
        &mut self,
        entity_type: &str,
        role: &str,
        perm_level: u8,
    ) -> Result<(), StoreError> {
        self.schema_mut(entity_type)?
            .permissions
            .retain(|r| !(r.role == role && r.perm_level == perm_level));
        Ok(())
    }
}

impl IdentityProvider for SnapshotStore {
    fn is_active(&self, user: &str) -> Result<bool, StoreError> {
        Ok(self.users.get(user).is_some_and(|u| u.enabled))
    }

    fn roles_of(&self, user: &str) -> Result<BTreeSet<String>, StoreError> {
        Ok(self
            .users
            .get(user)
            .map(|u| u.roles.clone())
            .unwrap_or_default())
    }

    fn dimension_values_of(
        &self,
        user: &str,
        dimension_field: &str,
    ) -> Result<BTreeSet<String>, StoreError> {
        Ok(self
            .users
            .get(user)
            .and_then(|u| u.dimensions.get(dimension_field))
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn site() -> SnapshotStore {
        SnapshotStore::default()
            .with_user("ana", ["Projects User"])
            .with_entity(
                PROJECT,
                "PRJ-1",
                EntityRecord::new().with_field("company", "Acme"),
            )
            .with_entity(
                "Task",
                "T-1",
                EntityRecord::new()
                    .with_field("company", "Acme")
                    .in_project("PRJ-1"),
            )
            .with_entity("Task", "T-2", EntityRecord::new().with_field("company", "Globex"))
            .with_assignment("A-1", "ana", "Task", "T-1")
    }

    #[test]
    fn save_and_load_preserve_snapshot() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/state.json");
        let store = site().with_share(PROJECT, "PRJ-1", "ana", ShareRights::Read);
        store.save(&path).unwrap();
        assert_eq!(SnapshotStore::load(&path).unwrap(), store);
    }

    #[test]
    fn open_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let store = SnapshotStore::open(&dir.path().join("absent.json")).unwrap();
        assert_eq!(store, SnapshotStore::default());
    }

    #[test]
    fn load_rejects_garbage() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            SnapshotStore::load(&path),
            Err(StoreError::Serialization(_))
        ));
    }

    #[test]
    fn apply_filter_evaluates_assignments() {
        let store = site();
        let filter = QueryFilter::any(vec![
            QueryFilter::field_in("company", ["Globex".to_string()].into()),
            QueryFilter::Assignee { user: "ana".into() },
        ]);
        assert_eq!(
            store.apply_filter("Task", &filter).unwrap(),
            vec!["T-1".to_string(), "T-2".to_string()]
        );
        assert!(store.apply_filter("Lead", &filter).unwrap().is_empty());
    }

    #[test]
    fn active_assignments_follow_project_link() {
        let store = site().with_assignment("A-2", "ana", "Task", "T-2");
        assert_eq!(
            store.active_assignments("ana", "PRJ-1").unwrap(),
            vec!["A-1".to_string()]
        );
    }

    #[test]
    fn share_mutation_on_unknown_record_fails() {
        let mut store = site();
        let err = store
            .upsert_share(PROJECT, "PRJ-404", "ana", ShareRights::ReadWrite)
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
        assert!(store.shares.is_empty());
    }

    #[test]
    fn unknown_user_is_inactive() {
        let store = site().with_disabled_user("bob");
        assert!(store.is_active("ana").unwrap());
        assert!(!store.is_active("bob").unwrap());
        assert!(!store.is_active("carol").unwrap());
    }
}
