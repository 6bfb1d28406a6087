// store.rs — Collaborator traits the reconcilers mutate state through.
//
// The host framework implements these over its own records (shares, project
// member rows, field overrides, permission rows). The reconcilers never see
// the framework directly, only these traits. `SnapshotStore` implements all
// of them over a JSON file for tests and the CLI.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use zv_policy::QueryFilter;

use crate::error::StoreError;

/// Rights carried by a share or a member row. Ordered: `Read < ReadWrite < Full`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShareRights {
    Read,
    ReadWrite,
    /// Read, write and re-share. Only ever set by hand.
    Full,
}

/// One row of a project's member list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub user: String,
    pub rights: ShareRights,
}

/// A role's permission row at one permission level of an entity type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionRow {
    pub role: String,
    pub perm_level: u8,
    #[serde(default)]
    pub read: bool,
    #[serde(default)]
    pub write: bool,
}

impl PermissionRow {
    /// A read-only row.
    pub fn read_only(role: impl Into<String>, perm_level: u8) -> Self {
        Self {
            role: role.into(),
            perm_level,
            read: true,
            write: false,
        }
    }
}

/// The entity/query layer.
pub trait EntityQuery {
    /// Ids of the records of `entity_type` that `filter` admits.
    fn apply_filter(
        &self,
        entity_type: &str,
        filter: &QueryFilter,
    ) -> Result<Vec<String>, StoreError>;

    /// The project a record belongs to. For a project, the project itself.
    fn project_of(&self, entity_type: &str, entity_id: &str) -> Result<Option<String>, StoreError>;

    /// Ids of `assignee`'s live assignments on the project or its records.
    fn active_assignments(&self, assignee: &str, project: &str)
        -> Result<Vec<String>, StoreError>;
}

/// Per-record shares and project membership.
pub trait GrantStore {
    fn get_share(
        &self,
        entity_type: &str,
        entity_id: &str,
        user: &str,
    ) -> Result<Option<ShareRights>, StoreError>;

    /// Create the share or overwrite its rights.
    fn upsert_share(
        &mut self,
        entity_type: &str,
        entity_id: &str,
        user: &str,
        rights: ShareRights,
    ) -> Result<(), StoreError>;

    /// Delete the share. Deleting a share that does not exist is a no-op.
    fn revoke_share(
        &mut self,
        entity_type: &str,
        entity_id: &str,
        user: &str,
    ) -> Result<(), StoreError>;

    fn get_members(&self, project: &str) -> Result<Vec<Member>, StoreError>;

    fn add_member(&mut self, project: &str, member: Member) -> Result<(), StoreError>;

    /// Remove `user`'s member row. Removing a non-member is a no-op.
    fn remove_member(&mut self, project: &str, user: &str) -> Result<(), StoreError>;
}

/// Field permission levels and per-role permission rows.
pub trait SchemaStore {
    /// The effective perm level of a field, or `None` when the entity type has
    /// no such field.
    fn get_field_perm_level(&self, entity_type: &str, field: &str)
        -> Result<Option<u8>, StoreError>;

    /// Override a field's perm level, creating the override if needed.
    fn set_field_perm_level(
        &mut self,
        entity_type: &str,
        field: &str,
        perm_level: u8,
    ) -> Result<(), StoreError>;

    fn list_permission_rows(&self, entity_type: &str) -> Result<Vec<PermissionRow>, StoreError>;

    /// Create the row for `(row.role, row.perm_level)` or replace its flags.
    fn upsert_permission_row(
        &mut self,
        entity_type: &str,
        row: PermissionRow,
    ) -> Result<(), StoreError>;

    fn delete_permission_row(
        &mut self,
        entity_type: &str,
        role: &str,
        perm_level: u8,
    ) -> Result<(), StoreError>;
}

/// Who users are: roles and permitted dimension values.
pub trait IdentityProvider {
    /// Whether the user exists and is enabled.
    fn is_active(&self, user: &str) -> Result<bool, StoreError>;

    fn roles_of(&self, user: &str) -> Result<BTreeSet<String>, StoreError>;

    /// Values of `dimension_field` the user is permitted to see.
    fn dimension_values_of(
        &self,
        user: &str,
        dimension_field: &str,
    ) -> Result<BTreeSet<String>, StoreError>;
}
