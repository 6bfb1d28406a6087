//! # zv-reconcile
//!
//! Reconcilers that bring a site's permission state in line with its
//! onboarding policy.
//!
//! - [`GrantReconciler`] turns task assignment events into project shares or
//!   member rows, and takes them away again when the last assignment goes.
//! - [`privacy::reconcile`] puts protected fields behind a permission level and
//!   syncs which roles may read it.
//!
//! Both work through the collaborator traits in [`store`], so the host
//! framework stays behind an interface. [`SnapshotStore`] implements all of
//! them over a JSON file.
//!
//! ## Key invariants
//!
//! - **Idempotent**: replaying an event or a privacy run against converged
//!   state performs no mutation.
//! - **Manual grants win**: rights strictly above what the reconciler grants
//!   are never lowered or revoked.
//! - **No widening**: field privacy never grants read to a role outside the
//!   policy's role list, and only removes access under strict sync.

pub mod error;
pub mod grants;
pub mod privacy;
pub mod snapshot;
pub mod store;

pub use error::{ReconcileError, StoreError};
pub use grants::{
    AccessGrant, AccessMode, AssignmentEvent, AssignmentKind, GrantOutcome, GrantReconciler,
    GrantReport,
};
pub use privacy::{FieldChange, ReconciliationReport, Skip, SkipReason};
pub use snapshot::{Assignment, EntityRecord, SnapshotStore};
pub use store::{
    EntityQuery, GrantStore, IdentityProvider, Member, PermissionRow, SchemaStore, ShareRights,
};
