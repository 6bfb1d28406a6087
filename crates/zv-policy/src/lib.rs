//! # zv-policy
//!
//! Onboarding policy for multi-company ERP sites.
//!
//! A site's [`PolicyDocument`] is assembled by the [`PolicyLoader`] from
//! built-in defaults plus the global and per-client blueprint layers. The
//! [`ScopeResolver`] turns it into a listing [`QueryFilter`] for a caller, and
//! [`has_permission`] guards single records of sensitive entity types.
//!
//! ## Key invariants
//!
//! - **Immutable documents**: a loaded document never changes. Reloading
//!   swaps a whole new document into the [`PolicyCell`].
//! - **All-or-nothing loading**: one malformed layer fails the load; nothing
//!   from a partially-read policy is ever used.
//! - **Bypass first**: a caller holding any bypass role is unrestricted,
//!   whatever the scope rules say.
//! - **Pure resolution**: scope resolution does no I/O and is safe to call
//!   concurrently from any number of query paths.

pub mod cell;
pub mod document;
pub mod error;
pub mod filter;
pub mod guard;
pub mod loader;
pub mod scope;
pub mod site;

pub use cell::PolicyCell;
pub use document::{
    CollaborationMode, CollaborationPolicy, FieldPrivacyPolicy, PolicyDocument, ScopeRule, PROJECT,
    TASK,
};
pub use error::PolicyError;
pub use filter::{FilterSubject, QueryFilter};
pub use guard::{has_permission, Access, GuardDecision, GuardedRecord};
pub use loader::{LoadedPolicy, PolicyLoader};
pub use scope::{
    resolve_scope, CallerScope, DimensionValues, ResolutionStep, ResolutionTrace, ScopeResolver,
};
pub use site::SiteConfig;
