// cell.rs — Atomic holder for the active policy document.
//
// Reconcilers take a snapshot (`Arc<PolicyDocument>`) at the start of a run
// and keep using it even if a reload happens mid-run. A reload parses the
// new document completely before swapping; on failure the old one stays.

use std::sync::{Arc, PoisonError, RwLock};

use crate::document::PolicyDocument;
use crate::error::PolicyError;

/// The currently active policy, swapped as a whole on reload.
#[derive(Debug)]
pub struct PolicyCell {
    current: RwLock<Arc<PolicyDocument>>,
}

impl PolicyCell {
    pub fn new(document: PolicyDocument) -> Self {
        Self {
            current: RwLock::new(Arc::new(document)),
        }
    }

    /// The active document. Cheap: clones an `Arc`.
    pub fn snapshot(&self) -> Arc<PolicyDocument> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the active document.
    pub fn replace(&self, document: PolicyDocument) -> Arc<PolicyDocument> {
        let next = Arc::new(document);
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = next.clone();
        next
    }

    /// Load a new document with `load` and swap it in only if loading succeeded.
    pub fn reload_with<F>(&self, load: F) -> Result<Arc<PolicyDocument>, PolicyError>
    where
        F: FnOnce() -> Result<PolicyDocument, PolicyError>,
    {
        let document = load()?;
        let next = self.replace(document);
        tracing::info!(
            scope_rules = next.scope_rules.len(),
            collab = %next.collaboration.mode,
            "policy reloaded"
        );
        Ok(next)
    }
}

impl Default for PolicyCell {
    fn default() -> Self {
        Self::new(PolicyDocument::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_survives_reload() {
        let cell = PolicyCell::new(PolicyDocument::builtin());
        let before = cell.snapshot();

        cell.reload_with(|| PolicyDocument::load(b"strict_default_deny: true\n"))
            .unwrap();

        assert!(!before.strict_default_deny);
        assert!(cell.snapshot().strict_default_deny);
    }

    #[test]
    fn failed_reload_keeps_previous_document() {
        let cell = PolicyCell::new(PolicyDocument::builtin());
        let result = cell.reload_with(|| PolicyDocument::load(b"collab:\n  on_task_assignment: 7\n"));
        assert!(result.is_err());
        assert_eq!(*cell.snapshot(), PolicyDocument::builtin());
    }
}
