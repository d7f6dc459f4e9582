//! Reverse index from backend objects to the YttSources referencing them.
//!
//! The index is the only shared mutable state of the controller. It is
//! written by the reconciler and read by the watch tasks, so every operation
//! takes the lock for its whole duration and never yields while holding it.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use indexmap::IndexSet;

use crate::reference::{ExternalReference, ObjectKey};

#[derive(Debug, Default)]
struct IndexState {
    /// Backend reference -> YttSources pointing at it, in registration order.
    dependents: HashMap<ExternalReference, IndexSet<ObjectKey>>,
    /// YttSource -> the backend it currently points at.
    references: HashMap<ObjectKey, ExternalReference>,
}

/// Thread-safe bidirectional mapping between YttSources and the backend
/// objects they reference.
///
/// Every YttSource appears under at most one reference, and the two maps
/// always mirror each other.
#[derive(Debug, Default)]
pub struct ReferenceIndex {
    state: Mutex<IndexState>,
}

impl ReferenceIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, IndexState> {
        // The maps are updated in place without intermediate states, so a
        // poisoned lock still guards a consistent index.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records that `key` now references `reference`, dropping whatever it
    /// referenced before.
    pub fn upsert(&self, key: &ObjectKey, reference: ExternalReference) {
        let mut state = self.state();

        if let Some(previous) = state.references.get(key).cloned() {
            if previous != reference {
                detach(&mut state.dependents, &previous, key);
            }
        }

        state
            .dependents
            .entry(reference.clone())
            .or_default()
            .insert(key.clone());
        state.references.insert(key.clone(), reference);
    }

    /// Forgets `key` entirely.
    ///
    /// Every dependents set is scanned, not just the one recorded for `key`,
    /// so stale entries cannot outlive a removal.
    pub fn remove(&self, key: &ObjectKey) {
        let mut state = self.state();
        state.references.remove(key);
        state.dependents.retain(|_, keys| {
            keys.shift_remove(key);
            !keys.is_empty()
        });
    }

    /// Snapshot of the YttSources referencing `reference`.
    pub fn dependents_of(&self, reference: &ExternalReference) -> Vec<ObjectKey> {
        self.state()
            .dependents
            .get(reference)
            .map(|keys| keys.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// The reference currently recorded for `key`.
    pub fn reference_of(&self, key: &ObjectKey) -> Option<ExternalReference> {
        self.state().references.get(key).cloned()
    }
}

fn detach(
    dependents: &mut HashMap<ExternalReference, IndexSet<ObjectKey>>,
    reference: &ExternalReference,
    key: &ObjectKey,
) {
    if let Some(keys) = dependents.get_mut(reference) {
        keys.shift_remove(key);
        if keys.is_empty() {
            dependents.remove(reference);
        }
    }
}
