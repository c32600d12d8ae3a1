//! Tracker of content currently out for external discovery.
//!
//! Entries are owned by RAII guards: an entry lives exactly as long as the
//! guard handed out by [`PendingContent::insert`], so a fan-out that ends by
//! any path (completion, provider death, dropped continuation) cannot leak it.

use std::collections::BTreeMap;
use std::sync::Arc;

use discovery_core::{Content, Correlation};
use parking_lot::Mutex;

/// Shared table of in-flight content keyed by the fan-out that carries it.
#[derive(Debug, Clone, Default)]
pub struct PendingContent {
    entries: Arc<Mutex<BTreeMap<Correlation, Content>>>,
}

impl PendingContent {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `content` as in flight under `id` until the guard drops.
    #[must_use]
    pub fn insert(&self, id: Correlation, content: Content) -> PendingGuard {
        self.entries.lock().insert(id, content);
        PendingGuard {
            id,
            entries: Arc::clone(&self.entries),
        }
    }

    /// Union of everything in flight.
    #[must_use]
    pub fn content(&self) -> Content {
        self.entries
            .lock()
            .values()
            .fold(Content::default(), |all, c| all.union(c))
    }

    /// Snapshot of the individual in-flight entries.
    #[must_use]
    pub fn entries(&self) -> Vec<(Correlation, Content)> {
        self.entries
            .lock()
            .iter()
            .map(|(id, content)| (*id, content.clone()))
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

/// Removes its entry from the tracker when dropped.
#[derive(Debug)]
pub struct PendingGuard {
    id: Correlation,
    entries: Arc<Mutex<BTreeMap<Correlation, Content>>>,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.entries.lock().remove(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_removes_entry_on_drop() {
        let pending = PendingContent::new();
        let guard = pending.insert(Correlation::new(), Content::services_only(["a"]));
        assert_eq!(pending.len(), 1);

        drop(guard);
        assert!(pending.is_empty());
        assert!(pending.content().is_empty());
    }

    #[test]
    fn content_is_union_of_entries() {
        let pending = PendingContent::new();
        let first = pending.insert(Correlation::new(), Content::services_only(["a", "b"]));
        let _second = pending.insert(Correlation::new(), Content::new(["b", "c"], ["q"]));

        assert_eq!(pending.content(), Content::new(["a", "b", "c"], ["q"]));

        drop(first);
        assert_eq!(pending.content(), Content::new(["b", "c"], ["q"]));
    }

    #[test]
    fn entries_are_keyed_by_flight() {
        let pending = PendingContent::new();
        let id = Correlation::new();
        let guard = pending.insert(id, Content::queues_only(["q"]));

        assert_eq!(pending.entries(), vec![(id, Content::queues_only(["q"]))]);
        drop(guard);
        assert!(pending.entries().is_empty());
    }

    #[test]
    fn guard_dropped_inside_panicking_scope_still_cleans_up() {
        let pending = PendingContent::new();
        let tracker = pending.clone();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _guard = tracker.insert(Correlation::new(), Content::services_only(["a"]));
            panic!("fan-out aborted");
        }));

        assert!(result.is_err());
        assert!(pending.is_empty());
    }
}
