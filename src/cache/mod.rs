//! State cache
//!
//! Holds the most recent snapshot behind a single shared reference. A
//! replace swaps the whole reference, so a reader holding the previous
//! `Arc<Snapshot>` keeps a consistent view until it drops it.

use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

use crate::types::{EntityState, Snapshot};

/// Latest snapshot of entity states
#[derive(Debug, Default)]
pub struct StateCache {
    current: RwLock<Arc<Snapshot>>,
}

impl StateCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Swap in a new snapshot, dropping the previous one entirely
    pub fn replace(&self, snapshot: Snapshot) {
        let next = Arc::new(snapshot);
        let count = next.len();
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        *current = next;
        debug!(entities = count, "State snapshot replaced");
    }

    /// Shared handle on the current snapshot
    pub fn snapshot(&self) -> Arc<Snapshot> {
        let current = self.current.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&current)
    }

    /// First record with the given identifier, if any
    pub fn lookup(&self, entity_id: &str) -> Option<EntityState> {
        self.snapshot().lookup(entity_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_cache_lookup_is_absent() {
        let cache = StateCache::new();
        assert!(cache.is_empty());
        assert!(cache.lookup("sensor.t").is_none());
    }

    #[test]
    fn test_replace_drops_entities_missing_from_new_snapshot() {
        let cache = StateCache::new();
        cache.replace(Snapshot::new(vec![
            EntityState::new("sensor.a", "1"),
            EntityState::new("sensor.b", "2"),
        ]));
        cache.replace(Snapshot::new(vec![EntityState::new("sensor.a", "3")]));

        assert_eq!(cache.lookup("sensor.a").unwrap().state, "3");
        assert!(cache.lookup("sensor.b").is_none());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_reader_keeps_old_snapshot_across_replace() {
        let cache = StateCache::new();
        cache.replace(Snapshot::new(vec![EntityState::new("sensor.a", "old")]));

        let held = cache.snapshot();
        cache.replace(Snapshot::new(vec![EntityState::new("sensor.a", "new")]));

        assert_eq!(held.state_of("sensor.a"), Some("old"));
        assert_eq!(cache.snapshot().state_of("sensor.a"), Some("new"));
    }
}
