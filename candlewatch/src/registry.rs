use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use candlewatch_core::WatcherId;

use crate::watcher::Watcher;

/// In-memory set of watchers started by this process, keyed by id.
#[derive(Default)]
pub struct WatcherRegistry {
    watchers: RwLock<HashMap<WatcherId, Arc<Watcher>>>,
}

impl WatcherRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `watcher`, returning any watcher previously registered under the same id.
    pub fn insert(&self, watcher: Arc<Watcher>) -> Option<Arc<Watcher>> {
        self.watchers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(watcher.id().clone(), watcher)
    }

    /// Look up a registered watcher.
    #[must_use]
    pub fn get(&self, id: &WatcherId) -> Option<Arc<Watcher>> {
        self.watchers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    /// Whether `id` is registered and its run loop is live.
    #[must_use]
    pub fn is_active(&self, id: &WatcherId) -> bool {
        self.get(id).is_some_and(|w| w.is_active())
    }

    /// Unregister one watcher.
    pub fn remove(&self, id: &WatcherId) -> Option<Arc<Watcher>> {
        self.watchers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
    }

    /// Unregister every watcher.
    pub fn drain(&self) -> Vec<Arc<Watcher>> {
        self.watchers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .map(|(_, w)| w)
            .collect()
    }

    /// Registered ids, sorted.
    #[must_use]
    pub fn ids(&self) -> Vec<WatcherId> {
        let mut ids: Vec<_> = self
            .watchers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    /// Number of registered watchers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.watchers.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
