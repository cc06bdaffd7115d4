//! Live-key registry.
//!
//! Tracks which keys of each [`ViewFamily`] have been written, so that a
//! family can be invalidated without scanning the backing store.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use super::keys::{ViewFamily, ViewKey};
use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::registry";

/// Maps each view family to the keys written under it.
///
/// Entries may outlive their cache value (TTL expiry is not observed here);
/// deleting an already expired key is harmless.
#[derive(Default)]
pub struct KeyRegistry {
    families: RwLock<HashMap<ViewFamily, HashSet<ViewKey>>>,
}

impl KeyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a key that now holds a value in the store. Callers register
    /// after a successful write, never before.
    pub fn register(&self, key: &ViewKey) {
        let Some(family) = ViewFamily::from_key(key) else {
            return;
        };
        rw_write(&self.families, SOURCE, "register")
            .entry(family)
            .or_default()
            .insert(key.clone());
    }

    pub fn unregister(&self, key: &ViewKey) {
        let Some(family) = ViewFamily::from_key(key) else {
            return;
        };
        let mut families = rw_write(&self.families, SOURCE, "unregister");
        if let Some(keys) = families.get_mut(&family) {
            keys.remove(key);
            if keys.is_empty() {
                families.remove(&family);
            }
        }
    }

    /// Remove and return every key registered for `family`.
    pub fn take_family(&self, family: ViewFamily) -> HashSet<ViewKey> {
        rw_write(&self.families, SOURCE, "take_family")
            .remove(&family)
            .unwrap_or_default()
    }

    pub fn keys_for(&self, family: ViewFamily) -> HashSet<ViewKey> {
        rw_read(&self.families, SOURCE, "keys_for")
            .get(&family)
            .cloned()
            .unwrap_or_default()
    }

    pub fn key_count(&self) -> usize {
        rw_read(&self.families, SOURCE, "key_count")
            .values()
            .map(HashSet::len)
            .sum()
    }

    pub fn clear(&self) {
        rw_write(&self.families, SOURCE, "clear").clear();
    }
}
