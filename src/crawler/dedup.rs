//! Run-scoped set of claimed resource keys

use crate::url::ResourceKey;
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

/// Keys already scheduled for download in this run
///
/// `try_claim` is a single locked insert, so for any key exactly one caller
/// ever sees `true`. Keys are never removed.
#[derive(Debug, Default)]
pub struct SeenSet {
    keys: Mutex<HashSet<ResourceKey>>,
}

impl SeenSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `key` and returns true if nobody claimed it before
    pub fn try_claim(&self, key: &ResourceKey) -> bool {
        let mut keys = self.lock();
        if keys.contains(key) {
            return false;
        }
        keys.insert(key.clone())
    }

    pub fn contains(&self, key: &ResourceKey) -> bool {
        self.lock().contains(key)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // A panic while holding the lock cannot leave the set half-updated, so a
    // poisoned guard is still consistent.
    fn lock(&self) -> MutexGuard<'_, HashSet<ResourceKey>> {
        self.keys
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
