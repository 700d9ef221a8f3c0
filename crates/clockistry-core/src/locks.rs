//! Per-key async locks

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type Slots<K> = HashMap<K, Arc<AsyncMutex<()>>>;

/// A lazily populated set of async mutexes, one per key.
///
/// Idle keys are dropped from the map when their last guard is released.
pub struct KeyedLocks<K: Hash + Eq + Clone> {
    slots: Mutex<Slots<K>>,
}

impl<K: Hash + Eq + Clone> KeyedLocks<K> {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Wait for exclusive access to `key`
    pub async fn lock(&self, key: &K) -> KeyedGuard<'_, K> {
        let slot = {
            let mut slots = self.slots();
            slots.entry(key.clone()).or_default().clone()
        };
        let guard = slot.lock_owned().await;

        KeyedGuard {
            locks: self,
            key: key.clone(),
            guard: Some(guard),
        }
    }

    /// Number of keys currently held or waited on
    pub fn active_keys(&self) -> usize {
        self.slots().len()
    }

    fn slots(&self) -> std::sync::MutexGuard<'_, Slots<K>> {
        // The map only holds Arcs; a panic elsewhere cannot leave it inconsistent
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl<K: Hash + Eq + Clone> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self::new()
    }
}

/// Holds one key of a [`KeyedLocks`] until dropped
pub struct KeyedGuard<'a, K: Hash + Eq + Clone> {
    locks: &'a KeyedLocks<K>,
    key: K,
    guard: Option<OwnedMutexGuard<()>>,
}

impl<K: Hash + Eq + Clone> Drop for KeyedGuard<'_, K> {
    fn drop(&mut self) {
        drop(self.guard.take());

        let mut slots = self.locks.slots();
        if let Some(slot) = slots.get(&self.key)
            && Arc::strong_count(slot) == 1
        {
            slots.remove(&self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_key_is_exclusive() {
        let locks = Arc::new(KeyedLocks::<String>::new());
        let key = "u1".to_string();

        let first = locks.lock(&key).await;
        let contender = {
            let locks = locks.clone();
            let key = key.clone();
            tokio::spawn(async move {
                let _held = locks.lock(&key).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(first);
        contender.await.unwrap();
        assert_eq!(locks.active_keys(), 0);
    }

    #[tokio::test]
    async fn different_keys_do_not_block() {
        let locks = KeyedLocks::<&str>::new();
        let _a = locks.lock(&"a").await;
        let _b = locks.lock(&"b").await;
        assert_eq!(locks.active_keys(), 2);
    }
}
