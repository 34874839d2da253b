//! Per-entity lock registries.
//!
//! Every bucket name, object identifier, and upload identifier is guarded by
//! its own monitor, created lazily on first use. The registries stand in for
//! what a real database would implement as row-level locking: all mutations
//! to one entity are strictly serialized, independent entities proceed fully
//! in parallel.
//!
//! Creation and removal follow an explicit race-free protocol. Creation is
//! an atomic insert-if-absent. Removal only succeeds while the registry
//! holds the sole strong reference to the monitor, so a concurrent acquirer
//! that has already cloned the `Arc` can never have its monitor pulled out
//! from under it.

use std::hash::Hash;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// KeyedLocks
// ---------------------------------------------------------------------------

/// A registry of monitors keyed by entity identifier.
pub struct KeyedLocks<K: Eq + Hash> {
    locks: DashMap<K, Arc<Mutex<()>>>,
}

impl<K: Eq + Hash> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self {
            locks: DashMap::new(),
        }
    }
}

impl<K: Eq + Hash> std::fmt::Debug for KeyedLocks<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyedLocks")
            .field("len", &self.locks.len())
            .finish()
    }
}

impl<K: Eq + Hash> KeyedLocks<K> {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the monitor for `key`, creating it if absent.
    ///
    /// The caller keeps the returned `Arc` alive for as long as it holds the
    /// lock; the extra strong reference is what makes a concurrent
    /// [`release`](Self::release) fail instead of racing.
    pub fn acquire(&self, key: K) -> Arc<Mutex<()>> {
        self.locks.entry(key).or_default().clone()
    }

    /// Ensure a monitor exists for `key` without taking it.
    ///
    /// Used when an identifier is minted so that its lock registration is a
    /// guaranteed side effect of creation, not an assumption later callers
    /// must satisfy.
    pub fn register(&self, key: K) {
        self.locks.entry(key).or_default();
    }

    /// Remove the monitor for `key` if no concurrent acquirer holds it.
    ///
    /// Returns `true` if the entry was removed. A `false` return means a
    /// racing `acquire` won; the entry stays and will be cleaned up by a
    /// later release.
    pub fn release(&self, key: &K) -> bool {
        self.locks
            .remove_if(key, |_, lock| Arc::strong_count(lock) == 1)
            .is_some()
    }

    /// Whether a monitor is currently registered for `key`.
    #[must_use]
    pub fn contains(&self, key: &K) -> bool {
        self.locks.contains_key(key)
    }
}

// ---------------------------------------------------------------------------
// StoreLocks
// ---------------------------------------------------------------------------

/// The three independent lock domains of the storage engine.
#[derive(Debug, Default)]
pub struct StoreLocks {
    /// One monitor per bucket name.
    pub buckets: KeyedLocks<String>,
    /// One monitor per object identifier.
    pub objects: KeyedLocks<Uuid>,
    /// One monitor per multipart upload identifier.
    pub uploads: KeyedLocks<Uuid>,
}

impl StoreLocks {
    /// Create an empty set of lock registries.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_create_monitor_lazily() {
        let locks: KeyedLocks<String> = KeyedLocks::new();
        assert!(!locks.contains(&"a".to_owned()));

        let _lock = locks.acquire("a".to_owned());
        assert!(locks.contains(&"a".to_owned()));
    }

    #[test]
    fn test_should_return_same_monitor_for_same_key() {
        let locks: KeyedLocks<String> = KeyedLocks::new();
        let l1 = locks.acquire("k".to_owned());
        let l2 = locks.acquire("k".to_owned());
        assert!(Arc::ptr_eq(&l1, &l2));
    }

    #[test]
    fn test_should_refuse_release_while_held() {
        let locks: KeyedLocks<String> = KeyedLocks::new();
        let lock = locks.acquire("busy".to_owned());
        let _guard = lock.lock();

        // The caller above still holds a strong reference.
        assert!(!locks.release(&"busy".to_owned()));
        assert!(locks.contains(&"busy".to_owned()));

        drop(_guard);
        drop(lock);
        assert!(locks.release(&"busy".to_owned()));
        assert!(!locks.contains(&"busy".to_owned()));
    }

    #[test]
    fn test_should_release_registered_but_unheld_monitor() {
        let locks: KeyedLocks<Uuid> = KeyedLocks::new();
        let id = Uuid::new_v4();
        locks.register(id);
        assert!(locks.contains(&id));
        assert!(locks.release(&id));
    }

    #[test]
    fn test_should_release_unknown_key_as_noop() {
        let locks: KeyedLocks<Uuid> = KeyedLocks::new();
        assert!(!locks.release(&Uuid::new_v4()));
    }

    #[test]
    fn test_should_keep_domains_independent() {
        let locks = StoreLocks::new();
        let id = Uuid::new_v4();
        locks.objects.register(id);
        assert!(locks.objects.contains(&id));
        assert!(!locks.uploads.contains(&id));
    }

    #[test]
    fn test_should_serialize_across_threads() {
        let locks = Arc::new(StoreLocks::new());
        let counter = Arc::new(parking_lot::Mutex::new(0u32));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let locks = locks.clone();
                let counter = counter.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        let lock = locks.buckets.acquire("shared".to_owned());
                        let _guard = lock.lock();
                        let mut c = counter.lock();
                        *c += 1;
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().expect("thread join");
        }
        assert_eq!(*counter.lock(), 800);
    }
}
