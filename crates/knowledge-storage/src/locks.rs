//! Per-resource lock registry.
//!
//! Collections, graphs, indexes and memory blobs are read, modified and
//! written back whole. Two writers interleaving on the same blob would drop
//! one update, so each read-modify-write runs under that resource's mutex.
//!
//! The registry belongs to one engine instance. Separate instances (tests,
//! tenants served by different engines) never share locks.

use dashmap::DashMap;
use std::sync::{Arc, Mutex};

use crate::column_families::ResourceKind;
use crate::keys::ResourceKey;

/// Mutex per (kind, key), created on first use and dropped once no caller
/// holds or waits for it.
#[derive(Debug, Default)]
pub struct ResourceLocks {
    locks: DashMap<(ResourceKind, ResourceKey), Arc<Mutex<()>>>,
}

impl ResourceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn handle(&self, kind: ResourceKind, key: &ResourceKey) -> Arc<Mutex<()>> {
        self.locks
            .entry((kind, key.clone()))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Run `f` while holding the lock for one resource.
    ///
    /// Locks are not reentrant. When nesting, acquire the collection lock
    /// before the graph lock, and the graph lock before index locks.
    pub fn with_lock<T>(&self, kind: ResourceKind, key: &ResourceKey, f: impl FnOnce() -> T) -> T {
        let handle = self.handle(kind, key);
        let result = {
            // The mutex guards no data, so a poisoned lock is still usable.
            let _guard = handle.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            f()
        };
        drop(handle);
        self.release(kind, key);
        result
    }

    /// Remove the entry if the registry holds the only reference. Handles are
    /// cloned under the same shard lock, so a waiter always keeps it alive.
    fn release(&self, kind: ResourceKind, key: &ResourceKey) {
        self.locks
            .remove_if(&(kind, key.clone()), |_, handle| Arc::strong_count(handle) == 1);
    }

    /// Number of resources currently locked or awaited.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn test_with_lock_serializes_writers() {
        let locks = Arc::new(ResourceLocks::new());
        let key = ResourceKey::new("acme", "main", "people").unwrap();
        let counter = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let locks = Arc::clone(&locks);
                let key = key.clone();
                let counter = Arc::clone(&counter);
                thread::spawn(move || {
                    for _ in 0..100 {
                        locks.with_lock(ResourceKind::Collection, &key, || {
                            // Non-atomic read-modify-write; only safe under the lock.
                            let current = counter.load(Ordering::Relaxed);
                            thread::yield_now();
                            counter.store(current + 1, Ordering::Relaxed);
                        });
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(counter.load(Ordering::Relaxed), 800);
        assert!(locks.is_empty());
    }

    #[test]
    fn test_distinct_resources_do_not_block() {
        let locks = ResourceLocks::new();
        let people = ResourceKey::new("acme", "main", "people").unwrap();
        let graph = ResourceKey::new("acme", "main", "graph").unwrap();

        let value = locks.with_lock(ResourceKind::Collection, &people, || {
            locks.with_lock(ResourceKind::Graph, &graph, || {
                assert_eq!(locks.len(), 2);
                42
            })
        });
        assert_eq!(value, 42);
        assert!(locks.is_empty());
    }

    #[test]
    fn test_registry_does_not_grow_with_resources() {
        let locks = ResourceLocks::new();
        for i in 0..50 {
            let key = ResourceKey::new("acme", "main", &format!("collection_{i}")).unwrap();
            locks.with_lock(ResourceKind::Collection, &key, || {
                assert_eq!(locks.len(), 1);
            });
        }
        assert_eq!(locks.len(), 0);
    }

    #[test]
    fn test_waiting_caller_runs_and_registry_empties() {
        let locks = Arc::new(ResourceLocks::new());
        let key = ResourceKey::new("acme", "main", "people").unwrap();
        let (entered_tx, entered_rx) = std::sync::mpsc::channel();

        let waiter = locks.with_lock(ResourceKind::Collection, &key, || {
            let locks = Arc::clone(&locks);
            let key = key.clone();
            let waiter = thread::spawn(move || {
                locks.with_lock(ResourceKind::Collection, &key, || {
                    entered_tx.send(()).unwrap();
                });
            });
            // Give the waiter time to take its handle and block.
            thread::sleep(std::time::Duration::from_millis(50));
            waiter
        });

        entered_rx.recv().unwrap();
        waiter.join().unwrap();
        assert!(locks.is_empty());
    }
}
