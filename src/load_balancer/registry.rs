//! Append-only replica registry.
//!
//! # Responsibilities
//! - Hold replicas in registration order; indices never change
//! - Grow by doubling, copying existing entries into the new buffer
//! - Let readers scan without locks while a writer grows the buffer

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use arc_swap::ArcSwap;
use parking_lot::Mutex;

/// Capacity of a fresh registry.
pub const INITIAL_CAPACITY: usize = 10;

/// Fixed-size backing buffer. A slot is written once, under the grow lock.
struct Slots<T> {
    entries: Box<[OnceLock<Arc<T>>]>,
}

impl<T> Slots<T> {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: (0..capacity).map(|_| OnceLock::new()).collect(),
        }
    }

    fn capacity(&self) -> usize {
        self.entries.len()
    }

    /// Copy every entry into a buffer of twice the capacity.
    fn doubled(&self) -> Self {
        let grown = Self::with_capacity((self.capacity() * 2).max(1));
        for (slot, entry) in grown.entries.iter().zip(self.entries.iter()) {
            if let Some(value) = entry.get() {
                let _ = slot.set(value.clone());
            }
        }
        grown
    }
}

/// Ordered, growable collection of replicas. There is no removal.
pub struct ReplicaRegistry<T> {
    slots: ArcSwap<Slots<T>>,
    len: AtomicUsize,
    grow: Mutex<()>,
}

impl<T> ReplicaRegistry<T> {
    pub fn new() -> Self {
        Self::with_capacity(INITIAL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: ArcSwap::from_pointee(Slots::with_capacity(capacity)),
            len: AtomicUsize::new(0),
            grow: Mutex::new(()),
        }
    }

    /// Append an entry and return its index.
    pub fn add(&self, entry: Arc<T>) -> usize {
        let _guard = self.grow.lock();
        let index = self.len.load(Ordering::Acquire);

        let mut slots = self.slots.load_full();
        if index >= slots.capacity() {
            let grown = Arc::new(slots.doubled());
            self.slots.store(grown.clone());
            tracing::debug!(
                from = slots.capacity(),
                to = grown.capacity(),
                "Replica registry grown"
            );
            slots = grown;
        }

        let _ = slots.entries[index].set(entry);
        // Publish only after the slot is filled; readers bound scans by `len`.
        self.len.store(index + 1, Ordering::Release);
        index
    }

    /// Number of registered entries.
    pub fn count(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    /// Current backing capacity.
    pub fn capacity(&self) -> usize {
        self.slots.load().capacity()
    }

    pub fn get(&self, index: usize) -> Option<Arc<T>> {
        self.snapshot().get(index).cloned()
    }

    /// Point-in-time view bounded by the count observed now.
    pub fn snapshot(&self) -> Snapshot<T> {
        let len = self.len.load(Ordering::Acquire);
        let slots = self.slots.load_full();
        Snapshot { slots, len }
    }
}

impl<T> Default for ReplicaRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for ReplicaRegistry<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplicaRegistry")
            .field("count", &self.count())
            .field("capacity", &self.capacity())
            .finish()
    }
}

/// Entries `0..len` of the registry as of `ReplicaRegistry::snapshot`.
pub struct Snapshot<T> {
    slots: Arc<Slots<T>>,
    len: usize,
}

impl<T> Snapshot<T> {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn get(&self, index: usize) -> Option<&Arc<T>> {
        if index >= self.len {
            return None;
        }
        self.slots.entries.get(index).and_then(OnceLock::get)
    }

    /// Entries in index order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<T>> + '_ {
        self.slots.entries[..self.len].iter().filter_map(OnceLock::get)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_assigns_sequential_indices() {
        let registry = ReplicaRegistry::new();
        assert_eq!(registry.add(Arc::new("a")), 0);
        assert_eq!(registry.add(Arc::new("b")), 1);
        assert_eq!(registry.count(), 2);
        assert_eq!(registry.capacity(), INITIAL_CAPACITY);
        assert_eq!(registry.get(1).as_deref(), Some(&"b"));
        assert!(registry.get(2).is_none());
    }

    #[test]
    fn test_growth_preserves_entries_at_their_indices() {
        let registry = ReplicaRegistry::new();
        for i in 0..INITIAL_CAPACITY {
            registry.add(Arc::new(i));
        }
        assert_eq!(registry.capacity(), INITIAL_CAPACITY);

        let eleventh = registry.add(Arc::new(INITIAL_CAPACITY));
        assert_eq!(eleventh, INITIAL_CAPACITY);
        assert_eq!(registry.count(), INITIAL_CAPACITY + 1);
        assert_eq!(registry.capacity(), INITIAL_CAPACITY * 2);

        for i in 0..=INITIAL_CAPACITY {
            assert_eq!(*registry.get(i).unwrap(), i);
        }
    }

    #[test]
    fn test_zero_capacity_still_grows() {
        let registry = ReplicaRegistry::with_capacity(0);
        registry.add(Arc::new(7));
        registry.add(Arc::new(8));
        assert_eq!(registry.count(), 2);
        assert!(registry.capacity() >= 2);
    }

    #[test]
    fn test_snapshot_is_bounded_by_count_at_creation() {
        let registry = ReplicaRegistry::with_capacity(2);
        registry.add(Arc::new(0));
        registry.add(Arc::new(1));
        let before = registry.snapshot();

        // Forces a resize while `before` is still alive.
        registry.add(Arc::new(2));

        assert_eq!(before.len(), 2);
        assert_eq!(before.iter().map(|v| **v).collect::<Vec<_>>(), vec![0, 1]);
        assert!(before.get(2).is_none());

        let after = registry.snapshot();
        assert_eq!(after.iter().map(|v| **v).collect::<Vec<_>>(), vec![0, 1, 2]);
    }

    #[test]
    fn test_concurrent_adds_lose_nothing() {
        let registry = Arc::new(ReplicaRegistry::with_capacity(1));
        let threads: Vec<_> = (0..8)
            .map(|t| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    for i in 0..100 {
                        registry.add(Arc::new(t * 1000 + i));
                        // Readers interleave with growth.
                        let snapshot = registry.snapshot();
                        assert_eq!(snapshot.iter().count(), snapshot.len());
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        assert_eq!(registry.count(), 800);
        let mut seen: Vec<_> = registry.snapshot().iter().map(|v| **v).collect();
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen.len(), 800);
    }
}
