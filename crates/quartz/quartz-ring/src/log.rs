//! Growable append-only log behind an [`RwSpinLock`].
//!
//! The only buffer in this crate that allocates after construction. Appends
//! take the exclusive lock; readers take the shared lock and can replay from
//! any index, which is never invalidated because entries are never removed
//! (short of [`clear`](LockedDynamicLog::clear)).

use quartz_sync::RwSpinLock;
use std::cell::UnsafeCell;

pub struct LockedDynamicLog<T> {
    entries: UnsafeCell<Vec<T>>,
    lock: RwSpinLock,
}

// SAFETY: `entries` is only mutated under the exclusive lock and only read
// under the shared lock.
unsafe impl<T: Send + Sync> Sync for LockedDynamicLog<T> {}

impl<T> LockedDynamicLog<T> {
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: UnsafeCell::new(Vec::with_capacity(capacity)),
            lock: RwSpinLock::new(),
        }
    }

    #[inline]
    fn with_entries<R>(&self, f: impl FnOnce(&Vec<T>) -> R) -> R {
        let _guard = self.lock.read();
        // SAFETY: shared lock held, no writer can be active.
        f(unsafe { &*self.entries.get() })
    }

    #[inline]
    fn with_entries_mut<R>(&self, f: impl FnOnce(&mut Vec<T>) -> R) -> R {
        let _guard = self.lock.write();
        // SAFETY: exclusive lock held.
        f(unsafe { &mut *self.entries.get() })
    }

    /// Append `value`; returns its index.
    pub fn enqueue(&self, value: T) -> u64 {
        self.with_entries_mut(|entries| {
            entries.push(value);
            (entries.len() - 1) as u64
        })
    }

    /// Hand every entry from `cursor` onwards to `f` and return the index
    /// after the last one. `f` runs under the shared lock, so it must not
    /// append to this log.
    pub fn dequeue_from<F: FnMut(&T)>(&self, cursor: u64, mut f: F) -> u64 {
        self.with_entries(|entries| {
            let start = usize::try_from(cursor).unwrap_or(usize::MAX);
            for entry in entries.iter().skip(start) {
                f(entry);
            }
            cursor.max(entries.len() as u64)
        })
    }

    pub fn end_index(&self) -> u64 {
        self.with_entries(|entries| entries.len() as u64)
    }

    /// Index of the newest entry, `None` while empty.
    pub fn latest_index(&self) -> Option<u64> {
        self.end_index().checked_sub(1)
    }

    pub fn len(&self) -> usize {
        self.with_entries(Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Currently allocated capacity, in entries.
    pub fn capacity(&self) -> usize {
        self.with_entries(Vec::capacity)
    }

    pub fn clear(&self) {
        self.with_entries_mut(Vec::clear);
    }
}

impl<T: Default> LockedDynamicLog<T> {
    /// Append a default entry and let `f` fill it in under the lock.
    pub fn emplace<F: FnOnce(&mut T)>(&self, f: F) -> u64 {
        self.with_entries_mut(|entries| {
            entries.push(T::default());
            let index = entries.len() - 1;
            f(&mut entries[index]);
            index as u64
        })
    }
}

impl<T: Clone> LockedDynamicLog<T> {
    pub fn get(&self, index: u64) -> Option<T> {
        let index = usize::try_from(index).ok()?;
        self.with_entries(|entries| entries.get(index).cloned())
    }

    pub fn latest(&self) -> Option<T> {
        self.with_entries(|entries| entries.last().cloned())
    }
}

impl<T> Default for LockedDynamicLog<T> {
    fn default() -> Self {
        Self::new()
    }
}
