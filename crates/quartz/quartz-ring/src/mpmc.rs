//! Many producers, many consumers.
//!
//! Slot `i` starts with sequence `i` and a write of position `p` commits
//! `p + N`, so a reader at `c` knows the slot is ready exactly when its
//! sequence reads `c + N`. Stateful consumers claim records by CAS on tail;
//! any number of broadcast cursors can replay the same records on the side.

use crate::ring::{BroadcastRing, Drained, record_overruns};
use crate::stamped::StampedCore;
use std::sync::atomic::Ordering;

pub struct MpmcRing<T, const N: usize> {
    core: StampedCore<T, N>,
}

// SAFETY: producers only write slots they claimed; consumers claim by CAS;
// every read is validated against the slot sequence.
unsafe impl<T: Copy + Send, const N: usize> Sync for MpmcRing<T, N> {}

impl<T: Copy + Default, const N: usize> MpmcRing<T, N> {
    pub fn new() -> Self {
        Self {
            core: StampedCore::new(),
        }
    }
}

impl<T: Copy + Default, const N: usize> Default for MpmcRing<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Copy, const N: usize> MpmcRing<T, N> {
    #[inline]
    pub fn enqueue(&self, value: T) -> u64 {
        self.core.publish_with(|slot| *slot = value)
    }

    #[inline]
    pub fn emplace<F: FnOnce(&mut T)>(&self, f: F) -> u64 {
        self.core.publish_with(f)
    }

    /// Claim and consume visible records. Safe to call from several threads;
    /// each record goes to exactly one of them.
    pub fn dequeue<F: FnMut(&T)>(&self, mut f: F) -> usize {
        let mut skipped = 0;
        let mut consumed = 0;
        while let Some(value) = self.core.claim_next(&mut skipped) {
            f(&value);
            consumed += 1;
        }
        record_overruns(
            &self.core.overruns,
            skipped,
            self.core.tail.load(Ordering::Relaxed),
        );
        consumed
    }

    pub fn read_at(&self, pos: u64) -> Option<T> {
        self.core.read_at(pos)
    }

    pub fn len(&self) -> usize {
        self.core.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        N
    }

    pub fn overruns(&self) -> u64 {
        self.core.overruns.load(Ordering::Relaxed)
    }

    pub fn clear(&mut self) {
        self.core.clear();
    }
}

impl<T: Copy, const N: usize> BroadcastRing<T> for MpmcRing<T, N> {
    fn capacity(&self) -> usize {
        N
    }

    fn end_index(&self) -> u64 {
        self.core.head.load(Ordering::Acquire)
    }

    fn get(&self, pos: u64) -> T {
        self.core.get(pos)
    }

    fn drain_from<F: FnMut(&T)>(&self, cursor: u64, f: F) -> Drained {
        self.core.drain_from(cursor, f)
    }
}
