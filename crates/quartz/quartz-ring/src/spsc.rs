//! Single-producer / single-consumer ring.
//!
//! The ring itself only offers broadcast reads. Writing and consuming go
//! through the two handles returned by [`SpscRing::split`], which borrows the
//! ring mutably, so the compiler guarantees there is exactly one of each.
//!
//! ```
//! use quartz_ring::{BroadcastRing, SpscRing};
//!
//! let mut ring = SpscRing::<u64, 8>::new();
//! let (mut tx, mut rx) = ring.split();
//! let pos = tx.enqueue(42);
//! assert_eq!(tx.ring().get(pos), 42);
//!
//! let mut seen = Vec::new();
//! assert_eq!(rx.dequeue(|v| seen.push(*v)), 1);
//! assert_eq!(seen, [42]);
//! ```

use crate::plain::PlainCore;
use crate::ring::{BroadcastRing, Drained, record_overruns};
use std::sync::atomic::Ordering;

pub struct SpscRing<T, const N: usize> {
    core: PlainCore<T, N>,
}

// SAFETY: head is only advanced through the unique `SpscProducer`, tail only
// through the unique `SpscConsumer`; every other access is a validated copy.
unsafe impl<T: Copy + Send, const N: usize> Sync for SpscRing<T, N> {}

impl<T: Copy + Default, const N: usize> SpscRing<T, N> {
    pub fn new() -> Self {
        Self {
            core: PlainCore::new(),
        }
    }
}

impl<T: Copy + Default, const N: usize> Default for SpscRing<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Copy, const N: usize> SpscRing<T, N> {
    /// Hand out the producer and consumer ends. They can be moved to two
    /// threads (e.g. with `std::thread::scope`).
    pub fn split(&mut self) -> (SpscProducer<'_, T, N>, SpscConsumer<'_, T, N>) {
        let ring = &*self;
        (SpscProducer { ring }, SpscConsumer { ring })
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

    /// Records the consumer lost to being lapped.
    pub fn overruns(&self) -> u64 {
        self.core.overruns.load(Ordering::Relaxed)
    }

    /// Back to the empty state. Slot contents are left as they are.
    pub fn clear(&mut self) {
        self.core.clear();
    }
}

impl<T: Copy, const N: usize> BroadcastRing<T> for SpscRing<T, N> {
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

/// The writing end of an [`SpscRing`].
pub struct SpscProducer<'a, T, const N: usize> {
    ring: &'a SpscRing<T, N>,
}

impl<'a, T: Copy, const N: usize> SpscProducer<'a, T, N> {
    /// Append `value`, returning its absolute position. Never blocks: a full
    /// ring overwrites its oldest record.
    #[inline]
    pub fn enqueue(&mut self, value: T) -> u64 {
        self.emplace(|slot| *slot = value)
    }

    /// Build the next record in place.
    #[inline]
    pub fn emplace<F: FnOnce(&mut T)>(&mut self, f: F) -> u64 {
        // SAFETY: `split` hands out a single producer per ring.
        unsafe { self.ring.core.publish_with(f) }
    }

    /// Shared view for broadcast readers.
    pub fn ring(&self) -> &'a SpscRing<T, N> {
        self.ring
    }
}

/// The consuming end of an [`SpscRing`].
pub struct SpscConsumer<'a, T, const N: usize> {
    ring: &'a SpscRing<T, N>,
}

impl<'a, T: Copy, const N: usize> SpscConsumer<'a, T, N> {
    /// Hand every visible record to `f` in order. Returns how many were
    /// consumed.
    pub fn dequeue<F: FnMut(&T)>(&mut self, mut f: F) -> usize {
        let core = &self.ring.core;
        let mut skipped = 0;
        let mut consumed = 0;
        // SAFETY: `split` hands out a single consumer per ring.
        while let Some(value) = unsafe { core.consume_next(&mut skipped) } {
            f(&value);
            consumed += 1;
        }
        record_overruns(&core.overruns, skipped, core.tail.load(Ordering::Relaxed));
        consumed
    }

    pub fn ring(&self) -> &'a SpscRing<T, N> {
        self.ring
    }
}
