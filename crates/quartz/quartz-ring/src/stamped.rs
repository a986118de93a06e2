//! Storage for rings with many producers ([`MpscRing`](crate::MpscRing),
//! [`MpmcRing`](crate::MpmcRing)).
//!
//! Producers claim positions with an atomic increment of head and may finish
//! in any order, so head alone cannot say which slots are complete. Each slot
//! therefore carries a stamp saying which position it currently holds.
//!
//! # Stamp protocol
//!
//! Slot `i` starts with stamp `i`. A producer that claimed position `p`:
//!
//! 1. stores `(p + N) | BUSY` and issues a Release fence (write starting)
//! 2. writes the record
//! 3. stores `p + N` with Release (write complete)
//!
//! A reader at position `c` expects the stamp `c + N`:
//!
//! | stamp seen                     | meaning                           |
//! |--------------------------------|-----------------------------------|
//! | below `c + N`, or busy `c + N` | not written yet: stop here        |
//! | exactly `c + N`                | complete: copy, then re-check     |
//! | above `c + N`                  | overwritten by a later lap        |
//!
//! The re-check after the copy (same idea as a seqlock read) rejects a copy
//! that raced with a producer reusing the slot. Because a reader stops at the
//! first incomplete position, it always sees a gap-free prefix even when
//! later positions completed first.

use crate::ring::{Capacity, Drained, apply_overrun_policy, seq_to_index, skip_lapped};
use quartz_sync::{CacheLinePad, CachePadded};
use std::cell::UnsafeCell;
use std::ptr;
use std::sync::atomic::{AtomicU64, Ordering, fence};

/// Marks a stamp whose write is still in progress. Positions never get close
/// to this bit.
const BUSY: u64 = 1 << 63;

#[repr(C, align(64))]
struct StampedSlot<T> {
    stamp: AtomicU64,
    value: UnsafeCell<T>,
}

pub(crate) enum Probe<T> {
    Ready(T),
    Pending,
    Lapped,
}

impl<T: Copy> StampedSlot<T> {
    #[inline(always)]
    fn write_with<F: FnOnce(&mut T)>(&self, commit: u64, f: F) {
        self.stamp.store(commit | BUSY, Ordering::Relaxed);
        fence(Ordering::Release);
        // SAFETY: position `commit - N` was claimed by this thread alone.
        f(unsafe { &mut *self.value.get() });
        self.stamp.store(commit, Ordering::Release);
    }

    #[inline(always)]
    fn probe(&self, expected: u64) -> Probe<T> {
        let s1 = self.stamp.load(Ordering::Acquire);
        let committed = s1 & !BUSY;
        if committed < expected || (committed == expected && s1 & BUSY != 0) {
            return Probe::Pending;
        }
        if committed > expected {
            return Probe::Lapped;
        }
        // SAFETY: the cell always holds an initialised T; a torn copy is
        // discarded by the stamp re-check below.
        let value = unsafe { ptr::read_volatile(self.value.get()) };
        fence(Ordering::Acquire);
        if self.stamp.load(Ordering::Relaxed) == s1 {
            Probe::Ready(value)
        } else {
            Probe::Lapped
        }
    }
}

#[repr(C)]
pub(crate) struct StampedCore<T, const N: usize> {
    _pad: CacheLinePad,
    slots: [StampedSlot<T>; N],
    pub(crate) head: CachePadded<AtomicU64>,
    pub(crate) tail: CachePadded<AtomicU64>,
    pub(crate) overruns: CachePadded<AtomicU64>,
}

impl<T: Copy + Default, const N: usize> StampedCore<T, N> {
    pub(crate) fn new() -> Self {
        let _ = Capacity::<N>::MASK;
        Self {
            _pad: CacheLinePad::new(),
            slots: std::array::from_fn(|i| StampedSlot {
                stamp: AtomicU64::new(i as u64),
                value: UnsafeCell::new(T::default()),
            }),
            head: CachePadded::new(AtomicU64::new(0)),
            tail: CachePadded::new(AtomicU64::new(0)),
            overruns: CachePadded::new(AtomicU64::new(0)),
        }
    }
}

impl<T: Copy, const N: usize> StampedCore<T, N> {
    #[inline(always)]
    fn slot(&self, pos: u64) -> &StampedSlot<T> {
        &self.slots[seq_to_index(pos, Capacity::<N>::MASK)]
    }

    /// Claim the next position and write it in place.
    #[inline(always)]
    pub(crate) fn publish_with<F: FnOnce(&mut T)>(&self, f: F) -> u64 {
        let pos = self.head.fetch_add(1, Ordering::AcqRel);
        self.slot(pos).write_with(pos + Capacity::<N>::SLOTS, f);
        pos
    }

    #[inline(always)]
    pub(crate) fn probe(&self, pos: u64) -> Probe<T> {
        self.slot(pos).probe(pos + Capacity::<N>::SLOTS)
    }

    #[inline(always)]
    pub(crate) fn get(&self, pos: u64) -> T {
        // SAFETY: see `StampedSlot::probe`; no validation here by contract.
        unsafe { ptr::read_volatile(self.slot(pos).value.get()) }
    }

    /// Copy of `pos` only if the slot still holds exactly that position.
    #[inline]
    pub(crate) fn read_at(&self, pos: u64) -> Option<T> {
        match self.probe(pos) {
            Probe::Ready(value) => Some(value),
            Probe::Pending | Probe::Lapped => None,
        }
    }

    pub(crate) fn drain_from<F: FnMut(&T)>(&self, cursor: u64, mut f: F) -> Drained {
        let mut d = Drained::starting_at(cursor);
        d.catch_up(self.head.load(Ordering::Acquire), Capacity::<N>::SLOTS);
        loop {
            match self.probe(d.cursor) {
                Probe::Ready(value) => {
                    d.consumed();
                    f(&value);
                }
                Probe::Pending => break,
                Probe::Lapped => {
                    d.recover_lap(self.head.load(Ordering::Acquire), Capacity::<N>::SLOTS)
                }
            }
        }
        d
    }

    /// Take the record at the tail for a single consumer.
    ///
    /// # Safety
    /// The caller must be the only thread advancing tail.
    pub(crate) unsafe fn consume_next(&self, skipped: &mut u64) -> Option<T> {
        let mut tail = self.tail.load(Ordering::Relaxed);
        apply_overrun_policy(
            self.head.load(Ordering::Acquire),
            &mut tail,
            Capacity::<N>::SLOTS,
            skipped,
        );
        loop {
            match self.probe(tail) {
                Probe::Ready(value) => {
                    self.tail.store(tail + 1, Ordering::Release);
                    return Some(value);
                }
                Probe::Pending => {
                    self.tail.store(tail, Ordering::Release);
                    return None;
                }
                Probe::Lapped => skip_lapped(
                    self.head.load(Ordering::Acquire),
                    &mut tail,
                    Capacity::<N>::SLOTS,
                    skipped,
                ),
            }
        }
    }

    /// Take the record at the tail when several consumers compete for it.
    /// A record is only handed out to the consumer whose CAS moved tail past
    /// it, and only that consumer accounts the positions it skipped.
    pub(crate) fn claim_next(&self, skipped: &mut u64) -> Option<T> {
        loop {
            let tail = self.tail.load(Ordering::Acquire);
            let head = self.head.load(Ordering::Acquire);
            let mut pos = tail;
            let mut lost = 0;
            apply_overrun_policy(head, &mut pos, Capacity::<N>::SLOTS, &mut lost);

            let (next, value) = match self.probe(pos) {
                Probe::Ready(value) => (pos + 1, Some(value)),
                Probe::Pending if pos == tail => return None,
                Probe::Pending => (pos, None),
                Probe::Lapped => {
                    skip_lapped(head, &mut pos, Capacity::<N>::SLOTS, &mut lost);
                    (pos, None)
                }
            };

            if self
                .tail
                .compare_exchange(tail, next, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                *skipped += lost;
                if value.is_some() {
                    return value;
                }
            }
        }
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        let tail = self.tail.load(Ordering::Acquire);
        let head = self.head.load(Ordering::Acquire);
        head.saturating_sub(tail) as usize
    }

    pub(crate) fn clear(&mut self) {
        *self.head.get_mut() = 0;
        *self.tail.get_mut() = 0;
        *self.overruns.get_mut() = 0;
        for (i, slot) in self.slots.iter_mut().enumerate() {
            *slot.stamp.get_mut() = i as u64;
        }
    }
}
