//! Storage and cursor logic for rings whose only completion signal is the
//! head counter ([`SpscRing`](crate::SpscRing) and
//! [`LockedRing`](crate::LockedRing)).
//!
//! A record at `pos` is complete once `head > pos`. Head has exactly one
//! writer at a time (the single producer, or whoever holds the head lock) and
//! is published with Release after the slot write.
//!
//! Head alone cannot tell a reader that the slot it just copied is being
//! rewritten: while position `pos + N` is in flight head still reads
//! `pos + N`. The writer therefore bumps `claimed` before it touches the slot:
//!
//! ```text
//! writer                          reader at pos
//! claimed = pos + 1  (Relaxed)    copy slot
//! fence(Release)                  fence(Acquire)
//! write slot                      claimed - pos <= N ?  keep : discard
//! head = pos + 1     (Release)
//! ```
//!
//! If the copy observed any byte of a later lap, the fences guarantee the
//! reader also observes that lap's claim, and the copy is discarded.

use crate::ring::{Capacity, Drained, apply_overrun_policy, seq_to_index, skip_lapped};
use quartz_sync::{CacheLinePad, CachePadded};
use std::cell::UnsafeCell;
use std::ptr;
use std::sync::atomic::{AtomicU64, Ordering, fence};

#[repr(C)]
pub(crate) struct PlainCore<T, const N: usize> {
    _pad: CacheLinePad,
    buffer: [UnsafeCell<T>; N],
    pub(crate) head: CachePadded<AtomicU64>,
    claimed: CachePadded<AtomicU64>,
    pub(crate) tail: CachePadded<AtomicU64>,
    pub(crate) overruns: CachePadded<AtomicU64>,
}

impl<T: Copy + Default, const N: usize> PlainCore<T, N> {
    pub(crate) fn new() -> Self {
        let _ = Capacity::<N>::MASK;
        Self {
            _pad: CacheLinePad::new(),
            buffer: std::array::from_fn(|_| UnsafeCell::new(T::default())),
            head: CachePadded::new(AtomicU64::new(0)),
            claimed: CachePadded::new(AtomicU64::new(0)),
            tail: CachePadded::new(AtomicU64::new(0)),
            overruns: CachePadded::new(AtomicU64::new(0)),
        }
    }
}

impl<T: Copy, const N: usize> PlainCore<T, N> {
    #[inline(always)]
    fn cell(&self, pos: u64) -> *mut T {
        self.buffer[seq_to_index(pos, Capacity::<N>::MASK)].get()
    }

    /// Write the next record in place and publish it.
    ///
    /// # Safety
    /// The caller must be the only thread advancing head: the single
    /// producer, or the holder of the head lock.
    #[inline(always)]
    pub(crate) unsafe fn publish_with<F: FnOnce(&mut T)>(&self, f: F) -> u64 {
        let pos = self.head.load(Ordering::Relaxed);
        self.claimed.store(pos + 1, Ordering::Relaxed);
        fence(Ordering::Release);
        // SAFETY: no other producer can touch this slot until head moves on;
        // readers detect the overwrite through `claimed`.
        f(unsafe { &mut *self.cell(pos) });
        self.head.store(pos + 1, Ordering::Release);
        pos
    }

    #[inline(always)]
    pub(crate) fn get(&self, pos: u64) -> T {
        // SAFETY: the cell always holds an initialised T; a concurrent
        // overwrite is the documented overrun case.
        unsafe { ptr::read_volatile(self.cell(pos)) }
    }

    /// Copy `pos`, then make sure no producer started rewriting the slot
    /// meanwhile. `Err` carries the claim that proved the lap.
    #[inline(always)]
    fn read_checked(&self, pos: u64) -> Result<T, u64> {
        let value = self.get(pos);
        fence(Ordering::Acquire);
        let claimed = self.claimed.load(Ordering::Relaxed);
        if claimed.saturating_sub(pos) <= Capacity::<N>::SLOTS {
            Ok(value)
        } else {
            Err(claimed)
        }
    }

    pub(crate) fn drain_from<F: FnMut(&T)>(&self, cursor: u64, mut f: F) -> Drained {
        let mut d = Drained::starting_at(cursor);
        let mut head = self.head.load(Ordering::Acquire);
        d.catch_up(head, Capacity::<N>::SLOTS);
        while d.cursor < head {
            match self.read_checked(d.cursor) {
                Ok(value) => {
                    d.consumed();
                    f(&value);
                }
                Err(lapped_by) => d.recover_lap(lapped_by, Capacity::<N>::SLOTS),
            }
            head = self.head.load(Ordering::Acquire);
        }
        d
    }

    /// Take the record at the tail, if one is visible.
    ///
    /// # Safety
    /// The caller must be the only thread advancing tail: the single
    /// consumer, or the holder of the tail lock.
    #[inline(always)]
    pub(crate) unsafe fn consume_next(&self, skipped: &mut u64) -> Option<T> {
        let mut tail = self.tail.load(Ordering::Relaxed);
        loop {
            let head = self.head.load(Ordering::Acquire);
            apply_overrun_policy(head, &mut tail, Capacity::<N>::SLOTS, skipped);
            if tail >= head {
                self.tail.store(tail, Ordering::Release);
                return None;
            }
            match self.read_checked(tail) {
                Ok(value) => {
                    self.tail.store(tail + 1, Ordering::Release);
                    return Some(value);
                }
                Err(claimed) => skip_lapped(claimed, &mut tail, Capacity::<N>::SLOTS, skipped),
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
        *self.claimed.get_mut() = 0;
        *self.tail.get_mut() = 0;
        *self.overruns.get_mut() = 0;
    }
}
