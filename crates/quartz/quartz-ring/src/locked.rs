//! Ring with lock-serialised producers and consumers.
//!
//! Writers take the exclusive side of a head lock, stateful consumers the
//! exclusive side of a separate tail lock, so producers never contend with
//! consumers. Broadcast readers take no lock at all.
//!
//! The capacity has to be a power of two; anything else is rejected when the
//! ring type is instantiated:
//!
//! ```compile_fail
//! let _ring = quartz_ring::LockedRing::<u64, 3>::new();
//! ```

use crate::plain::PlainCore;
use crate::ring::{BroadcastRing, Drained, record_overruns};
use quartz_sync::{CachePadded, RwSpinLock};
use std::sync::atomic::Ordering;

pub struct LockedRing<T, const N: usize> {
    core: PlainCore<T, N>,
    head_lock: CachePadded<RwSpinLock>,
    tail_lock: CachePadded<RwSpinLock>,
}

/// Same structure under the name trading code tends to use for it.
pub type CircularArray<T, const N: usize> = LockedRing<T, N>;

// SAFETY: head only moves under `head_lock`, tail only under `tail_lock`;
// slot reads are validated copies.
unsafe impl<T: Copy + Send, const N: usize> Sync for LockedRing<T, N> {}

impl<T: Copy + Default, const N: usize> LockedRing<T, N> {
    pub fn new() -> Self {
        Self {
            core: PlainCore::new(),
            head_lock: CachePadded::new(RwSpinLock::new()),
            tail_lock: CachePadded::new(RwSpinLock::new()),
        }
    }
}

impl<T: Copy + Default, const N: usize> Default for LockedRing<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Copy, const N: usize> LockedRing<T, N> {
    #[inline]
    pub fn enqueue(&self, value: T) -> u64 {
        self.emplace(|slot| *slot = value)
    }

    /// Build the next record in place while holding the head lock.
    #[inline]
    pub fn emplace<F: FnOnce(&mut T)>(&self, f: F) -> u64 {
        let _guard = self.head_lock.write();
        // SAFETY: the head lock makes us the only writer of head.
        unsafe { self.core.publish_with(f) }
    }

    /// Consume visible records one by one. The tail lock is held while a
    /// record is taken, not while `f` runs, so several consumers can share
    /// the work.
    pub fn dequeue<F: FnMut(&T)>(&self, mut f: F) -> usize {
        let mut skipped = 0;
        let mut consumed = 0;
        loop {
            let next = {
                let _guard = self.tail_lock.write();
                // SAFETY: the tail lock makes us the only writer of tail.
                unsafe { self.core.consume_next(&mut skipped) }
            };
            match next {
                Some(value) => {
                    f(&value);
                    consumed += 1;
                }
                None => break,
            }
        }
        record_overruns(
            &self.core.overruns,
            skipped,
            self.core.tail.load(Ordering::Relaxed),
        );
        consumed
    }

    /// [`dequeue`](Self::dequeue) without taking the tail lock.
    ///
    /// # Safety
    /// No other thread may consume from this ring (through either method)
    /// until this call returns.
    pub unsafe fn dequeue_unlocked<F: FnMut(&T)>(&self, mut f: F) -> usize {
        let mut skipped = 0;
        let mut consumed = 0;
        // SAFETY: forwarded from the caller.
        while let Some(value) = unsafe { self.core.consume_next(&mut skipped) } {
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

impl<T: Copy, const N: usize> BroadcastRing<T> for LockedRing<T, N> {
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use crate::ring::Cursor;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;

    #[test]
    fn circular_array_is_a_locked_ring() {
        let ring = CircularArray::<u32, 4>::new();
        assert_eq!(ring.enqueue(7), 0);
        assert_eq!(ring.enqueue(8), 1);
        assert_eq!(ring.latest(), Some(8));
        assert_eq!(ring.get(0), 7);
        assert_eq!(ring.len(), 2);
    }

    #[test]
    fn dequeue_empties_in_order() {
        let ring = LockedRing::<u32, 8>::new();
        for i in 0..5 {
            ring.enqueue(i);
        }
        let mut seen = Vec::new();
        assert_eq!(ring.dequeue(|v| seen.push(*v)), 5);
        assert_eq!(seen, [0, 1, 2, 3, 4]);
        assert!(ring.is_empty());
        assert_eq!(ring.dequeue(|_| panic!("ring is empty")), 0);
    }

    #[test]
    fn unlocked_dequeue_matches_locked() {
        let ring = LockedRing::<u32, 8>::new();
        ring.enqueue(1);
        ring.enqueue(2);
        let mut seen = Vec::new();
        // SAFETY: single-threaded test, no other consumer.
        let n = unsafe { ring.dequeue_unlocked(|v| seen.push(*v)) };
        assert_eq!(n, 2);
        assert_eq!(seen, [1, 2]);
    }

    #[test]
    fn broadcast_read_leaves_tail_alone() {
        let ring = LockedRing::<u32, 8>::new();
        ring.enqueue(10);
        ring.enqueue(11);

        let mut seen = Vec::new();
        let next = ring.dequeue_from(0, |v| seen.push(*v));
        assert_eq!(next, 2);
        assert_eq!(seen, [10, 11]);
        assert_eq!(ring.len(), 2);
    }

    #[test]
    fn clear_restarts_at_slot_zero() {
        let mut ring = LockedRing::<u32, 4>::new();
        ring.enqueue(1);
        ring.enqueue(2);
        ring.clear();
        assert_eq!(ring.len(), 0);
        assert_eq!(ring.latest_index(), None);
        assert_eq!(ring.enqueue(5), 0);
        assert_eq!(ring.get(0), 5);
    }

    /// Four producers and two consumers: every record is consumed exactly
    /// once.
    #[test]
    fn producers_and_consumers_share_work() {
        const PRODUCERS: u32 = 4;
        const PER_PRODUCER: u32 = 2_000;
        const TOTAL: usize = (PRODUCERS * PER_PRODUCER) as usize;

        let ring = Box::new(LockedRing::<u32, 16384>::new());
        let seen = Mutex::new(Vec::with_capacity(TOTAL));

        thread::scope(|s| {
            for p in 0..PRODUCERS {
                let ring = &ring;
                s.spawn(move || {
                    for i in 0..PER_PRODUCER {
                        ring.enqueue(p * PER_PRODUCER + i);
                    }
                });
            }
            for _ in 0..2 {
                let (ring, seen) = (&ring, &seen);
                s.spawn(move || {
                    let mut local = Vec::new();
                    loop {
                        ring.dequeue(|v| local.push(*v));
                        if ring.end_index() as usize == TOTAL && ring.is_empty() {
                            break;
                        }
                    }
                    seen.lock().unwrap().extend(local);
                });
            }
        });

        let seen = seen.into_inner().unwrap();
        assert_eq!(seen.len(), TOTAL);
        let unique: HashSet<_> = seen.into_iter().collect();
        assert_eq!(unique.len(), TOTAL);
        assert_eq!(ring.overruns(), 0);
    }

    /// Lapping producers against lagging readers: broadcast and consuming
    /// reads alike must only hand out records written by a single lap.
    #[test]
    fn lapped_readers_only_get_whole_records() {
        type Wide = [u64; 32];
        let ring = LockedRing::<Wide, 4>::new();
        let done = AtomicBool::new(false);
        let whole = |w: &Wide| w.iter().all(|x| *x == w[0]);

        let (reads, torn) = thread::scope(|s| {
            for p in 0..2u64 {
                let (ring, done) = (&ring, &done);
                s.spawn(move || {
                    let mut v = p << 32;
                    while !done.load(Ordering::Relaxed) {
                        v += 1;
                        ring.emplace(|slot| slot.fill(v));
                    }
                });
            }

            let (mut reads, mut torn) = (0u64, 0u64);
            let mut cursor = Cursor::at(0);
            for _ in 0..20_000 {
                let mut check = |w: &Wide| {
                    reads += 1;
                    torn += u64::from(!whole(w));
                };
                ring.dequeue_from(0, &mut check);
                cursor.drain(&ring, &mut check);
                ring.dequeue(&mut check);
            }
            done.store(true, Ordering::Relaxed);
            (reads, torn)
        });

        assert!(reads > 0);
        assert_eq!(torn, 0, "{torn} of {reads} records mixed two laps");
    }
}
