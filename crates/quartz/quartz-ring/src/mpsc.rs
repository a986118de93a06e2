//! Many producers, one stateful consumer.
//!
//! Producers claim positions with a single `fetch_add` and publish through
//! the slot stamp, so a slow producer holds back the consumer at its own
//! position only until it finishes. Records are consumed in position order.

use crate::ring::{BroadcastRing, Drained, record_overruns};
use crate::stamped::StampedCore;
use std::sync::atomic::Ordering;

pub struct MpscRing<T, const N: usize> {
    core: StampedCore<T, N>,
}

// SAFETY: producers only write slots they claimed; every read is validated
// against the slot stamp. The single-consumer rule for `dequeue` is part of
// its contract.
unsafe impl<T: Copy + Send, const N: usize> Sync for MpscRing<T, N> {}

impl<T: Copy + Default, const N: usize> MpscRing<T, N> {
    pub fn new() -> Self {
        Self {
            core: StampedCore::new(),
        }
    }
}

impl<T: Copy + Default, const N: usize> Default for MpscRing<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Copy, const N: usize> MpscRing<T, N> {
    /// Append `value` from any thread. Returns its absolute position.
    #[inline]
    pub fn enqueue(&self, value: T) -> u64 {
        self.core.publish_with(|slot| *slot = value)
    }

    #[inline]
    pub fn emplace<F: FnOnce(&mut T)>(&self, f: F) -> u64 {
        self.core.publish_with(f)
    }

    /// Consume every record visible at the tail, stopping at the first
    /// position whose producer has not finished yet.
    ///
    /// Only one thread may consume at a time. Two concurrent callers are not
    /// unsound but may both see the same records; use
    /// [`MpmcRing`](crate::MpmcRing) when several consumers share the work.
    pub fn dequeue<F: FnMut(&T)>(&self, mut f: F) -> usize {
        let mut skipped = 0;
        let mut consumed = 0;
        // SAFETY: tail is a plain atomic; a second consumer breaks ordering
        // guarantees, not memory safety.
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

    /// Copy of `pos` if it is complete and still held by the ring.
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

    /// Reset cursors and slot stamps.
    pub fn clear(&mut self) {
        self.core.clear();
    }
}

impl<T: Copy, const N: usize> BroadcastRing<T> for MpscRing<T, N> {
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
    use std::thread;

    /// Two producers write four tagged records each; the consumer sees every
    /// tag exactly once and the ring ends up empty.
    #[test]
    fn two_producers_tags_seen_once() {
        let ring = MpscRing::<u32, 8>::new();
        thread::scope(|s| {
            s.spawn(|| {
                for tag in 1..=4 {
                    ring.enqueue(tag);
                }
            });
            s.spawn(|| {
                for tag in 5..=8 {
                    ring.enqueue(tag);
                }
            });
        });

        let mut tags = Vec::new();
        assert_eq!(ring.dequeue(|t| tags.push(*t)), 8);
        tags.sort_unstable();
        assert_eq!(tags, [1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(ring.len(), 0);
        assert_eq!(ring.overruns(), 0);
    }

    /// Slots are reused lap after lap; the consumer must not see a slot from
    /// the previous lap as ready.
    #[test]
    fn reused_slot_is_not_reread() {
        let ring = MpscRing::<u32, 4>::new();
        for lap in 0..5 {
            for i in 0..4 {
                ring.enqueue(lap * 10 + i);
            }
            let mut seen = Vec::new();
            assert_eq!(ring.dequeue(|v| seen.push(*v)), 4);
            assert_eq!(seen, [lap * 10, lap * 10 + 1, lap * 10 + 2, lap * 10 + 3]);
            assert_eq!(ring.dequeue(|_| panic!("already consumed")), 0);
        }
    }

    #[test]
    fn consumer_fast_forwards_when_lapped() {
        let ring = MpscRing::<u32, 4>::new();
        for i in 0..10 {
            ring.enqueue(i);
        }
        let mut seen = Vec::new();
        ring.dequeue(|v| seen.push(*v));
        assert_eq!(seen, [6, 7, 8, 9]);
        assert_eq!(ring.overruns(), 6);
    }

    #[test]
    fn read_at_only_returns_held_positions() {
        let ring = MpscRing::<u32, 4>::new();
        let first = ring.enqueue(100);
        assert_eq!(ring.read_at(first), Some(100));
        assert_eq!(ring.read_at(first + 1), None);

        for i in 0..4 {
            ring.enqueue(i);
        }
        // position 0 has been overwritten by position 4
        assert_eq!(ring.read_at(first), None);
        assert_eq!(ring.read_at(4), Some(3));
    }

    #[test]
    fn clear_resets_stamps() {
        let mut ring = MpscRing::<u32, 4>::new();
        for i in 0..6 {
            ring.enqueue(i);
        }
        ring.clear();
        assert!(ring.is_empty());
        assert_eq!(ring.dequeue(|_| panic!("cleared")), 0);
        assert_eq!(ring.drain_from(0, |_| panic!("cleared")).read, 0);

        assert_eq!(ring.enqueue(42), 0);
        let mut seen = Vec::new();
        ring.dequeue(|v| seen.push(*v));
        assert_eq!(seen, [42]);
    }

    /// Per-producer order survives interleaving with other producers.
    #[test]
    fn per_producer_order_is_preserved() {
        const PRODUCERS: u64 = 4;
        const PER_PRODUCER: u64 = 50_000;

        let ring = Box::new(MpscRing::<(u64, u64), 4096>::new());
        let mut next = [0u64; PRODUCERS as usize];
        let mut total = 0;

        thread::scope(|s| {
            for p in 0..PRODUCERS {
                let ring = &ring;
                s.spawn(move || {
                    for i in 0..PER_PRODUCER {
                        while ring.len() >= 2048 {
                            std::hint::spin_loop();
                        }
                        ring.enqueue((p, i));
                    }
                });
            }

            while total < PRODUCERS * PER_PRODUCER {
                ring.dequeue(|&(p, i)| {
                    assert_eq!(next[p as usize], i);
                    next[p as usize] += 1;
                    total += 1;
                });
            }
        });

        assert_eq!(ring.overruns(), 0);
        assert!(ring.is_empty());
    }
}
