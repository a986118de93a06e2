//! Index arithmetic, overrun policy and the broadcast read interface shared by
//! every bounded ring.

use std::sync::atomic::{AtomicU64, Ordering};

/// Compile-time capacity checks for a ring of `N` slots.
///
/// Referencing [`Capacity::MASK`] from a constructor forces the assertion to
/// be evaluated when the ring type is instantiated, so `N = 3` fails the
/// build instead of misbehaving at runtime.
pub(crate) struct Capacity<const N: usize>;

impl<const N: usize> Capacity<N> {
    pub(crate) const MASK: u64 = {
        assert!(
            N > 0 && N.is_power_of_two(),
            "ring capacity must be a positive power of two"
        );
        (N - 1) as u64
    };

    pub(crate) const SLOTS: u64 = N as u64;
}

/// Converts an absolute position to a slot index.
///
/// Works because the capacity is always a power of 2: with `capacity = 8`
/// the mask is `0b111` and
///
/// ```text
/// seq =  0 → 0 & 7 = 0
/// seq =  5 → 5 & 7 = 5
/// seq =  8 → 8 & 7 = 0  (wraps around)
/// seq = 15 → 15 & 7 = 7
/// ```
#[inline(always)]
pub fn seq_to_index(seq: u64, mask: u64) -> usize {
    (seq & mask) as usize
}

/// Moves a reader that producers have lapped onto the oldest record the ring
/// can still hold.
///
/// With `N` slots only positions `write_seq - N .. write_seq` can be intact.
/// A reader further behind is placed at `write_seq - N` and the positions it
/// jumped over are added to `overruns`. The landing slot may be the next one
/// a producer rewrites, so the reads that follow still validate their copy.
///
/// ```text
/// capacity = 8, write_seq = 20, read_seq = 5
///
/// lag 15 exceeds 8 slots: overruns += 7, read_seq = 12
/// ```
#[inline(always)]
pub fn apply_overrun_policy(write_seq: u64, read_seq: &mut u64, capacity: u64, overruns: &mut u64) {
    // a cursor handed in from elsewhere can be past a head loaded earlier
    let behind = write_seq.saturating_sub(*read_seq);
    if behind > capacity {
        *overruns += behind - capacity;
        *read_seq = write_seq - capacity;
    }
}

/// Step past a slot found overwritten while reading `read_seq`.
///
/// Normally `write_seq` is already more than `capacity` ahead and the overrun
/// policy does the work. If the overwrite is visible in the slot before it is
/// visible in `write_seq`, only the one lost position is skipped, so the
/// reader always makes progress.
#[inline(always)]
pub(crate) fn skip_lapped(write_seq: u64, read_seq: &mut u64, capacity: u64, skipped: &mut u64) {
    let before = *read_seq;
    apply_overrun_policy(write_seq, read_seq, capacity, skipped);
    if *read_seq == before {
        *read_seq += 1;
        *skipped += 1;
    }
}

/// Account records a stateful consumer lost to being lapped.
#[inline]
pub(crate) fn record_overruns(counter: &AtomicU64, skipped: u64, tail: u64) {
    if skipped > 0 {
        counter.fetch_add(skipped, Ordering::Relaxed);
        tracing::warn!(skipped, tail, "consumer lapped by producers, records overwritten");
    }
}

/// Outcome of one broadcast drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Drained {
    /// Position to resume from next time.
    pub cursor: u64,
    /// Records handed to the callback.
    pub read: u64,
    /// Records lost because the producers lapped the cursor.
    pub skipped: u64,
}

impl Drained {
    #[inline(always)]
    pub(crate) fn starting_at(cursor: u64) -> Self {
        Self {
            cursor,
            read: 0,
            skipped: 0,
        }
    }

    #[inline(always)]
    pub(crate) fn catch_up(&mut self, head: u64, capacity: u64) {
        apply_overrun_policy(head, &mut self.cursor, capacity, &mut self.skipped);
    }

    #[inline(always)]
    pub(crate) fn recover_lap(&mut self, head: u64, capacity: u64) {
        skip_lapped(head, &mut self.cursor, capacity, &mut self.skipped);
    }

    #[inline(always)]
    pub(crate) fn consumed(&mut self) {
        self.cursor += 1;
        self.read += 1;
    }
}

/// Non-destructive reads shared by every bounded ring.
///
/// Nothing here mutates the ring, so any number of threads may call these
/// concurrently with the producers and with each other.
pub trait BroadcastRing<T: Copy> {
    /// Number of slots, `N`.
    fn capacity(&self) -> usize;

    /// One past the last claimed position (the current head).
    fn end_index(&self) -> u64;

    /// Copy of the slot that holds `pos`, without checking that `pos` is
    /// still (or already) the record stored there.
    fn get(&self, pos: u64) -> T;

    /// Hand every record visible from `cursor` onwards to `f`, in position
    /// order, stopping at the first position not yet completed.
    fn drain_from<F: FnMut(&T)>(&self, cursor: u64, f: F) -> Drained;

    /// [`drain_from`](Self::drain_from) returning only the new cursor.
    fn dequeue_from<F: FnMut(&T)>(&self, cursor: u64, f: F) -> u64 {
        self.drain_from(cursor, f).cursor
    }

    /// Position of the most recently claimed record, `None` while empty.
    fn latest_index(&self) -> Option<u64> {
        self.end_index().checked_sub(1)
    }

    /// Snapshot of the most recently claimed record.
    fn latest(&self) -> Option<T> {
        self.latest_index().map(|pos| self.get(pos))
    }
}

/// Caller-owned broadcast reader state.
///
/// Each `Cursor` follows a ring at its own pace. Nothing about it is stored
/// in the ring, so cursors can be created, cloned and dropped freely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Cursor {
    position: u64,
    overruns: u64,
}

impl Cursor {
    /// Replay from absolute `position`.
    pub fn at(position: u64) -> Self {
        Self {
            position,
            overruns: 0,
        }
    }

    /// Start at the ring's current head: only records published from now on
    /// will be seen.
    pub fn tail_follow<T: Copy, R: BroadcastRing<T>>(ring: &R) -> Self {
        Self::at(ring.end_index())
    }

    /// Drain everything currently visible. Returns the number of records
    /// handed to `f`.
    pub fn drain<T, R, F>(&mut self, ring: &R, f: F) -> u64
    where
        T: Copy,
        R: BroadcastRing<T>,
        F: FnMut(&T),
    {
        let d = ring.drain_from(self.position, f);
        self.position = d.cursor;
        self.overruns += d.skipped;
        d.read
    }

    /// How far this cursor trails the head.
    pub fn lag<T: Copy, R: BroadcastRing<T>>(&self, ring: &R) -> u64 {
        ring.end_index().saturating_sub(self.position)
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    /// Records lost to overruns since this cursor was created.
    pub fn overruns(&self) -> u64 {
        self.overruns
    }
}
