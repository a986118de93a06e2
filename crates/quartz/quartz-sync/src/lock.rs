//! Reader / writer / upgrade spinlock in a single atomic word.
//!
//! # Bit layout
//!
//! ```text
//!  31                                2   1          0
//! ┌───────────────────────────────────┬──────────┬────────┐
//! │        reader count (× 4)         │ UPGRADED │ WRITER │
//! └───────────────────────────────────┴──────────┴────────┘
//! ```
//!
//! - Any number of readers may hold the lock together.
//! - One upgrader may coexist with readers. While its bit is set no *new*
//!   reader gets in, so it can later promote itself to writer once the
//!   existing readers drain.
//! - A writer excludes everybody.
//!
//! Acquisition spins. After 1000 failed attempts in one call the thread starts
//! yielding between attempts. There is no fairness and no timeout, and the
//! lock is not reentrant.
//!
//! The `unlock*` and transition methods are `unsafe`: calling one without
//! holding the matching lock corrupts the word. [`ReadGuard`], [`WriteGuard`]
//! and [`UpgradeGuard`] are the safe way to use them.
//!
//! [`ReadGuard`]: crate::ReadGuard
//! [`WriteGuard`]: crate::WriteGuard
//! [`UpgradeGuard`]: crate::UpgradeGuard

use std::sync::atomic::{AtomicU32, Ordering};

pub(crate) const WRITER: u32 = 1;
pub(crate) const UPGRADED: u32 = 2;
pub(crate) const READER: u32 = 4;

/// Attempts before a spinning caller starts yielding its time slice.
const SPINS_BEFORE_YIELD: u32 = 1000;

#[derive(Default)]
pub struct RwSpinLock {
    bits: AtomicU32,
}

/// Spin until `attempt` succeeds.
#[inline(always)]
fn spin_until(mut attempt: impl FnMut() -> bool) {
    let mut count = 0u32;
    while !attempt() {
        count = count.saturating_add(1);
        if count > SPINS_BEFORE_YIELD {
            if count == SPINS_BEFORE_YIELD + 1 {
                tracing::trace!("rw spinlock contended, yielding between attempts");
            }
            std::thread::yield_now();
        } else {
            std::hint::spin_loop();
        }
    }
}

impl RwSpinLock {
    pub const fn new() -> Self {
        Self {
            bits: AtomicU32::new(0),
        }
    }

    // ─── Exclusive ──────────────────────────────────────────────────────────

    /// Acquire exclusive access, spinning until every reader, upgrader and
    /// writer is gone.
    #[inline]
    pub fn lock(&self) {
        spin_until(|| self.try_lock());
    }

    /// Acquire exclusive access if the lock is completely free.
    #[inline]
    pub fn try_lock(&self) -> bool {
        self.bits
            .compare_exchange(0, WRITER, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
    }

    /// Release exclusive access. Clears the upgraded bit as well, since a
    /// failed `try_lock_upgrade` issued while we held the lock may have left
    /// it set.
    ///
    /// # Safety
    /// The caller must hold the exclusive lock.
    #[inline]
    pub unsafe fn unlock(&self) {
        self.bits.fetch_and(!(WRITER | UPGRADED), Ordering::Release);
    }

    // ─── Shared ─────────────────────────────────────────────────────────────

    #[inline]
    pub fn lock_shared(&self) {
        spin_until(|| self.try_lock_shared());
    }

    /// Try to join as a reader. Fails while a writer or an upgrader is
    /// present.
    ///
    /// `fetch_add` is used instead of a CAS loop because it is cheaper in the
    /// common uncontended case; on failure the increment is rolled back.
    #[inline]
    pub fn try_lock_shared(&self) -> bool {
        let value = self.bits.fetch_add(READER, Ordering::Acquire);
        if value & (WRITER | UPGRADED) != 0 {
            self.bits.fetch_sub(READER, Ordering::Release);
            return false;
        }
        true
    }

    /// # Safety
    /// The caller must hold one shared lock.
    #[inline]
    pub unsafe fn unlock_shared(&self) {
        self.bits.fetch_sub(READER, Ordering::Release);
    }

    // ─── Upgrade ────────────────────────────────────────────────────────────

    #[inline]
    pub fn lock_upgrade(&self) {
        spin_until(|| self.try_lock_upgrade());
    }

    /// Try to take the upgrade lock.
    ///
    /// On failure the bit is intentionally not cleared: it was already set by
    /// another upgrader, or a writer holds the lock and clears it on `unlock`.
    #[inline]
    pub fn try_lock_upgrade(&self) -> bool {
        let value = self.bits.fetch_or(UPGRADED, Ordering::Acquire);
        value & (UPGRADED | WRITER) == 0
    }

    /// # Safety
    /// The caller must hold the upgrade lock.
    #[inline]
    pub unsafe fn unlock_upgrade(&self) {
        self.bits.fetch_sub(UPGRADED, Ordering::AcqRel);
    }

    // ─── Transitions ────────────────────────────────────────────────────────

    /// Downgrade writer to reader.
    ///
    /// The reader count goes up before the writer bit is cleared, so a
    /// concurrent `try_lock_shared` sees the writer until the very end.
    ///
    /// # Safety
    /// The caller must hold the exclusive lock.
    #[inline]
    pub unsafe fn unlock_and_lock_shared(&self) {
        self.bits.fetch_add(READER, Ordering::Acquire);
        // SAFETY: forwarded from the caller.
        unsafe { self.unlock() };
    }

    /// Downgrade upgrader to reader in one atomic add.
    ///
    /// # Safety
    /// The caller must hold the upgrade lock.
    #[inline]
    pub unsafe fn unlock_upgrade_and_lock_shared(&self) {
        self.bits.fetch_add(READER - UPGRADED, Ordering::AcqRel);
    }

    /// Promote upgrader to writer, succeeding only when no reader is left.
    ///
    /// # Safety
    /// The caller must hold the upgrade lock. On `false` it still does.
    #[inline]
    pub unsafe fn try_unlock_upgrade_and_lock(&self) -> bool {
        self.bits
            .compare_exchange(UPGRADED, WRITER, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
    }

    /// Promote upgrader to writer, spinning until the readers drain.
    ///
    /// # Safety
    /// The caller must hold the upgrade lock.
    #[inline]
    pub unsafe fn unlock_upgrade_and_lock(&self) {
        // SAFETY: forwarded from the caller on every attempt.
        spin_until(|| unsafe { self.try_unlock_upgrade_and_lock() });
    }

    /// Demote writer to upgrader.
    ///
    /// Two steps because another thread may be OR-ing the upgraded bit in
    /// `try_lock_upgrade` at the same time. Setting UPGRADED first means no
    /// observer ever sees neither bit set.
    ///
    /// # Safety
    /// The caller must hold the exclusive lock.
    #[inline]
    pub unsafe fn unlock_and_lock_upgrade(&self) {
        self.bits.fetch_or(UPGRADED, Ordering::Acquire);
        self.bits.fetch_sub(WRITER, Ordering::Release);
    }

    /// Raw state word. Intended for debugging and tests.
    #[inline]
    pub fn bits(&self) -> u32 {
        self.bits.load(Ordering::Acquire)
    }

    /// Number of shared holders currently counted in the word.
    ///
    /// Transiently includes readers whose `try_lock_shared` is about to fail
    /// and roll back.
    #[inline]
    pub fn reader_count(&self) -> u32 {
        self.bits() / READER
    }
}

impl std::fmt::Debug for RwSpinLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let bits = self.bits();
        f.debug_struct("RwSpinLock")
            .field("readers", &(bits / READER))
            .field("upgraded", &(bits & UPGRADED != 0))
            .field("writer", &(bits & WRITER != 0))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    #[test]
    fn exclusive_excludes_everyone() {
        let l = RwSpinLock::new();
        assert!(l.try_lock());
        assert!(!l.try_lock());
        assert!(!l.try_lock_shared());
        assert!(!l.try_lock_upgrade());
        unsafe { l.unlock() };
        // the failed try_lock_upgrade above left UPGRADED set; unlock cleared it
        assert_eq!(l.bits(), 0);
    }

    #[test]
    fn readers_and_one_upgrader_coexist() {
        let l = RwSpinLock::new();
        assert!(l.try_lock_shared());
        assert!(l.try_lock_shared());
        assert!(l.try_lock_upgrade());
        assert_eq!(l.reader_count(), 2);

        // upgraded bit blocks new readers and writers
        assert!(!l.try_lock_shared());
        assert!(!l.try_lock());
        assert_eq!(l.reader_count(), 2, "failed reader must roll back");

        unsafe {
            assert!(!l.try_unlock_upgrade_and_lock());
            l.unlock_shared();
            l.unlock_shared();
            assert!(l.try_unlock_upgrade_and_lock());
        }
        assert_eq!(l.bits(), WRITER);
        unsafe { l.unlock() };
        assert_eq!(l.bits(), 0);
    }

    #[test]
    fn transitions_keep_word_consistent() {
        let l = RwSpinLock::new();
        l.lock();
        unsafe { l.unlock_and_lock_shared() };
        assert_eq!(l.bits(), READER);
        unsafe { l.unlock_shared() };

        l.lock();
        unsafe { l.unlock_and_lock_upgrade() };
        assert_eq!(l.bits(), UPGRADED);
        unsafe { l.unlock_upgrade_and_lock_shared() };
        assert_eq!(l.bits(), READER);
        unsafe { l.unlock_shared() };

        l.lock_upgrade();
        unsafe { l.unlock_upgrade_and_lock() };
        assert_eq!(l.bits(), WRITER);
        unsafe { l.unlock() };

        l.lock_upgrade();
        unsafe { l.unlock_upgrade() };
        assert_eq!(l.bits(), 0);
    }

    /// Scenario: thread 1 holds the upgrade lock; thread 2 cannot join as a
    /// reader; thread 1 then promotes itself because no reader got in after it.
    #[test]
    fn upgrade_blocks_new_readers_then_promotes() {
        let l = Arc::new(RwSpinLock::new());
        assert!(l.try_lock_upgrade());

        let l2 = Arc::clone(&l);
        let joined = thread::spawn(move || l2.try_lock_shared()).join().unwrap();
        assert!(!joined);

        assert!(unsafe { l.try_unlock_upgrade_and_lock() });
        assert_eq!(l.bits(), WRITER);
        unsafe { l.unlock() };
    }

    /// Many threads increment a plain counter under the exclusive lock; any
    /// overlap between two writers would lose increments.
    #[test]
    fn writers_are_mutually_exclusive() {
        const THREADS: usize = 8;
        const ITERS: usize = 10_000;

        let l = Arc::new(RwSpinLock::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let total = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let (l, inside, total) = (l.clone(), inside.clone(), total.clone());
                thread::spawn(move || {
                    for _ in 0..ITERS {
                        l.lock();
                        assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0);
                        total.fetch_add(1, Ordering::Relaxed);
                        inside.fetch_sub(1, Ordering::SeqCst);
                        unsafe { l.unlock() };
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(total.load(Ordering::Relaxed), THREADS * ITERS);
        assert_eq!(l.bits(), 0);
    }
}
