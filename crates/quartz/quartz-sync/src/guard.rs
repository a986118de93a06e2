//! RAII guards over [`RwSpinLock`].
//!
//! A guard borrows the lock it was taken from and releases it when dropped,
//! on every exit path including early returns and unwinding. Guards are
//! move-only. Transitions between them consume the source guard, so after a
//! downgrade or promotion there is exactly one guard describing what the
//! thread holds.
//!
//! | from            | to              | method                                |
//! |-----------------|-----------------|---------------------------------------|
//! | `WriteGuard`    | `ReadGuard`     | [`WriteGuard::downgrade`]             |
//! | `WriteGuard`    | `UpgradeGuard`  | [`WriteGuard::downgrade_to_upgradable`] |
//! | `UpgradeGuard`  | `ReadGuard`     | [`UpgradeGuard::downgrade`]           |
//! | `UpgradeGuard`  | `WriteGuard`    | [`UpgradeGuard::upgrade`], [`UpgradeGuard::try_upgrade`] |
//!
//! Each transition is also available through `From`.

use crate::lock::RwSpinLock;

impl RwSpinLock {
    /// Exclusive lock, released when the guard drops.
    #[inline]
    pub fn write(&self) -> WriteGuard<'_> {
        self.lock();
        WriteGuard { lock: self }
    }

    /// Shared lock, released when the guard drops.
    #[inline]
    pub fn read(&self) -> ReadGuard<'_> {
        self.lock_shared();
        ReadGuard { lock: self }
    }

    /// Upgrade-intent lock, released when the guard drops.
    #[inline]
    pub fn upgradable(&self) -> UpgradeGuard<'_> {
        self.lock_upgrade();
        UpgradeGuard { lock: self }
    }

    /// Exclusive lock without spinning; `None` when it is held in any mode.
    #[inline]
    pub fn try_write(&self) -> Option<WriteGuard<'_>> {
        self.try_lock().then(|| WriteGuard { lock: self })
    }

    /// Shared lock without spinning; `None` while a writer or an upgrader is
    /// present.
    #[inline]
    pub fn try_read(&self) -> Option<ReadGuard<'_>> {
        self.try_lock_shared().then(|| ReadGuard { lock: self })
    }

    #[inline]
    pub fn try_upgradable(&self) -> Option<UpgradeGuard<'_>> {
        self.try_lock_upgrade().then(|| UpgradeGuard { lock: self })
    }
}

#[must_use = "if unused the lock is released immediately"]
pub struct WriteGuard<'a> {
    lock: &'a RwSpinLock,
}

impl<'a> WriteGuard<'a> {
    /// Become a reader without letting another writer in between.
    #[inline]
    pub fn downgrade(self) -> ReadGuard<'a> {
        let lock = self.into_lock();
        // SAFETY: we held the exclusive lock and the guard is disarmed.
        unsafe { lock.unlock_and_lock_shared() };
        ReadGuard { lock }
    }

    /// Keep the intent to write while letting readers back in.
    #[inline]
    pub fn downgrade_to_upgradable(self) -> UpgradeGuard<'a> {
        let lock = self.into_lock();
        // SAFETY: as above.
        unsafe { lock.unlock_and_lock_upgrade() };
        UpgradeGuard { lock }
    }

    #[inline]
    pub fn lock(&self) -> &'a RwSpinLock {
        self.lock
    }

    #[inline(always)]
    fn into_lock(self) -> &'a RwSpinLock {
        let lock = self.lock;
        std::mem::forget(self);
        lock
    }
}

impl Drop for WriteGuard<'_> {
    #[inline]
    fn drop(&mut self) {
        // SAFETY: a live WriteGuard means this thread holds the exclusive lock.
        unsafe { self.lock.unlock() };
    }
}

#[must_use = "if unused the lock is released immediately"]
pub struct ReadGuard<'a> {
    lock: &'a RwSpinLock,
}

impl<'a> ReadGuard<'a> {
    #[inline]
    pub fn lock(&self) -> &'a RwSpinLock {
        self.lock
    }
}

impl Drop for ReadGuard<'_> {
    #[inline]
    fn drop(&mut self) {
        // SAFETY: a live ReadGuard accounts for one reader in the word.
        unsafe { self.lock.unlock_shared() };
    }
}

#[must_use = "if unused the lock is released immediately"]
pub struct UpgradeGuard<'a> {
    lock: &'a RwSpinLock,
}

impl<'a> UpgradeGuard<'a> {
    /// Promote to writer, spinning until existing readers leave. New readers
    /// are already shut out by the upgraded bit.
    #[inline]
    pub fn upgrade(self) -> WriteGuard<'a> {
        let lock = self.into_lock();
        // SAFETY: we held the upgrade lock and the guard is disarmed.
        unsafe { lock.unlock_upgrade_and_lock() };
        WriteGuard { lock }
    }

    /// Promote to writer only if no reader holds the lock right now.
    /// On failure the upgrade guard is handed back unchanged.
    #[inline]
    pub fn try_upgrade(self) -> Result<WriteGuard<'a>, UpgradeGuard<'a>> {
        // SAFETY: we hold the upgrade lock; on success the word now records a
        // writer, which the returned guard will release.
        if unsafe { self.lock.try_unlock_upgrade_and_lock() } {
            Ok(WriteGuard {
                lock: self.into_lock(),
            })
        } else {
            Err(self)
        }
    }

    /// Give up the intent to write and remain a reader.
    #[inline]
    pub fn downgrade(self) -> ReadGuard<'a> {
        let lock = self.into_lock();
        // SAFETY: we held the upgrade lock and the guard is disarmed.
        unsafe { lock.unlock_upgrade_and_lock_shared() };
        ReadGuard { lock }
    }

    #[inline]
    pub fn lock(&self) -> &'a RwSpinLock {
        self.lock
    }

    #[inline(always)]
    fn into_lock(self) -> &'a RwSpinLock {
        let lock = self.lock;
        std::mem::forget(self);
        lock
    }
}

impl Drop for UpgradeGuard<'_> {
    #[inline]
    fn drop(&mut self) {
        // SAFETY: a live UpgradeGuard means this thread holds the upgrade lock.
        unsafe { self.lock.unlock_upgrade() };
    }
}

impl<'a> From<WriteGuard<'a>> for ReadGuard<'a> {
    fn from(guard: WriteGuard<'a>) -> Self {
        guard.downgrade()
    }
}

impl<'a> From<UpgradeGuard<'a>> for ReadGuard<'a> {
    fn from(guard: UpgradeGuard<'a>) -> Self {
        guard.downgrade()
    }
}

impl<'a> From<WriteGuard<'a>> for UpgradeGuard<'a> {
    fn from(guard: WriteGuard<'a>) -> Self {
        guard.downgrade_to_upgradable()
    }
}

impl<'a> From<UpgradeGuard<'a>> for WriteGuard<'a> {
    fn from(guard: UpgradeGuard<'a>) -> Self {
        guard.upgrade()
    }
}
