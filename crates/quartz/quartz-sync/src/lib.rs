//! Synchronization primitives for Quartz hot paths.
//!
//! - [`RwSpinLock`]: a reader / writer / upgrade spinlock packed in one atomic
//!   word, with RAII guards ([`ReadGuard`], [`WriteGuard`], [`UpgradeGuard`])
//!   and consuming transitions between them.
//! - [`CacheLinePad`] / [`CachePadded`]: keep hot fields on separate cache lines.
//! - [`AutoResetEvent`] and [`SharedAutoResetEvent`]: auto-reset signals, the
//!   latter usable across processes through a shared mapping.
//! - [`wait_until`]: poll a predicate with a fixed delay until it holds or a
//!   timeout expires.

mod event;
#[cfg(target_os = "linux")]
mod futex;
mod guard;
mod lock;
mod pad;
mod poll;
mod shared_event;

pub use event::AutoResetEvent;
pub use guard::{ReadGuard, UpgradeGuard, WriteGuard};
pub use lock::RwSpinLock;
pub use pad::{CACHE_LINE_SIZE, CacheLinePad, CachePadded};
pub use poll::wait_until;
pub use shared_event::SharedAutoResetEvent;
