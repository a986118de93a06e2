//! Fixed-capacity rings for hot-path producer / consumer hand-off.
//!
//! | type               | producers | stateful consumers | completion tracking     |
//! |--------------------|-----------|--------------------|-------------------------|
//! | [`LockedRing`]     | many      | many               | head / tail spinlocks   |
//! | [`SpscRing`]       | one       | one                | head counter            |
//! | [`MpscRing`]       | many      | one                | per-slot stamp          |
//! | [`MpmcRing`]       | many      | many               | per-slot stamp          |
//! | [`LockedDynamicLog`] | many    | cursor only        | growable, spinlocked    |
//!
//! Every bounded ring offers two ways to read:
//!
//! - **Consuming**: `dequeue` drains from the ring's own tail.
//! - **Broadcast**: [`BroadcastRing::dequeue_from`] drains from a caller-owned
//!   cursor and never mutates the ring, so any number of readers can follow
//!   the producers independently. [`Cursor`] wraps that position together
//!   with an overrun count.
//!
//! Capacity `N` is a const generic and must be a power of two; anything else
//! is rejected at compile time. Producers never block: a reader that falls
//! more than `N` records behind loses the overwritten records and is moved
//! forward to the oldest record still in the ring.

mod locked;
mod log;
mod mpmc;
mod mpsc;
mod plain;
mod ring;
mod spsc;
mod stamped;

pub use locked::{CircularArray, LockedRing};
pub use log::LockedDynamicLog;
pub use mpmc::MpmcRing;
pub use mpsc::MpscRing;
pub use ring::{BroadcastRing, Cursor, Drained, apply_overrun_policy, seq_to_index};
pub use spsc::{SpscConsumer, SpscProducer, SpscRing};
