//! Cache line padding.
//!
//! Two independently written fields that share a cache line make every write
//! on one core invalidate the line on the other ("false sharing"). Hot fields
//! such as a ring's head, its tail and lock words are either wrapped in
//! [`CachePadded`] or separated by a [`CacheLinePad`].

pub use crossbeam_utils::CachePadded;

/// Bytes reserved by one [`CacheLinePad`].
///
/// x86_64 and aarch64 prefetch cache lines in adjacent pairs, so padding to
/// 128 bytes is what actually keeps two fields apart there. This matches the
/// alignment [`CachePadded`] uses on those targets.
#[cfg(any(target_arch = "x86_64", target_arch = "aarch64", target_arch = "powerpc64"))]
pub const CACHE_LINE_SIZE: usize = 128;

#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64", target_arch = "powerpc64")))]
pub const CACHE_LINE_SIZE: usize = 64;

/// An opaque, zero-filled gap of one cache line.
///
/// Place it between fields of a `#[repr(C)]` struct that must not share a
/// line. It carries no data and no logic.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct CacheLinePad {
    _bytes: [u8; CACHE_LINE_SIZE],
}

impl CacheLinePad {
    pub const fn new() -> Self {
        Self {
            _bytes: [0; CACHE_LINE_SIZE],
        }
    }
}

impl Default for CacheLinePad {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CacheLinePad {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CacheLinePad")
    }
}
