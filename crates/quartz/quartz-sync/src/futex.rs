//! Thin wrappers over the Linux `futex(2)` syscall.
//!
//! The non-private operations are used on purpose: the word may live in a
//! file mapping shared with other processes, and the kernel keys shared
//! futexes by the backing page rather than the virtual address.

use std::ptr;
use std::sync::atomic::AtomicU32;
use std::time::Duration;

/// Sleep while `*word == expected`, for at most `timeout`.
///
/// Returns early on a wake-up, a signal, a spurious wake, or immediately if
/// the word no longer holds `expected`. Callers re-check their condition.
pub(crate) fn wait(word: &AtomicU32, expected: u32, timeout: Option<Duration>) {
    let ts = timeout.map(|d| libc::timespec {
        tv_sec: d.as_secs().min(libc::time_t::MAX as u64) as libc::time_t,
        tv_nsec: d.subsec_nanos() as libc::c_long,
    });
    let ts_ptr = ts
        .as_ref()
        .map_or(ptr::null(), |t| t as *const libc::timespec);

    // SAFETY: `word` is a valid, aligned u32 for the duration of the call.
    // The return value only tells us why we woke up; every outcome is handled
    // by the caller's retry loop.
    unsafe {
        libc::syscall(
            libc::SYS_futex,
            word.as_ptr(),
            libc::FUTEX_WAIT,
            expected,
            ts_ptr,
            ptr::null::<u32>(),
            0u32,
        );
    }
}

/// Wake up to `count` threads sleeping on `word`.
pub(crate) fn wake(word: &AtomicU32, count: u32) {
    // SAFETY: see `wait`.
    unsafe {
        libc::syscall(libc::SYS_futex, word.as_ptr(), libc::FUTEX_WAKE, count);
    }
}
