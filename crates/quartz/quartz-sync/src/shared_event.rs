//! Auto-reset event shared between processes.
//!
//! The event state lives in a small file-backed mapping so that any process
//! opening the same path operates on the same word.
//!
//! # Layout
//!
//! ```text
//! ┌──────────┬──────────┬──────────────┬────────────────┐
//! │  magic   │ version  │ state (u32)  │ waiters (u32)  │
//! │  (8B)    │  (8B)    │  0 / 1       │                │
//! └──────────┴──────────┴──────────────┴────────────────┘
//! ```
//!
//! On Linux waiters sleep in the kernel on `state` via a shared futex. Other
//! platforms fall back to a short sleep-poll with identical semantics.

use quartz_mmap::MmapFileMut;
use std::io;
use std::mem::size_of;
use std::path::Path;
use std::ptr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

/// ASCII "QRTZEVNT".
pub const SHARED_EVENT_MAGIC: u64 = 0x5152_545A_4556_4E54;

pub const SHARED_EVENT_VERSION: u64 = 1;

#[cfg(not(target_os = "linux"))]
const FALLBACK_POLL: Duration = Duration::from_micros(200);

#[repr(C)]
struct SharedEventHeader {
    magic: u64,
    version: u64,
    state: AtomicU32,
    waiters: AtomicU32,
}

impl SharedEventHeader {
    fn validate(&self) -> Result<(), &'static str> {
        if self.magic != SHARED_EVENT_MAGIC {
            return Err("Bad magic");
        }
        if self.version != SHARED_EVENT_VERSION {
            return Err("Wrong version");
        }
        Ok(())
    }
}

/// Cross-process auto-reset event with the same contract as
/// [`AutoResetEvent`](crate::AutoResetEvent).
pub struct SharedAutoResetEvent {
    /// Owns the mapping; `header` points into it.
    _mm: MmapFileMut,
    header: *const SharedEventHeader,
}

// SAFETY: the header is only ever accessed through atomics and the mapping it
// points into lives as long as `self`.
unsafe impl Send for SharedAutoResetEvent {}
unsafe impl Sync for SharedAutoResetEvent {}

impl SharedAutoResetEvent {
    /// Create the backing file at `path` (truncating any previous content)
    /// and initialise the event.
    pub fn create<P: AsRef<Path>>(path: P, initial: bool) -> io::Result<Self> {
        let path = path.as_ref();
        let mut mm = MmapFileMut::create_rw(path, size_of::<SharedEventHeader>())?;
        let base = mm.as_mut_ptr() as *mut SharedEventHeader;

        // SAFETY: the mapping was just created, is large enough and page
        // aligned; nobody else can have validated it yet.
        unsafe {
            ptr::write(
                base,
                SharedEventHeader {
                    magic: SHARED_EVENT_MAGIC,
                    version: SHARED_EVENT_VERSION,
                    state: AtomicU32::new(initial as u32),
                    waiters: AtomicU32::new(0),
                },
            );
        }
        tracing::debug!(path = %path.display(), initial, "created shared auto reset event");

        Ok(Self {
            _mm: mm,
            header: base,
        })
    }

    /// Open an event previously created by [`create`](Self::create), possibly
    /// in another process.
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let path = path.as_ref();
        let mut mm = MmapFileMut::open_rw(path, size_of::<SharedEventHeader>())?;
        let base = mm.as_mut_ptr() as *const SharedEventHeader;

        // SAFETY: the file is at least header sized; validate() rejects
        // anything that is not an event.
        let h = unsafe { &*base };
        h.validate()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        tracing::debug!(path = %path.display(), "opened shared auto reset event");

        Ok(Self {
            _mm: mm,
            header: base,
        })
    }

    #[inline(always)]
    fn header(&self) -> &SharedEventHeader {
        // SAFETY: header points at a validated SharedEventHeader in our mapping
        unsafe { &*self.header }
    }

    pub fn set(&self) {
        let h = self.header();
        h.state.store(1, Ordering::SeqCst);
        if h.waiters.load(Ordering::SeqCst) > 0 {
            wake_one(&h.state);
        }
    }

    pub fn reset(&self) {
        self.header().state.store(0, Ordering::Release);
    }

    /// Block until signalled. Always returns `true`.
    pub fn wait_one(&self) -> bool {
        self.wait(None)
    }

    /// Block until signalled or `timeout` elapses; returns whether the signal
    /// was consumed. A timeout too large to express as an `Instant` waits
    /// without a deadline.
    pub fn wait_one_timeout(&self, timeout: Duration) -> bool {
        let ok = self.wait(Instant::now().checked_add(timeout));
        if !ok {
            tracing::debug!(?timeout, "shared auto reset event wait timed out");
        }
        ok
    }

    pub fn is_set(&self) -> bool {
        self.header().state.load(Ordering::Acquire) == 1
    }

    fn wait(&self, deadline: Option<Instant>) -> bool {
        let h = self.header();
        h.waiters.fetch_add(1, Ordering::SeqCst);
        let consumed = loop {
            if h
                .state
                .compare_exchange(1, 0, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                break true;
            }
            let remaining = match deadline {
                Some(d) => match d.checked_duration_since(Instant::now()) {
                    Some(r) if !r.is_zero() => Some(r),
                    _ => break false,
                },
                None => None,
            };
            sleep_while_clear(&h.state, remaining);
        };
        h.waiters.fetch_sub(1, Ordering::SeqCst);
        consumed
    }
}

#[cfg(target_os = "linux")]
#[inline]
fn sleep_while_clear(state: &AtomicU32, timeout: Option<Duration>) {
    crate::futex::wait(state, 0, timeout);
}

#[cfg(not(target_os = "linux"))]
#[inline]
fn sleep_while_clear(_state: &AtomicU32, timeout: Option<Duration>) {
    std::thread::sleep(timeout.map_or(FALLBACK_POLL, |t| t.min(FALLBACK_POLL)));
}

#[cfg(target_os = "linux")]
#[inline]
fn wake_one(state: &AtomicU32) {
    crate::futex::wake(state, 1);
}

#[cfg(not(target_os = "linux"))]
#[inline]
fn wake_one(_state: &AtomicU32) {}
