//! One stress pass per ring variant plus the event round-trip checks.
//!
//! Producers throttle themselves to half a ring ahead of the stateful
//! consumers, so every consuming pass must account for every record. Broadcast
//! readers run unthrottled alongside and may be lapped; their losses are
//! reported, not treated as failures. Any torn record fails the run.

use anyhow::{Context, bail};
use quartz_config::StressConfig;
use quartz_events::Quote;
use quartz_ring::{
    BroadcastRing, Cursor, LockedDynamicLog, LockedRing, MpmcRing, MpscRing, SpscRing,
};
use quartz_sync::{AutoResetEvent, SharedAutoResetEvent, wait_until};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const DRAIN_POLL: Duration = Duration::from_millis(1);
const DRAIN_TIMEOUT: Duration = Duration::from_secs(120);
const EVENT_ROUND_TRIPS: u32 = 10_000;
const SHARED_EVENT_ROUND_TRIPS: u32 = 1_000;
const EVENT_WAIT: Duration = Duration::from_secs(5);

#[derive(Debug, Default)]
struct Outcome {
    variant: &'static str,
    consumed: u64,
    torn: u64,
    overruns: u64,
    broadcast_read: u64,
    broadcast_overruns: u64,
    elapsed: Duration,
}

impl Outcome {
    fn report(&self) -> anyhow::Result<()> {
        let secs = self.elapsed.as_secs_f64().max(f64::EPSILON);
        info!(
            variant = self.variant,
            consumed = self.consumed,
            overruns = self.overruns,
            broadcast_read = self.broadcast_read,
            broadcast_overruns = self.broadcast_overruns,
            elapsed_ms = self.elapsed.as_millis() as u64,
            rate_per_s = (self.consumed as f64 / secs) as u64,
            "stress pass complete"
        );
        if self.broadcast_overruns > 0 {
            warn!(
                variant = self.variant,
                lost = self.broadcast_overruns,
                "broadcast readers were lapped"
            );
        }
        if self.torn > 0 {
            bail!("{}: {} torn records", self.variant, self.torn);
        }
        Ok(())
    }
}

/// What a consuming pass needs from a ring.
trait StressRing: BroadcastRing<Quote> + Sync {
    const NAME: &'static str;
    /// Stateful consumers allowed to run at once.
    const CONSUMERS: usize;

    fn publish(&self, quote: Quote);
    fn consume(&self, f: &mut dyn FnMut(&Quote)) -> usize;
    fn backlog(&self) -> usize;
    fn lost(&self) -> u64;
}

impl<const N: usize> StressRing for MpscRing<Quote, N> {
    const NAME: &'static str = "mpsc";
    const CONSUMERS: usize = 1;

    fn publish(&self, quote: Quote) {
        self.emplace(|slot| *slot = quote);
    }

    fn consume(&self, f: &mut dyn FnMut(&Quote)) -> usize {
        self.dequeue(f)
    }

    fn backlog(&self) -> usize {
        self.len()
    }

    fn lost(&self) -> u64 {
        self.overruns()
    }
}

impl<const N: usize> StressRing for MpmcRing<Quote, N> {
    const NAME: &'static str = "mpmc";
    const CONSUMERS: usize = 2;

    fn publish(&self, quote: Quote) {
        self.enqueue(quote);
    }

    fn consume(&self, f: &mut dyn FnMut(&Quote)) -> usize {
        self.dequeue(f)
    }

    fn backlog(&self) -> usize {
        self.len()
    }

    fn lost(&self) -> u64 {
        self.overruns()
    }
}

impl<const N: usize> StressRing for LockedRing<Quote, N> {
    const NAME: &'static str = "locked";
    const CONSUMERS: usize = 2;

    fn publish(&self, quote: Quote) {
        self.enqueue(quote);
    }

    fn consume(&self, f: &mut dyn FnMut(&Quote)) -> usize {
        self.dequeue(f)
    }

    fn backlog(&self) -> usize {
        self.len()
    }

    fn lost(&self) -> u64 {
        self.overruns()
    }
}

fn is_intact(q: &Quote) -> bool {
    *q == Quote::synthetic(q.producer, q.seq)
}

/// Broadcast reader loop shared by every pass: follow from position 0 until
/// `done` is raised and the cursor has caught up.
fn follow<R: BroadcastRing<Quote>>(ring: &R, done: &AtomicBool) -> (u64, u64, u64) {
    let mut cursor = Cursor::at(0);
    let mut read = 0;
    let mut torn = 0;
    loop {
        let finished = done.load(Ordering::Acquire);
        read += cursor.drain(ring, |q| torn += u64::from(!is_intact(q)));
        if finished && cursor.lag(ring) == 0 {
            break;
        }
        std::hint::spin_loop();
    }
    (read, cursor.overruns(), torn)
}

fn stress_ring<R: StressRing>(config: &StressConfig, ring: &R) -> anyhow::Result<Outcome> {
    let per_producer = config.records_per_producer;
    let total = config.producers as u64 * per_producer;
    let high_water = ring.capacity() / 2;
    let consumed = AtomicU64::new(0);
    let torn = AtomicU64::new(0);
    let done = AtomicBool::new(false);
    let started = Instant::now();

    let (drained, readers) = thread::scope(|s| {
        for p in 0..config.producers {
            let done = &done;
            s.spawn(move || {
                for seq in 0..per_producer {
                    while ring.backlog() >= high_water {
                        // consumers gave up, nobody will make room
                        if done.load(Ordering::Relaxed) {
                            return;
                        }
                        std::hint::spin_loop();
                    }
                    ring.publish(Quote::synthetic(p as u16, seq));
                }
            });
        }

        for _ in 0..R::CONSUMERS {
            let (consumed, torn, done) = (&consumed, &torn, &done);
            s.spawn(move || {
                let mut local_torn = 0;
                while consumed.load(Ordering::Acquire) < total && !done.load(Ordering::Acquire) {
                    let n = ring.consume(&mut |q| local_torn += u64::from(!is_intact(q)));
                    consumed.fetch_add(n as u64, Ordering::AcqRel);
                }
                torn.fetch_add(local_torn, Ordering::Relaxed);
            });
        }

        let readers: Vec<_> = (0..config.broadcast_readers)
            .map(|_| {
                let done = &done;
                s.spawn(move || follow(ring, done))
            })
            .collect();

        let drained = wait_until(
            || consumed.load(Ordering::Acquire) >= total,
            DRAIN_POLL,
            DRAIN_TIMEOUT,
        );
        done.store(true, Ordering::Release);
        let readers: Vec<_> = readers.into_iter().map(|h| h.join()).collect();
        (drained, readers)
    });

    let mut outcome = Outcome {
        variant: R::NAME,
        consumed: consumed.into_inner(),
        torn: torn.into_inner(),
        overruns: ring.lost(),
        elapsed: started.elapsed(),
        ..Outcome::default()
    };
    for reader in readers {
        let Ok((read, lost, torn)) = reader else {
            bail!("{}: broadcast reader panicked", R::NAME);
        };
        outcome.broadcast_read += read;
        outcome.broadcast_overruns += lost;
        outcome.torn += torn;
    }
    if !drained {
        bail!(
            "{}: consumed {} of {} records before timing out",
            R::NAME,
            outcome.consumed,
            total
        );
    }
    Ok(outcome)
}

fn stress_spsc<const N: usize>(config: &StressConfig) -> anyhow::Result<Outcome> {
    let total = config.producers as u64 * config.records_per_producer;
    let mut ring = Box::new(SpscRing::<Quote, N>::new());
    let (mut tx, mut rx) = ring.split();
    let shared = tx.ring();
    let done = AtomicBool::new(false);
    let started = Instant::now();

    let (consumed, torn, readers) = thread::scope(|s| {
        s.spawn(move || {
            for seq in 0..total {
                while tx.ring().len() >= N / 2 {
                    std::hint::spin_loop();
                }
                tx.enqueue(Quote::synthetic(0, seq));
            }
        });
        let readers: Vec<_> = (0..config.broadcast_readers)
            .map(|_| {
                let done = &done;
                s.spawn(move || follow(shared, done))
            })
            .collect();

        let mut consumed = 0u64;
        let mut torn = 0u64;
        while consumed < total {
            consumed += rx.dequeue(|q| torn += u64::from(!is_intact(q))) as u64;
        }
        done.store(true, Ordering::Release);
        let readers: Vec<_> = readers.into_iter().map(|h| h.join()).collect();
        (consumed, torn, readers)
    });

    let mut outcome = Outcome {
        variant: "spsc",
        consumed,
        torn,
        overruns: ring.overruns(),
        elapsed: started.elapsed(),
        ..Outcome::default()
    };
    for reader in readers {
        let Ok((read, lost, torn)) = reader else {
            bail!("spsc: broadcast reader panicked");
        };
        outcome.broadcast_read += read;
        outcome.broadcast_overruns += lost;
        outcome.torn += torn;
    }
    Ok(outcome)
}

fn stress_log(config: &StressConfig) -> anyhow::Result<Outcome> {
    let per_producer = config.records_per_producer;
    let total = config.producers as u64 * per_producer;
    let log = LockedDynamicLog::with_capacity(total as usize);
    let started = Instant::now();

    let (read, torn) = thread::scope(|s| {
        for p in 0..config.producers {
            let log = &log;
            s.spawn(move || {
                for seq in 0..per_producer {
                    log.enqueue(Quote::synthetic(p as u16, seq));
                }
            });
        }
        let mut cursor = 0;
        let mut torn = 0u64;
        while cursor < total {
            cursor = log.dequeue_from(cursor, |q| torn += u64::from(!is_intact(q)));
        }
        (cursor, torn)
    });

    Ok(Outcome {
        variant: "dynamic_log",
        consumed: read,
        torn,
        elapsed: started.elapsed(),
        ..Outcome::default()
    })
}

/// Round trips between two threads over a pair of process-local events.
fn stress_local_event() -> anyhow::Result<Duration> {
    let ping = AutoResetEvent::new(false);
    let pong = AutoResetEvent::new(false);
    let started = Instant::now();

    thread::scope(|s| {
        let echo = s.spawn(|| {
            (0..EVENT_ROUND_TRIPS).all(|_| ping.wait_one_timeout(EVENT_WAIT) && {
                pong.set();
                true
            })
        });
        for i in 0..EVENT_ROUND_TRIPS {
            ping.set();
            if !pong.wait_one_timeout(EVENT_WAIT) {
                bail!("local event round trip {i} timed out");
            }
        }
        match echo.join() {
            Ok(true) => Ok(()),
            _ => bail!("local event echo thread failed"),
        }
    })?;

    Ok(started.elapsed() / EVENT_ROUND_TRIPS)
}

/// Same round trip through two independent mappings of shared event files,
/// as two processes would see them.
fn stress_shared_event(config: &StressConfig) -> anyhow::Result<Duration> {
    let ping_path = format!("{}.ping", config.event_path);
    let pong_path = format!("{}.pong", config.event_path);
    let ping = SharedAutoResetEvent::create(&ping_path, false)
        .with_context(|| format!("creating {ping_path}"))?;
    let pong = SharedAutoResetEvent::create(&pong_path, false)
        .with_context(|| format!("creating {pong_path}"))?;
    let remote_ping = SharedAutoResetEvent::open(&ping_path)?;
    let remote_pong = SharedAutoResetEvent::open(&pong_path)?;
    let started = Instant::now();

    let result = thread::scope(|s| {
        let echo = s.spawn(|| {
            (0..SHARED_EVENT_ROUND_TRIPS).all(|_| {
                remote_ping.wait_one_timeout(EVENT_WAIT) && {
                    remote_pong.set();
                    true
                }
            })
        });
        for i in 0..SHARED_EVENT_ROUND_TRIPS {
            ping.set();
            if !pong.wait_one_timeout(EVENT_WAIT) {
                bail!("shared event round trip {i} timed out");
            }
        }
        match echo.join() {
            Ok(true) => Ok(()),
            _ => bail!("shared event echo thread failed"),
        }
    });
    let elapsed = started.elapsed();

    for path in [&ping_path, &pong_path] {
        if let Err(e) = std::fs::remove_file(path) {
            debug!(path = %path, error = %e, "could not remove event file");
        }
    }
    result?;
    Ok(elapsed / SHARED_EVENT_ROUND_TRIPS)
}

pub fn run_all<const N: usize>(config: &StressConfig) -> anyhow::Result<()> {
    info!(capacity = N, "running ring stress passes");

    stress_spsc::<N>(config)?.report()?;

    let mpsc = Box::new(MpscRing::<Quote, N>::new());
    stress_ring(config, &*mpsc)?.report()?;

    let mpmc = Box::new(MpmcRing::<Quote, N>::new());
    stress_ring(config, &*mpmc)?.report()?;

    let locked = Box::new(LockedRing::<Quote, N>::new());
    stress_ring(config, &*locked)?.report()?;

    stress_log(config)?.report()?;

    let local = stress_local_event()?;
    info!(round_trip_ns = local.as_nanos() as u64, "auto reset event");
    let shared = stress_shared_event(config)?;
    info!(round_trip_ns = shared.as_nanos() as u64, "shared auto reset event");

    info!("all stress passes complete");
    Ok(())
}
