use std::hint::black_box;
use std::mem::{align_of, size_of};
use std::path::PathBuf;
use std::sync::Barrier;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use quartz_events::{Quote, SymbolId};
use quartz_perf::*;
use quartz_ring::{BroadcastRing, LockedRing, MpmcRing, MpscRing, SpscRing};
use quartz_sync::{CACHE_LINE_SIZE, RwSpinLock};

const CAP: usize = 4096;
const CROSS_THREAD_EVENTS: u64 = 200_000;

/// Latency of one record travelling producer → consumer across threads.
struct CrossThreadDiag {
    name: &'static str,
    stats: Option<Stats>,
    overruns: u64,
}

fn main() {
    let rusage_start = capture_rusage();
    let mut results: Vec<BenchResult> = Vec::new();

    print_banner();
    section_memory_layout();
    section_lock(&mut results);
    section_rings(&mut results);
    let cross = section_cross_thread();

    let rusage_end = capture_rusage();
    section_resources(&rusage_start, &rusage_end);
    save_results(&results, &cross, &rusage_start, &rusage_end);
}

fn print_banner() {
    let bar = "\u{2550}".repeat(90);
    println!("\n{bar}");
    println!("  QUARTZ PERFORMANCE REPORT");
    println!("  lock + ring micro benchmarks, cross-thread latency");
    println!("{bar}\n");

    let ncpu = thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(0);
    println!("  CPUs:        {ncpu}");
    println!("  Cache line:  {CACHE_LINE_SIZE} B (padding unit)");
}

fn section_memory_layout() {
    section_header("MEMORY LAYOUT");

    println!(
        "  {:<34} {:>10} {:>8} {:>12}",
        "Type", "Size", "Align", "Cache Lines"
    );
    println!("  {}", "\u{2500}".repeat(70));

    let line = CACHE_LINE_SIZE as u64;
    let types: &[(&str, usize, usize)] = &[
        ("Quote", size_of::<Quote>(), align_of::<Quote>()),
        ("SymbolId", size_of::<SymbolId>(), align_of::<SymbolId>()),
        ("RwSpinLock", size_of::<RwSpinLock>(), align_of::<RwSpinLock>()),
        (
            "SpscRing<Quote, 4096>",
            size_of::<SpscRing<Quote, CAP>>(),
            align_of::<SpscRing<Quote, CAP>>(),
        ),
        (
            "LockedRing<Quote, 4096>",
            size_of::<LockedRing<Quote, CAP>>(),
            align_of::<LockedRing<Quote, CAP>>(),
        ),
        (
            "MpscRing<Quote, 4096>",
            size_of::<MpscRing<Quote, CAP>>(),
            align_of::<MpscRing<Quote, CAP>>(),
        ),
        (
            "MpmcRing<Quote, 4096>",
            size_of::<MpmcRing<Quote, CAP>>(),
            align_of::<MpmcRing<Quote, CAP>>(),
        ),
    ];

    for &(name, size, align) in types {
        println!(
            "  {:<34} {:>10} {:>6} B {:>12}",
            name,
            format_bytes(size as u64),
            align,
            (size as u64).div_ceil(line)
        );
    }

    println!(
        "\n  * Stamped slots (MPSC/MPMC) are one 64 B line each: Quote ({} B) + stamp",
        size_of::<Quote>()
    );
}

fn section_lock(results: &mut Vec<BenchResult>) {
    section_header("RW SPIN LOCK (uncontended)");
    print_table_header();

    let lock = RwSpinLock::new();
    let rows = [
        measure_batched("write()", 1000, 10_000, 100, || {
            drop(black_box(lock.write()));
        }),
        measure_batched("read()", 1000, 10_000, 100, || {
            drop(black_box(lock.read()));
        }),
        measure_batched("upgradable().upgrade()", 1000, 10_000, 100, || {
            drop(black_box(lock.upgradable().upgrade()));
        }),
    ];
    for r in rows {
        print_result_row(&r);
        results.push(r);
    }
}

fn section_rings(results: &mut Vec<BenchResult>) {
    section_header("RINGS (single thread, enqueue + consume)");
    print_table_header();

    let quote = Quote::synthetic(0, 1);

    let mut spsc = Box::new(SpscRing::<Quote, CAP>::new());
    let (mut tx, mut rx) = spsc.split();
    let r = measure_batched("spsc enqueue+dequeue", 1000, 1000, 10, || {
        tx.enqueue(black_box(quote));
        rx.dequeue(|q| {
            black_box(q);
        });
    });
    print_result_row(&r);
    results.push(r);

    let mpsc = Box::new(MpscRing::<Quote, CAP>::new());
    let r = measure_batched("mpsc enqueue+dequeue", 1000, 1000, 10, || {
        mpsc.enqueue(black_box(quote));
        mpsc.dequeue(|q| {
            black_box(q);
        });
    });
    print_result_row(&r);
    results.push(r);

    let mpmc = Box::new(MpmcRing::<Quote, CAP>::new());
    let r = measure_batched("mpmc enqueue+dequeue", 1000, 1000, 10, || {
        mpmc.enqueue(black_box(quote));
        mpmc.dequeue(|q| {
            black_box(q);
        });
    });
    print_result_row(&r);
    results.push(r);

    let locked = Box::new(LockedRing::<Quote, CAP>::new());
    let r = measure_batched("locked enqueue+dequeue", 1000, 1000, 10, || {
        locked.enqueue(black_box(quote));
        locked.dequeue(|q| {
            black_box(q);
        });
    });
    print_result_row(&r);
    results.push(r);

    let mut cursor = mpmc.end_index();
    let r = measure_batched("mpmc enqueue+dequeue_from", 1000, 1000, 10, || {
        mpmc.enqueue(black_box(quote));
        cursor = mpmc.dequeue_from(cursor, |q| {
            black_box(q);
        });
    });
    print_result_row(&r);
    results.push(r);
}

/// Producer stamps each quote with the monotonic clock, consumer measures
/// the age of the quote when it sees it.
fn cross_thread<P, C>(name: &'static str, produce: P, mut consume: C) -> CrossThreadDiag
where
    P: Fn(u64) + Sync,
    C: FnMut(&mut dyn FnMut(&Quote)),
{
    let barrier = Barrier::new(2);
    let done = AtomicBool::new(false);
    let mut samples = Vec::with_capacity(CROSS_THREAD_EVENTS as usize);

    thread::scope(|s| {
        s.spawn(|| {
            barrier.wait();
            for seq in 0..CROSS_THREAD_EVENTS {
                produce(seq);
                // pace the producer so the consumer measures transit, not backlog
                for _ in 0..64 {
                    std::hint::spin_loop();
                }
            }
            done.store(true, Ordering::Release);
        });

        barrier.wait();
        loop {
            // a pass that starts after `done` sees every published record
            let finished = done.load(Ordering::Acquire);
            consume(&mut |q: &Quote| {
                samples.push(mono_now_ns().saturating_sub(q.ts_event_ns));
            });
            if finished {
                break;
            }
        }
    });

    let stats = (!samples.is_empty()).then(|| compute_stats(&mut samples));
    CrossThreadDiag {
        name,
        stats,
        overruns: 0,
    }
}

fn section_cross_thread() -> Vec<CrossThreadDiag> {
    section_header("CROSS-THREAD LATENCY (producer stamp -> consumer read)");
    println!(
        "  {:<20} {:>8} {:>8} {:>8} {:>8} {:>8} {:>10}",
        "Ring", "p50", "p90", "p99", "p99.9", "max", "overruns"
    );
    println!("  {}", "\u{2500}".repeat(80));

    let mut out = Vec::new();

    let mpsc = Box::new(MpscRing::<Quote, CAP>::new());
    let mut d = cross_thread(
        "mpsc",
        |seq| {
            mpsc.enqueue(make_test_quote(0, seq));
        },
        |f| {
            mpsc.dequeue(f);
        },
    );
    d.overruns = mpsc.overruns();
    out.push(d);

    let mpmc = Box::new(MpmcRing::<Quote, CAP>::new());
    let mut d = cross_thread(
        "mpmc",
        |seq| {
            mpmc.enqueue(make_test_quote(0, seq));
        },
        |f| {
            mpmc.dequeue(f);
        },
    );
    d.overruns = mpmc.overruns();
    out.push(d);

    let locked = Box::new(LockedRing::<Quote, CAP>::new());
    let mut d = cross_thread(
        "locked",
        |seq| {
            locked.enqueue(make_test_quote(0, seq));
        },
        |f| {
            locked.dequeue(f);
        },
    );
    d.overruns = locked.overruns();
    out.push(d);

    let broadcast = Box::new(MpmcRing::<Quote, CAP>::new());
    let mut cursor = quartz_ring::Cursor::at(0);
    let mut d = cross_thread(
        "mpmc cursor",
        |seq| {
            broadcast.enqueue(make_test_quote(0, seq));
        },
        |f| {
            cursor.drain(&*broadcast, f);
        },
    );
    d.overruns = cursor.overruns();
    out.push(d);

    for d in &out {
        if let Some(s) = &d.stats {
            println!(
                "  {:<20} {:>8} {:>8} {:>8} {:>8} {:>8} {:>10}",
                d.name, s.p50, s.p90, s.p99, s.p999, s.max, d.overruns
            );
        }
    }
    println!("\n  * values in ns");
    out
}

fn section_resources(start: &ResourceSnapshot, end: &ResourceSnapshot) {
    section_header("RESOURCE USAGE");
    println!("  Max RSS:              {}", format_bytes(end.max_rss_bytes.max(0) as u64));
    println!(
        "  Minor faults:         {}",
        end.minor_faults.saturating_sub(start.minor_faults)
    );
    println!(
        "  Major faults:         {}",
        end.major_faults.saturating_sub(start.major_faults)
    );
    println!(
        "  Voluntary ctx sw:     {}",
        end.vol_ctx_switches.saturating_sub(start.vol_ctx_switches)
    );
    println!(
        "  Involuntary ctx sw:   {}",
        end.invol_ctx_switches.saturating_sub(start.invol_ctx_switches)
    );
}

fn save_results(
    results: &[BenchResult],
    cross: &[CrossThreadDiag],
    rusage_start: &ResourceSnapshot,
    rusage_end: &ResourceSnapshot,
) {
    // CARGO_MANIFEST_DIR = perf/, report goes next to the criterion output
    let json_path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("target")
        .join("quartz_perf_report.json");

    let cross_json: Vec<_> = cross
        .iter()
        .map(|d| {
            serde_json::json!({
                "ring": d.name,
                "latency_ns": d.stats,
                "overruns": d.overruns,
            })
        })
        .collect();

    let output = serde_json::json!({
        "capacity": CAP,
        "micro": results,
        "cross_thread": cross_json,
        "resources": {
            "start": rusage_start,
            "end": rusage_end,
        },
    });

    let bar = "\u{2550}".repeat(90);
    let written = serde_json::to_string_pretty(&output)
        .map_err(std::io::Error::other)
        .and_then(|json| {
            if let Some(dir) = json_path.parent() {
                std::fs::create_dir_all(dir)?;
            }
            std::fs::write(&json_path, json)
        });
    match written {
        Ok(()) => {
            println!("\n{bar}");
            println!("  Results saved to: {}", json_path.display());
            println!("{bar}\n");
        }
        Err(e) => eprintln!("\n  [failed to save results: {e}]\n"),
    }
}
