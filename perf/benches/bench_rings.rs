use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};
use quartz_events::Quote;
use quartz_ring::{BroadcastRing, LockedDynamicLog, LockedRing, MpmcRing, MpscRing, SpscRing};

const CAP: usize = 4096;

fn bench_enqueue(c: &mut Criterion) {
    let quote = Quote::synthetic(1, 42);
    let mut group = c.benchmark_group("enqueue");
    group.throughput(Throughput::Elements(1));

    let mut spsc = Box::new(SpscRing::<Quote, CAP>::new());
    let (mut tx, _rx) = spsc.split();
    group.bench_function("spsc", |b| b.iter(|| tx.enqueue(black_box(quote))));

    let mpsc = Box::new(MpscRing::<Quote, CAP>::new());
    group.bench_function("mpsc", |b| b.iter(|| mpsc.enqueue(black_box(quote))));

    let mpmc = Box::new(MpmcRing::<Quote, CAP>::new());
    group.bench_function("mpmc", |b| b.iter(|| mpmc.enqueue(black_box(quote))));

    let locked = Box::new(LockedRing::<Quote, CAP>::new());
    group.bench_function("locked", |b| b.iter(|| locked.enqueue(black_box(quote))));

    group.finish();
}

/// Enqueue one record and consume it straight away: the steady state of a
/// consumer that keeps up.
fn bench_round_trip(c: &mut Criterion) {
    let quote = Quote::synthetic(1, 42);
    let mut group = c.benchmark_group("round_trip");
    group.throughput(Throughput::Elements(1));

    let mut spsc = Box::new(SpscRing::<Quote, CAP>::new());
    let (mut tx, mut rx) = spsc.split();
    group.bench_function("spsc", |b| {
        b.iter(|| {
            tx.enqueue(black_box(quote));
            rx.dequeue(|q| {
                black_box(q);
            })
        })
    });

    let mpsc = Box::new(MpscRing::<Quote, CAP>::new());
    group.bench_function("mpsc", |b| {
        b.iter(|| {
            mpsc.enqueue(black_box(quote));
            mpsc.dequeue(|q| {
                black_box(q);
            })
        })
    });

    let mpmc = Box::new(MpmcRing::<Quote, CAP>::new());
    group.bench_function("mpmc", |b| {
        b.iter(|| {
            mpmc.enqueue(black_box(quote));
            mpmc.dequeue(|q| {
                black_box(q);
            })
        })
    });

    let locked = Box::new(LockedRing::<Quote, CAP>::new());
    group.bench_function("locked", |b| {
        b.iter(|| {
            locked.enqueue(black_box(quote));
            locked.dequeue(|q| {
                black_box(q);
            })
        })
    });

    group.finish();
}

/// Broadcast replay of a full ring from a cursor.
fn bench_drain_from(c: &mut Criterion) {
    let mut group = c.benchmark_group("drain_from");
    group.throughput(Throughput::Elements(CAP as u64));

    let mpmc = Box::new(MpmcRing::<Quote, CAP>::new());
    for seq in 0..CAP as u64 {
        mpmc.enqueue(Quote::synthetic(0, seq));
    }
    group.bench_function("mpmc_full_ring", |b| {
        b.iter(|| {
            mpmc.dequeue_from(0, |q| {
                black_box(q);
            })
        })
    });

    let locked = Box::new(LockedRing::<Quote, CAP>::new());
    for seq in 0..CAP as u64 {
        locked.enqueue(Quote::synthetic(0, seq));
    }
    group.bench_function("locked_full_ring", |b| {
        b.iter(|| {
            locked.dequeue_from(0, |q| {
                black_box(q);
            })
        })
    });

    let log = LockedDynamicLog::with_capacity(CAP);
    for seq in 0..CAP as u64 {
        log.enqueue(Quote::synthetic(0, seq));
    }
    group.bench_function("dynamic_log", |b| {
        b.iter(|| {
            log.dequeue_from(0, |q| {
                black_box(q);
            })
        })
    });

    group.finish();
}

criterion_group!(benches, bench_enqueue, bench_round_trip, bench_drain_from);
criterion_main!(benches);
