//! Booking engine benchmarks
//!
//! - Planning: pure join planning against an in-memory snapshot
//! - Engine: join + leave round trip over the in-memory store
//! - Contention: many attendees racing for the same event
//!
//! Run with: `cargo bench -p attendance-runtime`

#![allow(missing_docs)] // Benchmarks don't need extensive docs
#![allow(clippy::expect_used)] // Benchmarks can use expect for setup

use attendance_core::{
    Caller, EventDraft, EventId, EventType, JoinTransaction, LedgerSnapshot, LedgerTransaction,
    UserId, Utc, Version, Versioned,
};
use attendance_testing::{TestHarness, attendee, guests, host};
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

fn benchmark_planning(c: &mut Criterion) {
    let mut group = c.benchmark_group("planning");

    let event = EventDraft::new("Bench", 1_000)
        .with_type(EventType::Group)
        .into_event(EventId::new(), UserId::new("host"), Utc::now());
    let snapshot = LedgerSnapshot::new(Versioned::new(event.clone(), Version::INITIAL), None);

    for guest_count in [0_usize, 3, 9] {
        let tx = JoinTransaction::new(
            event.id,
            Caller::new("bench-user", "Bench User"),
            guests(guest_count),
        );
        group.bench_with_input(
            BenchmarkId::new("join_plan", guest_count),
            &tx,
            |b, tx| {
                b.iter(|| black_box(tx.plan(black_box(&snapshot), Utc::now())));
            },
        );
    }

    group.finish();
}

fn benchmark_engine(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine");
    group.throughput(Throughput::Elements(2));

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("Failed to build runtime");

    let (harness, event_id) = runtime.block_on(async {
        let harness = TestHarness::new();
        let event = harness
            .engine
            .create_event(&host(), EventDraft::new("Bench", 100))
            .await
            .expect("create event");
        (harness, event.id)
    });
    let caller = attendee(1);

    group.bench_function("join_then_leave", |b| {
        b.to_async(&runtime).iter(|| async {
            harness
                .engine
                .join_event(event_id, &caller, guests(1))
                .await
                .expect("join");
            harness
                .engine
                .leave_event(event_id, &caller)
                .await
                .expect("leave");
        });
    });

    group.finish();
}

fn benchmark_contention(c: &mut Criterion) {
    let mut group = c.benchmark_group("contention");
    group.sample_size(20);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .enable_all()
        .build()
        .expect("Failed to build runtime");

    for attendees in [8_usize, 32] {
        group.throughput(Throughput::Elements(attendees as u64));
        group.bench_with_input(
            BenchmarkId::new("concurrent_joins", attendees),
            &attendees,
            |b, &attendees| {
                b.to_async(&runtime).iter(|| async move {
                    let harness = TestHarness::new();
                    let event = harness
                        .engine
                        .create_event(&host(), EventDraft::new("Bench", 16))
                        .await
                        .expect("create event");

                    let handles: Vec<_> = (0..attendees)
                        .map(|n| {
                            let engine = harness.engine.clone();
                            tokio::spawn(async move {
                                let _ = engine.join_event(event.id, &attendee(n), vec![]).await;
                            })
                        })
                        .collect();

                    for handle in handles {
                        handle.await.expect("Task failed");
                    }
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, benchmark_planning, benchmark_engine, benchmark_contention);
criterion_main!(benches);
