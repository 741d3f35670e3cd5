//! Queue engine benchmarks.
//!
//! Compares insertion and drain cost across strategy combinations.

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use kairos_sched::{Event, ImpactMatrix, QueueEngine, SchedulerConfig, StrategySet};
use kairos_types::{Context, EventKey, EventKind, EventUid, Timestamp};
use rand::{Rng, SeedableRng, rngs::SmallRng};

const ENTITIES: usize = 8;

fn workload(size: usize) -> Vec<Event> {
    let mut rng = SmallRng::seed_from_u64(0x6b61_6972);
    let mut uid = EventUid::FIRST;
    (0..size)
        .map(|i| {
            let ts = Timestamp::new(rng.gen_range(0..10_000));
            let context = Context::node(rng.gen_range(0..ENTITIES as u32));
            let kind = if i % 16 == 0 {
                EventKind::Timeout
            } else {
                EventKind::Undefined
            };
            let key = EventKey::new(ts, uid, context);
            uid = uid.next();
            Event::new(key, kind)
        })
        .collect()
}

fn strategies() -> Vec<(&'static str, StrategySet)> {
    let plain = StrategySet::plain();
    vec![
        ("plain", plain),
        (
            "path_reduction",
            StrategySet {
                path_reduction: true,
                ..plain
            },
        ),
        (
            "waiting_list",
            StrategySet {
                waiting_list: true,
                ..plain
            },
        ),
        (
            "local_lists",
            StrategySet {
                local_lists: true,
                ..plain
            },
        ),
        ("all", StrategySet::all()),
    ]
}

// ============================================================================
// Insert + Drain
// ============================================================================

fn bench_insert_drain(c: &mut Criterion) {
    let mut group = c.benchmark_group("queue_insert_drain");

    for size in [100, 1_000, 5_000] {
        let events = workload(size);
        group.throughput(Throughput::Elements(size as u64));

        for (name, strategies) in strategies() {
            let config = SchedulerConfig::new(ENTITIES)
                .with_impact_latency(ImpactMatrix::uniform(ENTITIES, 5))
                .with_strategies(strategies);

            group.bench_with_input(BenchmarkId::new(name, size), &events, |b, events| {
                b.iter_batched(
                    || (QueueEngine::new(&config).unwrap(), events.clone()),
                    |(mut engine, events)| {
                        for event in events {
                            engine.insert(event).unwrap();
                        }
                        while let Some(event) = engine.remove_next() {
                            black_box(event);
                        }
                    },
                    criterion::BatchSize::SmallInput,
                );
            });
        }
    }

    group.finish();
}

criterion_group!(benches, bench_insert_drain);
criterion_main!(benches);
