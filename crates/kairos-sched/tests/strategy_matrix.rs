//! Ordering, conservation and barrier properties across every strategy
//! combination.

use std::collections::{BTreeMap, BTreeSet};

use kairos_sched::{Event, ImpactMatrix, QueueEngine, SchedulerConfig, StrategySet};
use kairos_types::{Context, EventKey, EventKind, EventUid, NodeId, Timestamp};
use proptest::prelude::*;
use test_case::test_case;

const ENTITIES: usize = 3;

fn strategies(bits: u8) -> StrategySet {
    StrategySet {
        path_reduction: bits & 0b0001 != 0,
        remove_cancelled: bits & 0b0010 != 0,
        waiting_list: bits & 0b0100 != 0,
        local_lists: bits & 0b1000 != 0,
        local_lists_v2: false,
    }
}

/// The sixteen combinations plus local lists v2 on top of everything.
fn every_combination() -> Vec<StrategySet> {
    let mut all: Vec<_> = StrategySet::combinations().collect();
    all.push(StrategySet::all());
    all
}

fn engine(strategies: StrategySet, latency: u64) -> QueueEngine {
    let config = SchedulerConfig::new(ENTITIES)
        .with_impact_latency(ImpactMatrix::uniform(ENTITIES, latency))
        .with_strategies(strategies);
    QueueEngine::new(&config).expect("valid config")
}

fn context(index: u8) -> Context {
    match index % (ENTITIES as u8 + 1) {
        0 => Context::Global,
        n => Context::node(u32::from(n) - 1),
    }
}

fn kind(index: u8) -> EventKind {
    match index % 4 {
        0 | 1 => EventKind::Undefined,
        2 => EventKind::Timeout,
        _ => EventKind::Stop,
    }
}

fn drain_order(engine: &mut QueueEngine) -> Vec<(u64, u64)> {
    std::iter::from_fn(|| engine.remove_next())
        .map(|e| (e.key.ts.as_u64(), e.key.uid.as_u64()))
        .collect()
}

// ============================================================================
// Fixed Scenarios
// ============================================================================

#[test_case(0b0000; "plain list, cancelled kept")]
#[test_case(0b0001; "path reduction")]
#[test_case(0b0010; "remove cancelled")]
#[test_case(0b0011; "path reduction, remove cancelled")]
#[test_case(0b0100; "waiting list")]
#[test_case(0b0101; "waiting list, path reduction")]
#[test_case(0b0110; "waiting list, remove cancelled")]
#[test_case(0b0111; "waiting list, path reduction, remove cancelled")]
#[test_case(0b1000; "local lists")]
#[test_case(0b1001; "local lists, path reduction")]
#[test_case(0b1010; "local lists, remove cancelled")]
#[test_case(0b1011; "local lists, path reduction, remove cancelled")]
#[test_case(0b1100; "local lists, waiting list")]
#[test_case(0b1101; "local lists, waiting list, path reduction")]
#[test_case(0b1110; "local lists, waiting list, remove cancelled")]
#[test_case(0b1111; "every toggle")]
fn test_three_event_scenario(bits: u8) {
    let mut engine = engine(strategies(bits), 0);
    for (ts, uid) in [(5, 1), (5, 0), (3, 2)] {
        let key = EventKey::new(Timestamp::new(ts), EventUid::new(uid), Context::Global);
        engine.insert(Event::new(key, EventKind::Undefined)).unwrap();
    }
    assert_eq!(drain_order(&mut engine), vec![(3, 2), (5, 0), (5, 1)]);
}

#[test]
fn test_lookahead_scenario() {
    let config = SchedulerConfig::new(2)
        .with_impact_latency(ImpactMatrix::from_rows(vec![vec![0, 5], vec![5, 0]]).unwrap())
        .with_strategies(strategies(0b1000));
    let mut engine = QueueEngine::new(&config).unwrap();

    let a = EventKey::new(Timestamp::new(10), EventUid::new(4), Context::node(0));
    let b = EventKey::new(Timestamp::new(12), EventUid::new(5), Context::node(1));
    engine.insert(Event::new(b, EventKind::Undefined)).unwrap();
    engine.insert(Event::new(a, EventKind::Undefined)).unwrap();

    assert_eq!(engine.peek_next(), Some(a));
    assert_eq!(engine.remove_next().map(|e| e.key), Some(a));
    assert_eq!(engine.remove_next().map(|e| e.key), Some(b));
    assert!(engine.is_empty());
}

// ============================================================================
// Properties
// ============================================================================

#[derive(Debug, Clone)]
enum Op {
    Insert { ts: u64, context: u8, kind: u8 },
    Pop,
    Cancel { pick: usize },
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0u64..40, any::<u8>(), any::<u8>())
            .prop_map(|(ts, context, kind)| Op::Insert { ts, context, kind }),
        2 => Just(Op::Pop),
        1 => any::<usize>().prop_map(|pick| Op::Cancel { pick }),
    ]
}

/// Runs `ops` against `engine` and a sorted-set model, asserting that every
/// pop returns the model minimum. Returns the observed pop sequence.
fn run_against_model(engine: &mut QueueEngine, ops: &[Op]) -> Vec<(u64, u64)> {
    let mut model: BTreeSet<(u64, u64, Context)> = BTreeSet::new();
    let mut next_uid = EventUid::FIRST;
    let mut popped = Vec::new();
    let mut inserted = 0usize;
    let mut cancelled = 0usize;

    for op in ops {
        match *op {
            Op::Insert { ts, context: c, kind: k } => {
                let key = EventKey::new(Timestamp::new(ts), next_uid, context(c));
                next_uid = next_uid.next();
                engine.insert(Event::new(key, kind(k))).unwrap();
                model.insert((ts, key.uid.as_u64(), key.context));
                inserted += 1;
            }
            Op::Pop => {
                let expected = model.pop_first();
                let got = engine.remove_next();
                assert_eq!(
                    got.as_ref().map(|e| (e.key.ts.as_u64(), e.key.uid.as_u64(), e.key.context)),
                    expected
                );
                if let Some(e) = got {
                    popped.push((e.key.ts.as_u64(), e.key.uid.as_u64()));
                }
            }
            Op::Cancel { pick } => {
                if model.is_empty() {
                    continue;
                }
                let victim = *model.iter().nth(pick % model.len()).unwrap();
                model.remove(&victim);
                let key = EventKey::new(
                    Timestamp::new(victim.0),
                    EventUid::new(victim.1),
                    victim.2,
                );
                let removed = engine.remove(&key).expect("live event must be found");
                assert_eq!(removed.key, key);
                cancelled += 1;
            }
        }
        assert_eq!(engine.len(), model.len());
    }

    while let Some((ts, uid, _)) = model.pop_first() {
        let e = engine.remove_next().expect("engine ran dry before the model");
        assert_eq!((e.key.ts.as_u64(), e.key.uid.as_u64()), (ts, uid));
        popped.push((ts, uid));
    }
    assert!(engine.remove_next().is_none());
    assert_eq!(popped.len() + cancelled, inserted);
    popped
}

// ============================================================================
// Local Lists v2
// ============================================================================

/// Entities 0 - 1 - 2 on a line with 5 ms links, credits on every interface.
fn line_engine(strategies: StrategySet) -> QueueEngine {
    let link = |a, b| (NodeId::new(a), NodeId::new(b), 5);
    let config = SchedulerConfig::new(ENTITIES)
        .with_impact_latency(ImpactMatrix::from_links(ENTITIES, &[link(0, 1), link(1, 2)]))
        .with_interfaces(vec![
            vec![NodeId::new(1)],
            vec![NodeId::new(0), NodeId::new(2)],
            vec![NodeId::new(1)],
        ])
        .with_strategies(strategies.with_local_lists_v2());
    QueueEngine::new(&config).expect("valid config")
}

#[derive(Debug, Clone)]
enum MessageOp {
    Send { ts: u64, from: u8, to: u8 },
    Local { ts: u64, owner: u8, timeout: bool },
    Pop,
    Cancel { pick: usize },
}

fn message_op() -> impl Strategy<Value = MessageOp> {
    prop_oneof![
        3 => (0u64..40, any::<u8>(), any::<u8>())
            .prop_map(|(ts, from, to)| MessageOp::Send { ts, from, to }),
        2 => (0u64..40, any::<u8>(), any::<bool>())
            .prop_map(|(ts, owner, timeout)| MessageOp::Local { ts, owner, timeout }),
        3 => Just(MessageOp::Pop),
        1 => any::<usize>().prop_map(|pick| MessageOp::Cancel { pick }),
    ]
}

/// Pops one event and checks it against `live`, which maps every queued key
/// to the kind it must come out with. Returns false once the engine is empty.
fn pop_live(engine: &mut QueueEngine, live: &mut BTreeMap<EventKey, EventKind>) -> bool {
    let Some(event) = engine.remove_next() else {
        assert!(live.is_empty(), "engine ran dry with {} events live", live.len());
        return false;
    };
    let expected = live
        .remove(&event.key)
        .unwrap_or_else(|| panic!("{} is not live, returned twice or never inserted", event.key));
    assert_eq!(event.kind, expected, "kind of {}", event.key);
    true
}

/// Runs `ops` on a v2 engine, asserting that every inserted event leaves
/// exactly once, by pop or by removal.
fn run_messages(engine: &mut QueueEngine, ops: &[MessageOp]) {
    let mut live: BTreeMap<EventKey, EventKind> = BTreeMap::new();
    let mut next_uid = EventUid::FIRST;
    let mut inserted = 0usize;
    let mut popped = 0usize;
    let mut cancelled = 0usize;

    for op in ops {
        match *op {
            MessageOp::Send { ts, from, to } => {
                let (sender, dest) = (context(from), context(to));
                let key = EventKey::new(Timestamp::new(ts), next_uid, dest);
                next_uid = next_uid.next();
                let event = Event::new(key, EventKind::Outgoing).with_prev_context(sender);
                engine.insert(event).unwrap();
                let crosses = !sender.is_global() && !dest.is_global() && sender != dest;
                let delivered = if crosses {
                    EventKind::Incoming
                } else {
                    EventKind::Outgoing
                };
                live.insert(key, delivered);
                inserted += 1;
            }
            MessageOp::Local { ts, owner, timeout } => {
                let key = EventKey::new(Timestamp::new(ts), next_uid, context(owner));
                next_uid = next_uid.next();
                let kind = if timeout {
                    EventKind::Timeout
                } else {
                    EventKind::Undefined
                };
                engine.insert(Event::new(key, kind)).unwrap();
                live.insert(key, kind);
                inserted += 1;
            }
            MessageOp::Pop => {
                if pop_live(engine, &mut live) {
                    popped += 1;
                }
            }
            MessageOp::Cancel { pick } => {
                if live.is_empty() {
                    continue;
                }
                let key = *live.keys().nth(pick % live.len()).unwrap();
                live.remove(&key);
                let removed = engine.remove(&key).expect("live event must be found");
                assert_eq!(removed.key, key);
                cancelled += 1;
            }
        }
        assert_eq!(engine.len(), live.len());
    }

    while pop_live(engine, &mut live) {
        popped += 1;
    }
    assert!(engine.is_empty());
    assert_eq!(popped + cancelled, inserted);
}

#[test]
fn test_crossing_message_is_delivered_as_incoming() {
    let mut engine = line_engine(StrategySet::plain());
    let key = EventKey::new(Timestamp::new(5), EventUid::new(4), Context::node(1));
    engine
        .insert(Event::new(key, EventKind::Outgoing).with_prev_context(Context::node(0)))
        .unwrap();
    assert_eq!(engine.len(), 1);

    let delivered = engine.remove_next().expect("message delivered");
    assert_eq!(delivered.key, key);
    assert_eq!(delivered.kind, EventKind::Incoming);
    assert_eq!(engine.deadlocks(), 1);
    assert!(engine.is_empty());
}

proptest! {
    #[test]
    fn prop_messages_leave_exactly_once_under_credits(
        ops in prop::collection::vec(message_op(), 0..120),
    ) {
        for bits in 0u8..8 {
            let strategies = StrategySet {
                path_reduction: bits & 0b001 != 0,
                remove_cancelled: bits & 0b010 != 0,
                waiting_list: bits & 0b100 != 0,
                ..StrategySet::plain()
            };
            run_messages(&mut line_engine(strategies), &ops);
        }
    }

    #[test]
    fn prop_total_order_for_every_combination(
        ops in prop::collection::vec(op(), 0..120),
        latency in 0u64..8,
    ) {
        for strategies in every_combination() {
            let mut engine = engine(strategies, latency);
            let popped = run_against_model(&mut engine, &ops);
            let mut seen = BTreeSet::new();
            for (_, uid) in &popped {
                prop_assert!(seen.insert(*uid), "uid {} returned twice", uid);
            }
        }
    }

    #[test]
    fn prop_path_reduction_changes_nothing(
        ops in prop::collection::vec(op(), 0..120),
        waiting_list in any::<bool>(),
    ) {
        let base = StrategySet { waiting_list, ..StrategySet::plain() };
        let reduced = StrategySet { path_reduction: true, ..base };
        let plain_order = run_against_model(&mut engine(base, 0), &ops);
        let reduced_order = run_against_model(&mut engine(reduced, 0), &ops);
        prop_assert_eq!(plain_order, reduced_order);
    }

    #[test]
    fn prop_cancelled_barrier_is_invisible(
        barrier_ts in 1u64..30,
        front_ts in 0u64..30,
        behind in prop::collection::vec(0u64..60, 1..20),
        local_lists in any::<bool>(),
    ) {
        let strategies = StrategySet {
            waiting_list: true,
            local_lists,
            ..StrategySet::plain()
        };

        let key = |ts: u64, uid: u64| EventKey::new(Timestamp::new(ts), EventUid::new(uid), Context::node(0));
        let front = Event::new(key(front_ts.min(barrier_ts - 1), 4), EventKind::Undefined);
        let barrier = Event::new(key(barrier_ts, 5), EventKind::Timeout);
        let barrier_key = barrier.key;

        let mut with_barrier = engine(strategies, 0);
        let mut without = engine(strategies, 0);
        with_barrier.insert(front.clone()).unwrap();
        without.insert(front).unwrap();
        with_barrier.insert(barrier).unwrap();
        for (offset, ts) in behind.iter().enumerate() {
            let event = Event::new(key(*ts, 6 + offset as u64), EventKind::Undefined);
            with_barrier.insert(event.clone()).unwrap();
            without.insert(event).unwrap();
        }

        let removed = with_barrier.remove(&barrier_key).expect("barrier queued");
        prop_assert!(removed.pending().is_empty());
        prop_assert_eq!(with_barrier.len(), without.len());
        prop_assert_eq!(drain_order(&mut with_barrier), drain_order(&mut without));
    }
}
