#![no_main]

use std::collections::BTreeMap;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use kairos_sched::{Event, ImpactMatrix, QueueEngine, SchedulerConfig, StrategySet};
use kairos_types::{Context, EventKey, EventKind, EventUid, NodeId, Timestamp};

const ENTITIES: usize = 4;

// ============================================================================
// Arbitrary Inputs
// ============================================================================

#[derive(Debug, Clone, Copy, Arbitrary)]
enum FuzzKind {
    Undefined,
    Timeout,
    Stop,
    Outgoing,
}

impl From<FuzzKind> for EventKind {
    fn from(kind: FuzzKind) -> Self {
        match kind {
            FuzzKind::Undefined => EventKind::Undefined,
            FuzzKind::Timeout => EventKind::Timeout,
            FuzzKind::Stop => EventKind::Stop,
            FuzzKind::Outgoing => EventKind::Outgoing,
        }
    }
}

#[derive(Debug, Clone, Arbitrary)]
enum FuzzOp {
    Insert {
        ts: u16,
        owner: u8,
        sender: u8,
        kind: FuzzKind,
    },
    Pop,
    Peek,
    Remove { pick: u16 },
}

#[derive(Debug, Clone, Arbitrary)]
struct FuzzInput {
    strategies: u8,
    latency: u8,
    ops: Vec<FuzzOp>,
}

fn strategies(bits: u8) -> StrategySet {
    let local_lists = bits & 0b1000 != 0;
    StrategySet {
        path_reduction: bits & 0b0001 != 0,
        remove_cancelled: bits & 0b0010 != 0,
        waiting_list: bits & 0b0100 != 0,
        local_lists,
        local_lists_v2: local_lists && bits & 0b1_0000 != 0,
    }
}

fn context(owner: u8) -> Context {
    match owner as usize % (ENTITIES + 1) {
        0 => Context::Global,
        n => Context::node(n as u32 - 1),
    }
}

/// Entities on a line: each one talks to its neighbors.
fn line_interfaces() -> Vec<Vec<NodeId>> {
    (0..ENTITIES as u32)
        .map(|n| {
            [n.checked_sub(1), Some(n + 1)]
                .into_iter()
                .flatten()
                .filter(|&m| (m as usize) < ENTITIES)
                .map(NodeId::new)
                .collect()
        })
        .collect()
}

/// Kind the event carries when it leaves the engine. Under the credit rule an
/// outgoing event between two distinct entities is delivered as incoming.
fn delivered_kind(kind: EventKind, sender: Context, dest: Context, credits: bool) -> EventKind {
    let crosses = !sender.is_global() && !dest.is_global() && sender != dest;
    if credits && kind == EventKind::Outgoing && crosses {
        EventKind::Incoming
    } else {
        kind
    }
}

// ============================================================================
// Target
// ============================================================================

fuzz_target!(|input: FuzzInput| {
    let config = SchedulerConfig::new(ENTITIES)
        .with_impact_latency(ImpactMatrix::uniform(ENTITIES, u64::from(input.latency % 16)))
        .with_interfaces(line_interfaces())
        .with_strategies(strategies(input.strategies));
    let credits = config.strategies.local_lists_v2;
    let mut engine = QueueEngine::new(&config).expect("valid config");
    // Live keys and the kind each must be returned with.
    let mut model: BTreeMap<EventKey, EventKind> = BTreeMap::new();
    let mut uid = EventUid::FIRST;

    for op in input.ops.iter().take(512) {
        match *op {
            FuzzOp::Insert {
                ts,
                owner,
                sender,
                kind,
            } => {
                let (dest, sender) = (context(owner), context(sender));
                let key = EventKey::new(Timestamp::new(u64::from(ts)), uid, dest);
                uid = uid.next();
                let kind = EventKind::from(kind);
                let event = Event::new(key, kind).with_prev_context(sender);
                engine.insert(event).expect("no exploration");
                model.insert(key, delivered_kind(kind, sender, dest, credits));
            }
            FuzzOp::Pop => match engine.remove_next() {
                // Credits may hold back the minimum, so only membership holds.
                Some(event) if credits => {
                    assert_eq!(model.remove(&event.key), Some(event.kind));
                }
                Some(event) => {
                    assert_eq!(model.pop_first(), Some((event.key, event.kind)));
                }
                None => assert!(model.is_empty()),
            },
            FuzzOp::Peek => match engine.peek_next() {
                Some(key) if credits => assert!(model.contains_key(&key)),
                peeked => assert_eq!(peeked, model.keys().next().copied()),
            },
            FuzzOp::Remove { pick } => {
                let Some(&victim) = model.keys().nth(usize::from(pick) % model.len().max(1))
                else {
                    continue;
                };
                model.remove(&victim);
                let removed = engine.remove(&victim).expect("live event");
                assert_eq!(removed.key, victim);
            }
        }
        assert_eq!(engine.len(), model.len());
    }

    let drained = engine.drain();
    assert_eq!(drained.len(), model.len());
});
