//! Per-entity partitioning with lookahead-based selection.
//!
//! Events are split into one [`ListQueue`] per entity plus one lane for
//! simulator-owned events. The next event is taken from a lane whose front is
//! *safe*: no other lane's front, shifted by the impact latency between the
//! two lanes, could still precede it. The simulator lane has zero latency to
//! every entity.
//!
//! With the v2 credit rule, outgoing events whose sender and destination
//! differ are parked in the sender's lane. Such an event may only leave the
//! sender once the sender holds inbound credit on every one of its
//! interfaces; leaving converts it to an incoming event in the destination's
//! lane. When every safe front is a blocked outgoing event the engine records
//! a deadlock and falls back to plain lookahead.

use std::collections::BTreeMap;

use kairos_types::{Context, EventKey, EventKind, NodeId};
use tracing::{debug, trace, warn};

use crate::{
    Event, ImpactMatrix, ListPolicy, ListQueue, LookaheadBoundary, Scheduler, SchedulerConfig,
};

/// Lane index of simulator-owned events.
const GLOBAL_LANE: usize = 0;

fn lane_of(context: Context) -> usize {
    match context {
        Context::Global => GLOBAL_LANE,
        Context::Node(id) => id.index() + 1,
    }
}

// ============================================================================
// Inbound Credits
// ============================================================================

/// Per-entity, per-interface count of incoming events delivered but not yet
/// consumed.
#[derive(Debug, Clone, Default)]
pub struct CreditTable {
    interfaces: Vec<Vec<usize>>,
    /// `inbound[dest][sender]`.
    inbound: Vec<Vec<u32>>,
}

impl CreditTable {
    pub fn new(entities: usize, interfaces: &[Vec<NodeId>]) -> Self {
        let mut table = Self {
            interfaces: vec![Vec::new(); entities],
            inbound: vec![vec![0; entities]; entities],
        };
        for (node, neighbors) in interfaces.iter().enumerate() {
            table.interfaces[node] = neighbors.iter().map(|n| n.index()).collect();
        }
        table
    }

    /// Records an incoming event from `sender` reaching `dest`.
    pub fn deliver(&mut self, dest: usize, sender: usize) {
        self.inbound[dest][sender] += 1;
    }

    /// Records `dest` consuming an incoming event from `sender`.
    pub fn consume(&mut self, dest: usize, sender: usize) {
        let cell = &mut self.inbound[dest][sender];
        *cell = cell.saturating_sub(1);
    }

    /// Returns the outstanding credit `dest` holds from `sender`.
    pub fn credit(&self, dest: usize, sender: usize) -> u32 {
        self.inbound[dest][sender]
    }

    /// True if `node` has inbound credit on every interface.
    pub fn may_send(&self, node: usize) -> bool {
        self.interfaces[node]
            .iter()
            .all(|&peer| self.inbound[node][peer] > 0)
    }
}

// ============================================================================
// Local Lists
// ============================================================================

/// Events partitioned by owner, selected under lookahead.
#[derive(Debug)]
pub struct LocalLists {
    lanes: Vec<ListQueue>,
    latency: ImpactMatrix,
    boundary: LookaheadBoundary,
    credits: Option<CreditTable>,
    /// Parked outgoing events by destination lane, mapped to the sender lane
    /// holding them.
    outbound: Vec<BTreeMap<EventKey, usize>>,
    deadlocks: u64,
    conversions: u64,
}

impl LocalLists {
    pub fn new(config: &SchedulerConfig) -> Self {
        let policy = ListPolicy::from_strategies(&config.strategies);
        let lane_count = config.entities + 1;
        let credits = config
            .strategies
            .local_lists_v2
            .then(|| CreditTable::new(config.entities, &config.interfaces));
        Self {
            lanes: (0..lane_count).map(|_| ListQueue::new(policy)).collect(),
            latency: config.impact_latency.clone(),
            boundary: config.lookahead_boundary,
            credits,
            outbound: vec![BTreeMap::new(); lane_count],
            deadlocks: 0,
            conversions: 0,
        }
    }

    /// Number of times every safe candidate was a blocked outgoing event.
    pub fn deadlocks(&self) -> u64 {
        self.deadlocks
    }

    /// Number of outgoing events converted to incoming ones.
    pub fn conversions(&self) -> u64 {
        self.conversions
    }

    /// Inbound credit table, present when the v2 rule is active.
    pub fn credits(&self) -> Option<&CreditTable> {
        self.credits.as_ref()
    }

    /// Every lane, the simulator lane first.
    pub fn lanes(&self) -> impl Iterator<Item = &ListQueue> {
        self.lanes.iter()
    }

    /// The lane queue holding events owned by `context`.
    pub fn lane(&self, context: Context) -> &ListQueue {
        &self.lanes[lane_of(context)]
    }

    fn latency(&self, from: usize, to: usize) -> u64 {
        if from == GLOBAL_LANE || to == GLOBAL_LANE {
            0
        } else {
            self.latency.get(from - 1, to - 1)
        }
    }

    /// True if `event` waits in its sender's lane for credit.
    fn is_parked_outgoing(&self, event: &Event) -> bool {
        self.credits.is_some()
            && event.kind == EventKind::Outgoing
            && !event.prev_context.is_global()
            && !event.key.context.is_global()
            && event.prev_context != event.key.context
    }

    /// Lane an event is stored in.
    fn home_lane(&self, event: &Event) -> usize {
        if self.is_parked_outgoing(event) {
            lane_of(event.prev_context)
        } else {
            lane_of(event.key.context)
        }
    }

    /// Boundary comparison: may `front` run before anything `other` could
    /// still cause `latency` later?
    fn precedes_shifted(&self, front: &EventKey, other: &EventKey, latency: u64) -> bool {
        match self.boundary {
            LookaheadBoundary::Sequenced => {
                (front.ts, front.uid) < (other.ts.saturating_add(latency), other.uid)
            }
            LookaheadBoundary::Inclusive if latency == 0 => front.precedes(other),
            LookaheadBoundary::Inclusive => front.ts <= other.ts.saturating_add(latency),
        }
    }

    fn is_safe(&self, lane: usize, front: &EventKey) -> bool {
        let fronts_allow = self.lanes.iter().enumerate().all(|(other, queue)| {
            if other == lane {
                return true;
            }
            match queue.front() {
                Some(o) => self.precedes_shifted(front, &o.key, self.latency(lane, other)),
                None => true,
            }
        });
        // An outgoing event parked elsewhere already targets this lane.
        let inbound_allows = self.outbound[lane]
            .keys()
            .next()
            .is_none_or(|parked| front.precedes(parked));
        fronts_allow && inbound_allows
    }

    fn is_blocked(&self, lane: usize, front: &Event) -> bool {
        match &self.credits {
            Some(credits) if self.is_parked_outgoing(front) => !credits.may_send(lane - 1),
            _ => false,
        }
    }

    /// Picks the lane whose front is removed next.
    fn select(&mut self) -> Option<usize> {
        let mut min_safe: Option<(usize, EventKey)> = None;
        let mut min_eligible: Option<(usize, EventKey)> = None;
        let mut min_any: Option<(usize, EventKey)> = None;

        for (lane, queue) in self.lanes.iter().enumerate() {
            let Some(front) = queue.front() else {
                continue;
            };
            let key = front.key;
            if min_any.is_none_or(|(_, k)| key.precedes(&k)) {
                min_any = Some((lane, key));
            }
            if !self.is_safe(lane, &key) {
                continue;
            }
            if min_safe.is_none_or(|(_, k)| key.precedes(&k)) {
                min_safe = Some((lane, key));
            }
            if !self.is_blocked(lane, front) && min_eligible.is_none_or(|(_, k)| key.precedes(&k))
            {
                min_eligible = Some((lane, key));
            }
        }

        if let Some((lane, _)) = min_eligible {
            return Some(lane);
        }
        if let Some((lane, key)) = min_safe {
            self.deadlocks += 1;
            debug!(
                key = %key,
                deadlocks = self.deadlocks,
                "every safe front is waiting for inbound credit, falling back to lookahead"
            );
            return Some(lane);
        }
        let (lane, key) = min_any?;
        warn!(key = %key, "no lane is lookahead-safe, impact latency matrix is inconsistent");
        Some(lane)
    }

    /// Moves a parked outgoing event into its destination's lane.
    fn convert(&mut self, mut event: Event) {
        let sender = lane_of(event.prev_context);
        let dest = lane_of(event.key.context);
        self.outbound[dest].remove(&event.key);
        if let Some(credits) = self.credits.as_mut() {
            credits.deliver(dest - 1, sender - 1);
        }
        self.conversions += 1;
        debug!(
            key = %event.key,
            from = %event.prev_context,
            "outgoing event delivered as incoming"
        );
        event.kind = EventKind::Incoming;
        self.lanes[dest].insert(event);
    }

    fn consume_credit(&mut self, event: &Event) {
        if event.kind != EventKind::Incoming {
            return;
        }
        let (Context::Node(dest), Context::Node(sender)) = (event.key.context, event.prev_context)
        else {
            return;
        };
        if let Some(credits) = self.credits.as_mut() {
            credits.consume(dest.index(), sender.index());
        }
    }

    /// Converts parked outgoing events until the selected front is one that
    /// will actually be returned.
    fn settle(&mut self) -> Option<usize> {
        loop {
            let lane = self.select()?;
            let front = self.lanes[lane].front()?;
            if !self.is_parked_outgoing(front) {
                return Some(lane);
            }
            let event = self.lanes[lane].remove_next()?;
            self.convert(event);
        }
    }
}

impl Scheduler for LocalLists {
    fn insert(&mut self, event: Event) {
        let lane = self.home_lane(&event);
        assert!(
            lane < self.lanes.len(),
            "event {} targets unknown context {}",
            event.key,
            event.key.context
        );
        if self.is_parked_outgoing(&event) {
            let dest = lane_of(event.key.context);
            assert!(
                dest < self.lanes.len(),
                "outgoing event {} targets unknown context",
                event.key
            );
            self.outbound[dest].insert(event.key, lane);
        }
        trace!(key = %event.key, lane, "insert into local list");
        self.lanes[lane].insert(event);
    }

    fn is_empty(&self) -> bool {
        self.lanes.iter().all(ListQueue::is_empty)
    }

    fn len(&self) -> usize {
        self.lanes.iter().map(ListQueue::len).sum()
    }

    fn peek_next(&mut self) -> Option<EventKey> {
        let lane = self.settle()?;
        self.lanes[lane].peek_next()
    }

    fn remove_next(&mut self) -> Option<Event> {
        let lane = self.settle()?;
        let event = self.lanes[lane].remove_next()?;
        self.consume_credit(&event);
        Some(event)
    }

    fn remove(&mut self, key: &EventKey) -> Option<Event> {
        let dest = lane_of(key.context);
        if let Some(sender) = self.outbound.get_mut(dest)?.remove(key) {
            return self.lanes[sender].remove(key);
        }
        let event = self.lanes.get_mut(dest)?.remove(key)?;
        self.consume_credit(&event);
        Some(event)
    }

    fn drain(&mut self) -> Vec<Event> {
        for parked in &mut self.outbound {
            parked.clear();
        }
        self.lanes.iter_mut().flat_map(ListQueue::drain).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StrategySet;
    use kairos_types::{EventUid, Timestamp};

    fn key(ts: u64, uid: u64, context: Context) -> EventKey {
        EventKey::new(Timestamp::new(ts), EventUid::new(uid), context)
    }

    fn two_nodes(latency: u64, boundary: LookaheadBoundary) -> LocalLists {
        let config = SchedulerConfig::new(2)
            .with_impact_latency(ImpactMatrix::uniform(2, latency))
            .with_strategies(StrategySet {
                local_lists: true,
                ..StrategySet::plain()
            })
            .with_lookahead_boundary(boundary);
        LocalLists::new(&config)
    }

    fn uids(lists: &mut LocalLists) -> Vec<u64> {
        std::iter::from_fn(|| lists.remove_next())
            .map(|e| e.key.uid.as_u64())
            .collect()
    }

    #[test]
    fn lookahead_orders_across_entities() {
        let mut lists = two_nodes(5, LookaheadBoundary::Sequenced);
        let a = key(10, 4, Context::node(0));
        let b = key(12, 5, Context::node(1));
        lists.insert(Event::new(b, EventKind::Undefined));
        lists.insert(Event::new(a, EventKind::Undefined));

        assert!(lists.is_safe(1, &a));
        assert!(lists.is_safe(2, &b));
        assert_eq!(lists.peek_next(), Some(a));
        assert_eq!(uids(&mut lists), vec![4, 5]);
    }

    #[test]
    fn front_beyond_lookahead_window_is_unsafe() {
        let mut lists = two_nodes(5, LookaheadBoundary::Sequenced);
        lists.insert(Event::new(key(10, 4, Context::node(0)), EventKind::Undefined));
        assert!(!lists.is_safe(2, &key(15, 5, Context::node(1))));
        assert!(lists.is_safe(2, &key(14, 5, Context::node(1))));
    }

    #[test]
    fn inclusive_boundary_admits_equal_shifted_timestamp() {
        let mut lists = two_nodes(5, LookaheadBoundary::Inclusive);
        lists.insert(Event::new(key(10, 4, Context::node(0)), EventKind::Undefined));
        assert!(lists.is_safe(2, &key(15, 5, Context::node(1))));
        assert!(!lists.is_safe(2, &key(16, 5, Context::node(1))));
    }

    #[test]
    fn global_lane_has_zero_latency() {
        let mut lists = two_nodes(100, LookaheadBoundary::Sequenced);
        lists.insert(Event::new(key(20, 4, Context::Global), EventKind::Undefined));
        lists.insert(Event::new(key(30, 5, Context::node(0)), EventKind::Undefined));
        lists.insert(Event::new(key(10, 6, Context::node(1)), EventKind::Undefined));
        assert_eq!(uids(&mut lists), vec![6, 4, 5]);
    }

    fn v2_pair() -> LocalLists {
        let config = SchedulerConfig::new(2)
            .with_impact_latency(ImpactMatrix::uniform(2, 5))
            .with_interfaces(vec![vec![NodeId::new(1)], vec![NodeId::new(0)]])
            .with_strategies(StrategySet::plain().with_local_lists_v2());
        LocalLists::new(&config)
    }

    fn outgoing(ts: u64, uid: u64, from: u32, to: u32) -> Event {
        Event::new(key(ts, uid, Context::node(to)), EventKind::Outgoing)
            .with_prev_context(Context::node(from))
    }

    #[test]
    fn outgoing_is_parked_with_sender_and_delivered_as_incoming() {
        let mut lists = v2_pair();
        lists.insert(outgoing(10, 4, 0, 1));
        assert_eq!(lists.lane(Context::node(0)).len(), 1);
        assert_eq!(lists.lane(Context::node(1)).len(), 0);

        let delivered = lists.remove_next().expect("delivered");
        assert_eq!(delivered.kind, EventKind::Incoming);
        assert_eq!(delivered.key.context, Context::node(1));
        assert_eq!(lists.conversions(), 1);
        // Blocked on credit with nothing else safe.
        assert_eq!(lists.deadlocks(), 1);
        // Delivered then consumed.
        assert_eq!(lists.credits().map(|c| c.credit(1, 0)), Some(0));
    }

    #[test]
    fn blocked_outgoing_yields_to_safe_local_work() {
        let mut lists = v2_pair();
        lists.insert(outgoing(10, 4, 0, 1));
        lists.insert(Event::new(key(12, 5, Context::node(0)), EventKind::Undefined));

        // Node 0 has no credit from node 1; its outgoing front is blocked but
        // still the only safe front, so the fallback delivers it.
        assert_eq!(uids(&mut lists), vec![4, 5]);
        assert_eq!(lists.deadlocks(), 1);
    }

    #[test]
    fn credit_unblocks_sender() {
        let mut credits = CreditTable::new(2, &[vec![NodeId::new(1)], vec![NodeId::new(0)]]);
        assert!(!credits.may_send(0));
        credits.deliver(0, 1);
        assert!(credits.may_send(0));
        credits.consume(0, 1);
        credits.consume(0, 1);
        assert_eq!(credits.credit(0, 1), 0);
    }

    #[test]
    fn removing_parked_outgoing() {
        let mut lists = v2_pair();
        let event = outgoing(10, 4, 0, 1);
        let k = event.key;
        lists.insert(event);
        assert!(lists.remove(&k).is_some());
        assert!(lists.is_empty());
        assert!(lists.remove(&k).is_none());
    }
}
