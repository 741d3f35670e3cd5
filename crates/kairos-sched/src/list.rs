//! Single sorted event list.
//!
//! `ListQueue` is the building block of every layout: used alone it is the
//! whole queue, under local lists there is one per entity plus one for
//! simulator-owned events. Two strategies live here:
//!
//! - **Path reduction**: the two-branch comparator and a tail fast path that
//!   appends without scanning when the new event sorts after the last
//!   element (stepping over a trailing Stop sentinel).
//! - **Waiting list**: a Timeout event that is not at the front acts as a
//!   barrier. An insertion scan that reaches it and does not sort before it
//!   is parked on the barrier's pending list instead of scanning further.
//!   When the barrier reaches the front, its pending events are re-inserted
//!   in order, starting just past the barrier.
//!
//! Every pending event sorts after its barrier, so the front of the main
//! list is always the minimum of the whole queue.

use std::collections::VecDeque;

use kairos_types::{EventKey, EventKind};
use tracing::{debug, trace};

use crate::{Event, OrderingPolicy, Scheduler, StrategySet};

/// Insertion behavior of a [`ListQueue`], fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ListPolicy {
    pub ordering: OrderingPolicy,
    pub waiting_list: bool,
    pub tail_fast_path: bool,
}

impl ListPolicy {
    /// Derives the list policy from the active strategy set.
    pub fn from_strategies(strategies: &StrategySet) -> Self {
        Self {
            ordering: if strategies.path_reduction {
                OrderingPolicy::TwoBranch
            } else {
                OrderingPolicy::Lexicographic
            },
            waiting_list: strategies.waiting_list,
            tail_fast_path: strategies.path_reduction,
        }
    }
}

/// A sorted list of events with optional barrier deferral.
#[derive(Debug, Default)]
pub struct ListQueue {
    events: VecDeque<Event>,
    policy: ListPolicy,
    /// Timeout events currently in `events`.
    barriers: usize,
    /// Events parked on some barrier's pending list.
    deferred: usize,
}

impl ListQueue {
    pub fn new(policy: ListPolicy) -> Self {
        Self {
            events: VecDeque::new(),
            policy,
            barriers: 0,
            deferred: 0,
        }
    }

    pub fn policy(&self) -> ListPolicy {
        self.policy
    }

    /// Front event, without settling anything.
    pub fn front(&self) -> Option<&Event> {
        self.events.front()
    }

    /// Events in the main list, in removal order. Deferred events are
    /// reachable through [`Event::pending`].
    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.iter()
    }

    /// Number of events parked behind barriers.
    pub fn deferred(&self) -> usize {
        self.deferred
    }

    fn is_deferring_barrier(&self, index: usize) -> bool {
        self.policy.waiting_list && index != 0 && self.events[index].kind.is_barrier()
    }

    /// True if some barrier other than the front could capture a scan.
    fn has_inner_barrier(&self) -> bool {
        if !self.policy.waiting_list {
            return false;
        }
        let front_is_barrier = self.events.front().is_some_and(|e| e.kind.is_barrier());
        self.barriers > usize::from(front_is_barrier)
    }

    fn push_main(&mut self, index: usize, event: Event) {
        if event.kind.is_barrier() {
            self.barriers += 1;
        }
        self.events.insert(index, event);
    }

    fn take_main(&mut self, index: usize) -> Option<Event> {
        let event = self.events.remove(index)?;
        if event.kind.is_barrier() {
            self.barriers -= 1;
        }
        Some(event)
    }

    /// Inserts `event` by scanning from `start`.
    fn insert_from(&mut self, start: usize, event: Event) {
        let ordering = self.policy.ordering;

        if self.policy.tail_fast_path && start == 0 && !self.has_inner_barrier() {
            let len = self.events.len();
            let fits_at = match self.events.back() {
                None => Some(0),
                Some(last) if !ordering.sorts_before(&event.key, &last.key) => Some(len),
                Some(last)
                    if last.kind == EventKind::Stop
                        && (len == 1
                            || !ordering.sorts_before(&event.key, &self.events[len - 2].key)) =>
                {
                    Some(len - 1)
                }
                Some(_) => None,
            };
            if let Some(index) = fits_at {
                self.push_main(index, event);
                return;
            }
        }

        let mut index = start;
        while index < self.events.len() {
            let existing = &self.events[index];
            if ordering.sorts_before(&event.key, &existing.key) {
                break;
            }
            if self.is_deferring_barrier(index) {
                trace!(uid = %event.key.uid, barrier = %existing.key.uid, "deferring behind barrier");
                self.events[index].pending.push(event);
                self.deferred += 1;
                return;
            }
            index += 1;
        }
        self.push_main(index, event);
    }

    /// Releases the pending list of a barrier that just reached the front.
    fn promote_front(&mut self) {
        let Some(front) = self.events.front_mut() else {
            return;
        };
        if front.pending.is_empty() {
            return;
        }
        let released = std::mem::take(&mut front.pending);
        debug!(
            barrier = %front.key.uid,
            released = released.len(),
            "barrier reached front, releasing deferred events"
        );
        self.deferred -= released.len();
        for event in released {
            self.insert_from(1, event);
        }
    }

    /// Returns a barrier's pending list to the queue, scanning from `start`.
    fn reinsert(&mut self, start: usize, pending: Vec<Event>) {
        self.deferred -= pending.len();
        for event in pending {
            self.insert_from(start, event);
        }
    }
}

impl Scheduler for ListQueue {
    fn insert(&mut self, event: Event) {
        trace!(key = %event.key, kind = %event.kind, "insert");
        self.insert_from(0, event);
    }

    fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    fn len(&self) -> usize {
        self.events.len() + self.deferred
    }

    fn peek_next(&mut self) -> Option<EventKey> {
        self.events.front().map(|e| e.key)
    }

    fn remove_next(&mut self) -> Option<Event> {
        let event = self.take_main(0)?;
        debug_assert!(event.pending.is_empty(), "front barrier kept pending events");
        self.promote_front();
        Some(event)
    }

    fn remove(&mut self, key: &EventKey) -> Option<Event> {
        if let Some(index) = self.events.iter().position(|e| e.key.uid == key.uid) {
            let mut event = self.take_main(index)?;
            let pending = std::mem::take(&mut event.pending);
            if !pending.is_empty() {
                debug!(
                    barrier = %event.key.uid,
                    released = pending.len(),
                    "cancelled barrier, redistributing deferred events"
                );
                self.reinsert(index, pending);
            }
            self.promote_front();
            return Some(event);
        }

        for barrier in self.events.iter_mut() {
            let Some(index) = barrier.pending.iter().position(|e| e.key.uid == key.uid) else {
                continue;
            };
            let mut event = barrier.pending.remove(index);
            // Nested events stay deferred, now behind the parent barrier.
            let nested = std::mem::take(&mut event.pending);
            barrier.pending.splice(index..index, nested);
            self.deferred -= 1;
            return Some(event);
        }

        None
    }

    fn drain(&mut self) -> Vec<Event> {
        let mut out = Vec::with_capacity(self.len());
        for mut event in self.events.drain(..) {
            let pending = std::mem::take(&mut event.pending);
            out.push(event);
            out.extend(pending);
        }
        self.barriers = 0;
        self.deferred = 0;
        out
    }
}
