//! The simulation driver.
//!
//! Owns the queue engine, one global logical clock and one clock per entity.
//! Callbacks live in a slot table keyed by uid rather than inside the queued
//! events, so an event's callback is taken out exactly once: when it runs,
//! when it is removed, or when the simulator is disposed.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use kairos_sched::{Event, ExplorationHook, QueueEngine, SchedulerConfig};
use kairos_types::{Context, EventKey, EventKind, EventUid, Timestamp, TransmitInfo};
use tracing::{debug, trace, warn};

use crate::clock::LogicalClock;
use crate::handle::EventId;
use crate::inbox::{Inbox, RemoteScheduler};
use crate::SimError;

/// Work executed when an event fires.
pub type Callback = Box<dyn FnOnce(&mut Simulator)>;

enum Slot {
    Armed(Callback),
    /// Marked cancelled but still queued; skipped when dequeued.
    Cancelled,
}

/// Summary of a completed `run()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Callbacks invoked during this run.
    pub events_processed: u64,
    /// Global clock when the run ended.
    pub final_time: Timestamp,
    /// Deadlock fallbacks taken by the queue engine so far.
    pub deadlocks: u64,
    /// True if the run ended through `stop()` rather than an empty queue.
    pub stopped: bool,
}

/// Single-threaded discrete-event simulator.
///
/// `Simulator` is neither `Send` nor `Sync`: every entry point except the
/// [`RemoteScheduler`] runs on the thread that owns it.
pub struct Simulator {
    engine: QueueEngine,
    global: LogicalClock,
    locals: Vec<LogicalClock>,
    slots: HashMap<EventUid, Slot>,
    next_uid: EventUid,
    /// Events inserted into the engine and not yet dequeued or removed.
    unscheduled: usize,
    current_context: Context,
    stop_requested: bool,
    terminated: Option<String>,
    destroy_events: VecDeque<(EventId, Callback)>,
    inbox: Arc<Inbox>,
    events_processed: u64,
}

impl std::fmt::Debug for Simulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulator")
            .field("global", &self.global)
            .field("current_context", &self.current_context)
            .field("pending", &self.engine.len())
            .field("next_uid", &self.next_uid)
            .finish_non_exhaustive()
    }
}

impl Simulator {
    /// Creates a simulator without exploration.
    pub fn new(config: SchedulerConfig) -> Result<Self, SimError> {
        let engine = QueueEngine::new(&config)?;
        Ok(Self::with_engine(engine))
    }

    /// Creates a simulator whose queue engine reports to `hook`.
    pub fn with_hook(
        config: SchedulerConfig,
        hook: Box<dyn ExplorationHook>,
    ) -> Result<Self, SimError> {
        let engine = QueueEngine::with_hook(&config, hook)?;
        Ok(Self::with_engine(engine))
    }

    fn with_engine(engine: QueueEngine) -> Self {
        Self {
            locals: vec![LogicalClock::default(); engine.entities()],
            engine,
            global: LogicalClock::default(),
            slots: HashMap::new(),
            next_uid: EventUid::FIRST,
            unscheduled: 0,
            current_context: Context::Global,
            stop_requested: false,
            terminated: None,
            destroy_events: VecDeque::new(),
            inbox: Arc::new(Inbox::new()),
            events_processed: 0,
        }
    }

    // ========================================================================
    // Clocks
    // ========================================================================

    fn clock(&self, context: Context) -> &LogicalClock {
        match context {
            Context::Global => &self.global,
            Context::Node(id) => self.locals.get(id.index()).unwrap_or_else(|| {
                panic!(
                    "context {context} is outside the {} configured entities",
                    self.locals.len()
                )
            }),
        }
    }

    fn clock_mut(&mut self, context: Context) -> &mut LogicalClock {
        let entities = self.locals.len();
        match context {
            Context::Global => &mut self.global,
            Context::Node(id) => self.locals.get_mut(id.index()).unwrap_or_else(|| {
                panic!("context {context} is outside the {entities} configured entities")
            }),
        }
    }

    /// Current time in the current context.
    pub fn now(&self) -> Timestamp {
        self.clock(self.current_context).now()
    }

    /// Current time of `context`'s clock.
    pub fn now_in(&self, context: Context) -> Timestamp {
        self.clock(context).now()
    }

    /// Context of the event currently executing, `Global` outside events.
    pub fn context(&self) -> Context {
        self.current_context
    }

    /// Configuration of the current queue engine.
    pub fn config(&self) -> &SchedulerConfig {
        self.engine.config()
    }

    pub fn engine(&self) -> &QueueEngine {
        &self.engine
    }

    /// Events queued in the engine, including cancelled-but-kept ones.
    pub fn pending(&self) -> usize {
        self.engine.len()
    }

    // ========================================================================
    // Scheduling
    // ========================================================================

    fn allocate_uid(&mut self) -> EventUid {
        let uid = self.next_uid;
        self.next_uid = uid.next();
        uid
    }

    fn enqueue(&mut self, event: Event, callback: Callback) -> EventId {
        let kind = event.kind;
        let uid = event.key.uid;
        match self.engine.insert(event) {
            Ok(key) => {
                trace!(key = %key, kind = %kind, "scheduled");
                self.slots.insert(uid, Slot::Armed(callback));
                self.unscheduled += 1;
                EventId::new(key, kind)
            }
            Err(err) => {
                warn!(%err, uid = %uid, "event dropped, stopping run");
                if self.terminated.is_none() {
                    self.terminated = Some(match err {
                        kairos_sched::SchedError::BranchTerminated { reason } => reason,
                        other => other.to_string(),
                    });
                }
                self.stop_requested = true;
                EventId::new(EventKey::new(Timestamp::MAX, uid, Context::Global), kind)
            }
        }
    }

    fn schedule_event(
        &mut self,
        base: Context,
        context: Context,
        delay: u64,
        kind: EventKind,
        transmit: Option<TransmitInfo>,
        callback: Callback,
    ) -> EventId {
        let ts = self.clock(base).after(delay);
        // Validates the owner context too.
        let _ = self.clock(context);
        let uid = self.allocate_uid();
        let mut event = Event::new(EventKey::new(ts, uid, context), kind).with_prev_context(base);
        if let Some(transmit) = transmit {
            event = event.with_transmit(transmit);
        }
        self.enqueue(event, callback)
    }

    /// Schedules `callback` `delay` after now in the current context.
    pub fn schedule<F>(&mut self, delay: u64, callback: F) -> EventId
    where
        F: FnOnce(&mut Simulator) + 'static,
    {
        self.schedule_kind(EventKind::Undefined, delay, callback)
    }

    /// Schedules an event of a specific kind in the current context.
    pub fn schedule_kind<F>(&mut self, kind: EventKind, delay: u64, callback: F) -> EventId
    where
        F: FnOnce(&mut Simulator) + 'static,
    {
        let context = self.current_context;
        self.schedule_event(context, context, delay, kind, None, Box::new(callback))
    }

    /// Schedules a Timeout event, a barrier under the waiting-list strategy.
    pub fn schedule_timeout<F>(&mut self, delay: u64, callback: F) -> EventId
    where
        F: FnOnce(&mut Simulator) + 'static,
    {
        self.schedule_kind(EventKind::Timeout, delay, callback)
    }

    /// Schedules a packet transmission in the current context. Transmissions
    /// are the only events exploration may perturb.
    pub fn schedule_transmit<F>(&mut self, delay: u64, packet_size: u32, callback: F) -> EventId
    where
        F: FnOnce(&mut Simulator) + 'static,
    {
        let context = self.current_context;
        self.schedule_event(
            context,
            context,
            delay,
            EventKind::Undefined,
            Some(TransmitInfo::new(packet_size)),
            Box::new(callback),
        )
    }

    /// Schedules `callback` in `context`, `delay` after that context's clock.
    pub fn schedule_with_context<F>(&mut self, context: Context, delay: u64, callback: F) -> EventId
    where
        F: FnOnce(&mut Simulator) + 'static,
    {
        self.schedule_event(
            context,
            context,
            delay,
            EventKind::Undefined,
            None,
            Box::new(callback),
        )
    }

    /// Schedules an outgoing message from `prev` to `context`, `delay` after
    /// the sender's clock.
    pub fn schedule_with_prev_context<F>(
        &mut self,
        prev: Context,
        context: Context,
        delay: u64,
        callback: F,
    ) -> EventId
    where
        F: FnOnce(&mut Simulator) + 'static,
    {
        self.schedule_event(
            prev,
            context,
            delay,
            EventKind::Outgoing,
            None,
            Box::new(callback),
        )
    }

    /// Schedules an outgoing packet transmission from `prev` to `context`.
    pub fn schedule_outgoing_transmit<F>(
        &mut self,
        prev: Context,
        context: Context,
        delay: u64,
        packet_size: u32,
        callback: F,
    ) -> EventId
    where
        F: FnOnce(&mut Simulator) + 'static,
    {
        self.schedule_event(
            prev,
            context,
            delay,
            EventKind::Outgoing,
            Some(TransmitInfo::new(packet_size)),
            Box::new(callback),
        )
    }

    /// Schedules `callback` at the current time in the current context.
    pub fn schedule_now<F>(&mut self, callback: F) -> EventId
    where
        F: FnOnce(&mut Simulator) + 'static,
    {
        self.schedule(0, callback)
    }

    /// Registers `callback` to run during [`Simulator::destroy`].
    pub fn schedule_destroy<F>(&mut self, callback: F) -> EventId
    where
        F: FnOnce(&mut Simulator) + 'static,
    {
        let serial = self.allocate_uid();
        let id = EventId::destroy(self.global.now(), serial);
        self.destroy_events.push_back((id, Box::new(callback)));
        id
    }

    /// Handle for scheduling from other threads.
    pub fn remote(&self) -> RemoteScheduler {
        RemoteScheduler::new(Arc::clone(&self.inbox))
    }

    fn drain_inbox(&mut self) {
        for request in self.inbox.drain() {
            let ts = self.global.after(request.delay);
            let _ = self.clock(request.context);
            let uid = self.allocate_uid();
            let event = Event::new(EventKey::new(ts, uid, request.context), EventKind::Undefined);
            trace!(key = %event.key, "merged remote request");
            self.enqueue(event, request.callback);
        }
    }

    // ========================================================================
    // Cancellation
    // ========================================================================

    /// True if the event already ran, was cancelled or removed, or is not
    /// after its context's clock.
    pub fn is_expired(&self, id: &EventId) -> bool {
        if id.is_destroy() {
            return !self
                .destroy_events
                .iter()
                .any(|(queued, _)| queued.serial() == id.serial());
        }
        match self.slots.get(&id.uid()) {
            None | Some(Slot::Cancelled) => true,
            Some(Slot::Armed(_)) => self.clock(id.context()).has_passed(id.ts(), id.uid()),
        }
    }

    /// Time until the event fires, zero once expired.
    pub fn get_delay_left(&self, id: &EventId) -> u64 {
        if self.is_expired(id) {
            return 0;
        }
        id.ts().saturating_since(self.clock(id.context()).now())
    }

    /// Cancels an event. Expired handles are ignored.
    ///
    /// With `remove_cancelled` the event also leaves the queue; otherwise it
    /// stays queued and is skipped when it reaches the front.
    pub fn cancel(&mut self, id: &EventId) {
        if self.is_expired(id) {
            return;
        }
        if id.is_destroy() || self.engine.config().strategies.remove_cancelled {
            self.remove(id);
            return;
        }
        debug!(key = %id.key(), "cancelled in place");
        self.slots.insert(id.uid(), Slot::Cancelled);
    }

    /// Removes an event from the queue and releases its callback.
    ///
    /// # Panics
    ///
    /// Panics if a live handle cannot be found in the queue.
    pub fn remove(&mut self, id: &EventId) {
        if id.is_destroy() {
            self.destroy_events
                .retain(|(queued, _)| queued.serial() != id.serial());
            return;
        }
        if self.is_expired(id) {
            return;
        }
        let removed = self.engine.remove(&id.key());
        assert!(
            removed.is_some(),
            "event {id} is live but missing from the queue"
        );
        let slot = self.slots.remove(&id.uid());
        assert!(slot.is_some(), "event {id} has no callback");
        self.unscheduled -= 1;
        trace!(key = %id.key(), "removed");
    }

    // ========================================================================
    // Run Loop
    // ========================================================================

    /// Requests the run loop to return after the current event.
    pub fn stop(&mut self) {
        self.stop_requested = true;
    }

    /// Schedules a Stop event `delay` after now in the current context.
    pub fn stop_after(&mut self, delay: u64) -> EventId {
        self.schedule_kind(EventKind::Stop, delay, Simulator::stop)
    }

    /// Executes events until the queue is empty or a stop is requested.
    ///
    /// # Panics
    ///
    /// Panics if the queue reports empty while events are still accounted
    /// as scheduled, which means an event was lost.
    pub fn run(&mut self) -> Result<RunSummary, SimError> {
        let processed_before = self.events_processed;
        self.drain_inbox();
        if self.terminated.is_none() {
            self.stop_requested = false;
        }

        while !self.stop_requested && !self.engine.is_empty() {
            self.process_one();
        }

        if let Some(reason) = &self.terminated {
            return Err(SimError::BranchTerminated {
                reason: reason.clone(),
            });
        }

        assert!(
            !self.engine.is_empty() || self.unscheduled == 0,
            "queue is empty but {} events are still scheduled",
            self.unscheduled
        );

        let summary = RunSummary {
            events_processed: self.events_processed - processed_before,
            final_time: self.global.now(),
            deadlocks: self.engine.deadlocks(),
            stopped: self.stop_requested,
        };
        debug!(
            events = summary.events_processed,
            final_time = %summary.final_time,
            stopped = summary.stopped,
            "run finished"
        );
        Ok(summary)
    }

    fn process_one(&mut self) {
        let Some(event) = self.engine.remove_next() else {
            return;
        };
        self.unscheduled -= 1;

        let key = event.key;
        self.clock_mut(key.context).advance_to(key.ts, key.uid);
        self.current_context = key.context;

        match self.slots.remove(&key.uid) {
            Some(Slot::Armed(callback)) => {
                trace!(key = %key, kind = %event.kind, "invoke");
                callback(self);
                self.events_processed += 1;
            }
            Some(Slot::Cancelled) => trace!(key = %key, "skipping cancelled event"),
            None => panic!("event {key} reached the front without a callback"),
        }
        self.current_context = Context::Global;

        self.drain_inbox();
    }

    // ========================================================================
    // Teardown
    // ========================================================================

    /// Runs destroy-phase callbacks in registration order.
    pub fn destroy(&mut self) {
        while let Some((id, callback)) = self.destroy_events.pop_front() {
            trace!(serial = %id.serial(), "destroy event");
            callback(self);
        }
    }

    /// Drops every queued event and pending remote request.
    pub fn dispose(&mut self) {
        drop(self.inbox.drain());
        let flushed = self.engine.drain();
        debug!(flushed = flushed.len(), "disposing queued events");
        self.slots.clear();
        self.unscheduled = 0;
    }

    /// Replaces the queue engine, moving every pending event into the new
    /// one without perturbing it again. The new engine's configuration,
    /// cancellation policy included, applies from here on.
    ///
    /// # Panics
    ///
    /// Panics if the new engine was built for a different entity count.
    pub fn set_queue_engine(&mut self, mut engine: QueueEngine) {
        assert_eq!(
            engine.entities(),
            self.locals.len(),
            "replacement queue engine covers a different number of entities"
        );
        for event in self.engine.drain() {
            engine.reinsert(event);
        }
        debug!(moved = engine.len(), "queue engine replaced");
        self.engine = engine;
    }
}
