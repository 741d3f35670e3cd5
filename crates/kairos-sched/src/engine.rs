//! The queue engine: a layout chosen once from the strategy set, plus
//! exploration perturbation in front of it.

use std::fmt::Write as _;

use kairos_types::EventKey;
use tracing::trace;

use crate::explore::perturb::Perturber;
use crate::explore::{ExplorationHook, NoopHook};
use crate::{Event, ListPolicy, ListQueue, LocalLists, SchedError, Scheduler, SchedulerConfig};

/// How events are partitioned.
#[derive(Debug)]
pub enum Layout {
    /// One list for every event.
    Single(ListQueue),
    /// One list per entity plus a simulator lane.
    Partitioned(LocalLists),
}

impl Layout {
    pub fn new(config: &SchedulerConfig) -> Self {
        if config.strategies.local_lists {
            Layout::Partitioned(LocalLists::new(config))
        } else {
            Layout::Single(ListQueue::new(ListPolicy::from_strategies(
                &config.strategies,
            )))
        }
    }

    fn scheduler(&mut self) -> &mut dyn Scheduler {
        match self {
            Layout::Single(list) => list,
            Layout::Partitioned(lists) => lists,
        }
    }

    fn scheduler_ref(&self) -> &dyn Scheduler {
        match self {
            Layout::Single(list) => list,
            Layout::Partitioned(lists) => lists,
        }
    }
}

/// Ordered container of pending events with the configured strategies.
pub struct QueueEngine {
    layout: Layout,
    perturber: Perturber,
    hook: Box<dyn ExplorationHook>,
    trace_queue: bool,
    config: SchedulerConfig,
}

impl std::fmt::Debug for QueueEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueEngine")
            .field("layout", &self.layout)
            .field("perturber", &self.perturber)
            .finish_non_exhaustive()
    }
}

impl QueueEngine {
    /// Creates an engine without exploration.
    pub fn new(config: &SchedulerConfig) -> Result<Self, SchedError> {
        Self::with_hook(config, Box::new(NoopHook))
    }

    /// Creates an engine that reports to an exploration hook.
    pub fn with_hook(
        config: &SchedulerConfig,
        hook: Box<dyn ExplorationHook>,
    ) -> Result<Self, SchedError> {
        config.validate()?;
        Ok(Self {
            layout: Layout::new(config),
            perturber: Perturber::new(config.exploration.clone()),
            hook,
            trace_queue: config.exploration.enabled && config.exploration.trace_queue,
            config: config.clone(),
        })
    }

    /// Inserts an event and returns its final key, which differs from the
    /// given one only if exploration perturbed it.
    pub fn insert(&mut self, mut event: Event) -> Result<EventKey, SchedError> {
        self.perturber.apply(&mut event, self.hook.as_mut())?;
        let key = event.key;
        self.layout.scheduler().insert(event);
        if self.trace_queue {
            let description = self.describe_concrete();
            for line in description.lines() {
                self.hook.diagnostic(line);
            }
        }
        Ok(key)
    }

    /// Inserts an event taken out of another engine, skipping perturbation.
    pub fn reinsert(&mut self, event: Event) {
        trace!(key = %event.key, "reinsert");
        self.layout.scheduler().insert(event);
    }

    pub fn is_empty(&self) -> bool {
        self.layout.scheduler_ref().is_empty()
    }

    pub fn len(&self) -> usize {
        self.layout.scheduler_ref().len()
    }

    /// Key of the event [`QueueEngine::remove_next`] would return.
    pub fn peek_next(&mut self) -> Option<EventKey> {
        self.layout.scheduler().peek_next()
    }

    /// Removes the next causally safe event.
    pub fn remove_next(&mut self) -> Option<Event> {
        let event = self.layout.scheduler().remove_next()?;
        trace!(key = %event.key, kind = %event.kind, "dequeue");
        Some(event)
    }

    /// Removes a specific event. `None` if it is not queued.
    pub fn remove(&mut self, key: &EventKey) -> Option<Event> {
        self.layout.scheduler().remove(key)
    }

    /// Removes every event, deferred and parked ones included.
    pub fn drain(&mut self) -> Vec<Event> {
        self.layout.scheduler().drain()
    }

    /// Deadlock fallbacks taken by local-lists v2; zero for other layouts.
    pub fn deadlocks(&self) -> u64 {
        match &self.layout {
            Layout::Partitioned(lists) => lists.deadlocks(),
            Layout::Single(_) => 0,
        }
    }

    /// Entity count this engine was configured for.
    pub fn entities(&self) -> usize {
        self.config.entities
    }

    /// Configuration the engine was built from.
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn perturber(&self) -> &Perturber {
        &self.perturber
    }

    pub fn hook(&self) -> &dyn ExplorationHook {
        self.hook.as_ref()
    }

    /// Human-readable dump of the queue, one event per line. Perturbed
    /// timestamps are printed as stored.
    pub fn describe(&self) -> String {
        self.render(|_, ts| ts)
    }

    /// Like [`QueueEngine::describe`], but asks the hook for a concrete
    /// example of every perturbed timestamp before printing it.
    pub fn describe_concrete(&mut self) -> String {
        let Self {
            layout,
            perturber,
            hook,
            ..
        } = self;
        render_queue(layout, perturber, |symbolic, ts| {
            if symbolic {
                hook.concrete_example(ts)
            } else {
                ts
            }
        })
    }

    fn render(&self, example: impl FnMut(bool, u64) -> u64) -> String {
        render_queue(&self.layout, &self.perturber, example)
    }
}

fn render_queue(
    layout: &Layout,
    perturber: &Perturber,
    mut example: impl FnMut(bool, u64) -> u64,
) -> String {
    let lanes: Vec<&ListQueue> = match layout {
        Layout::Single(list) => vec![list],
        Layout::Partitioned(lists) => lists.lanes().collect(),
    };
    let mut out = String::from("Current event queue------\n");
    for list in lanes {
        for event in list.iter() {
            describe_event(&mut out, perturber, event, "", &mut example);
            for parked in event.pending() {
                describe_event(&mut out, perturber, parked, "  ", &mut example);
            }
        }
    }
    out.push_str("End of queue--------\n");
    out
}

fn describe_event(
    out: &mut String,
    perturber: &Perturber,
    event: &Event,
    indent: &str,
    example: &mut impl FnMut(bool, u64) -> u64,
) {
    let symbolic = perturber.is_perturbed(event.key.uid);
    let ts = example(symbolic, event.key.ts.as_u64());
    let _ = write!(out, "{indent}Event {} : {ts} ms", event.key.uid);
    if event.transmit.is_some() {
        out.push_str(" - Transmission Event");
    }
    if symbolic {
        out.push_str(" - Symbolic event");
    }
    out.push('\n');
}
