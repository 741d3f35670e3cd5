//! The record the queue engine stores for each scheduled event.

use kairos_types::{Context, EventKey, EventKind, TransmitInfo};

/// One scheduled event as held by the queue engine.
///
/// The callback itself is not stored here: the driver keeps callbacks in a
/// slot table keyed by uid, so the queue only ever moves plain data and a
/// callback can be released at most once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// When the event fires, its tie breaker, and its owner. For outgoing
    /// events under the v2 credit rule, `key.context` is the destination.
    pub key: EventKey,
    /// Scheduling-policy tag.
    pub kind: EventKind,
    /// The entity that caused this event, used by outgoing/incoming
    /// transitions.
    pub prev_context: Context,
    /// Set for packet transmissions eligible for perturbation.
    pub transmit: Option<TransmitInfo>,
    /// Events deferred behind this one while it is a non-front barrier.
    pub(crate) pending: Vec<Event>,
}

impl Event {
    pub fn new(key: EventKey, kind: EventKind) -> Self {
        Self {
            key,
            kind,
            prev_context: key.context,
            transmit: None,
            pending: Vec::new(),
        }
    }

    /// Sets the entity that caused this event.
    pub fn with_prev_context(mut self, prev_context: Context) -> Self {
        self.prev_context = prev_context;
        self
    }

    /// Marks the event as a packet transmission.
    pub fn with_transmit(mut self, transmit: TransmitInfo) -> Self {
        self.transmit = Some(transmit);
        self
    }

    /// Events currently deferred behind this barrier.
    pub fn pending(&self) -> &[Event] {
        &self.pending
    }
}
