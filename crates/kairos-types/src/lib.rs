//! # kairos-types: Core types for the `Kairos` scheduling kernel
//!
//! This crate contains the shared vocabulary used by the queue engine and the
//! simulation driver:
//! - Logical time ([`Timestamp`])
//! - Event identity ([`EventUid`], [`EventKey`])
//! - Ownership ([`NodeId`], [`Context`])
//! - Scheduling policy tags ([`EventKind`])
//! - Exploration metadata ([`TransmitInfo`])
//!
//! Nothing in here knows about callbacks. An [`EventKey`] is the immutable
//! part of a scheduled event and is cheap to copy into handles.

use std::{
    cmp::Ordering,
    fmt::{Debug, Display},
    ops::Add,
};

use serde::{Deserialize, Serialize};

// ============================================================================
// Logical Time
// ============================================================================

/// A simulated instant, in the simulator's time unit (milliseconds by
/// convention). Unrelated to wall-clock time.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct Timestamp(u64);

impl Timestamp {
    /// The origin of simulated time.
    pub const ZERO: Timestamp = Timestamp(0);

    /// The largest representable instant. Used as the "never" sentinel for
    /// unreachable lookahead bounds.
    pub const MAX: Timestamp = Timestamp(u64::MAX);

    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }

    /// Adds a delay, returning `None` on overflow.
    pub fn checked_add(self, delay: u64) -> Option<Timestamp> {
        self.0.checked_add(delay).map(Timestamp)
    }

    /// Adds a delay, clamping at [`Timestamp::MAX`].
    pub fn saturating_add(self, delay: u64) -> Timestamp {
        Timestamp(self.0.saturating_add(delay))
    }

    /// Returns the distance from `earlier` to `self`, or zero if `earlier` is
    /// in the future.
    pub fn saturating_since(self, earlier: Timestamp) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

impl Add<u64> for Timestamp {
    type Output = Timestamp;

    fn add(self, rhs: u64) -> Self::Output {
        Timestamp(self.0 + rhs)
    }
}

impl Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Timestamp {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<Timestamp> for u64 {
    fn from(ts: Timestamp) -> Self {
        ts.0
    }
}

// ============================================================================
// Event Identity
// ============================================================================

/// Globally unique, monotonically increasing sequence number assigned when an
/// event is scheduled. Breaks ties between events with equal timestamps.
///
/// Values below [`EventUid::FIRST`] are reserved:
/// - `0` marks an invalid event
/// - `1` marks "now" events
/// - `2` marks destroy-phase events
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct EventUid(u64);

impl EventUid {
    pub const INVALID: EventUid = EventUid(0);
    pub const NOW: EventUid = EventUid(1);
    pub const DESTROY: EventUid = EventUid(2);

    /// First uid handed out to regular events.
    pub const FIRST: EventUid = EventUid(4);

    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns the uid that follows this one.
    pub fn next(self) -> EventUid {
        EventUid(self.0 + 1)
    }

    /// Returns true for the reserved invalid/now/destroy values.
    pub fn is_reserved(self) -> bool {
        self < Self::FIRST
    }
}

impl Display for EventUid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for EventUid {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<EventUid> for u64 {
    fn from(uid: EventUid) -> Self {
        uid.0
    }
}

// ============================================================================
// Ownership
// ============================================================================

/// Index of a simulated entity (a network node).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct NodeId(u32);

impl NodeId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn as_u32(self) -> u32 {
        self.0
    }

    /// Returns the id as a vector index.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for NodeId {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl From<NodeId> for u32 {
    fn from(id: NodeId) -> Self {
        id.0
    }
}

/// The owner of an event: either a specific entity with its own local clock,
/// or the simulator itself.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub enum Context {
    /// Simulator-owned; runs against the global clock.
    #[default]
    Global,
    /// Owned by one entity; runs against that entity's local clock.
    Node(NodeId),
}

impl Context {
    pub fn node(id: u32) -> Self {
        Context::Node(NodeId::new(id))
    }

    pub fn is_global(self) -> bool {
        matches!(self, Context::Global)
    }

    /// Returns the owning entity, if any.
    pub fn node_id(self) -> Option<NodeId> {
        match self {
            Context::Global => None,
            Context::Node(id) => Some(id),
        }
    }
}

impl Display for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Context::Global => write!(f, "global"),
            Context::Node(id) => write!(f, "node-{id}"),
        }
    }
}

impl From<NodeId> for Context {
    fn from(id: NodeId) -> Self {
        Context::Node(id)
    }
}

// ============================================================================
// Event Kinds
// ============================================================================

/// Scheduling-policy tag carried by every event.
///
/// The kind never participates in ordering. It selects queue-engine behavior:
/// Timeouts act as barriers, Stop marks the end of the horizon, and
/// Outgoing/Incoming drive cross-entity message handling.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub enum EventKind {
    #[default]
    Undefined,
    Timeout,
    Stop,
    Outgoing,
    Incoming,
}

impl EventKind {
    /// Returns true if events of this kind defer later insertions.
    pub fn is_barrier(self) -> bool {
        matches!(self, EventKind::Timeout)
    }
}

impl Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EventKind::Undefined => "undefined",
            EventKind::Timeout => "timeout",
            EventKind::Stop => "stop",
            EventKind::Outgoing => "outgoing",
            EventKind::Incoming => "incoming",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Event Key
// ============================================================================

/// The immutable identity of a scheduled event: when it fires, its tie
/// breaker, and who owns it.
///
/// Keys order lexicographically by `(ts, uid)`. Since uids are unique, two
/// live keys never compare equal on that pair; `context` only participates
/// to keep `Ord` consistent with `Eq`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventKey {
    pub ts: Timestamp,
    pub uid: EventUid,
    pub context: Context,
}

impl EventKey {
    pub fn new(ts: Timestamp, uid: EventUid, context: Context) -> Self {
        Self { ts, uid, context }
    }

    /// Returns true if `self` must be removed before `other`.
    pub fn precedes(&self, other: &EventKey) -> bool {
        (self.ts, self.uid) < (other.ts, other.uid)
    }
}

impl Ord for EventKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.ts
            .cmp(&other.ts)
            .then_with(|| self.uid.cmp(&other.uid))
            .then_with(|| self.context.cmp(&other.context))
    }
}

impl PartialOrd for EventKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Display for EventKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}@{}ms/{}", self.uid, self.ts, self.context)
    }
}

/// Metadata marking an event as a packet transmission, which makes it
/// eligible for timestamp perturbation by an exploration engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransmitInfo {
    /// Size of the transmitted packet in bytes.
    pub packet_size: u32,
}

impl TransmitInfo {
    pub fn new(packet_size: u32) -> Self {
        Self { packet_size }
    }
}

// ============================================================================
// Tests
// ============================================================================
