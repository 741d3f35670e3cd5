//! Handles returned to producers.

use kairos_types::{Context, EventKey, EventKind, EventUid, Timestamp};

/// Identifies one scheduled event for later cancellation or queries.
///
/// Handles are plain data; holding one keeps nothing alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventId {
    key: EventKey,
    kind: EventKind,
    /// Distinguishes destroy-phase handles, which all share
    /// [`EventUid::DESTROY`]. Equal to the key's uid otherwise.
    serial: EventUid,
}

impl EventId {
    pub(crate) fn new(key: EventKey, kind: EventKind) -> Self {
        Self {
            key,
            kind,
            serial: key.uid,
        }
    }

    pub(crate) fn destroy(ts: Timestamp, serial: EventUid) -> Self {
        Self {
            key: EventKey::new(ts, EventUid::DESTROY, Context::Global),
            kind: EventKind::Undefined,
            serial,
        }
    }

    pub fn key(&self) -> EventKey {
        self.key
    }

    pub fn ts(&self) -> Timestamp {
        self.key.ts
    }

    pub fn uid(&self) -> EventUid {
        self.key.uid
    }

    pub fn context(&self) -> Context {
        self.key.context
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// True for handles returned by `schedule_destroy`.
    pub fn is_destroy(&self) -> bool {
        self.key.uid == EventUid::DESTROY
    }

    pub(crate) fn serial(&self) -> EventUid {
        self.serial
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.key, self.kind)
    }
}
