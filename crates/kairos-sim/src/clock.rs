//! Logical clocks.

use kairos_types::{EventUid, Timestamp};

/// Position of one logical clock: the timestamp and uid of the last event
/// executed against it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LogicalClock {
    now: Timestamp,
    last_uid: EventUid,
}

impl LogicalClock {
    pub fn now(&self) -> Timestamp {
        self.now
    }

    pub fn last_uid(&self) -> EventUid {
        self.last_uid
    }

    /// Moves the clock to an event about to execute.
    pub fn advance_to(&mut self, ts: Timestamp, uid: EventUid) {
        self.now = ts;
        self.last_uid = uid;
    }

    /// True if an event at `(ts, uid)` is not after this clock's position.
    pub fn has_passed(&self, ts: Timestamp, uid: EventUid) -> bool {
        ts < self.now || (ts == self.now && uid <= self.last_uid)
    }

    /// Absolute timestamp `delay` after now.
    ///
    /// # Panics
    ///
    /// Panics if the result does not fit in a timestamp.
    pub fn after(&self, delay: u64) -> Timestamp {
        self.now.checked_add(delay).unwrap_or_else(|| {
            panic!("scheduling {delay} after {} overflows logical time", self.now)
        })
    }
}
