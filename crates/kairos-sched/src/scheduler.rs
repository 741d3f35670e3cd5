//! Scheduler trait implemented by every queue layout.
//!
//! - **`ListQueue`**: a single sorted list, optionally with barrier deferral
//! - **`LocalLists`**: one list per entity plus a global list, selected by
//!   lookahead
//!
//! `QueueEngine` composes these with exploration perturbation and is what the
//! driver owns.

use kairos_types::EventKey;

use crate::Event;

/// A time-ordered container of events.
pub trait Scheduler {
    /// Inserts an event. The event's key must be unique in the queue.
    fn insert(&mut self, event: Event);

    /// Returns true if no event is pending.
    fn is_empty(&self) -> bool;

    /// Returns the number of pending events, including deferred ones.
    fn len(&self) -> usize;

    /// Returns the key of the event `remove_next` would return.
    ///
    /// Takes `&mut self` because partitioned layouts may settle cross-entity
    /// transfers before they can answer. Settling never loses events.
    fn peek_next(&mut self) -> Option<EventKey>;

    /// Removes and returns the next event that is safe to execute.
    fn remove_next(&mut self) -> Option<Event>;

    /// Removes a specific event, wherever it is held.
    ///
    /// Returns `None` if the event is not in the queue.
    fn remove(&mut self, key: &EventKey) -> Option<Event>;

    /// Removes every event, deferred ones included.
    fn drain(&mut self) -> Vec<Event>;
}
