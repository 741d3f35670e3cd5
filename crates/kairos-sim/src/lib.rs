//! # kairos-sim: Simulation driver for the `Kairos` scheduling kernel
//!
//! Runs callbacks in the order chosen by a [`kairos_sched::QueueEngine`],
//! keeping one global logical clock and one clock per entity.
//!
//! - [`Simulator`]: schedule, cancel, remove, run, stop, destroy
//! - [`EventId`]: handle for cancellation and expiry queries
//! - [`RemoteScheduler`]: thread-safe front door, merged on the owner thread
//!
//! ## Quick Start
//!
//! ```
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! use kairos_sched::SchedulerConfig;
//! use kairos_sim::Simulator;
//!
//! let mut sim = Simulator::new(SchedulerConfig::new(1)).unwrap();
//! let fired = Rc::new(RefCell::new(Vec::new()));
//! for delay in [5, 3] {
//!     let fired = Rc::clone(&fired);
//!     sim.schedule(delay, move |sim| fired.borrow_mut().push(sim.now().as_u64()));
//! }
//! sim.run().unwrap();
//! assert_eq!(*fired.borrow(), vec![3, 5]);
//! ```

mod clock;
mod error;
mod handle;
mod inbox;
mod simulator;

pub use clock::LogicalClock;
pub use error::SimError;
pub use handle::EventId;
pub use inbox::{Inbox, RemoteCallback, RemoteRequest, RemoteScheduler};
pub use simulator::{Callback, RunSummary, Simulator};
