//! # kairos-sched: Queue engine for the `Kairos` scheduling kernel
//!
//! Decides which pending event runs next. Four strategies compose:
//!
//! - **Sorted list**: `(timestamp, uid)` order, the contract every other
//!   strategy preserves
//! - **Path reduction**: two-branch comparator and tail fast path
//! - **Waiting list**: Timeout events defer insertions behind them
//! - **Local lists**: one queue per entity, selected under lookahead, with
//!   an optional inbound-credit rule for outgoing messages ("v2")
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         QueueEngine                           │
//! │  ┌────────────┐   ┌─────────────────────────────────────────┐ │
//! │  │ Perturber  │──▶│ Layout                                  │ │
//! │  │ (explore)  │   │   Single(ListQueue)                     │ │
//! │  └────────────┘   │   Partitioned(LocalLists)               │ │
//! │        │          │     global lane + one ListQueue/entity  │ │
//! │        ▼          │     ImpactMatrix, CreditTable           │ │
//! │ ExplorationHook   └─────────────────────────────────────────┘ │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The layout is chosen once from [`StrategySet`]; nothing branches on
//! strategy booleans per call.
//!
//! ## Quick Start
//!
//! ```
//! use kairos_sched::{Event, QueueEngine, SchedulerConfig};
//! use kairos_types::{Context, EventKey, EventKind, EventUid, Timestamp};
//!
//! let mut engine = QueueEngine::new(&SchedulerConfig::new(1)).unwrap();
//! for (ts, uid) in [(5, 5), (5, 4), (3, 6)] {
//!     let key = EventKey::new(Timestamp::new(ts), EventUid::new(uid), Context::Global);
//!     engine.insert(Event::new(key, EventKind::Undefined)).unwrap();
//! }
//! let order: Vec<u64> = std::iter::from_fn(|| engine.remove_next())
//!     .map(|e| e.key.uid.as_u64())
//!     .collect();
//! assert_eq!(order, vec![6, 4, 5]);
//! ```

mod config;
mod engine;
mod error;
mod event;
pub mod explore;
mod latency;
mod list;
mod local;
mod ordering;
mod scheduler;

pub use config::{LookaheadBoundary, PerturbationConfig, SchedulerConfig, StrategySet};
pub use engine::{Layout, QueueEngine};
pub use error::SchedError;
pub use event::Event;
pub use explore::{ExplorationHook, ExplorationTrace, NoopHook, SeededHook};
pub use latency::{ImpactMatrix, UNREACHABLE};
pub use list::{ListPolicy, ListQueue};
pub use local::{CreditTable, LocalLists};
pub use ordering::OrderingPolicy;
pub use scheduler::Scheduler;
