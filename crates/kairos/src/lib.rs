//! # Kairos
//!
//! Deterministic scheduling kernel for discrete-event network simulation.
//!
//! Producers schedule callbacks at logical timestamps; the kernel executes
//! them in `(timestamp, uid)` order on one thread, whichever combination of
//! queue strategies is active:
//!
//! - **Ordering contract** - strictly increasing uids break timestamp ties
//! - **Strategy composition** - path reduction, waiting list, local lists
//! - **Exploration** - symbolic perturbation of transmit timestamps
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                            Kairos                             │
//! │  ┌──────────┐   ┌─────────────┐   ┌────────────────────────┐ │
//! │  │  Config  │ → │  Simulator  │ → │      QueueEngine       │ │
//! │  │(toml/env)│   │(clocks, ids)│   │(list, lanes, perturb)  │ │
//! │  └──────────┘   └─────────────┘   └────────────────────────┘ │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```
//! use kairos::{Context, SchedulerConfig, Simulator, StrategySet};
//!
//! let config = SchedulerConfig::new(2).with_strategies(StrategySet::all());
//! let mut sim = Simulator::new(config).unwrap();
//! sim.schedule_with_context(Context::node(1), 7, |sim| {
//!     sim.schedule(2, |sim| assert_eq!(sim.now().as_u64(), 9));
//! });
//! let summary = sim.run().unwrap();
//! assert_eq!(summary.events_processed, 2);
//! ```

use std::path::Path;

use anyhow::{Context as _, Result};

// Driver
pub use kairos_sim::{
    Callback, EventId, LogicalClock, RemoteScheduler, RunSummary, SimError, Simulator,
};

// Queue engine
pub use kairos_sched::{
    Event, ExplorationHook, ExplorationTrace, ImpactMatrix, Layout, LookaheadBoundary, NoopHook,
    PerturbationConfig, QueueEngine, SchedError, SchedulerConfig, SeededHook, StrategySet,
    explore,
};

// Core types
pub use kairos_types::{Context, EventKey, EventKind, EventUid, NodeId, Timestamp, TransmitInfo};

// Configuration
pub use kairos_config::{ConfigError, ConfigLoader, KairosConfig};

/// Builds a simulator from the layered configuration rooted at `project_dir`.
pub fn simulator_from_dir(project_dir: impl AsRef<Path>) -> Result<Simulator> {
    let project_dir = project_dir.as_ref();
    let config = ConfigLoader::new()
        .with_project_dir(project_dir)
        .load()
        .with_context(|| format!("loading configuration from {}", project_dir.display()))?;
    let scheduler = config
        .into_scheduler_config()
        .context("invalid scheduler configuration")?;
    Ok(Simulator::new(scheduler)?)
}
