//! Simulation driver error types.

use kairos_sched::SchedError;

/// Errors returned by the simulation driver.
///
/// Producer protocol violations (negative clocks, unknown contexts, removing
/// an event that cannot be found) panic instead.
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    /// The exploration hook ended this branch; the run stopped early.
    #[error("exploration branch terminated: {reason}")]
    BranchTerminated { reason: String },

    /// The queue engine rejected the configuration.
    #[error(transparent)]
    Sched(#[from] SchedError),
}
