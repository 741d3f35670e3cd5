//! Queue engine error types.

/// Recoverable errors raised by the queue engine.
///
/// Protocol violations (removing an unknown handle, scheduling into an
/// entity that does not exist) are programmer errors and panic instead.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchedError {
    /// The scheduler configuration is internally inconsistent.
    #[error("invalid scheduler configuration: {0}")]
    InvalidConfig(String),

    /// The exploration hook ended the current exploration branch.
    #[error("exploration branch terminated: {reason}")]
    BranchTerminated { reason: String },

    /// Exploration coverage input could not be parsed.
    #[error("malformed coverage input at line {line}: {detail}")]
    MalformedCoverage { line: usize, detail: String },
}
