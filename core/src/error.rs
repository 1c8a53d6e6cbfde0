//! Error types surfaced to callers of the marketplace control surface.

use thiserror::Error;

/// Errors returned by marketplace operations.
///
/// Configuration problems and invalid state transitions are reported here.
/// Cancellation, stop and "not found" are normal outcomes and have their own
/// result types instead.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MarketError {
    /// Pool capacity must be at least one ticket
    #[error("Invalid capacity: must be greater than zero")]
    InvalidCapacity,

    /// A participant parameter failed validation
    #[error("Invalid parameter '{field}': {reason}")]
    InvalidParameter {
        /// Offending field
        field: &'static str,
        /// What was wrong with it
        reason: String,
    },

    /// `start` was called while a simulation is running
    #[error("Simulation is already running")]
    AlreadyRunning,

    /// The operation needs a running simulation
    #[error("Simulation is not running")]
    NotRunning,

    /// A participant with the same name is already active in that role
    #[error("A {role} named '{name}' is already active")]
    DuplicateParticipant {
        /// "vendor" or "customer"
        role: String,
        /// Name as supplied by the caller
        name: String,
    },
}
