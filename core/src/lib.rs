//! # Ticket Market Core
//!
//! Domain types and contracts for the ticket market simulator.
//!
//! Vendors release tickets into a bounded shared pool; customers withdraw
//! them. This crate holds everything that does not need an async runtime:
//!
//! - **Ticket** / **Money**: immutable values moved through the pool
//! - **Participants**: validated vendor and customer parameters, ids, and
//!   the [`Termination`](participant::Termination) outcomes of their loops
//! - **Telemetry**: the [`MarketEvent`](telemetry::MarketEvent) vocabulary and
//!   the injected [`TelemetrySink`](telemetry::TelemetrySink) trait
//! - **Environment**: the [`Clock`](environment::Clock) used to timestamp sales
//! - **Config**: the JSON-persisted [`MarketConfig`](config::MarketConfig)
//!
//! The pool, participant loops and orchestrator live in
//! `ticket-market-runtime`.
//!
//! ## Example
//!
//! ```
//! use ticket_market_core::{Money, VendorParams};
//!
//! let params = VendorParams::new("Vendor 0", "movie", 3, 1, 10, "12.50".parse::<Money>()?);
//! params.validate()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

// Re-export commonly used types
pub use chrono::{DateTime, Utc};

/// Configuration loading, validation and persistence
pub mod config;

/// Error types returned by marketplace operations
pub mod error;

/// Exact monetary amounts
pub mod money;

/// Participant identity, parameters and termination outcomes
pub mod participant;

/// Telemetry events and sinks
pub mod telemetry;

/// The ticket value type
pub mod ticket;

/// Environment module - Dependency injection traits
///
/// Participants record sale timestamps through these traits so tests can
/// pin time to a fixed instant.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```ignore
    /// // Test - fixed time for deterministic tests
    /// struct FixedClock { time: DateTime<Utc> }
    /// impl Clock for FixedClock {
    ///     fn now(&self) -> DateTime<Utc> {
    ///         self.time
    ///     }
    /// }
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Production clock backed by the system time
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}

pub use config::{ConfigError, CustomerSpec, MarketConfig, VendorSpec};
pub use environment::{Clock, SystemClock};
pub use error::MarketError;
pub use money::{Money, MoneyParseError};
pub use participant::{
    CustomerParams, ParticipantId, ParticipantInfo, Role, Termination, VendorParams,
};
pub use telemetry::{MarketEvent, NoopSink, TelemetrySink};
pub use ticket::Ticket;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_moves_forward() {
        let clock = SystemClock;
        let first = clock.now();
        let second = clock.now();
        assert!(second >= first);
    }
}
