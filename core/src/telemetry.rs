//! Telemetry contract between the simulation core and its observers.
//!
//! The core never writes to the console or to files. Every observable
//! occurrence is described as a [`MarketEvent`] and handed to an injected
//! [`TelemetrySink`]. The runtime ships a `tracing`-backed sink; tests use a
//! recording sink.
//!
//! # Example
//!
//! ```
//! use ticket_market_core::telemetry::{MarketEvent, TelemetrySink};
//!
//! struct Stdout;
//!
//! impl TelemetrySink for Stdout {
//!     fn record(&self, event: MarketEvent) {
//!         println!("{}", event.kind());
//!     }
//! }
//!
//! Stdout.record(MarketEvent::PoolEmpty);
//! ```

use crate::money::Money;
use crate::participant::{ParticipantInfo, Termination};
use serde::Serialize;
use std::sync::Arc;

/// Discrete events emitted by the pool, the participants and the orchestrator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MarketEvent {
    /// A simulation run started
    SimulationStarted {
        /// Pool capacity for this run
        capacity: usize,
    },

    /// A simulation run finished stopping
    SimulationStopped {
        /// Tickets issued during the run
        total_issued: u64,
        /// Revenue collected during the run
        total_revenue: Money,
    },

    /// The pool's stop flag was set (first call only)
    StopRequested,

    /// A vendor placed a ticket in the pool
    TicketIssued {
        /// Vendor name
        vendor: String,
        /// Per-vendor ticket sequence number
        ticket_id: u64,
        /// Event label
        event_name: String,
        /// Pool occupancy right after the insert
        pool_size: usize,
    },

    /// A customer took a ticket out of the pool
    TicketWithdrawn {
        /// Customer name
        customer: String,
        /// Per-vendor ticket sequence number
        ticket_id: u64,
        /// Price paid
        price: Money,
        /// Pool occupancy right after the removal
        pool_size: usize,
    },

    /// An issuer found the pool full and is about to wait
    PoolFull {
        /// Pool capacity
        capacity: usize,
    },

    /// A withdrawer found the pool empty and is about to wait
    PoolEmpty,

    /// A participant task began executing
    ParticipantStarted {
        /// Who started
        participant: ParticipantInfo,
    },

    /// A participant task finished its loop
    ParticipantFinished {
        /// Who finished
        participant: ParticipantInfo,
        /// Why the loop ended
        termination: Termination,
        /// Tickets issued or bought before ending
        completed: u32,
    },

    /// A participant task had to be aborted because it did not exit in time
    ParticipantAborted {
        /// Who was aborted
        participant: ParticipantInfo,
    },

    /// A participant task panicked instead of returning
    ParticipantPanicked {
        /// Who panicked
        participant: ParticipantInfo,
        /// Panic payload, when it was a string
        message: String,
    },
}

impl MarketEvent {
    /// Short, stable name of the event variant
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::SimulationStarted { .. } => "simulation_started",
            Self::SimulationStopped { .. } => "simulation_stopped",
            Self::StopRequested => "stop_requested",
            Self::TicketIssued { .. } => "ticket_issued",
            Self::TicketWithdrawn { .. } => "ticket_withdrawn",
            Self::PoolFull { .. } => "pool_full",
            Self::PoolEmpty => "pool_empty",
            Self::ParticipantStarted { .. } => "participant_started",
            Self::ParticipantFinished { .. } => "participant_finished",
            Self::ParticipantAborted { .. } => "participant_aborted",
            Self::ParticipantPanicked { .. } => "participant_panicked",
        }
    }
}

/// Receiver of [`MarketEvent`]s.
///
/// Implementations must be cheap and non-blocking: events are recorded from
/// inside participant loops on the hot issue/withdraw path.
pub trait TelemetrySink: Send + Sync {
    /// Record one event
    fn record(&self, event: MarketEvent);
}

impl<T: TelemetrySink + ?Sized> TelemetrySink for Arc<T> {
    fn record(&self, event: MarketEvent) {
        (**self).record(event);
    }
}

/// Sink that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl TelemetrySink for NoopSink {
    fn record(&self, _event: MarketEvent) {}
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_type_tag() {
        let json = serde_json::to_value(MarketEvent::PoolFull { capacity: 3 }).unwrap();
        assert_eq!(json["type"], "pool_full");
        assert_eq!(json["capacity"], 3);
    }

    #[test]
    fn kind_matches_serde_tag() {
        let event = MarketEvent::SimulationStopped {
            total_issued: 1,
            total_revenue: Money::from_cents(100),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], event.kind());
    }
}
