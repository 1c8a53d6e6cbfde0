//! `tracing` + `metrics` backed [`TelemetrySink`].

use crate::metrics::{ParticipantMetrics, PoolMetrics};
use ticket_market_core::{MarketEvent, TelemetrySink};

/// Logs every [`MarketEvent`] through `tracing` and updates the market
/// metrics.
///
/// Per-ticket traffic is logged at `debug`, lifecycle at `info`, aborts at
/// `warn` and panics at `error`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl TelemetrySink for TracingSink {
    fn record(&self, event: MarketEvent) {
        match event {
            MarketEvent::SimulationStarted { capacity } => {
                tracing::info!(capacity, "Simulation started");
            }
            MarketEvent::SimulationStopped {
                total_issued,
                total_revenue,
            } => {
                tracing::info!(total_issued, %total_revenue, "Simulation stopped");
            }
            MarketEvent::StopRequested => {
                tracing::info!("Stop requested, waking blocked participants");
            }
            MarketEvent::TicketIssued {
                vendor,
                ticket_id,
                event_name,
                pool_size,
            } => {
                PoolMetrics::record_issued(pool_size);
                tracing::debug!(%vendor, ticket_id, %event_name, pool_size, "Ticket issued");
            }
            MarketEvent::TicketWithdrawn {
                customer,
                ticket_id,
                price,
                pool_size,
            } => {
                PoolMetrics::record_withdrawn(price, pool_size);
                tracing::debug!(%customer, ticket_id, %price, pool_size, "Ticket bought");
            }
            MarketEvent::PoolFull { capacity } => {
                PoolMetrics::record_full();
                tracing::debug!(capacity, "Pool full, vendor waiting");
            }
            MarketEvent::PoolEmpty => {
                PoolMetrics::record_empty();
                tracing::debug!("Pool empty, customer waiting");
            }
            MarketEvent::ParticipantStarted { participant } => {
                ParticipantMetrics::record_started(participant.role);
                tracing::info!(
                    name = %participant.name,
                    role = %participant.role,
                    id = %participant.id,
                    "Participant started"
                );
            }
            MarketEvent::ParticipantFinished {
                participant,
                termination,
                completed,
            } => {
                ParticipantMetrics::record_finished(participant.role, termination);
                tracing::info!(
                    name = %participant.name,
                    role = %participant.role,
                    %termination,
                    completed,
                    "Participant finished"
                );
            }
            MarketEvent::ParticipantAborted { participant } => {
                ParticipantMetrics::record_aborted(participant.role);
                tracing::warn!(
                    name = %participant.name,
                    role = %participant.role,
                    "Participant did not exit in time, aborted"
                );
            }
            MarketEvent::ParticipantPanicked {
                participant,
                message,
            } => {
                ParticipantMetrics::record_panicked(participant.role);
                tracing::error!(
                    name = %participant.name,
                    role = %participant.role,
                    %message,
                    "Participant panicked"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ticket_market_core::{Money, ParticipantId, ParticipantInfo, Role, Termination};

    #[test]
    fn records_every_event_kind() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        let participant = ParticipantInfo {
            id: ParticipantId::new(),
            name: "Vendor 0".to_string(),
            role: Role::Vendor,
        };

        let events = [
            MarketEvent::SimulationStarted { capacity: 4 },
            MarketEvent::TicketIssued {
                vendor: "Vendor 0".to_string(),
                ticket_id: 1,
                event_name: "movie".to_string(),
                pool_size: 1,
            },
            MarketEvent::TicketWithdrawn {
                customer: "Customer 0".to_string(),
                ticket_id: 1,
                price: Money::from_cents(500),
                pool_size: 0,
            },
            MarketEvent::PoolFull { capacity: 4 },
            MarketEvent::PoolEmpty,
            MarketEvent::StopRequested,
            MarketEvent::ParticipantStarted {
                participant: participant.clone(),
            },
            MarketEvent::ParticipantFinished {
                participant: participant.clone(),
                termination: Termination::Stopped,
                completed: 1,
            },
            MarketEvent::ParticipantAborted {
                participant: participant.clone(),
            },
            MarketEvent::ParticipantPanicked {
                participant,
                message: "boom".to_string(),
            },
            MarketEvent::SimulationStopped {
                total_issued: 1,
                total_revenue: Money::from_cents(500),
            },
        ];

        for event in events {
            TracingSink.record(event);
        }
    }
}
