//! Prometheus metrics for the ticket market.
//!
//! Metrics are fed from [`MarketEvent`]s by the
//! [`TracingSink`](crate::telemetry::TracingSink), plus a stop-duration
//! histogram recorded by the marketplace itself:
//! - Pool traffic (issued, withdrawn, revenue, full/empty waits, occupancy)
//! - Participant lifecycle (started, finished by termination, aborted, panicked)
//! - Shutdown latency
//!
//! # Example
//!
//! ```rust,no_run
//! use ticket_market_runtime::metrics::MetricsServer;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//!
//! if let Some(text) = server.render() {
//!     println!("{text}");
//! }
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;
use ticket_market_core::{Money, Role, Termination};

pub use metrics::{counter, gauge, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus recorder plus the address its `/metrics` endpoint is served on.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new, not yet installed, metrics server.
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Describe every market metric and install the Prometheus recorder.
    ///
    /// A recorder that is already installed (another server in the same
    /// process) is not an error; [`render`](Self::render) then returns `None`.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or installed.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[0.001, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!(addr = %self.addr, "Metrics recorder installed");
                Ok(())
            }
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!(
                        "Metrics recorder already initialized, skipping re-initialization"
                    );
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            }
        }
    }

    /// Address the `/metrics` endpoint is served on
    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus text format.
    ///
    /// Returns `None` if this server did not install the recorder.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

fn register_metrics() {
    // Pool
    describe_counter!(
        "market_tickets_issued_total",
        "Total number of tickets placed in the pool"
    );
    describe_counter!(
        "market_tickets_withdrawn_total",
        "Total number of tickets bought from the pool"
    );
    describe_counter!(
        "market_revenue_cents_total",
        "Total revenue collected, in cents"
    );
    describe_counter!(
        "market_pool_full_total",
        "Number of times an issuer waited on a full pool"
    );
    describe_counter!(
        "market_pool_empty_total",
        "Number of times a customer waited on an empty pool"
    );
    describe_gauge!("market_pool_size", "Tickets currently in the pool");

    // Participants
    describe_counter!(
        "market_participants_started_total",
        "Participant tasks started, by role"
    );
    describe_counter!(
        "market_participants_finished_total",
        "Participant tasks finished, by role and termination"
    );
    describe_counter!(
        "market_participants_aborted_total",
        "Participant tasks aborted after the shutdown timeout"
    );
    describe_counter!(
        "market_participants_panicked_total",
        "Participant tasks that panicked"
    );

    // Orchestrator
    describe_histogram!(
        "market_stop_duration_seconds",
        "Time taken to stop a simulation run"
    );
}

/// Pool metrics recorder.
pub struct PoolMetrics;

impl PoolMetrics {
    /// Record a ticket entering the pool.
    #[allow(clippy::cast_precision_loss)] // pool sizes are far below 2^52
    pub fn record_issued(pool_size: usize) {
        counter!("market_tickets_issued_total").increment(1);
        gauge!("market_pool_size").set(pool_size as f64);
    }

    /// Record a ticket leaving the pool.
    #[allow(clippy::cast_precision_loss)]
    pub fn record_withdrawn(price: Money, pool_size: usize) {
        counter!("market_tickets_withdrawn_total").increment(1);
        counter!("market_revenue_cents_total").increment(price.cents());
        gauge!("market_pool_size").set(pool_size as f64);
    }

    /// Record an issuer blocking on a full pool.
    pub fn record_full() {
        counter!("market_pool_full_total").increment(1);
    }

    /// Record a customer blocking on an empty pool.
    pub fn record_empty() {
        counter!("market_pool_empty_total").increment(1);
    }
}

/// Participant lifecycle metrics recorder.
pub struct ParticipantMetrics;

impl ParticipantMetrics {
    /// Record a participant task starting.
    pub fn record_started(role: Role) {
        counter!("market_participants_started_total", "role" => role.to_string()).increment(1);
    }

    /// Record a participant loop ending.
    pub fn record_finished(role: Role, termination: Termination) {
        counter!(
            "market_participants_finished_total",
            "role" => role.to_string(),
            "termination" => termination.to_string()
        )
        .increment(1);
    }

    /// Record a participant task being aborted.
    pub fn record_aborted(role: Role) {
        counter!("market_participants_aborted_total", "role" => role.to_string()).increment(1);
    }

    /// Record a participant task panicking.
    pub fn record_panicked(role: Role) {
        counter!("market_participants_panicked_total", "role" => role.to_string()).increment(1);
    }
}

/// Orchestrator metrics recorder.
pub struct MarketMetrics;

impl MarketMetrics {
    /// Record how long a stop took.
    pub fn record_stop(duration: Duration) {
        histogram!("market_stop_duration_seconds").record(duration.as_secs_f64());
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn server_starts_without_handle() {
        let server = MetricsServer::new("127.0.0.1:0".parse().unwrap());
        assert!(server.handle().is_none());
        assert!(server.render().is_none());
    }

    #[test]
    fn start_tolerates_existing_recorder() {
        let mut first = MetricsServer::new("127.0.0.1:0".parse().unwrap());
        let mut second = MetricsServer::new("127.0.0.1:0".parse().unwrap());
        assert!(first.start().is_ok());
        assert!(second.start().is_ok());
    }

    #[test]
    fn recorded_metrics_render() {
        let mut server = MetricsServer::new("127.0.0.1:0".parse().unwrap());
        server.start().unwrap();

        PoolMetrics::record_issued(3);
        PoolMetrics::record_withdrawn(Money::from_cents(1250), 2);
        ParticipantMetrics::record_finished(Role::Vendor, Termination::QuotaReached);
        MarketMetrics::record_stop(Duration::from_millis(40));

        // Another test may own the global recorder.
        if let Some(rendered) = server.render() {
            assert!(rendered.contains("market_tickets_issued_total"));
            assert!(rendered.contains("market_revenue_cents_total"));
            assert!(rendered.contains("market_participants_finished_total"));
            assert!(rendered.contains("market_stop_duration_seconds"));
        }
    }
}
