//! # Ticket Market Simulator
//!
//! Building blocks of the `ticket-market` binary: config resolution,
//! marketplace population, the run loop and report rendering.

use std::fmt::Write as _;
use std::path::Path;
use std::time::Duration;
use ticket_market_core::{ConfigError, MarketConfig};
use ticket_market_runtime::{MarketStatus, Marketplace, StopReport, UnitExit};
use tokio::time::Interval;

/// Prometheus `/metrics` endpoint
pub mod metrics_endpoint;
/// Process signal handling
pub mod shutdown;

/// How often the run loop checks whether every participant has finished
pub const FINISH_POLL: Duration = Duration::from_millis(200);

/// Resolve the configuration: an explicit path wins, then `MARKET_CONFIG`,
/// then defaults. `MARKET_CAPACITY` overrides the capacity in every case.
///
/// # Errors
///
/// Returns error if the chosen file cannot be loaded or is invalid.
pub fn load_config(path: Option<&Path>) -> Result<MarketConfig, ConfigError> {
    match path {
        Some(path) => MarketConfig::load_with_env(path),
        None => MarketConfig::from_env(),
    }
}

/// Add every configured participant to a running marketplace.
///
/// # Errors
///
/// Returns error on the first participant that is rejected.
pub fn populate(market: &Marketplace, config: &MarketConfig) -> anyhow::Result<usize> {
    for spec in &config.vendors {
        market.add_vendor(spec.to_params()?)?;
    }
    for spec in &config.customers {
        market.add_customer(spec.to_params()?)?;
    }
    Ok(config.vendors.len() + config.customers.len())
}

/// Why the run loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunEnd {
    /// Every participant finished on its own
    AllFinished,
    /// Ctrl+C / SIGTERM
    Signal,
}

/// Log status periodically until every participant finishes or `shutdown`
/// resolves.
///
/// # Errors
///
/// Returns error if `shutdown` fails (signal handler registration).
pub async fn run_until_done<F>(
    market: &Marketplace,
    status_interval: Option<Duration>,
    shutdown: F,
) -> std::io::Result<RunEnd>
where
    F: std::future::Future<Output = std::io::Result<()>>,
{
    tokio::pin!(shutdown);
    let mut status_ticker = status_interval.map(tokio::time::interval);
    let mut finish_poll = tokio::time::interval(FINISH_POLL);

    loop {
        tokio::select! {
            result = &mut shutdown => {
                result?;
                return Ok(RunEnd::Signal);
            }
            () = next_tick(&mut status_ticker) => {
                log_status(&market.status());
            }
            _ = finish_poll.tick() => {
                let status = market.status();
                if status.active_vendors + status.active_customers == 0 {
                    tracing::info!("All participants finished");
                    return Ok(RunEnd::AllFinished);
                }
            }
        }
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

fn log_status(status: &MarketStatus) {
    tracing::info!(
        tickets = status.current_size,
        capacity = status.capacity,
        issued = status.total_issued,
        sold = status.total_withdrawn,
        revenue = %status.total_revenue,
        vendors = status.active_vendors,
        customers = status.active_customers,
        "Market status"
    );
}

/// Human-readable summary of a stop report
#[must_use]
pub fn render_report(report: &StopReport) -> String {
    let snap = &report.final_snapshot;
    let mut out = String::new();

    let _ = writeln!(out, "=== Simulation stopped ===");
    let _ = writeln!(out, "Tickets issued:    {}", snap.total_issued);
    let _ = writeln!(out, "Tickets sold:      {}", snap.total_withdrawn);
    let _ = writeln!(out, "Left in pool:      {}/{}", snap.current_size, snap.capacity);
    let _ = writeln!(out, "Total revenue:     {}", snap.total_revenue);
    let _ = writeln!(out, "Stopped in:        {} ms", report.duration.as_millis());

    if !report.exits.is_empty() {
        let _ = writeln!(out, "\nParticipant exits:");
        for exit in &report.exits {
            let how = match &exit.exit {
                UnitExit::Finished(termination) => termination.to_string(),
                UnitExit::Aborted => "aborted".to_string(),
                UnitExit::Panicked(message) => format!("panicked: {message}"),
            };
            let _ = writeln!(
                out,
                "  {:<8} {:<20} {how}",
                exit.participant.role.to_string(),
                exit.participant.name
            );
        }
    }
    if report.aborted > 0 {
        let _ = writeln!(out, "\n{} participant(s) had to be aborted", report.aborted);
    }
    out
}
