//! `ticket-market`: runs one ticket market simulation from a JSON config.
//!
//! ```text
//! ticket-market [config.json]
//! ```
//!
//! Without an argument the config path is read from `MARKET_CONFIG`; with
//! neither, built-in defaults are used. The run ends when every participant
//! has finished or on Ctrl+C / SIGTERM. Prometheus metrics are served on
//! `METRICS_ADDR` (default `0.0.0.0:9090`) at `/metrics` while the
//! simulation runs.

use anyhow::Context;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use ticket_market_runtime::metrics::MetricsServer;
use ticket_market_runtime::{Marketplace, MarketplaceConfig, TracingSink, cancel_pair};
use ticket_market_simulator::{
    RunEnd, load_config, metrics_endpoint, populate, render_report, run_until_done, shutdown,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_METRICS_ADDR: &str = "0.0.0.0:9090";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let path = std::env::args_os().nth(1).map(PathBuf::from);
    let config = load_config(path.as_deref()).context("Failed to load configuration")?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let metrics_addr: SocketAddr = std::env::var("METRICS_ADDR")
        .unwrap_or_else(|_| DEFAULT_METRICS_ADDR.to_string())
        .parse()
        .context("Invalid METRICS_ADDR")?;
    let mut metrics = MetricsServer::new(metrics_addr);
    metrics.start()?;

    let (metrics_stop, metrics_signal) = cancel_pair();
    let metrics_task = match metrics.handle().cloned() {
        Some(handle) => {
            let addr = metrics.addr();
            let listener = tokio::net::TcpListener::bind(addr)
                .await
                .with_context(|| format!("Failed to bind metrics endpoint on {addr}"))?;
            tracing::info!("Prometheus metrics available at http://{addr}/metrics");
            Some(tokio::spawn(metrics_endpoint::serve(listener, handle, metrics_signal)))
        }
        None => None,
    };

    let market = Marketplace::new(MarketplaceConfig::from(&config), Arc::new(TracingSink));
    market.start(config.capacity)?;
    let participants = populate(&market, &config)?;
    tracing::info!(capacity = config.capacity, participants, "Ticket market running");

    let end =
        run_until_done(&market, config.status_interval(), shutdown::wait_for_signal()).await?;
    if end == RunEnd::Signal {
        tracing::info!("Shutting down on signal");
    }

    let report = market.stop().await?;
    println!("{}", render_report(&report));

    let recent = market.sales(5);
    if !recent.is_empty() {
        println!("Most recent sales:");
        for sale in recent {
            println!(
                "  #{} {} -> {} ({})",
                sale.ticket_id, sale.event_name, sale.customer, sale.price
            );
        }
    }

    metrics_stop.cancel();
    if let Some(task) = metrics_task {
        task.await??;
    }
    Ok(())
}
