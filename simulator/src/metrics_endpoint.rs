//! HTTP endpoint exposing the Prometheus metrics.

use axum::Router;
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use ticket_market_runtime::CancelSignal;
use tokio::net::TcpListener;

/// `GET /metrics` rendering `handle` in Prometheus text format
pub fn router(handle: PrometheusHandle) -> Router {
    Router::new().route(
        "/metrics",
        get(move || {
            let handle = handle.clone();
            async move { handle.render() }
        }),
    )
}

/// Serve [`router`] on `listener` until `shutdown` fires.
///
/// # Errors
///
/// Returns error if accepting connections fails.
pub async fn serve(
    listener: TcpListener,
    handle: PrometheusHandle,
    mut shutdown: CancelSignal,
) -> std::io::Result<()> {
    axum::serve(listener, router(handle))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}
