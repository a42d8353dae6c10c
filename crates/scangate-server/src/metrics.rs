//! Prometheus metrics recorder and `/metrics` rendering.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Must be called once at startup before any metrics are recorded.
pub fn install_recorder() -> PrometheusHandle {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install metrics recorder");
    info!("prometheus metrics recorder installed");
    handle
}

/// Render Prometheus text format from the installed recorder.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

// Metric names recorded across the workspace.

/// RPC requests total (counter, labels: method).
pub const RPC_REQUESTS_TOTAL: &str = "rpc_requests_total";
/// RPC errors total (counter, labels: method, error_type).
pub const RPC_ERRORS_TOTAL: &str = "rpc_errors_total";
/// RPC request duration seconds (histogram, labels: method).
pub const RPC_REQUEST_DURATION_SECONDS: &str = "rpc_request_duration_seconds";
/// Push streams opened (counter).
pub const STREAM_CONNECTIONS_TOTAL: &str = "stream_connections_total";
/// Push-stream frames dropped on a full or closed channel (counter, labels: reason).
pub const STREAM_FRAMES_DROPPED_TOTAL: &str = "stream_frames_dropped_total";
/// Responses delivered over a push stream (counter).
pub const STREAM_RESPONSES_TOTAL: &str = "stream_responses_total";
/// Upstream attempts (counter, labels: operation).
pub const UPSTREAM_REQUESTS_TOTAL: &str = "upstream_requests_total";
/// Upstream retries (counter, labels: operation, category).
pub const UPSTREAM_RETRIES_TOTAL: &str = "upstream_retries_total";
/// Fingerprint cache hits (counter).
pub const CACHE_HITS_TOTAL: &str = "cache_hits_total";
/// Fingerprint cache misses (counter).
pub const CACHE_MISSES_TOTAL: &str = "cache_misses_total";
/// Limiter waits (counter, labels: category).
pub const LIMITER_WAITS_TOTAL: &str = "limiter_waits_total";
/// Idle sessions reaped (counter).
pub const SESSIONS_REAPED_TOTAL: &str = "sessions_reaped_total";
