//! Prometheus metrics exposition
//!
//! Service metrics:
//!
//! - `gateway_requests_total` (counter): labels `status`, `method`
//! - `gateway_request_duration_seconds` (histogram): label `status`
//! - `gateway_upstream_errors_total` (counter): label `error_type`
//! - `gateway_session_authenticated` (gauge): 1 while an access credential is held
//!
//! The `auth_*` counters emitted by `auth-client` render through the same
//! recorder.

use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};

const DURATION_METRIC: &str = "gateway_request_duration_seconds";

/// Histogram buckets from 5ms to 60s, covering the configurable backend
/// timeout range (including a refresh plus a retry).
const DURATION_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
];

fn builder() -> Result<PrometheusBuilder, BuildError> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(Matcher::Full(DURATION_METRIC.to_string()), DURATION_BUCKETS)
}

/// Install the Prometheus recorder and return a handle for rendering metrics.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    builder()?.install_recorder()
}

/// Record a completed proxied request with status code and HTTP method labels.
pub fn record_request(status: u16, method: &str, duration_secs: f64) {
    let status_str = status.to_string();
    metrics::counter!("gateway_requests_total", "status" => status_str.clone(), "method" => method.to_string())
        .increment(1);
    metrics::histogram!(DURATION_METRIC, "status" => status_str).record(duration_secs);
}

/// Record a failure to reach the backend (or to authenticate against it).
pub fn record_upstream_error(error_type: &str) {
    metrics::counter!("gateway_upstream_errors_total", "error_type" => error_type.to_string())
        .increment(1);
}

pub fn set_session_authenticated(authenticated: bool) {
    metrics::gauge!("gateway_session_authenticated").set(if authenticated { 1.0 } else { 0.0 });
}
