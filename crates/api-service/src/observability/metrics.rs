//! Metrics definitions for the API service.
//!
//! All metrics follow Prometheus naming conventions:
//! - `api_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded to prevent cardinality explosion:
//! - `method`: 7 values max (GET, POST, PATCH, DELETE, PUT, HEAD, OPTIONS)
//! - `endpoint`: the fixed route table plus `/other`
//! - `status`: 3 values (success, error, timeout)
//! - `result`: `accepted`, `insecure`, or one label per rejection reason
//! - `outcome`: bounded by code (`performed`, `suppressed`)

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize Prometheus metrics recorder and return the handle
/// for serving metrics via HTTP.
///
/// Must be called before any metrics are recorded.
///
/// # Errors
///
/// Returns error if Prometheus recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Prefix("api_http_request".to_string()),
            &[
                0.005, 0.010, 0.025, 0.050, 0.100, 0.150, 0.200, 0.300, 0.500, 1.000, 2.000,
            ],
        )
        .map_err(|e| format!("Failed to set HTTP request buckets: {e}"))?
        // JWKS fetch is bounded by the fetch timeout (max 60s)
        .set_buckets_for_metric(
            Matcher::Prefix("api_jwks_fetch".to_string()),
            &[
                0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000, 10.000,
            ],
        )
        .map_err(|e| format!("Failed to set JWKS fetch buckets: {e}"))?
        .set_buckets_for_metric(
            Matcher::Prefix("api_jwt_validation".to_string()),
            &[
                0.0005, 0.001, 0.002, 0.005, 0.010, 0.025, 0.050, 0.100, 0.500, 1.000,
            ],
        )
        .map_err(|e| format!("Failed to set JWT validation buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

// ============================================================================
// HTTP Request Metrics
// ============================================================================

/// Record HTTP request completion
///
/// Metric: `api_http_requests_total`, `api_http_request_duration_seconds`
/// Labels: `method`, `endpoint`, `status`
///
/// This captures ALL HTTP responses including framework-level errors like
/// 404 Not Found and 405 Method Not Allowed.
pub fn record_http_request(method: &str, endpoint: &str, status_code: u16, duration: Duration) {
    let normalized_endpoint = normalize_endpoint(endpoint);
    let status = categorize_status_code(status_code);

    histogram!("api_http_request_duration_seconds",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint.to_string(),
        "status" => status.to_string()
    )
    .record(duration.as_secs_f64());

    counter!("api_http_requests_total",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint.to_string(),
        "status_code" => status_code.to_string()
    )
    .increment(1);
}

/// Categorize HTTP status code into success/error/timeout
fn categorize_status_code(status_code: u16) -> &'static str {
    match status_code {
        200..=299 => "success",
        408 | 504 => "timeout",
        _ => "error",
    }
}

/// Normalize endpoint path to prevent label cardinality explosion.
///
/// Unknown paths collapse to "/other".
fn normalize_endpoint(path: &str) -> &'static str {
    match path {
        "/" => "/",
        "/health" => "/health",
        "/metrics" => "/metrics",
        "/api/auth/config" => "/api/auth/config",
        "/api/auth/verify" => "/api/auth/verify",
        "/api/auth/status" => "/api/auth/status",
        "/api/auth/me" => "/api/auth/me",
        _ => "/other",
    }
}

// ============================================================================
// Token Validation Metrics
// ============================================================================

/// Record a token verification decision
///
/// Metric: `api_jwt_validations_total`, `api_jwt_validation_duration_seconds`
/// Labels: `result`
pub fn record_jwt_validation(result: &'static str, duration: Duration) {
    histogram!("api_jwt_validation_duration_seconds",
        "result" => result
    )
    .record(duration.as_secs_f64());

    counter!("api_jwt_validations_total",
        "result" => result
    )
    .increment(1);
}

// ============================================================================
// JWKS Metrics
// ============================================================================

/// Record a JWKS fetch attempt
///
/// Metric: `api_jwks_fetch_total`, `api_jwks_fetch_duration_seconds`
/// Labels: `status` (`success`, `network`, `http_status`, `malformed`)
pub fn record_jwks_fetch(status: &'static str, duration: Duration) {
    histogram!("api_jwks_fetch_duration_seconds").record(duration.as_secs_f64());

    counter!("api_jwks_fetch_total",
        "status" => status
    )
    .increment(1);
}

/// Record a forced refresh decision made on an unknown `kid`
///
/// Metric: `api_jwks_forced_refresh_total`
/// Labels: `outcome` (`performed`, `suppressed`)
pub fn record_forced_refresh(outcome: &'static str) {
    counter!("api_jwks_forced_refresh_total",
        "outcome" => outcome
    )
    .increment(1);
}
