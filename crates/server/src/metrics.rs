//! Prometheus metrics for observability.
//!
//! This module provides metrics for monitoring the triage server:
//! - HTTP request metrics (latency, counts, errors)
//! - WebSocket connection metrics
//! - Queue depth and in-flight contact attempts (collected dynamically)

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts,
    Registry, TextEncoder,
};

use triage_core::Lane;

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// HTTP Request Metrics
// =============================================================================

/// HTTP request duration in seconds.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "triage_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
        ]),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("triage_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "triage_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

// =============================================================================
// WebSocket Metrics
// =============================================================================

/// Active WebSocket connections.
pub static WS_CONNECTIONS_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "triage_ws_connections_active",
        "Currently connected WebSocket clients",
    )
    .unwrap()
});

/// Total WebSocket connections accepted.
pub static WS_CONNECTIONS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "triage_ws_connections_total",
        "Total WebSocket connections accepted",
    )
    .unwrap()
});

/// Messages forwarded to WebSocket clients, by topic and action.
pub static WS_MESSAGES_SENT: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "triage_ws_messages_sent_total",
            "Messages forwarded to WebSocket clients",
        ),
        &["topic", "action"],
    )
    .unwrap()
});

/// Times a WebSocket client lagged behind the broadcast channel.
pub static WS_LAG_EVENTS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "triage_ws_lag_events_total",
        "WebSocket clients that lagged and skipped messages",
    )
    .unwrap()
});

// =============================================================================
// Engine gauges (collected dynamically)
// =============================================================================

/// Tickets currently being handled by a staff member.
pub static TICKETS_IN_PROGRESS: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "triage_tickets_in_progress",
        "Tickets currently assigned and being handled",
    )
    .unwrap()
});

// =============================================================================
// Registration and encoding
// =============================================================================

fn register_metrics(registry: &Registry) {
    // HTTP
    registry
        .register(Box::new(HTTP_REQUEST_DURATION.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()))
        .unwrap();

    // WebSocket
    registry
        .register(Box::new(WS_CONNECTIONS_ACTIVE.clone()))
        .unwrap();
    registry
        .register(Box::new(WS_CONNECTIONS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(WS_MESSAGES_SENT.clone()))
        .unwrap();
    registry.register(Box::new(WS_LAG_EVENTS.clone())).unwrap();

    // Engine
    registry
        .register(Box::new(TICKETS_IN_PROGRESS.clone()))
        .unwrap();

    // Core metrics (engine, dispatcher, repository)
    for metric in triage_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}

/// Collect dynamic metrics from current application state.
///
/// This is called before encoding metrics to update gauges with current
/// values from the engine.
pub fn collect_dynamic_metrics(state: &crate::state::AppState) {
    let stats = state.engine().stats();
    triage_core::metrics::QUEUE_DEPTH
        .with_label_values(&[Lane::Primary.as_str()])
        .set(stats.primary_depth as i64);
    triage_core::metrics::QUEUE_DEPTH
        .with_label_values(&[Lane::Retry.as_str()])
        .set(stats.retry_depth as i64);
    TICKETS_IN_PROGRESS.set(stats.in_progress as i64);
}

/// Normalize a path for metric labels (replace IDs with placeholders).
pub fn normalize_path(path: &str) -> String {
    // Replace UUIDs and plain numeric segments with placeholders
    let uuid_regex = regex_lite::Regex::new(
        r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}",
    )
    .unwrap();
    let numeric_regex = regex_lite::Regex::new(r"/\d+(/|$)").unwrap();

    let result = uuid_regex.replace_all(path, "{id}");
    let result = numeric_regex.replace_all(&result, "/{id}$1");
    result.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path_uuid() {
        let path = "/api/v1/tickets/550e8400-e29b-41d4-a716-446655440000";
        assert_eq!(normalize_path(path), "/api/v1/tickets/{id}");
    }

    #[test]
    fn test_normalize_path_uuid_with_suffix() {
        let path = "/api/v1/tickets/550e8400-e29b-41d4-a716-446655440000/assign";
        assert_eq!(normalize_path(path), "/api/v1/tickets/{id}/assign");
    }

    #[test]
    fn test_normalize_path_no_ids() {
        let path = "/api/v1/health";
        assert_eq!(normalize_path(path), "/api/v1/health");
    }

    #[test]
    fn test_normalize_path_lane_names_untouched() {
        let path = "/api/v1/queue/retry";
        assert_eq!(normalize_path(path), "/api/v1/queue/retry");
    }

    #[test]
    fn test_encode_metrics_returns_prometheus_format() {
        // Access metrics to ensure they're initialized
        HTTP_REQUESTS_TOTAL
            .with_label_values(&["GET", "/test", "200"])
            .inc();

        let output = encode_metrics();
        assert!(output.contains("triage_http_requests_total"));
        assert!(output.contains("# HELP"));
        assert!(output.contains("# TYPE"));
    }

    #[test]
    fn test_registry_contains_core_metrics() {
        // Touch metrics to ensure they appear in output
        // (Prometheus only outputs metrics that have been accessed)
        WS_CONNECTIONS_ACTIVE.set(0);
        TICKETS_IN_PROGRESS.set(0);
        triage_core::metrics::QUEUE_DEPTH
            .with_label_values(&["primary"])
            .set(0);
        triage_core::metrics::DISPATCH_PUBLISHED.inc_by(0);

        let output = encode_metrics();
        assert!(output.contains("triage_ws_connections_active"));
        assert!(output.contains("triage_tickets_in_progress"));
        assert!(output.contains("triage_queue_depth"));
        assert!(output.contains("triage_dispatch_published_total"));
    }
}
