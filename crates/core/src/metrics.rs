//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Lifecycle engine (transitions, rejections)
//! - Dispatcher (published, dropped, transport failures)
//! - Durable repository (post-commit write failures)

use once_cell::sync::Lazy;
use prometheus::{IntCounter, IntCounterVec, IntGaugeVec, Opts};

// =============================================================================
// Lifecycle engine
// =============================================================================

/// Committed ticket transitions by operation.
pub static TICKET_TRANSITIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "triage_ticket_transitions_total",
            "Committed ticket transitions",
        ),
        &["operation"], // "intake", "assign", "complete", "fail", "escalate", "cancel"
    )
    .unwrap()
});

/// Rejected transition attempts by error kind.
pub static TRANSITION_REJECTIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "triage_transition_rejections_total",
            "Transition attempts rejected by the engine",
        ),
        &["kind"], // "validation", "not_found", "invalid_state", "conflict", "storage"
    )
    .unwrap()
});

/// Live queue depth per lane (set from engine stats).
pub static QUEUE_DEPTH: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("triage_queue_depth", "Tickets currently queued, per lane"),
        &["lane"],
    )
    .unwrap()
});

// =============================================================================
// Dispatcher
// =============================================================================

/// Messages accepted onto the dispatch channel.
pub static DISPATCH_PUBLISHED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "triage_dispatch_published_total",
        "Queue updates accepted for fan-out",
    )
    .unwrap()
});

/// Messages dropped because the dispatch channel was full.
pub static DISPATCH_DROPPED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "triage_dispatch_dropped_total",
        "Queue updates dropped before fan-out",
    )
    .unwrap()
});

/// Delivery failures per transport.
pub static TRANSPORT_FAILURES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "triage_transport_failures_total",
            "Failed deliveries to a real-time transport",
        ),
        &["transport"],
    )
    .unwrap()
});

// =============================================================================
// Repository
// =============================================================================

/// Post-commit repository writes that failed (transition stands regardless).
pub static REPOSITORY_FAILURES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "triage_repository_failures_total",
        "Durable repository writes that failed after commit",
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        Box::new(TICKET_TRANSITIONS.clone()),
        Box::new(TRANSITION_REJECTIONS.clone()),
        Box::new(QUEUE_DEPTH.clone()),
        Box::new(DISPATCH_PUBLISHED.clone()),
        Box::new(DISPATCH_DROPPED.clone()),
        Box::new(TRANSPORT_FAILURES.clone()),
        Box::new(REPOSITORY_FAILURES.clone()),
    ]
}
