//! Prometheus Metrics Module
//!
//! Provides application-wide metrics collection using Prometheus.
//!
//! # Metrics Collected
//! - Inbound realtime events by action
//! - Translation outcomes (cache hit, translated, fallback)
//! - Per-connection delivery outcomes
//! - Push-fallback outcomes
//! - Active WebSocket connection gauge

use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

/// Global metrics registry
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

/// Inbound realtime events by action
pub static EVENTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("events_total", "Total inbound realtime events").namespace("lingua_chat"),
        &["action"],
    )
    .expect("Failed to create EVENTS_TOTAL metric")
});

/// Translation outcomes: "cached", "translated", "fallback"
pub static TRANSLATIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("translations_total", "Translation outcomes during fan-out")
            .namespace("lingua_chat"),
        &["outcome"],
    )
    .expect("Failed to create TRANSLATIONS_TOTAL metric")
});

/// Per-connection delivery outcomes: "delivered", "stale"
pub static DELIVERIES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("deliveries_total", "Per-connection delivery outcomes")
            .namespace("lingua_chat"),
        &["outcome"],
    )
    .expect("Failed to create DELIVERIES_TOTAL metric")
});

/// Push-fallback outcomes: "sent", "failed"
pub static PUSH_FALLBACK_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("push_fallback_total", "Offline push-fallback outcomes")
            .namespace("lingua_chat"),
        &["outcome"],
    )
    .expect("Failed to create PUSH_FALLBACK_TOTAL metric")
});

/// Active WebSocket connections
pub static CONNECTIONS_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::with_opts(
        Opts::new("connections_active", "Number of registered live connections")
            .namespace("lingua_chat"),
    )
    .expect("Failed to create CONNECTIONS_ACTIVE metric")
});

/// Register all metrics with the registry
fn register_metrics(registry: &Registry) {
    registry
        .register(Box::new(EVENTS_TOTAL.clone()))
        .expect("Failed to register EVENTS_TOTAL");
    registry
        .register(Box::new(TRANSLATIONS_TOTAL.clone()))
        .expect("Failed to register TRANSLATIONS_TOTAL");
    registry
        .register(Box::new(DELIVERIES_TOTAL.clone()))
        .expect("Failed to register DELIVERIES_TOTAL");
    registry
        .register(Box::new(PUSH_FALLBACK_TOTAL.clone()))
        .expect("Failed to register PUSH_FALLBACK_TOTAL");
    registry
        .register(Box::new(CONNECTIONS_ACTIVE.clone()))
        .expect("Failed to register CONNECTIONS_ACTIVE");
}

/// Collect and encode all metrics as Prometheus text format
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .expect("Failed to encode metrics");
    String::from_utf8(buffer).expect("Metrics should be valid UTF-8")
}

/// Record one inbound realtime event
pub fn record_event(action: &str) {
    EVENTS_TOTAL.with_label_values(&[action]).inc();
}

/// Record a translation outcome
pub fn record_translation(outcome: &str) {
    TRANSLATIONS_TOTAL.with_label_values(&[outcome]).inc();
}

/// Record a per-connection delivery outcome
pub fn record_delivery(outcome: &str) {
    DELIVERIES_TOTAL.with_label_values(&[outcome]).inc();
}

/// Record a push-fallback outcome
pub fn record_push_fallback(outcome: &str) {
    PUSH_FALLBACK_TOTAL.with_label_values(&[outcome]).inc();
}

/// Update the live-connection gauge
pub fn set_live_connections(count: usize) {
    CONNECTIONS_ACTIVE.set(count as i64);
}
