//! Metrics collection and export.
//!
//! Uses the `metrics` crate for instrumentation and exports
//! to Prometheus format.

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;
use weave_core::DeliveryReport;

/// Metric names.
pub mod names {
    pub const CONNECTIONS_TOTAL: &str = "weave_connections_total";
    pub const CONNECTIONS_ACTIVE: &str = "weave_connections_active";
    pub const EVENTS_DELIVERED_TOTAL: &str = "weave_events_delivered_total";
    pub const DELIVERY_FAILURES_TOTAL: &str = "weave_delivery_failures_total";
    pub const SUBSCRIPTIONS_TOTAL: &str = "weave_subscriptions_total";
    pub const FRAMES_REJECTED_TOTAL: &str = "weave_frames_rejected_total";
}

/// Initialize the metrics system.
pub fn init_metrics() {
    metrics::describe_counter!(
        names::CONNECTIONS_TOTAL,
        "Total number of sessions since server start"
    );
    metrics::describe_gauge!(
        names::CONNECTIONS_ACTIVE,
        "Current number of active sessions"
    );
    metrics::describe_counter!(
        names::EVENTS_DELIVERED_TOTAL,
        "Total events delivered to session queues"
    );
    metrics::describe_counter!(
        names::DELIVERY_FAILURES_TOTAL,
        "Total per-recipient delivery failures"
    );
    metrics::describe_counter!(
        names::SUBSCRIPTIONS_TOTAL,
        "Total number of channel subscriptions"
    );
    metrics::describe_counter!(
        names::FRAMES_REJECTED_TOTAL,
        "Total inbound frames rejected or ignored"
    );

    info!("Metrics initialized");
}

/// Start the Prometheus metrics server.
///
/// # Errors
///
/// Returns an error if the server cannot be started.
pub fn start_metrics_server(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    info!("Metrics server listening on {}", addr);
    Ok(())
}

/// Record the outcome of one broadcast.
pub fn record_broadcast(kind: &'static str, report: DeliveryReport) {
    counter!(names::EVENTS_DELIVERED_TOTAL, "kind" => kind).increment(report.delivered as u64);
    if report.failed > 0 {
        counter!(names::DELIVERY_FAILURES_TOTAL, "kind" => kind).increment(report.failed as u64);
    }
}

/// Record a subscription.
pub fn record_subscription() {
    counter!(names::SUBSCRIPTIONS_TOTAL).increment(1);
}

/// Record a rejected or ignored inbound frame.
pub fn record_rejected_frame(reason: &'static str) {
    counter!(names::FRAMES_REJECTED_TOTAL, "reason" => reason).increment(1);
}

/// Metrics guard that records disconnection on drop.
pub struct SessionMetricsGuard;

impl SessionMetricsGuard {
    /// Create a new metrics guard, recording a connection.
    #[must_use]
    pub fn new() -> Self {
        counter!(names::CONNECTIONS_TOTAL).increment(1);
        gauge!(names::CONNECTIONS_ACTIVE).increment(1.0);
        Self
    }
}

impl Default for SessionMetricsGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SessionMetricsGuard {
    fn drop(&mut self) {
        gauge!(names::CONNECTIONS_ACTIVE).decrement(1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_guard() {
        // Just test that it doesn't panic
        let _guard = SessionMetricsGuard::new();
    }
}
