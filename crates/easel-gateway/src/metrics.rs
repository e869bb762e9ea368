//! Prometheus metrics recording and endpoint.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use easel_canvas::{canvas_topic, BusStats, CanvasCommand};

use crate::state::ConnectionKind;

/// Install the Prometheus metrics recorder and return the handle for rendering.
pub fn install_prometheus_recorder() -> anyhow::Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    Ok(handle)
}

fn kind_label(kind: ConnectionKind) -> &'static str {
    match kind {
        ConnectionKind::Canvas => "canvas",
        ConnectionKind::Status => "status",
        ConnectionKind::Agent => "agent",
    }
}

/// Topic kind used as a label: `canvas_interaction:c1` becomes `canvas_interaction`.
fn topic_kind(topic: &str) -> String {
    topic.split(':').next().unwrap_or(topic).to_string()
}

/// Record a new WebSocket connection.
pub fn record_ws_connect(kind: ConnectionKind) {
    let labels = [("endpoint", kind_label(kind))];
    metrics::gauge!("ws_connections_active", &labels).increment(1.0);
}

/// Record a WebSocket disconnection.
pub fn record_ws_disconnect(kind: ConnectionKind) {
    let labels = [("endpoint", kind_label(kind))];
    metrics::gauge!("ws_connections_active", &labels).decrement(1.0);
}

/// Record a publish and how many subscribers it reached.
pub fn record_publish(topic: &str, receivers: usize) {
    let labels = [("topic_kind", topic_kind(topic))];
    metrics::counter!("bus_messages_published_total", &labels).increment(1);
    metrics::counter!("bus_receivers_total", &labels).increment(receivers as u64);
}

/// Record the frames one canvas command dispatch published.
///
/// A command containing a restore publishes a follow-up state frame.
pub fn record_canvas_dispatch(canvas_id: &str, command: &CanvasCommand, receivers: usize) {
    let topic = canvas_topic(canvas_id);
    record_publish(&topic, receivers);
    if command.contains_restore() {
        record_publish(&topic, receivers);
    }
}

/// Record a client interaction and whether an agent was registered for it.
pub fn record_interaction(kind: &str, routed: bool) {
    let labels = [
        ("kind", kind.to_string()),
        ("routed", routed.to_string()),
    ];
    metrics::counter!("canvas_interactions_total", &labels).increment(1);
}

/// Mirror a bus's own counters, including slow-consumer drops.
pub fn record_bus_stats(bus: &'static str, stats: BusStats) {
    let labels = [("bus", bus)];
    metrics::gauge!("bus_subscribers", &labels).set(stats.subscribers as f64);
    metrics::counter!("bus_published_total", &labels).absolute(stats.published);
    metrics::counter!("bus_dropped_total", &labels).absolute(stats.dropped);
}
