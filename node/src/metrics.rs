//! # Prometheus Metrics
//!
//! Operational metrics for the node, scraped at the `/metrics` HTTP
//! endpoint on the configured metrics port.
//!
//! All metrics are registered in a dedicated [`prometheus::Registry`] so
//! they do not collide with any default global registry consumers. The
//! gauges mirror counters held inside the protocol library (the auth
//! layer counts its own drops); a background task in `main` refreshes
//! them once a second.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{Encoder, IntGauge, Registry, TextEncoder};
use std::sync::Arc;

/// Holds all Prometheus metric handles for the node.
///
/// Clone-friendly (wraps `Arc` internally via prometheus handles) so it
/// can be shared across request handlers and background tasks.
#[derive(Clone)]
pub struct NodeMetrics {
    /// Prometheus registry that owns all metrics below.
    registry: Registry,
    /// Messages dropped by the receive hook for failing authentication.
    pub auth_failures: IntGauge,
    /// Number of peer contacts currently known.
    pub known_contacts: IntGauge,
    /// Number of in-flight pending offers.
    pub pending_offers: IntGauge,
    /// 1 while the node is between join and leave, else 0.
    pub node_open: IntGauge,
}

impl NodeMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Self {
        let registry = Registry::new_custom(Some("storj".into()), None)
            .expect("failed to create prometheus registry");

        let auth_failures = IntGauge::new(
            "auth_failures",
            "Messages dropped by the receive hook for failing authentication",
        )
        .expect("metric creation");
        registry
            .register(Box::new(auth_failures.clone()))
            .expect("metric registration");

        let known_contacts = IntGauge::new(
            "known_contacts",
            "Number of peer contacts currently in the contact book",
        )
        .expect("metric creation");
        registry
            .register(Box::new(known_contacts.clone()))
            .expect("metric registration");

        let pending_offers = IntGauge::new(
            "pending_offers",
            "Number of published contracts still waiting for a farmer offer",
        )
        .expect("metric creation");
        registry
            .register(Box::new(pending_offers.clone()))
            .expect("metric registration");

        let node_open = IntGauge::new("node_open", "1 while the node is joined to the network")
            .expect("metric creation");
        registry
            .register(Box::new(node_open.clone()))
            .expect("metric registration");

        Self {
            registry,
            auth_failures,
            known_contacts,
            pending_offers,
            node_open,
        }
    }

    /// Pull the current readings out of a node.
    pub fn refresh_from(&self, node: &storj_protocol::Node) {
        self.auth_failures.set(node.auth_failures() as i64);
        self.known_contacts.set(node.known_contacts() as i64);
        self.pending_offers.set(node.pending_count() as i64);
        self.node_open.set(node.is_open() as i64);
    }

    /// Encodes all registered metrics into the Prometheus text exposition
    /// format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer).expect("prometheus output is valid utf-8"))
    }
}

impl Default for NodeMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared metrics state passed to axum handlers.
pub type SharedMetrics = Arc<NodeMetrics>;

/// Axum handler that renders `/metrics` in Prometheus text format.
///
/// Returns HTTP 500 if encoding fails (should never happen in practice).
pub async fn metrics_handler(
    axum::extract::State(metrics): axum::extract::State<SharedMetrics>,
) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_encode_contains_prefixed_names() {
        let metrics = NodeMetrics::new();
        metrics.auth_failures.set(3);
        metrics.pending_offers.set(1);

        let body = metrics.encode().unwrap();
        assert!(body.contains("storj_auth_failures 3"));
        assert!(body.contains("storj_pending_offers 1"));
        assert!(body.contains("storj_known_contacts"));
        assert!(body.contains("storj_node_open"));
    }
}
