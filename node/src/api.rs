//! # HTTP API
//!
//! Builds the axum router that exposes the node's wire surface.
//!
//! ## Endpoints
//!
//! | Method | Path       | Description                                  |
//! |--------|------------|----------------------------------------------|
//! | POST   | `/`        | Signed JSON-RPC 2.0 endpoint (peer traffic)  |
//! | GET    | `/health`  | Liveness probe                               |
//! | GET    | `/status`  | Node status summary                          |
//!
//! CORS is wide open by design — the wire format is JSON-RPC over HTTP
//! and browser-hosted tooling is a first-class client. Authentication is
//! the signed envelope, not the transport.
//!
//! A peer request that fails envelope verification gets `204 No Content`:
//! the node read it, dropped it, and says nothing about why.

use axum::{
    extract::State,
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use storj_protocol::message::rpc::{RpcError, RpcRequest, RpcResponse};
use storj_protocol::network::RpcHandler;
use storj_protocol::Node;

use crate::metrics::SharedMetrics;

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared application state available to all request handlers.
///
/// Cheap to clone — everything behind `Arc` (the `Node` itself is one).
#[derive(Clone)]
pub struct AppState {
    /// The node's reported version string.
    pub version: String,
    /// The running node.
    pub node: Node,
    /// Reference to Prometheus metrics for in-handler recording.
    pub metrics: SharedMetrics,
}

/// Response payload for `GET /status`.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    /// Node software version.
    pub version: String,
    /// This node's hex node ID.
    pub node_id: String,
    /// This node's payment address.
    pub address: String,
    /// This node's contact URI.
    pub uri: String,
    /// Whether the node is joined to the network.
    pub open: bool,
    /// Number of known peer contacts.
    pub known_contacts: usize,
    /// Number of in-flight pending offers.
    pub pending_offers: usize,
    /// Messages dropped for failing authentication.
    pub auth_failures: u64,
    /// ISO-8601 timestamp of the response.
    pub timestamp: String,
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Builds the full axum [`Router`] with all routes, CORS, and tracing.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/", post(rpc_handler))
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /health` — returns 200 if the node process is alive.
///
/// This is the liveness probe for orchestrators. It intentionally does
/// not check subsystem health — that belongs in `/status`.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

/// `GET /status` — node status summary.
async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    state.metrics.refresh_from(&state.node);
    Json(StatusResponse {
        version: state.version.clone(),
        node_id: state.node.node_id().to_hex(),
        address: state.node.address(),
        uri: state.node.contact().to_uri(),
        open: state.node.is_open(),
        known_contacts: state.node.known_contacts(),
        pending_offers: state.node.pending_count(),
        auth_failures: state.node.auth_failures(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// `POST /` — the signed JSON-RPC endpoint peers talk to.
///
/// Decodes the envelope, hands it to the node's verify → dispatch → sign
/// pipeline, and renders the outcome. A dropped (unauthenticated)
/// message is `204 No Content`.
async fn rpc_handler(State(state): State<AppState>, Json(body): Json<serde_json::Value>) -> Response {
    let request: RpcRequest = match serde_json::from_value(body) {
        Ok(request) => request,
        Err(e) => {
            let response = RpcResponse::failure(
                "",
                RpcError::invalid_params(format!("malformed request envelope: {e}")),
            );
            return (StatusCode::OK, Json(response)).into_response();
        }
    };

    match state.node.handle(request).await {
        Some(response) => (StatusCode::OK, Json(response)).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}
