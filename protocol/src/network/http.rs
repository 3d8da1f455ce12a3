//! # HTTP Transport
//!
//! The production [`Transport`]: JSON-RPC 2.0 over HTTP POST. One request
//! per call, no connection pinning, no negotiated framing — shard payloads
//! are hex strings inside the JSON body, which is wasteful and wonderfully
//! debuggable.
//!
//! The server half (the axum router that feeds inbound requests to the
//! node's [`RpcHandler`](super::RpcHandler)) lives in the node binary;
//! this is only the client side.

use async_trait::async_trait;
use reqwest::StatusCode;

use super::overlay::{NetError, Transport};
use crate::config;
use crate::contact::Contact;
use crate::message::rpc::{RpcRequest, RpcResponse};

/// JSON-RPC-over-HTTP client transport.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Build the transport with the protocol's per-request timeout.
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(config::TRANSPORT_TIMEOUT)
            .build()
            .expect("http client construction is infallible");
        Self { client }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, contact: &Contact, request: RpcRequest) -> Result<RpcResponse, NetError> {
        let response = self
            .client
            .post(contact.http_url())
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    NetError::Timeout
                } else {
                    NetError::Transport(e.to_string())
                }
            })?;

        // 204 is the receiver telling us nothing: the message failed
        // authentication and was dropped without a reply.
        if response.status() == StatusCode::NO_CONTENT {
            return Err(NetError::Transport("message dropped by peer".into()));
        }
        if !response.status().is_success() {
            return Err(NetError::Transport(format!(
                "http status {}",
                response.status()
            )));
        }

        response
            .json::<RpcResponse>()
            .await
            .map_err(|e| NetError::Transport(format!("undecodable response body: {e}")))
    }
}
