//! # Network Seams
//!
//! The three async traits the node is built against, plus the
//! contact-table overlay used by the binary.
//!
//! The Kademlia routing table and iterative lookup are external
//! collaborators: the [`Overlay`] trait is the slot they plug into. What
//! ships here is [`StaticOverlay`] — a flat contact table fed by seed
//! connects and authenticated traffic. On a fully-meshed deployment (every
//! peer seeds every other) it resolves the same lookups an iterative
//! search would; behind the same trait, a real DHT drops in without
//! touching the protocol.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

use crate::contact::{Contact, ContactBook};
use crate::error::NodeError;
use crate::identity::NodeId;
use crate::message::auth::MessageAuth;
use crate::message::rpc::{RpcMethod, RpcRequest, RpcResponse};

/// Failures at the network seams.
#[derive(Debug, Error)]
pub enum NetError {
    /// Socket, HTTP, or in-process delivery failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// No contact is known for the requested node ID.
    #[error("peer not found: {0}")]
    PeerNotFound(String),

    /// The request did not complete within the transport timeout.
    #[error("request timed out")]
    Timeout,
}

impl From<NetError> for NodeError {
    fn from(err: NetError) -> Self {
        match err {
            NetError::Transport(msg) => NodeError::Transport(msg),
            NetError::PeerNotFound(id) => NodeError::PeerNotFound(id),
            NetError::Timeout => NodeError::Transport("request timed out".into()),
        }
    }
}

/// Point-to-point RPC delivery. Implementations move envelopes; signing
/// and verification happen above this seam.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver a request to a peer and await its response. A peer that
    /// silently drops the message (authentication failure) surfaces as a
    /// transport error, not a reply.
    async fn send(&self, contact: &Contact, request: RpcRequest) -> Result<RpcResponse, NetError>;
}

/// The DHT overlay's lookup and join primitives.
#[async_trait]
pub trait Overlay: Send + Sync {
    /// Join the overlay through a known contact.
    async fn connect(&self, contact: &Contact) -> Result<(), NetError>;

    /// Resolve a node ID to a reachable contact.
    async fn find_node(&self, node_id: &NodeId) -> Result<Contact, NetError>;
}

/// The pub/sub layer built atop the overlay.
#[async_trait]
pub trait Topics: Send + Sync {
    /// Publish a payload on a topic.
    async fn publish(&self, topic: &str, payload: serde_json::Value) -> Result<(), NetError>;

    /// Subscribe to a topic; published payloads arrive on the returned
    /// channel.
    async fn subscribe(&self, topic: &str) -> mpsc::Receiver<serde_json::Value>;

    /// Feed one inbound PUBLISH hop into the layer (relay + local
    /// delivery). Implementations that never see relayed traffic keep the
    /// default no-op.
    async fn handle_publish(
        &self,
        from: &Contact,
        topic: &str,
        payload: serde_json::Value,
        ttl: u8,
    ) {
        let _ = (from, topic, payload, ttl);
    }
}

/// The receiving half of the RPC endpoint: verify, dispatch, sign.
/// Implemented by the node façade; called by whatever serves the wire —
/// the axum gateway in production, [`super::memory::MemoryGrid`] in tests.
#[async_trait]
pub trait RpcHandler: Send + Sync {
    /// Handle one inbound request. `None` means the message failed
    /// authentication and is dropped without a reply.
    async fn handle(&self, request: RpcRequest) -> Option<RpcResponse>;
}

// ---------------------------------------------------------------------------
// StaticOverlay
// ---------------------------------------------------------------------------

/// Contact-table overlay: connect = authenticated PING + record,
/// find_node = table lookup.
pub struct StaticOverlay {
    auth: Arc<MessageAuth>,
    transport: Arc<dyn Transport>,
    book: Arc<ContactBook>,
    self_contact: Contact,
}

impl StaticOverlay {
    /// Wire the overlay over a transport and the shared contact book.
    pub fn new(
        auth: Arc<MessageAuth>,
        transport: Arc<dyn Transport>,
        book: Arc<ContactBook>,
        self_contact: Contact,
    ) -> Self {
        Self {
            auth,
            transport,
            book,
            self_contact,
        }
    }
}

#[async_trait]
impl Overlay for StaticOverlay {
    async fn connect(&self, contact: &Contact) -> Result<(), NetError> {
        let params = serde_json::json!({ "contact": self.self_contact });
        let mut request = RpcRequest::new(RpcMethod::Ping, params);
        self.auth.sign_request(&mut request);

        let mut response = self.transport.send(contact, request).await?;
        if let Some(error) = response.error.take() {
            return Err(NetError::Transport(format!(
                "ping rejected: {}",
                error.message
            )));
        }
        if self.auth.verify_response(contact, &mut response).is_err() {
            return Err(NetError::Transport(
                "ping response failed authentication".into(),
            ));
        }

        self.book.record(contact.clone());
        debug!(peer = %contact.node_id, "connected to overlay contact");
        Ok(())
    }

    async fn find_node(&self, node_id: &NodeId) -> Result<Contact, NetError> {
        self.book
            .get(node_id)
            .ok_or_else(|| NetError::PeerNotFound(node_id.to_hex()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Identity;

    struct NoTransport;

    #[async_trait]
    impl Transport for NoTransport {
        async fn send(
            &self,
            _contact: &Contact,
            _request: RpcRequest,
        ) -> Result<RpcResponse, NetError> {
            Err(NetError::Transport("unreachable".into()))
        }
    }

    #[tokio::test]
    async fn find_node_reads_the_book() {
        let identity = Identity::generate();
        let book = Arc::new(ContactBook::new());
        let self_contact = Contact::new("127.0.0.1", 4000, identity.node_id());
        let overlay = StaticOverlay::new(
            Arc::new(MessageAuth::new(identity, Arc::clone(&book))),
            Arc::new(NoTransport),
            Arc::clone(&book),
            self_contact,
        );

        let peer = Contact::new("10.0.0.1", 4001, Identity::generate().node_id());
        assert!(matches!(
            overlay.find_node(&peer.node_id).await,
            Err(NetError::PeerNotFound(_))
        ));

        book.record(peer.clone());
        assert_eq!(overlay.find_node(&peer.node_id).await.unwrap(), peer);
    }

    #[tokio::test]
    async fn failed_connect_does_not_record_the_contact() {
        let identity = Identity::generate();
        let book = Arc::new(ContactBook::new());
        let self_contact = Contact::new("127.0.0.1", 4000, identity.node_id());
        let overlay = StaticOverlay::new(
            Arc::new(MessageAuth::new(identity, Arc::clone(&book))),
            Arc::new(NoTransport),
            Arc::clone(&book),
            self_contact,
        );

        let peer = Contact::new("10.0.0.1", 4001, Identity::generate().node_id());
        assert!(overlay.connect(&peer).await.is_err());
        assert!(book.get(&peer.node_id).is_none());
    }
}
