//! # In-Memory Grid
//!
//! An in-process implementation of all three network seams. Every attached
//! node is reachable by node ID, `Transport::send` is a direct call into
//! the target's [`RpcHandler`], and published payloads land straight on
//! subscriber channels.
//!
//! This is how the integration tests run a renter/farmer cluster inside
//! one test body with zero sockets, and a convenient harness for
//! single-process experiments. Messages still travel through the full
//! signed-envelope path — the grid moves envelopes, it does not bypass
//! authentication.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::trace;

use super::overlay::{NetError, Overlay, RpcHandler, Topics, Transport};
use crate::contact::Contact;
use crate::identity::NodeId;
use crate::message::rpc::{RpcRequest, RpcResponse};

/// Subscriber channel capacity. Publications are tiny (one contract), so
/// a small buffer only has to absorb scheduling jitter.
const SUBSCRIBER_CAPACITY: usize = 64;

/// All three seams, one process.
pub struct MemoryGrid {
    peers: DashMap<NodeId, (Contact, Arc<dyn RpcHandler>)>,
    subscribers: DashMap<String, Vec<mpsc::Sender<serde_json::Value>>>,
}

impl MemoryGrid {
    /// A fresh, empty grid.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            peers: DashMap::new(),
            subscribers: DashMap::new(),
        })
    }

    /// Attach a node's RPC endpoint at its contact.
    pub fn attach(&self, contact: Contact, handler: Arc<dyn RpcHandler>) {
        self.peers.insert(contact.node_id, (contact, handler));
    }

    /// Detach a node — it stops being reachable, simulating churn.
    pub fn detach(&self, node_id: &NodeId) {
        self.peers.remove(node_id);
    }

    /// Number of attached peers.
    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }
}

#[async_trait]
impl Transport for MemoryGrid {
    async fn send(&self, contact: &Contact, request: RpcRequest) -> Result<RpcResponse, NetError> {
        let handler = self
            .peers
            .get(&contact.node_id)
            .map(|entry| Arc::clone(&entry.value().1))
            .ok_or_else(|| NetError::PeerNotFound(contact.node_id.to_hex()))?;

        match handler.handle(request).await {
            Some(response) => Ok(response),
            // The receiver dropped the message (failed authentication).
            None => Err(NetError::Transport("message dropped by peer".into())),
        }
    }
}

#[async_trait]
impl Overlay for MemoryGrid {
    async fn connect(&self, contact: &Contact) -> Result<(), NetError> {
        if self.peers.contains_key(&contact.node_id) {
            Ok(())
        } else {
            Err(NetError::PeerNotFound(contact.node_id.to_hex()))
        }
    }

    async fn find_node(&self, node_id: &NodeId) -> Result<Contact, NetError> {
        self.peers
            .get(node_id)
            .map(|entry| entry.value().0.clone())
            .ok_or_else(|| NetError::PeerNotFound(node_id.to_hex()))
    }
}

#[async_trait]
impl Topics for MemoryGrid {
    async fn publish(&self, topic: &str, payload: serde_json::Value) -> Result<(), NetError> {
        let senders: Vec<mpsc::Sender<serde_json::Value>> = self
            .subscribers
            .get(topic)
            .map(|entry| entry.value().clone())
            .unwrap_or_default();

        trace!(topic, subscribers = senders.len(), "delivering publication");
        for sender in senders {
            // A full or closed subscriber just misses this publication.
            let _ = sender.try_send(payload.clone());
        }
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> mpsc::Receiver<serde_json::Value> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_CAPACITY);
        self.subscribers.entry(topic.to_string()).or_default().push(tx);
        rx
    }
}
