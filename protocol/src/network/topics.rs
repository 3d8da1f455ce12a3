//! # Topic Relay
//!
//! The production [`Topics`] implementation: epidemic relay of published
//! contracts over the PUBLISH RPC. When a node publishes (or receives) a
//! publication, it forwards the payload to a fanout-bounded subset of its
//! known contacts. Each hop does the same, giving O(log N) propagation
//! without any broker.
//!
//! ## Deduplication
//!
//! Every publication is identified by the BLAKE3 hash of its topic and
//! payload. Nodes keep a bounded set of recently seen hashes; a repeat
//! arrival is dropped instead of re-forwarded. This is what prevents
//! broadcast storms in cyclic contact graphs.
//!
//! ## TTL
//!
//! Each publication carries a hop budget that decrements on every relay.
//! At zero the payload still reaches local subscribers but travels no
//! further, bounding the propagation diameter.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use super::overlay::{NetError, Topics, Transport};
use super::protocol::{to_value, RpcClient};
use crate::config;
use crate::contact::{unix_millis, Contact, ContactBook};
use crate::identity::NodeId;
use crate::message::auth::MessageAuth;
use crate::message::rpc::{PublishParams, RpcMethod};

/// Subscriber channel capacity.
const SUBSCRIBER_CAPACITY: usize = 64;

/// Gossip-based pub/sub over the signed PUBLISH method.
pub struct GossipTopics {
    client: RpcClient,
    book: Arc<ContactBook>,
    self_contact: Contact,
    subscribers: DashMap<String, Vec<mpsc::Sender<serde_json::Value>>>,
    seen: DashMap<[u8; 32], u64>,
}

impl GossipTopics {
    /// Wire the relay over a transport and the shared contact book.
    pub fn new(
        auth: Arc<MessageAuth>,
        transport: Arc<dyn Transport>,
        book: Arc<ContactBook>,
        self_contact: Contact,
    ) -> Self {
        Self {
            client: RpcClient::new(auth, transport),
            book,
            self_contact,
            subscribers: DashMap::new(),
            seen: DashMap::new(),
        }
    }

    /// Content identity of a publication for dedup purposes.
    fn content_hash(topic: &str, payload: &serde_json::Value) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new();
        hasher.update(topic.as_bytes());
        hasher.update(&serde_json::to_vec(payload).unwrap_or_default());
        *hasher.finalize().as_bytes()
    }

    /// Record a publication as seen. Returns false if it already was.
    fn mark_seen(&self, hash: [u8; 32]) -> bool {
        let fresh = self.seen.insert(hash, unix_millis()).is_none();
        if fresh {
            self.maybe_evict();
        }
        fresh
    }

    /// Evict the oldest entries once the seen cache exceeds capacity,
    /// down to 75%.
    fn maybe_evict(&self) {
        if self.seen.len() <= config::PUBLISH_SEEN_CACHE {
            return;
        }
        let target = config::PUBLISH_SEEN_CACHE * 3 / 4;
        let mut entries: Vec<([u8; 32], u64)> = self
            .seen
            .iter()
            .map(|entry| (*entry.key(), *entry.value()))
            .collect();
        entries.sort_by_key(|(_, ts)| *ts);
        let to_remove = entries.len().saturating_sub(target);
        for (hash, _) in entries.iter().take(to_remove) {
            self.seen.remove(hash);
        }
    }

    /// Hand a publication to local subscribers of its topic.
    fn deliver_local(&self, topic: &str, payload: &serde_json::Value) {
        if let Some(mut entry) = self.subscribers.get_mut(topic) {
            // Senders that are closed (or hopelessly backlogged) are
            // pruned here rather than tracked separately.
            entry
                .value_mut()
                .retain(|sender| sender.try_send(payload.clone()).is_ok());
        }
    }

    /// Forward a publication one hop to up to `PUBLISH_FANOUT` contacts,
    /// never back to `exclude`.
    async fn relay(&self, topic: &str, payload: &serde_json::Value, ttl: u8, exclude: &NodeId) {
        let targets: Vec<Contact> = self
            .book
            .contacts_except(exclude)
            .into_iter()
            .take(config::PUBLISH_FANOUT)
            .collect();
        if targets.is_empty() {
            debug!(topic, "no contacts to relay publication to");
            return;
        }

        for target in targets {
            let params = PublishParams {
                topic: topic.to_string(),
                payload: payload.clone(),
                ttl,
                contact: self.self_contact.clone(),
            };
            if let Err(err) = self
                .client
                .call(&target, RpcMethod::Publish, to_value(&params))
                .await
            {
                debug!(peer = %target.node_id, error = %err, "publish relay failed");
            }
        }
    }

    /// Number of publications in the dedup cache.
    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }
}

#[async_trait]
impl Topics for GossipTopics {
    async fn publish(&self, topic: &str, payload: serde_json::Value) -> Result<(), NetError> {
        // Mark our own publication seen so a relayed copy can't loop back
        // through us.
        self.mark_seen(Self::content_hash(topic, &payload));
        self.deliver_local(topic, &payload);
        self.relay(topic, &payload, config::PUBLISH_TTL, &self.self_contact.node_id)
            .await;
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> mpsc::Receiver<serde_json::Value> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_CAPACITY);
        self.subscribers.entry(topic.to_string()).or_default().push(tx);
        rx
    }

    async fn handle_publish(
        &self,
        from: &Contact,
        topic: &str,
        payload: serde_json::Value,
        ttl: u8,
    ) {
        if !self.mark_seen(Self::content_hash(topic, &payload)) {
            trace!(topic, "dropping duplicate publication");
            return;
        }

        // The forwarding peer authenticated; it is a contact worth knowing.
        self.book.record(from.clone());
        self.deliver_local(topic, &payload);

        if ttl > 1 {
            self.relay(topic, &payload, ttl - 1, &from.node_id).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Identity;

    fn topics() -> GossipTopics {
        let identity = Identity::generate();
        let book = Arc::new(ContactBook::new());
        let auth = Arc::new(MessageAuth::new(identity.clone(), Arc::clone(&book)));
        let contact = Contact::new("127.0.0.1", 4000, identity.node_id());

        struct NoTransport;
        #[async_trait]
        impl Transport for NoTransport {
            async fn send(
                &self,
                _contact: &Contact,
                _request: crate::message::rpc::RpcRequest,
            ) -> Result<crate::message::rpc::RpcResponse, NetError> {
                Err(NetError::Transport("unreachable".into()))
            }
        }

        GossipTopics::new(auth, Arc::new(NoTransport), book, contact)
    }

    fn peer_contact() -> Contact {
        Contact::new("10.0.0.9", 4009, Identity::generate().node_id())
    }

    #[tokio::test]
    async fn inbound_publication_reaches_subscribers_once() {
        let topics = topics();
        let mut rx = topics.subscribe("contract.v1").await;
        let payload = serde_json::json!({ "data_hash": "abc" });

        topics
            .handle_publish(&peer_contact(), "contract.v1", payload.clone(), 3)
            .await;
        assert_eq!(rx.recv().await.unwrap(), payload);

        // The duplicate is dropped by the seen cache.
        topics
            .handle_publish(&peer_contact(), "contract.v1", payload, 3)
            .await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn own_publication_does_not_loop_back() {
        let topics = topics();
        let mut rx = topics.subscribe("contract.v1").await;
        let payload = serde_json::json!({ "data_hash": "def" });

        topics.publish("contract.v1", payload.clone()).await.unwrap();
        // Local delivery happens exactly once, even if a relayed copy of
        // our own publication arrives later.
        assert_eq!(rx.recv().await.unwrap(), payload);
        topics
            .handle_publish(&peer_contact(), "contract.v1", payload, 3)
            .await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn topics_are_isolated() {
        let topics = topics();
        let mut rx = topics.subscribe("contract.v1").await;

        topics
            .handle_publish(&peer_contact(), "something.else", serde_json::json!({}), 3)
            .await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn forwarding_peer_is_recorded() {
        let topics = topics();
        let from = peer_contact();
        topics
            .handle_publish(&from, "contract.v1", serde_json::json!({ "x": 1 }), 3)
            .await;
        assert_eq!(topics.book.get(&from.node_id), Some(from));
    }

    #[tokio::test]
    async fn seen_cache_grows_per_unique_publication() {
        let topics = topics();
        for i in 0..10u32 {
            topics
                .handle_publish(
                    &peer_contact(),
                    "contract.v1",
                    serde_json::json!({ "i": i }),
                    1,
                )
                .await;
        }
        assert_eq!(topics.seen_count(), 10);
    }
}
