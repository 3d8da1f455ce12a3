//! # Node Façade
//!
//! The top-level runtime entity for a network peer. A [`Node`] composes
//! the overlay, topics, and transport seams with the contract protocol,
//! the pending-offer table, and the storage layers, and exposes the five
//! operations applications actually call:
//!
//! ```text
//! join() -> store() / retrieve() / audit() -> leave()
//! ```
//!
//! `join` must be called exactly once per open node; a second call fails
//! with `AlreadyOpen` and disturbs nothing. It connects the seed list,
//! schedules the 60-second liveness pings, starts the farming
//! subscription (when enabled), and the pending-offer sweeper. `leave`
//! aborts all of those tasks and waits for them to wind down.
//!
//! Each operation is a short, explicit state machine written as an
//! `async fn` — `store` is publish → await OFFER continuation → consign;
//! `audit` is select → lookup → consume-and-commit challenge → challenge
//! → verify.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::memory::MemoryGrid;
use super::overlay::{Overlay, RpcHandler, Topics, Transport};
use super::protocol::{to_value, ContractProtocol};
use crate::audit::{AuditTree, Verifier};
use crate::config;
use crate::contact::{unix_millis, Contact, ContactBook};
use crate::contract::Contract;
use crate::error::NodeError;
use crate::identity::{Identity, NodeId};
use crate::message::auth::MessageAuth;
use crate::message::rpc::{
    AuditParams, AuditResult, RetrieveParams, RetrieveResult, RpcMethod, RpcRequest, RpcResponse,
};
use crate::pending::{PendingOffer, PendingTable};
use crate::storage::{ItemStore, ShardStore};

use async_trait::async_trait;

/// The three network seams a node is wired to.
pub struct NetworkStack {
    /// DHT lookup and join.
    pub overlay: Arc<dyn Overlay>,
    /// Pub/sub for contract publication.
    pub topics: Arc<dyn Topics>,
    /// Point-to-point RPC delivery.
    pub transport: Arc<dyn Transport>,
}

impl NetworkStack {
    /// All three seams backed by one in-process [`MemoryGrid`] — the
    /// wiring used by the integration tests.
    pub fn in_memory(grid: &Arc<MemoryGrid>) -> Self {
        Self {
            overlay: Arc::clone(grid) as Arc<dyn Overlay>,
            topics: Arc::clone(grid) as Arc<dyn Topics>,
            transport: Arc::clone(grid) as Arc<dyn Transport>,
        }
    }
}

/// Behavioral knobs for a node.
#[derive(Debug, Clone)]
pub struct NodeOptions {
    /// Whether this node farms: subscribes to the contract topic and
    /// offers storage for published contracts.
    pub farm: bool,
    /// Seed contacts connected (and pinged) after `join`.
    pub seeds: Vec<Contact>,
}

impl Default for NodeOptions {
    fn default() -> Self {
        Self {
            farm: true,
            seeds: Vec::new(),
        }
    }
}

struct Lifecycle {
    open: bool,
    tasks: Vec<JoinHandle<()>>,
}

/// A peer node. Cheap to clone — all state is behind one `Arc`.
#[derive(Clone)]
pub struct Node {
    inner: Arc<NodeInner>,
}

struct NodeInner {
    identity: Identity,
    contact: Contact,
    options: NodeOptions,
    auth: Arc<MessageAuth>,
    book: Arc<ContactBook>,
    overlay: Arc<dyn Overlay>,
    topics: Arc<dyn Topics>,
    protocol: Arc<ContractProtocol>,
    items: Arc<Mutex<ItemStore>>,
    pending: Arc<PendingTable>,
    state: Mutex<Lifecycle>,
}

impl Node {
    /// Assemble a node from its identity, advertised contact, options,
    /// auth hooks, contact book, network seams, and storage layers.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        identity: Identity,
        contact: Contact,
        options: NodeOptions,
        auth: Arc<MessageAuth>,
        book: Arc<ContactBook>,
        net: NetworkStack,
        shards: Arc<dyn ShardStore>,
        items: ItemStore,
    ) -> Self {
        let items = Arc::new(Mutex::new(items));
        let pending = Arc::new(PendingTable::new());
        let protocol = Arc::new(ContractProtocol::new(
            identity.clone(),
            contact.clone(),
            Arc::clone(&auth),
            Arc::clone(&book),
            Arc::clone(&net.overlay),
            Arc::clone(&net.topics),
            Arc::clone(&net.transport),
            shards,
            Arc::clone(&items),
            Arc::clone(&pending),
        ));

        Self {
            inner: Arc::new(NodeInner {
                identity,
                contact,
                options,
                auth,
                book,
                overlay: net.overlay,
                topics: net.topics,
                protocol,
                items,
                pending,
                state: Mutex::new(Lifecycle {
                    open: false,
                    tasks: Vec::new(),
                }),
            }),
        }
    }

    // -- Introspection ------------------------------------------------------

    /// This node's ID.
    pub fn node_id(&self) -> NodeId {
        self.inner.identity.node_id()
    }

    /// This node's advertised contact.
    pub fn contact(&self) -> &Contact {
        &self.inner.contact
    }

    /// This node's payment address.
    pub fn address(&self) -> String {
        self.inner.identity.address()
    }

    /// Whether the node is between `join` and `leave`.
    pub fn is_open(&self) -> bool {
        self.inner.state.lock().open
    }

    /// Messages dropped for failing authentication (the `auth_failures`
    /// metric).
    pub fn auth_failures(&self) -> u64 {
        self.inner.auth.failure_count()
    }

    /// Number of in-flight pending offers.
    pub fn pending_count(&self) -> usize {
        self.inner.pending.len()
    }

    /// Number of known peer contacts.
    pub fn known_contacts(&self) -> usize {
        self.inner.book.len()
    }

    // -- Lifecycle ----------------------------------------------------------

    /// Open the node: connect seeds, schedule liveness pings, start the
    /// farming subscription and the pending sweeper.
    ///
    /// Calling `join` on an already-open node fails with
    /// [`NodeError::AlreadyOpen`] without disturbing any running state.
    pub async fn join(&self) -> Result<(), NodeError> {
        {
            let mut state = self.inner.state.lock();
            if state.open {
                return Err(NodeError::AlreadyOpen);
            }
            state.open = true;
        }
        info!(node_id = %self.node_id(), "joining network");

        let mut tasks = Vec::new();

        // Seeds: connect now, then ping on the liveness interval. Failures
        // never evict a seed — it is retried until leave.
        for seed in self.inner.options.seeds.clone() {
            match self.inner.overlay.connect(&seed).await {
                Ok(()) => info!(seed = %seed.node_id, "connected to seed"),
                Err(err) => {
                    warn!(seed = %seed.node_id, error = %err, "seed connect failed, will keep pinging")
                }
            }

            let overlay = Arc::clone(&self.inner.overlay);
            tasks.push(tokio::spawn(async move {
                let mut interval = tokio::time::interval(config::SEED_PING_INTERVAL);
                interval.tick().await; // the immediate first tick
                loop {
                    interval.tick().await;
                    if let Err(err) = overlay.connect(&seed).await {
                        debug!(seed = %seed.node_id, error = %err, "seed ping failed");
                    }
                }
            }));
        }

        // Farming: react to published contracts.
        if self.inner.options.farm {
            let mut publications = self.inner.topics.subscribe(Contract::TYPE_TAG).await;
            let protocol = Arc::clone(&self.inner.protocol);
            tasks.push(tokio::spawn(async move {
                while let Some(payload) = publications.recv().await {
                    protocol.farm(payload).await;
                }
            }));
        }

        // Sweeper: purge pending offers past their deadline. Dropping an
        // entry closes its completion channel, failing the waiting store().
        let pending = Arc::clone(&self.inner.pending);
        tasks.push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(config::OFFER_SWEEP_INTERVAL);
            loop {
                interval.tick().await;
                let expired = pending.expire(unix_millis());
                if !expired.is_empty() {
                    debug!(count = expired.len(), "purged expired pending offers");
                }
            }
        }));

        let mut state = self.inner.state.lock();
        if !state.open {
            // leave() raced us; wind the fresh tasks down.
            for task in tasks {
                task.abort();
            }
            return Err(NodeError::NotOpen);
        }
        state.tasks = tasks;
        Ok(())
    }

    /// Close the node: cancel the ping, farming, and sweeper tasks and
    /// wait for them to finish or fail.
    pub async fn leave(&self) -> Result<(), NodeError> {
        let tasks = {
            let mut state = self.inner.state.lock();
            if !state.open {
                return Err(NodeError::NotOpen);
            }
            state.open = false;
            std::mem::take(&mut state.tasks)
        };

        for task in tasks {
            task.abort();
            let _ = task.await;
        }
        info!(node_id = %self.node_id(), "left network");
        Ok(())
    }

    fn ensure_open(&self) -> Result<(), NodeError> {
        if self.inner.state.lock().open {
            Ok(())
        } else {
            Err(NodeError::NotOpen)
        }
    }

    // -- Renter operations --------------------------------------------------

    /// Store a shard on the network for `duration`.
    ///
    /// Publishes a draft contract, waits for the first valid farmer OFFER
    /// (the registered continuation handles countersigning and
    /// consignment), and returns the shard hash once the shard and its
    /// audit state are persisted.
    pub async fn store(&self, data: &[u8], duration: Duration) -> Result<NodeId, NodeError> {
        self.ensure_open()?;

        let shard_hash = NodeId::from_content(data);
        let now = unix_millis();
        let contract = Contract::new(
            self.node_id(),
            shard_hash,
            data.len() as u64,
            now,
            now + duration.as_millis() as u64,
            config::DEFAULT_AUDIT_COUNT,
        );
        let tree = AuditTree::generate(data, config::DEFAULT_AUDIT_COUNT);

        let (completion, accepted) = oneshot::channel();
        let offer = PendingOffer {
            contract: contract.clone(),
            shard: data.to_vec(),
            tree,
            deadline: now + config::OFFER_TIMEOUT.as_millis() as u64,
            completion,
        };
        if let Some(displaced) = self.inner.pending.insert(shard_hash, offer) {
            let _ = displaced.completion.send(Err(NodeError::ContractRejected(
                "superseded by a newer store of the same shard".into(),
            )));
        }

        info!(shard = %shard_hash, "publishing storage contract");
        if let Err(err) = self
            .inner
            .topics
            .publish(contract.type_tag(), contract.to_object())
            .await
        {
            self.inner.pending.take(&shard_hash);
            return Err(err.into());
        }

        match tokio::time::timeout(config::OFFER_TIMEOUT, accepted).await {
            Ok(Ok(outcome)) => outcome.map(|o| o.shard_hash),
            Ok(Err(_closed)) => Err(NodeError::ContractRejected(
                "pending offer was superseded or purged".into(),
            )),
            Err(_elapsed) => {
                self.inner.pending.take(&shard_hash);
                Err(NodeError::Transport(
                    "no farmer offered within the offer window".into(),
                ))
            }
        }
    }

    /// Fetch a stored shard back from its holder.
    pub async fn retrieve(&self, shard_hash: &NodeId) -> Result<Vec<u8>, NodeError> {
        self.ensure_open()?;

        let farmer_id = self.select_holder(shard_hash)?;
        let farmer = self
            .inner
            .overlay
            .find_node(&farmer_id)
            .await
            .map_err(NodeError::from)?;

        let params = RetrieveParams {
            data_hash: *shard_hash,
            contact: self.inner.contact.clone(),
        };
        let result = self
            .inner
            .protocol
            .client()
            .call(&farmer, RpcMethod::Retrieve, to_value(&params))
            .await?;

        let RetrieveResult { data_shard } = serde_json::from_value(result)
            .map_err(|_| NodeError::BadResponse("retrieve result carries no data_shard".into()))?;
        let bytes = hex::decode(&data_shard)
            .map_err(|_| NodeError::BadResponse("data_shard is not hex".into()))?;
        if NodeId::from_content(&bytes) != *shard_hash {
            return Err(NodeError::BadResponse(
                "returned shard does not match its hash".into(),
            ));
        }
        Ok(bytes)
    }

    // -- Audit coordinator --------------------------------------------------

    /// Challenge the shard's holder to prove possession.
    ///
    /// Returns the verification verdict. The revealed challenge is
    /// committed to disk *before* the challenge message is sent, so a
    /// crash-restart can never reuse a revealed pre-image. A farmer that
    /// answers with an error object fails the audit (`Ok(false)`);
    /// transport-level failures surface as errors.
    pub async fn audit(&self, shard_hash: &NodeId) -> Result<bool, NodeError> {
        self.ensure_open()?;

        let farmer_id = self.select_holder(shard_hash)?;
        let farmer = self
            .inner
            .overlay
            .find_node(&farmer_id)
            .await
            .map_err(NodeError::from)?;

        // Consume the next challenge and persist the consumption before
        // any of it leaves this node.
        let (challenge, index, verifier) = {
            let items = self.inner.items.lock();
            let mut item = items.load(shard_hash)?.ok_or_else(|| {
                NodeError::StorageError(format!("no storage item for shard {shard_hash}"))
            })?;
            let record = item
                .challenges
                .get_mut(&farmer_id)
                .ok_or(NodeError::ChallengesExhausted)?;
            let verifier = Verifier::new(record);
            let (challenge, index) = record
                .pop_challenge()
                .ok_or(NodeError::ChallengesExhausted)?;
            items.save(shard_hash, &item)?;
            (challenge, index, verifier)
        };

        let params = AuditParams {
            data_hash: *shard_hash,
            challenge,
            contact: self.inner.contact.clone(),
        };
        match self
            .inner
            .protocol
            .client()
            .call(&farmer, RpcMethod::Audit, to_value(&params))
            .await
        {
            Ok(result) => {
                let AuditResult { proof } = serde_json::from_value(result)
                    .map_err(|_| NodeError::BadResponse("audit result carries no proof".into()))?;
                let verdict = verifier.verify(&proof, index);
                info!(shard = %shard_hash, farmer = %farmer_id, verdict, "audit complete");
                Ok(verdict)
            }
            Err(NodeError::ContractRejected(reason)) => {
                // The farmer could not produce a proof. That *is* the
                // audit outcome, not a local failure.
                warn!(shard = %shard_hash, farmer = %farmer_id, %reason, "audit failed at farmer");
                Ok(false)
            }
            Err(other) => Err(other),
        }
    }

    /// Deterministic holder selection for retrieve/audit (v1: first key
    /// of the ordered contracts map).
    fn select_holder(&self, shard_hash: &NodeId) -> Result<NodeId, NodeError> {
        let items = self.inner.items.lock();
        let item = items.load(shard_hash)?.ok_or_else(|| {
            NodeError::StorageError(format!("no storage item for shard {shard_hash}"))
        })?;
        item.select_farmer()
            .ok_or_else(|| NodeError::StorageError("storage item has no contracts".into()))
    }
}

#[async_trait]
impl RpcHandler for Node {
    async fn handle(&self, request: RpcRequest) -> Option<RpcResponse> {
        self.inner.protocol.handle(request).await
    }
}
