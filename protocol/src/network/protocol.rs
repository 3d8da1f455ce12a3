//! # Contract Protocol
//!
//! The method handlers behind the node's RPC endpoint, both halves of the
//! contract negotiation:
//!
//! - **Renter half** — the OFFER handler. It takes the pending
//!   continuation registered by `store()`, validates the farmer's
//!   countersigned contract against the published draft, consigns the
//!   shard, persists the storage item, and wakes the waiting `store()`
//!   future. First valid OFFER wins; an invalid one puts the continuation
//!   back for the next farmer.
//! - **Farmer half** — [`ContractProtocol::farm`] reacts to published
//!   contracts: claim, sign, look up the renter, OFFER, verify the
//!   countersignature, persist the stub. The CONSIGN / RETRIEVE / AUDIT
//!   handlers serve the stored shard afterwards.
//!
//! Every inbound request passes the verify hook before any handler runs
//! and every success result passes the sign hook before transmission.
//! A request that fails verification produces no reply at all.

use parking_lot::Mutex;
use rand::RngCore;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::audit;
use crate::contact::{Contact, ContactBook};
use crate::contract::{Contract, Role};
use crate::error::NodeError;
use crate::identity::Identity;
use crate::message::auth::MessageAuth;
use crate::message::rpc::{
    AuditParams, AuditResult, ConsignParams, ConsignResult, OfferParams, OfferResult, PingParams,
    PublishParams, RetrieveParams, RetrieveResult, RpcError, RpcMethod, RpcRequest, RpcResponse,
};
use crate::pending::{PendingTable, StoreOutcome};
use crate::storage::{ItemStore, ShardStore};
use crate::network::overlay::{Overlay, Topics, Transport};

/// Serialize a value that cannot fail to serialize (all our wire types).
pub(crate) fn to_value<T: Serialize>(value: &T) -> serde_json::Value {
    serde_json::to_value(value).expect("wire type serialization is infallible")
}

// ---------------------------------------------------------------------------
// RpcClient
// ---------------------------------------------------------------------------

/// The signed request/response round trip, from the caller's side:
/// sign → send → surface error objects → verify → strip.
#[derive(Clone)]
pub(crate) struct RpcClient {
    auth: Arc<MessageAuth>,
    transport: Arc<dyn Transport>,
}

impl RpcClient {
    pub(crate) fn new(auth: Arc<MessageAuth>, transport: Arc<dyn Transport>) -> Self {
        Self { auth, transport }
    }

    /// Call a method on a peer and return its verified result body.
    ///
    /// Error objects come back as [`NodeError::ContractRejected`]; a
    /// response whose signature fails verification surfaces the
    /// authentication error to the caller (this is the outbound path —
    /// the silent-drop rule applies only inbound).
    pub(crate) async fn call(
        &self,
        to: &Contact,
        method: RpcMethod,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, NodeError> {
        let mut request = RpcRequest::new(method, params);
        self.auth.sign_request(&mut request);

        let mut response = self
            .transport
            .send(to, request)
            .await
            .map_err(NodeError::from)?;

        if let Some(error) = response.error.take() {
            return Err(NodeError::ContractRejected(error.message));
        }

        self.auth.verify_response(to, &mut response)?;
        response
            .result
            .take()
            .ok_or_else(|| NodeError::BadResponse("response carries no result".into()))
    }
}

// ---------------------------------------------------------------------------
// ContractProtocol
// ---------------------------------------------------------------------------

/// The RPC method handlers plus the farmer's reaction to published
/// contracts. Shared between the node façade and the serving layer.
pub struct ContractProtocol {
    identity: Identity,
    self_contact: Contact,
    auth: Arc<MessageAuth>,
    book: Arc<ContactBook>,
    overlay: Arc<dyn Overlay>,
    topics: Arc<dyn Topics>,
    client: RpcClient,
    shards: Arc<dyn ShardStore>,
    items: Arc<Mutex<ItemStore>>,
    pending: Arc<PendingTable>,
}

impl ContractProtocol {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        identity: Identity,
        self_contact: Contact,
        auth: Arc<MessageAuth>,
        book: Arc<ContactBook>,
        overlay: Arc<dyn Overlay>,
        topics: Arc<dyn Topics>,
        transport: Arc<dyn Transport>,
        shards: Arc<dyn ShardStore>,
        items: Arc<Mutex<ItemStore>>,
        pending: Arc<PendingTable>,
    ) -> Self {
        let client = RpcClient::new(Arc::clone(&auth), transport);
        Self {
            identity,
            self_contact,
            auth,
            book,
            overlay,
            topics,
            client,
            shards,
            items,
            pending,
        }
    }

    pub(crate) fn client(&self) -> &RpcClient {
        &self.client
    }

    // -- Dispatch -----------------------------------------------------------

    /// Verify, dispatch, sign. `None` means the request failed
    /// authentication and must be dropped without a reply.
    pub async fn handle(&self, mut request: RpcRequest) -> Option<RpcResponse> {
        // The claimed sender rides inside params; verification needs it
        // before anything else is decoded.
        let contact: Contact = match request
            .params
            .get("contact")
            .cloned()
            .map(serde_json::from_value)
        {
            Some(Ok(contact)) => contact,
            _ => {
                debug!(method = ?request.method, "dropping message without a sender contact");
                return None;
            }
        };

        if self.auth.verify_request(&contact, &mut request).is_err() {
            // Logged and counted inside the hook. No reply — answering
            // would hand attackers a signature oracle.
            return None;
        }

        let id = request.id.clone();
        let params = request.params;
        let mut response = match request.method {
            RpcMethod::Ping => self.handle_ping(&id, params),
            RpcMethod::Offer => match decode::<OfferParams>(&id, params) {
                Ok(p) => self.handle_offer(&id, p).await,
                Err(r) => r,
            },
            RpcMethod::Consign => match decode::<ConsignParams>(&id, params) {
                Ok(p) => self.handle_consign(&id, p),
                Err(r) => r,
            },
            RpcMethod::Retrieve => match decode::<RetrieveParams>(&id, params) {
                Ok(p) => self.handle_retrieve(&id, p),
                Err(r) => r,
            },
            RpcMethod::Audit => match decode::<AuditParams>(&id, params) {
                Ok(p) => self.handle_audit(&id, p),
                Err(r) => r,
            },
            RpcMethod::Publish => match decode::<PublishParams>(&id, params) {
                Ok(p) => self.handle_publish(&id, p).await,
                Err(r) => r,
            },
        };

        self.auth.sign_response(&mut response);
        Some(response)
    }

    // -- Method handlers ----------------------------------------------------

    fn handle_ping(&self, id: &str, params: serde_json::Value) -> RpcResponse {
        match decode::<PingParams>(id, params) {
            Ok(ping) => {
                self.book.record(ping.contact);
                RpcResponse::success(id, serde_json::json!({}))
            }
            Err(response) => response,
        }
    }

    /// Renter side: a farmer answered our published contract.
    async fn handle_offer(&self, id: &str, params: OfferParams) -> RpcResponse {
        let OfferParams {
            mut contract,
            contact: farmer_contact,
        } = params;
        let shard_hash = contract.data_hash;

        let Some(pending) = self.pending.take(&shard_hash) else {
            return RpcResponse::failure(id, RpcError::rejected("no pending offer for this shard"));
        };

        // The offered contract must be our draft, untouched except for the
        // farmer half, and the farmer signature must bind to the peer that
        // authenticated this message.
        let draft = &pending.contract;
        let untampered = contract.renter_id == draft.renter_id
            && contract.data_hash == draft.data_hash
            && contract.data_size == draft.data_size
            && contract.store_begin == draft.store_begin
            && contract.store_end == draft.store_end
            && contract.audit_count == draft.audit_count;
        if !untampered || contract.verify(Role::Farmer, &farmer_contact.node_id).is_err() {
            warn!(farmer = %farmer_contact.node_id, shard = %shard_hash, "rejecting invalid offer");
            self.pending.insert(shard_hash, pending);
            return RpcResponse::failure(id, RpcError::rejected("offer failed verification"));
        }

        self.book.record(farmer_contact.clone());
        contract.sign(Role::Renter, &self.identity);

        // Consign the shard to the accepting farmer.
        let consign = ConsignParams {
            data_hash: shard_hash,
            data_shard: hex::encode(&pending.shard),
            tree: pending.tree.public.clone(),
            contact: self.self_contact.clone(),
        };
        let consign_result = self
            .client
            .call(&farmer_contact, RpcMethod::Consign, to_value(&consign))
            .await
            .and_then(|result| {
                serde_json::from_value::<ConsignResult>(result)
                    .map_err(|_| NodeError::BadResponse("consign result carries no token".into()))
            });

        match consign_result {
            Ok(ack) => {
                debug!(farmer = %farmer_contact.node_id, token = %ack.token, "shard consigned");

                let persisted = {
                    let items = self.items.lock();
                    items.load_or_default(&shard_hash).and_then(|mut item| {
                        item.record_replica(
                            farmer_contact.node_id,
                            contract.clone(),
                            pending.tree.public.clone(),
                            pending.tree.private.clone(),
                        );
                        items.save(&shard_hash, &item)
                    })
                };
                if let Err(err) = persisted {
                    warn!(shard = %shard_hash, error = %err, "failed to persist storage item");
                    let _ = pending.completion.send(Err(err.into()));
                    return RpcResponse::failure(id, RpcError::internal("item persistence failed"));
                }

                info!(shard = %shard_hash, farmer = %farmer_contact.node_id, "shard stored");
                let _ = pending.completion.send(Ok(StoreOutcome {
                    shard_hash,
                    farmer: farmer_contact,
                }));
                RpcResponse::success(id, to_value(&OfferResult { contract }))
            }
            Err(err) => {
                warn!(farmer = %farmer_contact.node_id, error = %err, "consign failed, reopening offer");
                // Give the next farmer a chance at the same continuation.
                self.pending.insert(shard_hash, pending);
                RpcResponse::failure(id, RpcError::rejected(format!("consign failed: {err}")))
            }
        }
    }

    /// Farmer side: the renter delivers the shard bytes and public tree.
    fn handle_consign(&self, id: &str, params: ConsignParams) -> RpcResponse {
        let bytes = match hex::decode(&params.data_shard) {
            Ok(bytes) => bytes,
            Err(_) => {
                return RpcResponse::failure(id, RpcError::invalid_params("data_shard is not hex"))
            }
        };
        if crate::identity::NodeId::from_content(&bytes) != params.data_hash {
            return RpcResponse::failure(
                id,
                RpcError::rejected("shard bytes do not match data_hash"),
            );
        }

        if let Err(err) = self.shards.put(&params.data_hash, &bytes) {
            return RpcResponse::failure(id, RpcError::internal(err.to_string()));
        }

        // Duplicate CONSIGN for the same (renter, shard) updates the
        // existing item rather than duplicating it.
        let persisted = {
            let items = self.items.lock();
            items
                .load_or_default(&params.data_hash)
                .and_then(|mut item| {
                    item.record_tree(params.contact.node_id, params.tree.clone());
                    items.save(&params.data_hash, &item)
                })
        };
        if let Err(err) = persisted {
            return RpcResponse::failure(id, RpcError::internal(err.to_string()));
        }

        info!(shard = %params.data_hash, renter = %params.contact.node_id, "shard consigned to us");
        RpcResponse::success(id, to_value(&ConsignResult { token: fresh_token() }))
    }

    /// Farmer side: hand shard bytes back.
    fn handle_retrieve(&self, id: &str, params: RetrieveParams) -> RpcResponse {
        match self.shards.get(&params.data_hash) {
            Ok(Some(bytes)) => RpcResponse::success(
                id,
                to_value(&RetrieveResult {
                    data_shard: hex::encode(bytes),
                }),
            ),
            Ok(None) => RpcResponse::failure(id, RpcError::shard_not_found(&params.data_hash)),
            Err(err) => RpcResponse::failure(id, RpcError::internal(err.to_string())),
        }
    }

    /// Farmer side: prove possession for a revealed challenge.
    fn handle_audit(&self, id: &str, params: AuditParams) -> RpcResponse {
        let bytes = match self.shards.get(&params.data_hash) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                return RpcResponse::failure(id, RpcError::shard_not_found(&params.data_hash))
            }
            Err(err) => return RpcResponse::failure(id, RpcError::internal(err.to_string())),
        };

        let tree = {
            let items = self.items.lock();
            match items.load(&params.data_hash) {
                Ok(item) => item.and_then(|item| item.trees.get(&params.contact.node_id).cloned()),
                Err(err) => {
                    return RpcResponse::failure(id, RpcError::internal(err.to_string()))
                }
            }
        };
        let Some(tree) = tree else {
            return RpcResponse::failure(id, RpcError::rejected("no audit record for this peer"));
        };

        match audit::prove(&tree, &params.challenge, &bytes) {
            Ok(proof) => RpcResponse::success(id, to_value(&AuditResult { proof })),
            Err(err) => RpcResponse::failure(id, RpcError::rejected(err.to_string())),
        }
    }

    /// Relay hop: hand the publication to the topics layer.
    async fn handle_publish(&self, id: &str, params: PublishParams) -> RpcResponse {
        self.topics
            .handle_publish(&params.contact, &params.topic, params.payload, params.ttl)
            .await;
        RpcResponse::success(id, serde_json::json!({}))
    }

    // -- Farmer half of the negotiation -------------------------------------

    /// React to one published contract: claim it, sign it, offer it.
    ///
    /// Failures here are silent by design — a published contract is an
    /// open call, and a farmer that can't (or won't) take it simply stays
    /// quiet. One offer per publication, no retry.
    pub async fn farm(&self, payload: serde_json::Value) {
        let Ok(mut contract) = Contract::from_object(payload) else {
            debug!("ignoring undecodable contract publication");
            return;
        };
        let Some(renter_id) = contract.renter_id else {
            debug!("ignoring contract publication without a renter id");
            return;
        };
        if renter_id == self.identity.node_id() || contract.is_complete() {
            return;
        }

        let shard_hash = contract.data_hash;
        if contract.set_farmer(self.identity.node_id()).is_err() {
            return;
        }
        contract.set_payment_destination(self.identity.address());
        contract.sign(Role::Farmer, &self.identity);

        let renter = match self.overlay.find_node(&renter_id).await {
            Ok(contact) => contact,
            Err(err) => {
                debug!(renter = %renter_id, error = %err, "renter not reachable, skipping contract");
                return;
            }
        };

        let offer = OfferParams {
            contract,
            contact: self.self_contact.clone(),
        };
        let result = match self
            .client
            .call(&renter, RpcMethod::Offer, to_value(&offer))
            .await
        {
            Ok(result) => result,
            Err(err) => {
                debug!(renter = %renter_id, error = %err, "offer was not accepted");
                return;
            }
        };

        let Ok(OfferResult {
            contract: countersigned,
        }) = serde_json::from_value(result)
        else {
            warn!(renter = %renter_id, "offer response carried no contract");
            return;
        };
        if countersigned.verify(Role::Renter, &renter_id).is_err() {
            warn!(renter = %renter_id, "countersigned contract failed verification, aborting");
            return;
        }

        let persisted = {
            let items = self.items.lock();
            items.load_or_default(&shard_hash).and_then(|mut item| {
                item.record_contract(renter_id, countersigned);
                items.save(&shard_hash, &item)
            })
        };
        match persisted {
            Ok(()) => info!(shard = %shard_hash, renter = %renter_id, "contract accepted"),
            Err(err) => warn!(shard = %shard_hash, error = %err, "failed to persist contract"),
        }
    }
}

/// Decode a typed params struct, turning schema violations into a
/// `-32602` error response.
fn decode<T: DeserializeOwned>(id: &str, params: serde_json::Value) -> Result<T, RpcResponse> {
    serde_json::from_value(params)
        .map_err(|e| RpcResponse::failure(id, RpcError::invalid_params(e.to_string())))
}

/// An opaque consignment token: 16 random bytes, hex.
fn fresh_token() -> String {
    let mut bytes = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::memory::MemoryGrid;
    use crate::storage::SledShardStore;

    fn protocol_on_grid(
        grid: &Arc<MemoryGrid>,
    ) -> (Arc<ContractProtocol>, tempfile::TempDir) {
        let identity = Identity::generate();
        let contact = Contact::new("127.0.0.1", 4000, identity.node_id());
        let book = Arc::new(ContactBook::new());
        let auth = Arc::new(MessageAuth::new(identity.clone(), Arc::clone(&book)));
        let items_dir = tempfile::tempdir().unwrap();
        let items = Arc::new(Mutex::new(ItemStore::open(items_dir.path()).unwrap()));

        let protocol = Arc::new(ContractProtocol::new(
            identity,
            contact,
            auth,
            book,
            Arc::clone(grid) as Arc<dyn Overlay>,
            Arc::clone(grid) as Arc<dyn Topics>,
            Arc::clone(grid) as Arc<dyn Transport>,
            Arc::new(SledShardStore::open_temporary().unwrap()),
            items,
            Arc::new(PendingTable::new()),
        ));
        (protocol, items_dir)
    }

    fn signed_request(
        from: &Identity,
        from_contact: &Contact,
        method: RpcMethod,
        mut params: serde_json::Value,
    ) -> RpcRequest {
        params["contact"] = to_value(from_contact);
        let mut request = RpcRequest::new(method, params);
        let book = Arc::new(ContactBook::new());
        MessageAuth::new(from.clone(), book).sign_request(&mut request);
        request
    }

    #[tokio::test]
    async fn ping_records_the_sender_and_replies_signed() {
        let grid = MemoryGrid::new();
        let (protocol, _items_dir) = protocol_on_grid(&grid);

        let sender = Identity::generate();
        let sender_contact = Contact::new("10.0.0.2", 4001, sender.node_id());
        let request = signed_request(
            &sender,
            &sender_contact,
            RpcMethod::Ping,
            serde_json::json!({}),
        );

        let response = protocol.handle(request).await.expect("ping is answered");
        let result = response.result.expect("success result");
        // The reply is signed: reserved fields present in the result.
        assert!(result.get("__signature").is_some());
        assert!(result.get("__nonce").is_some());
    }

    #[tokio::test]
    async fn unauthenticated_request_is_dropped_silently() {
        let grid = MemoryGrid::new();
        let (protocol, _items_dir) = protocol_on_grid(&grid);

        let sender = Identity::generate();
        let sender_contact = Contact::new("10.0.0.2", 4001, sender.node_id());
        // No signature at all.
        let request = RpcRequest::new(
            RpcMethod::Ping,
            serde_json::json!({ "contact": sender_contact }),
        );

        assert!(protocol.handle(request).await.is_none());
    }

    #[tokio::test]
    async fn offer_without_pending_entry_is_rejected() {
        let grid = MemoryGrid::new();
        let (protocol, _items_dir) = protocol_on_grid(&grid);

        let farmer = Identity::generate();
        let farmer_contact = Contact::new("10.0.0.3", 4002, farmer.node_id());
        let renter = Identity::generate();
        let mut contract = Contract::new(
            renter.node_id(),
            crate::identity::NodeId::from_content(b"shard"),
            5,
            0,
            1000,
            12,
        );
        contract.set_farmer(farmer.node_id()).unwrap();
        contract.sign(Role::Farmer, &farmer);

        let request = signed_request(
            &farmer,
            &farmer_contact,
            RpcMethod::Offer,
            serde_json::json!({ "contract": contract }),
        );

        let response = protocol.handle(request).await.expect("answered");
        let error = response.error.expect("rejected");
        assert_eq!(error.code, -32000);
    }

    #[tokio::test]
    async fn consign_with_mismatched_hash_is_rejected() {
        let grid = MemoryGrid::new();
        let (protocol, _items_dir) = protocol_on_grid(&grid);

        let renter = Identity::generate();
        let renter_contact = Contact::new("10.0.0.4", 4003, renter.node_id());
        let tree = crate::audit::AuditTree::generate(b"real bytes", 2);
        let params = serde_json::json!({
            "data_hash": crate::identity::NodeId::from_content(b"real bytes"),
            "data_shard": hex::encode(b"different bytes"),
            "tree": tree.public,
        });
        let request = signed_request(&renter, &renter_contact, RpcMethod::Consign, params);

        let response = protocol.handle(request).await.expect("answered");
        assert!(response.error.is_some());
    }
}
