//! # Pending Offer Table
//!
//! `store()` publishes a contract and then has to wait for some farmer,
//! somewhere, to answer with an OFFER on the node's own RPC endpoint. The
//! pending table is the bridge between those two halves: a typed
//! continuation keyed by shard hash, carrying everything the OFFER handler
//! needs to finish the job — the draft contract, the shard bytes, the
//! audit tree, and a completion channel back to the waiting `store()`
//! future.
//!
//! At most one continuation exists per shard hash at any instant: the
//! first valid OFFER takes it (removing it), and a second `store()` for
//! the same shard displaces the first. Entries carry a deadline and are
//! swept once it passes.

use parking_lot::Mutex;
use std::collections::HashMap;
use tokio::sync::oneshot;

use crate::audit::AuditTree;
use crate::contact::Contact;
use crate::contract::Contract;
use crate::error::NodeError;
use crate::identity::NodeId;

/// What a completed store reports back: the shard hash and the farmer
/// that took the contract.
#[derive(Debug)]
pub struct StoreOutcome {
    /// Content address of the stored shard.
    pub shard_hash: NodeId,
    /// The farmer now holding a replica.
    pub farmer: Contact,
}

/// The continuation for one published contract.
pub struct PendingOffer {
    /// The renter-built draft contract (farmer half unset).
    pub contract: Contract,
    /// The shard bytes to consign once a farmer accepts.
    pub shard: Vec<u8>,
    /// Both halves of the audit tree built over the shard.
    pub tree: AuditTree,
    /// Unix-millisecond deadline after which this entry is swept.
    pub deadline: u64,
    /// Wakes the waiting `store()` future. Dropping the entry without
    /// sending fails that future.
    pub completion: oneshot::Sender<Result<StoreOutcome, NodeError>>,
}

/// Shard hash → pending-offer continuation.
pub struct PendingTable {
    entries: Mutex<HashMap<NodeId, PendingOffer>>,
}

impl PendingTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Register a continuation for a shard hash. Returns the displaced
    /// entry if one was already pending — the caller decides what to tell
    /// its waiter.
    pub fn insert(&self, shard_hash: NodeId, offer: PendingOffer) -> Option<PendingOffer> {
        self.entries.lock().insert(shard_hash, offer)
    }

    /// Take (and remove) the continuation for a shard hash. This is what
    /// makes the first valid OFFER win: the second caller gets `None`.
    pub fn take(&self, shard_hash: &NodeId) -> Option<PendingOffer> {
        self.entries.lock().remove(shard_hash)
    }

    /// Remove and return every entry whose deadline has passed.
    pub fn expire(&self, now: u64) -> Vec<PendingOffer> {
        let mut entries = self.entries.lock();
        let expired: Vec<NodeId> = entries
            .iter()
            .filter(|(_, offer)| offer.deadline <= now)
            .map(|(hash, _)| *hash)
            .collect();
        expired
            .into_iter()
            .filter_map(|hash| entries.remove(&hash))
            .collect()
    }

    /// Number of in-flight continuations.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl Default for PendingTable {
    fn default() -> Self {
        Self::new()
    }
}
