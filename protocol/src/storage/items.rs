//! # Storage Items
//!
//! A [`StorageItem`] is everything a peer knows about one shard hash,
//! organized as four maps keyed by counterparty node ID:
//!
//! - `contracts` — one entry per peer holding (or renting) a replica.
//! - `trees` — the public audit records.
//! - `challenges` — the private audit records with their remaining
//!   challenge supplies (renter side only; a farmer never holds
//!   pre-images).
//! - `meta` — opaque per-peer bookkeeping.
//!
//! On the renter side the four maps stay key-aligned: recording a replica
//! fills all of them at once. Items persist as one JSON file per shard
//! hash under `datadir/items/`, written atomically (temp file + rename)
//! because an audit *must not* observe a challenge list that was consumed
//! in memory but not on disk.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use super::StoreError;
use crate::audit::{PrivateAuditRecord, PublicAuditRecord};
use crate::contract::Contract;
use crate::identity::NodeId;

/// Per-shard state: contracts, audit records, and challenge supplies,
/// each keyed by the counterparty's node ID.
///
/// `BTreeMap` is load-bearing: its deterministic iteration order is what
/// makes [`select_farmer`](Self::select_farmer) reproducible across runs
/// and across peers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageItem {
    /// Contracts by counterparty node ID.
    pub contracts: BTreeMap<NodeId, Contract>,
    /// Public audit records by counterparty node ID.
    pub trees: BTreeMap<NodeId, PublicAuditRecord>,
    /// Private audit records (remaining challenges) by farmer node ID.
    pub challenges: BTreeMap<NodeId, PrivateAuditRecord>,
    /// Opaque per-peer metadata.
    pub meta: BTreeMap<NodeId, serde_json::Value>,
}

impl StorageItem {
    /// Renter side: record a farmer now holding a replica. Fills all four
    /// maps under the farmer's ID so the key-alignment invariant holds.
    pub fn record_replica(
        &mut self,
        farmer: NodeId,
        contract: Contract,
        public: PublicAuditRecord,
        private: PrivateAuditRecord,
    ) {
        self.contracts.insert(farmer, contract);
        self.trees.insert(farmer, public);
        self.challenges.insert(farmer, private);
        self.meta.entry(farmer).or_insert_with(|| serde_json::json!({}));
    }

    /// Farmer side: record the contract with a renter. The tree arrives
    /// separately at consignment; no challenge pre-images ever do.
    pub fn record_contract(&mut self, renter: NodeId, contract: Contract) {
        self.contracts.insert(renter, contract);
        self.meta.entry(renter).or_insert_with(|| serde_json::json!({}));
    }

    /// Farmer side: record the public audit record delivered by CONSIGN.
    /// Duplicate consignments overwrite — idempotent by design.
    pub fn record_tree(&mut self, renter: NodeId, public: PublicAuditRecord) {
        self.trees.insert(renter, public);
    }

    /// Deterministic holder selection for retrieve and audit: the first
    /// key of the ordered contracts map. v1 policy — this method is the
    /// single replacement point for anything smarter.
    pub fn select_farmer(&self) -> Option<NodeId> {
        self.contracts.keys().next().copied()
    }

    /// Whether any contract references this item. An item with no
    /// contracts is dead weight awaiting the reaper.
    pub fn is_referenced(&self) -> bool {
        !self.contracts.is_empty()
    }
}

// ---------------------------------------------------------------------------
// ItemStore
// ---------------------------------------------------------------------------

/// One JSON file per shard hash under `datadir/items/`.
#[derive(Debug, Clone)]
pub struct ItemStore {
    dir: PathBuf,
}

impl ItemStore {
    /// Open the item store under a data directory, creating
    /// `datadir/items/` if needed.
    pub fn open(datadir: &Path) -> Result<Self, StoreError> {
        let dir = datadir.join("items");
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Load the item for a shard hash, if one exists.
    pub fn load(&self, shard_hash: &NodeId) -> Result<Option<StorageItem>, StoreError> {
        let path = self.path_for(shard_hash);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&path)?;
        let item = serde_json::from_slice(&bytes)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(Some(item))
    }

    /// Load the item for a shard hash, or a fresh empty one.
    pub fn load_or_default(&self, shard_hash: &NodeId) -> Result<StorageItem, StoreError> {
        Ok(self.load(shard_hash)?.unwrap_or_default())
    }

    /// Persist an item atomically: write to a temp file, then rename over
    /// the target. A crash mid-save leaves the old item intact, never a
    /// half-written one.
    pub fn save(&self, shard_hash: &NodeId, item: &StorageItem) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(item)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let path = self.path_for(shard_hash);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// Remove an item. Absent items are not an error.
    pub fn delete(&self, shard_hash: &NodeId) -> Result<(), StoreError> {
        let path = self.path_for(shard_hash);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn path_for(&self, shard_hash: &NodeId) -> PathBuf {
        self.dir.join(format!("{}.json", shard_hash.to_hex()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditTree;
    use crate::identity::Identity;

    fn replica_parts() -> (NodeId, Contract, PublicAuditRecord, PrivateAuditRecord) {
        let renter = Identity::generate();
        let farmer = Identity::generate();
        let contract = Contract::new(
            renter.node_id(),
            NodeId::from_content(b"shard"),
            5,
            0,
            1000,
            12,
        );
        let tree = AuditTree::generate(b"shard", 4);
        (farmer.node_id(), contract, tree.public, tree.private)
    }

    #[test]
    fn record_replica_keeps_maps_key_aligned() {
        let (farmer, contract, public, private) = replica_parts();
        let mut item = StorageItem::default();
        item.record_replica(farmer, contract, public, private);

        let keys: Vec<_> = item.contracts.keys().collect();
        assert_eq!(item.trees.keys().collect::<Vec<_>>(), keys);
        assert_eq!(item.challenges.keys().collect::<Vec<_>>(), keys);
        assert_eq!(item.meta.keys().collect::<Vec<_>>(), keys);
    }

    #[test]
    fn select_farmer_is_deterministic_first_key() {
        let mut item = StorageItem::default();
        assert!(item.select_farmer().is_none());

        let (a, contract_a, pub_a, priv_a) = replica_parts();
        let (b, contract_b, pub_b, priv_b) = replica_parts();
        item.record_replica(a, contract_a, pub_a, priv_a);
        item.record_replica(b, contract_b, pub_b, priv_b);

        // First key of the ordered map, regardless of insertion order.
        let expected = *item.contracts.keys().next().unwrap();
        assert_eq!(item.select_farmer(), Some(expected));
        assert_eq!(expected, a.min(b));
    }

    #[test]
    fn item_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = ItemStore::open(dir.path()).unwrap();
        let hash = NodeId::from_content(b"shard");

        assert!(store.load(&hash).unwrap().is_none());

        let (farmer, contract, public, private) = replica_parts();
        let mut item = StorageItem::default();
        item.record_replica(farmer, contract, public, private);
        store.save(&hash, &item).unwrap();

        let loaded = store.load(&hash).unwrap().unwrap();
        assert_eq!(loaded, item);

        // The file lands where the persisted layout says it should.
        assert!(dir
            .path()
            .join("items")
            .join(format!("{}.json", hash.to_hex()))
            .exists());
    }

    #[test]
    fn save_overwrites_previous_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = ItemStore::open(dir.path()).unwrap();
        let hash = NodeId::from_content(b"shard");

        let (farmer, contract, public, mut private) = replica_parts();
        let mut item = StorageItem::default();
        item.record_replica(farmer, contract, public, private.clone());
        store.save(&hash, &item).unwrap();

        // Consume a challenge and persist; the reload must observe it.
        private.pop_challenge().unwrap();
        item.challenges.insert(farmer, private.clone());
        store.save(&hash, &item).unwrap();

        let loaded = store.load(&hash).unwrap().unwrap();
        assert_eq!(
            loaded.challenges.get(&farmer).unwrap().remaining(),
            private.remaining()
        );
        assert_eq!(loaded.challenges.get(&farmer).unwrap().issued, 1);
    }

    #[test]
    fn delete_tolerates_absent_items() {
        let dir = tempfile::tempdir().unwrap();
        let store = ItemStore::open(dir.path()).unwrap();
        let hash = NodeId::from_content(b"ghost");

        store.delete(&hash).unwrap();

        store.save(&hash, &StorageItem::default()).unwrap();
        store.delete(&hash).unwrap();
        assert!(store.load(&hash).unwrap().is_none());
    }
}
