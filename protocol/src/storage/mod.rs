//! # Shard Storage
//!
//! Two persistence concerns live here, deliberately separate:
//!
//! - [`ShardStore`] — raw shard bytes, keyed by content address. The
//!   production implementation is [`SledShardStore`], an embedded sled
//!   tree under `datadir/shards`.
//! - [`ItemStore`] (in [`items`]) — per-shard [`StorageItem`] metadata:
//!   contracts, audit records, and challenge supplies, one JSON file per
//!   shard hash under `datadir/items/`.
//!
//! Shard bytes are big and opaque; items are small and structured. Mixing
//! them in one store couples shard I/O to every metadata update.

pub mod items;

pub use items::{ItemStore, StorageItem};

use sled::Tree;
use std::path::Path;
use thiserror::Error;

use crate::identity::NodeId;

/// Errors from either storage layer.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sled error: {0}")]
    Backend(#[from] sled::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Where shard bytes live. The seam exists so tests and exotic
/// deployments can swap the backend without touching the protocol.
pub trait ShardStore: Send + Sync {
    /// Store shard bytes under their content address. Idempotent —
    /// consigning the same shard twice is an update, not an error.
    fn put(&self, hash: &NodeId, data: &[u8]) -> Result<(), StoreError>;

    /// Fetch shard bytes. `None` if this peer does not hold the shard.
    fn get(&self, hash: &NodeId) -> Result<Option<Vec<u8>>, StoreError>;

    /// Drop a shard. Removing an absent shard is not an error.
    fn delete(&self, hash: &NodeId) -> Result<(), StoreError>;

    /// Whether this peer holds the shard.
    fn contains(&self, hash: &NodeId) -> Result<bool, StoreError> {
        Ok(self.get(hash)?.is_some())
    }
}

// ---------------------------------------------------------------------------
// Sled-backed shard store
// ---------------------------------------------------------------------------

/// Shard bytes in an embedded sled tree.
///
/// sled is inherently thread-safe — lock-free concurrent reads,
/// serialized writes — so the store can be shared via `Arc` without
/// external synchronization.
#[derive(Debug, Clone)]
pub struct SledShardStore {
    db: sled::Db,
    shards: Tree,
}

impl SledShardStore {
    /// Open or create the shard database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = sled::open(path)?;
        let shards = db.open_tree("shards")?;
        Ok(Self { db, shards })
    }

    /// A temporary in-memory store that vanishes on drop. Ideal for unit
    /// tests — no filesystem side effects, no cleanup.
    pub fn open_temporary() -> Result<Self, StoreError> {
        let db = sled::Config::new().temporary(true).open()?;
        let shards = db.open_tree("shards")?;
        Ok(Self { db, shards })
    }

    /// Number of shards held.
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Block until all pending writes are durable.
    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }
}

impl ShardStore for SledShardStore {
    fn put(&self, hash: &NodeId, data: &[u8]) -> Result<(), StoreError> {
        self.shards.insert(hash.as_bytes(), data)?;
        self.db.flush()?;
        Ok(())
    }

    fn get(&self, hash: &NodeId) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.shards.get(hash.as_bytes())?.map(|ivec| ivec.to_vec()))
    }

    fn delete(&self, hash: &NodeId) -> Result<(), StoreError> {
        self.shards.remove(hash.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get_roundtrip() {
        let store = SledShardStore::open_temporary().unwrap();
        let hash = NodeId::from_content(b"hello");

        assert!(store.get(&hash).unwrap().is_none());
        store.put(&hash, b"hello").unwrap();
        assert_eq!(store.get(&hash).unwrap().unwrap(), b"hello");
        assert!(store.contains(&hash).unwrap());
        assert_eq!(store.shard_count(), 1);
    }

    #[test]
    fn put_is_idempotent() {
        let store = SledShardStore::open_temporary().unwrap();
        let hash = NodeId::from_content(b"hello");
        store.put(&hash, b"hello").unwrap();
        store.put(&hash, b"hello").unwrap();
        assert_eq!(store.shard_count(), 1);
    }

    #[test]
    fn delete_removes_and_tolerates_absent() {
        let store = SledShardStore::open_temporary().unwrap();
        let hash = NodeId::from_content(b"hello");

        store.delete(&hash).unwrap(); // absent: fine
        store.put(&hash, b"hello").unwrap();
        store.delete(&hash).unwrap();
        assert!(!store.contains(&hash).unwrap());
    }

    #[test]
    fn persistent_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let hash = NodeId::from_content(b"durable");

        {
            let store = SledShardStore::open(dir.path()).unwrap();
            store.put(&hash, b"durable").unwrap();
            store.flush().unwrap();
        }

        let store = SledShardStore::open(dir.path()).unwrap();
        assert_eq!(store.get(&hash).unwrap().unwrap(), b"durable");
    }
}
