//! # Node IDs
//!
//! A node ID is the 20-byte `RIPEMD160(SHA256(compressed_pubkey))` of a
//! peer's secp256k1 public key — the same construction as a Bitcoin
//! pay-to-pubkey-hash, which is what makes node identities and payment
//! addresses two views of the same key. Hex-encoded on the wire (40
//! characters).
//!
//! The same 20-byte type doubles as a shard address: a shard's identity is
//! the hash160 of its bytes. Content addressing and peer addressing share
//! one keyspace, which is exactly what a Kademlia-style overlay wants.

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::config;
use crate::crypto::hash::hash160;

/// Errors from parsing a node ID out of its hex wire form.
#[derive(Debug, Error)]
pub enum NodeIdError {
    /// The string was not valid hex.
    #[error("node id is not valid hex")]
    NotHex,

    /// The decoded value has the wrong length.
    #[error("node id has wrong length: expected {expected} bytes, got {got}")]
    WrongLength {
        /// Expected number of bytes.
        expected: usize,
        /// Actual number of bytes.
        got: usize,
    },
}

/// A 20-byte network identifier: a peer's identity or a shard's address.
///
/// `Ord` matters here — storage items keep their per-farmer maps in
/// `BTreeMap<NodeId, _>`, and the deterministic iteration order is what
/// makes farmer selection reproducible.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId([u8; config::NODE_ID_LENGTH]);

impl NodeId {
    /// Wrap raw bytes as a node ID.
    pub fn from_bytes(bytes: [u8; config::NODE_ID_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Derive the node ID for a compressed public key.
    pub fn from_public_key(compressed: &[u8]) -> Self {
        Self(hash160(compressed))
    }

    /// Derive the content address for a blob of shard bytes.
    pub fn from_content(data: &[u8]) -> Self {
        Self(hash160(data))
    }

    /// The raw 20 bytes.
    pub fn as_bytes(&self) -> &[u8; config::NODE_ID_LENGTH] {
        &self.0
    }

    /// Hex wire encoding. 40 characters.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl FromStr for NodeId {
    type Err = NodeIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|_| NodeIdError::NotHex)?;
        let arr: [u8; config::NODE_ID_LENGTH] =
            bytes
                .as_slice()
                .try_into()
                .map_err(|_| NodeIdError::WrongLength {
                    expected: config::NODE_ID_LENGTH,
                    got: bytes.len(),
                })?;
        Ok(Self(arr))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.to_hex())
    }
}

// Node IDs serialize as their hex string — they appear inside JSON bodies
// and as JSON object keys (the storage-item maps), and both need the
// string form.
impl Serialize for NodeId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for NodeId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}
