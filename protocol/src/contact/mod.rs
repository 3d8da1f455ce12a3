//! # Peer Contacts
//!
//! A [`Contact`] is how one peer refers to another: an address, a port,
//! and the node ID that every message from that peer must prove it owns.
//! On the wire and in seed lists, contacts travel as URIs:
//!
//! ```text
//! storj://host:port/<nodeIdHex>
//! ```
//!
//! The [`ContactBook`] is the node's working set of known peers plus the
//! bounded cache of recovered public keys. The cache exists purely to
//! short-circuit ECDSA recovery on the hot verification path — it is never
//! authoritative over the node-ID derivation, and every cached-key use
//! re-checks the derived ID.

use dashmap::DashMap;
use secp256k1::PublicKey;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

use crate::config;
use crate::identity::NodeId;

/// Errors from parsing a contact URI.
#[derive(Debug, Error)]
pub enum ContactError {
    /// The URI does not start with the expected scheme.
    #[error("invalid scheme: expected '{}://'", config::URI_SCHEME)]
    InvalidScheme,

    /// The URI is structurally malformed (missing host, port, or node ID).
    #[error("malformed contact uri: {0}")]
    Malformed(String),

    /// The port component is not a valid u16.
    #[error("invalid port: {0}")]
    InvalidPort(String),

    /// The node-ID path component failed to parse.
    #[error("invalid node id in uri: {0}")]
    InvalidNodeId(#[from] crate::identity::NodeIdError),
}

// ---------------------------------------------------------------------------
// Contact
// ---------------------------------------------------------------------------

/// Another peer on the network: where to reach it and who it must be.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    /// Hostname or IP address.
    pub address: String,
    /// TCP port the peer's RPC endpoint listens on.
    pub port: u16,
    /// The node ID every message from this peer must authenticate as.
    pub node_id: NodeId,
}

impl Contact {
    /// Build a contact from its three parts.
    pub fn new(address: impl Into<String>, port: u16, node_id: NodeId) -> Self {
        Self {
            address: address.into(),
            port,
            node_id,
        }
    }

    /// Format as a seed URI: `storj://host:port/<nodeIdHex>`.
    pub fn to_uri(&self) -> String {
        format!(
            "{}://{}:{}/{}",
            config::URI_SCHEME,
            self.address,
            self.port,
            self.node_id.to_hex()
        )
    }

    /// The peer's HTTP base URL for the JSON-RPC transport.
    pub fn http_url(&self) -> String {
        format!("http://{}:{}/", self.address, self.port)
    }
}

impl FromStr for Contact {
    type Err = ContactError;

    fn from_str(uri: &str) -> Result<Self, Self::Err> {
        let prefix = format!("{}://", config::URI_SCHEME);
        let rest = uri.strip_prefix(&prefix).ok_or(ContactError::InvalidScheme)?;

        let (authority, id_part) = rest
            .split_once('/')
            .ok_or_else(|| ContactError::Malformed("missing node id path".into()))?;

        // Split on the last colon so hosts containing colons still parse;
        // the port is always the final component.
        let (host, port_str) = authority
            .rsplit_once(':')
            .ok_or_else(|| ContactError::Malformed("missing port".into()))?;
        if host.is_empty() {
            return Err(ContactError::Malformed("empty host".into()));
        }

        let port: u16 = port_str
            .parse()
            .map_err(|_| ContactError::InvalidPort(port_str.to_string()))?;

        let node_id: NodeId = id_part.parse()?;

        Ok(Self::new(host, port, node_id))
    }
}

impl fmt::Display for Contact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_uri())
    }
}

// ---------------------------------------------------------------------------
// ContactBook
// ---------------------------------------------------------------------------

/// The node's working set of peers and the recovered-pubkey cache.
///
/// Both maps are concurrent — the verify hook, the seed pinger, and the
/// protocol handlers all touch the book without coordination. The pubkey
/// cache is bounded; when full, the oldest entries are evicted.
pub struct ContactBook {
    contacts: DashMap<NodeId, Contact>,
    pubkeys: DashMap<NodeId, (PublicKey, u64)>,
    pubkey_capacity: usize,
}

impl ContactBook {
    /// Create an empty book with the default pubkey-cache bound.
    pub fn new() -> Self {
        Self::with_capacity(config::PUBKEY_CACHE_CAPACITY)
    }

    /// Create an empty book with an explicit pubkey-cache bound.
    pub fn with_capacity(pubkey_capacity: usize) -> Self {
        Self {
            contacts: DashMap::new(),
            pubkeys: DashMap::new(),
            pubkey_capacity,
        }
    }

    /// Record (or refresh) a contact.
    pub fn record(&self, contact: Contact) {
        self.contacts.insert(contact.node_id, contact);
    }

    /// Look up a contact by node ID.
    pub fn get(&self, node_id: &NodeId) -> Option<Contact> {
        self.contacts.get(node_id).map(|entry| entry.clone())
    }

    /// All currently known contacts except `exclude`. Used by the publish
    /// relay to pick forwarding targets without echoing to the sender.
    pub fn contacts_except(&self, exclude: &NodeId) -> Vec<Contact> {
        self.contacts
            .iter()
            .filter(|entry| entry.key() != exclude)
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Number of known contacts.
    pub fn len(&self) -> usize {
        self.contacts.len()
    }

    /// Whether the book has no contacts yet.
    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }

    /// Cache a recovered public key for a node ID.
    pub fn cache_pubkey(&self, node_id: NodeId, key: PublicKey) {
        let now = unix_millis();
        self.pubkeys.insert(node_id, (key, now));
        self.maybe_evict();
    }

    /// Fetch a cached public key, if any. Callers MUST re-check that the
    /// key hashes to the node ID they are verifying against.
    pub fn cached_pubkey(&self, node_id: &NodeId) -> Option<PublicKey> {
        self.pubkeys.get(node_id).map(|entry| entry.value().0)
    }

    /// Number of cached public keys.
    pub fn cached_pubkey_count(&self) -> usize {
        self.pubkeys.len()
    }

    /// Evict the oldest cache entries once over capacity, down to 75%.
    fn maybe_evict(&self) {
        if self.pubkeys.len() <= self.pubkey_capacity {
            return;
        }

        let target = self.pubkey_capacity * 3 / 4;
        let mut entries: Vec<(NodeId, u64)> = self
            .pubkeys
            .iter()
            .map(|entry| (*entry.key(), entry.value().1))
            .collect();
        entries.sort_by_key(|(_, ts)| *ts);

        let to_remove = entries.len().saturating_sub(target);
        for (id, _) in entries.iter().take(to_remove) {
            self.pubkeys.remove(id);
        }
    }
}

impl Default for ContactBook {
    fn default() -> Self {
        Self::new()
    }
}

/// Milliseconds since the unix epoch — the protocol's nonce clock.
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
