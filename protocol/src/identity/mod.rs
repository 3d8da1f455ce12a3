//! Node identity: the keypair plus everything derived from it.
//!
//! An [`Identity`] bundles a secp256k1 keypair with the two values peers
//! actually see — the node ID and the payment address — and owns the one
//! signing path the rest of the crate is allowed to use.

mod node_id;

pub use node_id::{NodeId, NodeIdError};

use crate::config;
use crate::crypto::keys::{self, CompactSignature, KeyPair};

/// A peer's signing identity.
///
/// Wraps the keypair and pre-computes the derived node ID so the hot
/// verification path never re-hashes its own key. Cloneable because the
/// node façade, the auth hooks, and the farmer task each hold one.
#[derive(Clone, Debug)]
pub struct Identity {
    keypair: KeyPair,
    node_id: NodeId,
}

impl Identity {
    /// Build an identity from an existing keypair.
    pub fn new(keypair: KeyPair) -> Self {
        let node_id = NodeId::from_public_key(&keypair.public_key_bytes());
        Self { keypair, node_id }
    }

    /// Generate a fresh identity with a random keypair.
    pub fn generate() -> Self {
        Self::new(KeyPair::generate())
    }

    /// This peer's 20-byte node ID.
    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    /// The payment destination: the base58check form of the node ID with
    /// the standard address version byte. Farmers put this in contracts as
    /// the place settlement should eventually land.
    pub fn address(&self) -> String {
        let mut payload = Vec::with_capacity(config::NODE_ID_LENGTH);
        payload.extend_from_slice(self.node_id.as_bytes());
        bs58::encode(payload)
            .with_check_version(config::ADDRESS_VERSION)
            .into_string()
    }

    /// Sign bytes through the magic-hash framing.
    pub fn sign(&self, message: &[u8]) -> CompactSignature {
        self.keypair.sign_message(message)
    }

    /// Verify that `signature` over `message` was produced by the key
    /// behind `expected` — by recovering the public key and comparing its
    /// hash. No key distribution needed.
    pub fn verify(message: &[u8], signature: &CompactSignature, expected: &NodeId) -> bool {
        match keys::recover_public_key(message, signature) {
            Ok(key) => NodeId::from_public_key(&key.serialize()) == *expected,
            Err(_) => false,
        }
    }

    /// Access the underlying keypair (for key export in the node binary).
    pub fn keypair(&self) -> &KeyPair {
        &self.keypair
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_id_is_hash_of_public_key() {
        let identity = Identity::generate();
        let expected = NodeId::from_public_key(&identity.keypair().public_key_bytes());
        assert_eq!(identity.node_id(), expected);
    }

    #[test]
    fn sign_verify_roundtrip() {
        let identity = Identity::generate();
        let sig = identity.sign(b"abc1700000000000");
        assert!(Identity::verify(
            b"abc1700000000000",
            &sig,
            &identity.node_id()
        ));
    }

    #[test]
    fn verify_rejects_wrong_signer() {
        let alice = Identity::generate();
        let bob = Identity::generate();
        let sig = alice.sign(b"message");

        // Bob's node id doesn't match the recovered key.
        assert!(!Identity::verify(b"message", &sig, &bob.node_id()));
        // Neither does a tampered message under Alice's id.
        assert!(!Identity::verify(b"tampered", &sig, &alice.node_id()));
    }

    #[test]
    fn address_is_base58check_of_node_id() {
        let identity = Identity::generate();
        let addr = identity.address();

        let decoded = bs58::decode(&addr)
            .with_check(Some(crate::config::ADDRESS_VERSION))
            .into_vec()
            .unwrap();
        // First byte is the version, the rest is the node id.
        assert_eq!(decoded[0], crate::config::ADDRESS_VERSION);
        assert_eq!(&decoded[1..], identity.node_id().as_bytes());
    }

    #[test]
    fn addresses_differ_between_identities() {
        assert_ne!(Identity::generate().address(), Identity::generate().address());
    }
}
