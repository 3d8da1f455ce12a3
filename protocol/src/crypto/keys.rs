//! # Key Management
//!
//! secp256k1 keypair generation and compact recoverable signatures.
//!
//! Every peer on the network has a secp256k1 keypair. The wire format never
//! carries public keys — a receiver *recovers* the signer's key from the
//! 65-byte compact signature and checks that it hashes to the claimed node
//! ID. That recovery requirement is why this module is built on ECDSA
//! rather than a scheme with nicer ergonomics: the signature has to stand
//! alone.
//!
//! ## Security considerations
//!
//! - We use OS-level RNG for key generation. If your OS RNG is broken,
//!   you have bigger problems than shard storage.
//! - Key bytes are never logged. If you add logging to this module,
//!   you will be asked to leave.
//! - Signing always goes through the magic-hash framing — there is no API
//!   for signing raw digests, on purpose. One signing path, one audit
//!   surface.

use secp256k1::ecdsa::{RecoverableSignature, RecoveryId};
use secp256k1::{All, Message, PublicKey, Secp256k1, SecretKey};
use std::fmt;
use thiserror::Error;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use super::hash::magic_hash;
use crate::config;

/// Errors that can occur during key and signature operations.
///
/// Intentionally vague about *why* something failed — leaking details
/// about key material through error messages is a classic footgun.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("invalid secret key bytes: wrong length or not a valid scalar")]
    InvalidSecretKey,

    #[error("invalid compact signature encoding")]
    InvalidSignature,

    #[error("public key recovery failed")]
    RecoveryFailed,
}

/// A peer keypair wrapping a secp256k1 secret/public key pair.
///
/// This is the atomic unit of identity: the node ID, the payment address,
/// and every wire signature trace back to one of these. The secret key is
/// the crown jewel — `KeyPair` deliberately does NOT implement
/// `Serialize`/`Deserialize`; exporting key material is a conscious call
/// to [`secret_bytes`](Self::secret_bytes), not something that happens
/// because a struct got shoved into a JSON response.
pub struct KeyPair {
    secret: SecretKey,
    public: PublicKey,
    secp: Secp256k1<All>,
}

/// A 65-byte compact recoverable signature.
///
/// Layout matches Bitcoin's `signmessage`: one header byte carrying the
/// recovery id (27 + id + 4 for compressed keys), then r and s. Base64 on
/// the wire. The recovery id is what lets a verifier reconstruct the
/// signer's public key without ever having seen it.
#[derive(Clone, PartialEq, Eq)]
pub struct CompactSignature {
    recovery_id: u8,
    bytes: [u8; 64],
}

impl KeyPair {
    /// Generate a fresh keypair using the OS cryptographic RNG.
    pub fn generate() -> Self {
        let secp = Secp256k1::new();
        let (secret, public) = secp.generate_keypair(&mut rand::rngs::OsRng);
        Self {
            secret,
            public,
            secp,
        }
    }

    /// Reconstruct a keypair from raw 32-byte secret key material.
    ///
    /// The public key is re-derived from the secret key, so the two can
    /// never disagree.
    pub fn from_secret_bytes(bytes: &[u8; 32]) -> Result<Self, KeyError> {
        let secp = Secp256k1::new();
        let secret = SecretKey::from_slice(bytes).map_err(|_| KeyError::InvalidSecretKey)?;
        let public = PublicKey::from_secret_key(&secp, &secret);
        Ok(Self {
            secret,
            public,
            secp,
        })
    }

    /// Reconstruct a keypair from a hex-encoded secret key.
    ///
    /// Convenience for loading keys from a key file. Don't put raw hex
    /// keys in config files in production; for devnet, we're not going to
    /// pretend you won't do it anyway.
    pub fn from_hex(hex_str: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(hex_str.trim()).map_err(|_| KeyError::InvalidSecretKey)?;
        let arr: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| KeyError::InvalidSecretKey)?;
        Self::from_secret_bytes(&arr)
    }

    /// Returns the public key.
    pub fn public_key(&self) -> PublicKey {
        self.public
    }

    /// The compressed (33-byte) public key encoding. This is the input to
    /// the node-ID derivation.
    pub fn public_key_bytes(&self) -> [u8; config::PUBLIC_KEY_LENGTH] {
        self.public.serialize()
    }

    /// Exports the raw 32-byte secret key material.
    ///
    /// **Handle with extreme care.** Don't log it. Don't send it over the
    /// network. Don't store it in a text file called "my_keys.txt" on your
    /// desktop.
    pub fn secret_bytes(&self) -> [u8; 32] {
        self.secret.secret_bytes()
    }

    /// Sign a message through the magic-hash framing.
    ///
    /// The returned signature is recoverable: a verifier reconstructs the
    /// public key from the signature and the message alone.
    pub fn sign_message(&self, message: &[u8]) -> CompactSignature {
        let digest = magic_hash(message);
        let msg = Message::from_digest(digest);
        let sig = self.secp.sign_ecdsa_recoverable(&msg, &self.secret);
        let (rec_id, bytes) = sig.serialize_compact();
        CompactSignature {
            recovery_id: rec_id.to_i32() as u8,
            bytes,
        }
    }
}

impl Clone for KeyPair {
    /// Cloning a keypair is allowed but should make you uncomfortable.
    /// Every copy of a secret key is another thing to protect.
    fn clone(&self) -> Self {
        Self {
            secret: self.secret,
            public: self.public,
            secp: Secp256k1::new(),
        }
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print secret material in debug output. Not even "partially".
        write!(f, "KeyPair(pub={})", hex::encode(self.public_key_bytes()))
    }
}

impl PartialEq for KeyPair {
    /// Two keypairs are equal if their public keys match. Comparing secret
    /// material in a non-constant-time way is a bad habit, and for identity
    /// purposes the public key is what matters.
    fn eq(&self, other: &Self) -> bool {
        self.public == other.public
    }
}

impl Eq for KeyPair {}

// ---------------------------------------------------------------------------
// Recovery & Verification
// ---------------------------------------------------------------------------

/// Recover the signer's public key from a message and compact signature.
///
/// This is the heart of inbound authentication: no key exchange, no
/// registry — the signature carries its own key, and the caller checks the
/// key's hash against the claimed node ID.
pub fn recover_public_key(
    message: &[u8],
    signature: &CompactSignature,
) -> Result<PublicKey, KeyError> {
    let digest = magic_hash(message);
    let msg = Message::from_digest(digest);
    let rec_id = RecoveryId::from_i32(signature.recovery_id as i32)
        .map_err(|_| KeyError::InvalidSignature)?;
    let sig = RecoverableSignature::from_compact(&signature.bytes, rec_id)
        .map_err(|_| KeyError::InvalidSignature)?;
    let secp = Secp256k1::verification_only();
    secp.recover_ecdsa(&msg, &sig)
        .map_err(|_| KeyError::RecoveryFailed)
}

/// Verify a compact signature against a known public key.
///
/// Cheaper than recovery when the key is already cached — but callers MUST
/// still re-check that the cached key hashes to the expected node ID; the
/// cache is a shortcut, never an authority.
pub fn verify_with_key(message: &[u8], signature: &CompactSignature, key: &PublicKey) -> bool {
    let digest = magic_hash(message);
    let msg = Message::from_digest(digest);
    let Ok(rec_id) = RecoveryId::from_i32(signature.recovery_id as i32) else {
        return false;
    };
    let Ok(recoverable) = RecoverableSignature::from_compact(&signature.bytes, rec_id) else {
        return false;
    };
    let secp = Secp256k1::verification_only();
    secp.verify_ecdsa(&msg, &recoverable.to_standard(), key)
        .is_ok()
}

// ---------------------------------------------------------------------------
// CompactSignature encoding
// ---------------------------------------------------------------------------

impl CompactSignature {
    /// Header base for compressed-key compact signatures: 27 for the
    /// recovery id origin, plus 4 to flag a compressed public key.
    const HEADER_BASE: u8 = 31;

    /// Encode as the 65-byte base64 wire form.
    pub fn to_base64(&self) -> String {
        let mut out = [0u8; config::COMPACT_SIGNATURE_LENGTH];
        out[0] = Self::HEADER_BASE + self.recovery_id;
        out[1..].copy_from_slice(&self.bytes);
        BASE64.encode(out)
    }

    /// Decode the 65-byte base64 wire form.
    ///
    /// Accepts any header in the 27..=34 range (uncompressed and compressed
    /// variants) — the recovery id is the low two bits either way.
    pub fn from_base64(encoded: &str) -> Result<Self, KeyError> {
        let raw = BASE64.decode(encoded).map_err(|_| KeyError::InvalidSignature)?;
        if raw.len() != config::COMPACT_SIGNATURE_LENGTH {
            return Err(KeyError::InvalidSignature);
        }
        let header = raw[0];
        if !(27..=34).contains(&header) {
            return Err(KeyError::InvalidSignature);
        }
        let mut bytes = [0u8; 64];
        bytes.copy_from_slice(&raw[1..]);
        Ok(Self {
            recovery_id: (header - 27) & 3,
            bytes,
        })
    }
}

impl fmt::Debug for CompactSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b64 = self.to_base64();
        write!(f, "CompactSignature({}...)", &b64[..12.min(b64.len())])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::hash::hash160;

    #[test]
    fn generate_produces_valid_keypair() {
        let kp = KeyPair::generate();
        assert_eq!(kp.public_key_bytes().len(), 33);
        assert_eq!(kp.secret_bytes().len(), 32);
    }

    #[test]
    fn two_generated_keypairs_are_different() {
        // If this fails, your RNG is broken and you should panic (the
        // emotion, not the macro). Well, actually, both.
        let a = KeyPair::generate();
        let b = KeyPair::generate();
        assert_ne!(a.public_key_bytes(), b.public_key_bytes());
    }

    #[test]
    fn secret_bytes_roundtrip() {
        let kp = KeyPair::generate();
        let restored = KeyPair::from_secret_bytes(&kp.secret_bytes()).unwrap();
        assert_eq!(kp.public_key_bytes(), restored.public_key_bytes());
    }

    #[test]
    fn hex_roundtrip() {
        let kp = KeyPair::generate();
        let restored = KeyPair::from_hex(&hex::encode(kp.secret_bytes())).unwrap();
        assert_eq!(kp, restored);
    }

    #[test]
    fn invalid_hex_rejected() {
        assert!(KeyPair::from_hex("deadbeef").is_err());
        assert!(KeyPair::from_hex("not-hex-at-all").is_err());
        // All-zero is not a valid scalar either.
        assert!(KeyPair::from_secret_bytes(&[0u8; 32]).is_err());
    }

    #[test]
    fn sign_and_recover_roundtrip() {
        let kp = KeyPair::generate();
        let msg = b"abc1700000000000";
        let sig = kp.sign_message(msg);

        let recovered = recover_public_key(msg, &sig).unwrap();
        assert_eq!(recovered, kp.public_key());
        // And the derived node id matches.
        assert_eq!(
            hash160(&recovered.serialize()),
            hash160(&kp.public_key_bytes())
        );
    }

    #[test]
    fn recovery_of_tampered_message_yields_wrong_key() {
        let kp = KeyPair::generate();
        let sig = kp.sign_message(b"original");

        // Recovery over a different message either fails outright or
        // produces some other key — never the signer's.
        match recover_public_key(b"tampered", &sig) {
            Ok(key) => assert_ne!(key, kp.public_key()),
            Err(_) => {}
        }
    }

    #[test]
    fn verify_with_key_accepts_and_rejects() {
        let kp = KeyPair::generate();
        let other = KeyPair::generate();
        let sig = kp.sign_message(b"message");

        assert!(verify_with_key(b"message", &sig, &kp.public_key()));
        assert!(!verify_with_key(b"message", &sig, &other.public_key()));
        assert!(!verify_with_key(b"other message", &sig, &kp.public_key()));
    }

    #[test]
    fn base64_roundtrip() {
        let kp = KeyPair::generate();
        let sig = kp.sign_message(b"wire format");
        let encoded = sig.to_base64();
        let decoded = CompactSignature::from_base64(&encoded).unwrap();
        assert_eq!(sig, decoded);

        // Recovery still works after the round trip.
        let recovered = recover_public_key(b"wire format", &decoded).unwrap();
        assert_eq!(recovered, kp.public_key());
    }

    #[test]
    fn malformed_base64_rejected() {
        assert!(CompactSignature::from_base64("not base64 !!!").is_err());
        // Right alphabet, wrong length.
        assert!(CompactSignature::from_base64(&BASE64.encode([0u8; 10])).is_err());
        // Correct length but header outside the 27..=34 window.
        let mut raw = [0u8; 65];
        raw[0] = 99;
        assert!(CompactSignature::from_base64(&BASE64.encode(raw)).is_err());
    }

    #[test]
    fn debug_does_not_leak_secret() {
        let kp = KeyPair::generate();
        let debug_str = format!("{:?}", kp);
        assert!(debug_str.starts_with("KeyPair(pub="));
        assert!(!debug_str.contains(&hex::encode(kp.secret_bytes())));
    }
}
