//! Cryptographic primitives: hashing and secp256k1 keys.
//!
//! Everything identity-bearing in the protocol reduces to two operations —
//! `RIPEMD160(SHA256(·))` for addresses and the Bitcoin magic-hash compact
//! signature for authentication. Both live here, behind small typed
//! wrappers, so the rest of the crate never touches raw curve arithmetic.

pub mod hash;
pub mod keys;

pub use hash::{hash160, magic_hash, sha256};
pub use keys::{CompactSignature, KeyError, KeyPair};
