//! # Hashing Utilities
//!
//! The hash constructions used throughout the protocol. There are exactly
//! three and we refuse to add more without a very good reason:
//!
//! - **SHA-256** — the workhorse, and the inner half of every composite.
//! - **hash160** — `RIPEMD160(SHA256(data))`. Node IDs, shard addresses,
//!   and audit-tree nodes all use this 20-byte construction, the same one
//!   Bitcoin uses for pay-to-pubkey-hash. Compact, collision-resistant
//!   enough at this size, and interoperable with wallet tooling.
//! - **magic-hash** — Bitcoin's personal-message construction: double
//!   SHA-256 over a length-prefixed framed string. Signing through it keeps
//!   our compact signatures verifiable by anything that understands
//!   `signmessage`, which is what ties payment addresses to node identity.

use sha2::{Digest, Sha256};

use ripemd::Ripemd160;

/// The framing prefix for magic-hash signing. The leading `0x18` is the
/// varint length of the ASCII text that follows.
const MAGIC_PREFIX: &[u8] = b"\x18Bitcoin Signed Message:\n";

/// Compute the SHA-256 hash of the input data.
///
/// Returns a fixed 32-byte digest. For the composite constructions below,
/// prefer [`hash160`] and [`magic_hash`] — raw SHA-256 on its own appears
/// only as a building block.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Compute the double-SHA-256 hash: `SHA256(SHA256(data))`.
///
/// Used inside the magic-hash construction. The double hash protects
/// against length-extension, which matters when the outer protocol frames
/// attacker-controlled strings.
pub fn sha256d(data: &[u8]) -> [u8; 32] {
    sha256(&sha256(data))
}

/// Compute `RIPEMD160(SHA256(data))` — the 20-byte "hash160".
///
/// This is the address function of the entire network: a node ID is the
/// hash160 of a compressed public key, a shard address is the hash160 of
/// the shard bytes, and audit trees are built from hash160 nodes.
///
/// # Example
///
/// ```
/// use storj_protocol::crypto::hash160;
///
/// let shard_hash = hash160(b"hello");
/// assert_eq!(shard_hash.len(), 20);
/// ```
pub fn hash160(data: &[u8]) -> [u8; 20] {
    let sha = sha256(data);
    let mut hasher = Ripemd160::new();
    hasher.update(sha);
    hasher.finalize().into()
}

/// Compute the Bitcoin magic-hash of a message.
///
/// The construction is `SHA256d(prefix ‖ varint(len(msg)) ‖ msg)` where the
/// prefix is the length-prefixed string `"Bitcoin Signed Message:\n"`.
/// Signatures over this digest are what wallet software produces for
/// `signmessage`, so a node's RPC signatures and its payment address
/// verify with the same tooling.
pub fn magic_hash(message: &[u8]) -> [u8; 32] {
    let mut framed = Vec::with_capacity(MAGIC_PREFIX.len() + 9 + message.len());
    framed.extend_from_slice(MAGIC_PREFIX);
    write_varint(&mut framed, message.len() as u64);
    framed.extend_from_slice(message);
    sha256d(&framed)
}

/// Append a Bitcoin-style variable-length integer to `out`.
///
/// Messages in this protocol are short (an id plus a decimal nonce), but
/// the full encoding costs nothing and avoids a surprise cliff at 253
/// bytes.
fn write_varint(out: &mut Vec<u8>, value: u64) {
    match value {
        0..=0xFC => out.push(value as u8),
        0xFD..=0xFFFF => {
            out.push(0xFD);
            out.extend_from_slice(&(value as u16).to_le_bytes());
        }
        0x1_0000..=0xFFFF_FFFF => {
            out.push(0xFE);
            out.extend_from_slice(&(value as u32).to_le_bytes());
        }
        _ => {
            out.push(0xFF);
            out.extend_from_slice(&value.to_le_bytes());
        }
    }
}
