//! # Protocol Configuration & Constants
//!
//! Every magic number in the protocol lives here. If you're hardcoding a
//! constant somewhere else, you're doing it wrong and you owe the team
//! coffee.
//!
//! Some of these values are wire-visible (nonce expiry, the seed URI
//! scheme) — changing them after peers are deployed is somewhere between
//! "difficult" and "career-ending", so choose wisely on devnet.

use std::time::Duration;

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Node IDs are RIPEMD160(SHA256(compressed_pubkey)) — 20 bytes, same
/// construction as a Bitcoin pay-to-pubkey-hash address. Interop with that
/// ecosystem's address→signature mapping is the whole point.
pub const NODE_ID_LENGTH: usize = 20;

/// Compressed secp256k1 public keys are 33 bytes (parity byte + x).
pub const PUBLIC_KEY_LENGTH: usize = 33;

/// A compact recoverable signature on the wire: 1 header byte carrying the
/// recovery id, then r and s. 65 bytes, base64-encoded.
pub const COMPACT_SIGNATURE_LENGTH: usize = 65;

/// Version byte for base58check payment addresses. 0x00, the Bitcoin
/// mainnet P2PKH prefix — addresses double as payment destinations.
pub const ADDRESS_VERSION: u8 = 0x00;

// ---------------------------------------------------------------------------
// Message Authentication
// ---------------------------------------------------------------------------

/// How long a signed message stays acceptable after its nonce was minted.
/// 15 seconds tolerates realistic clock skew and transit delay without
/// leaving a barn-door replay window. Tune per deployment.
pub const NONCE_EXPIRE: Duration = Duration::from_millis(15_000);

/// Nonce expiry as milliseconds — nonces themselves are unix-epoch
/// milliseconds, so most of the arithmetic wants a u64.
pub const NONCE_EXPIRE_MS: u64 = 15_000;

/// Reserved field carrying the freshness token inside `params`/`result`.
pub const NONCE_FIELD: &str = "__nonce";

/// Reserved field carrying the compact signature inside `params`/`result`.
pub const SIGNATURE_FIELD: &str = "__signature";

/// Upper bound on the pubkey cache. One recovered key per peer we've ever
/// verified; 512 peers is far more than a node's working set.
pub const PUBKEY_CACHE_CAPACITY: usize = 512;

// ---------------------------------------------------------------------------
// Contracts & Audits
// ---------------------------------------------------------------------------

/// Number of pre-committed audit challenges generated per contract.
/// Twelve covers a year of monthly audits, or a quarter of weekly ones.
pub const DEFAULT_AUDIT_COUNT: u32 = 12;

/// How long a published contract waits for a farmer's OFFER before the
/// pending entry is purged and `store()` fails.
pub const OFFER_TIMEOUT: Duration = Duration::from_secs(60);

/// How often the pending-offer sweeper looks for expired entries.
pub const OFFER_SWEEP_INTERVAL: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Network
// ---------------------------------------------------------------------------

/// URI scheme for peer contacts: `storj://host:port/<nodeIdHex>`.
pub const URI_SCHEME: &str = "storj";

/// Default RPC bind address. Loopback on purpose — exposing a node to the
/// open internet is a conscious flag away, not a default.
pub const DEFAULT_RPC_BIND: &str = "127.0.0.1:4000";

/// Default data directory name under the user's home directory
/// (`$HOME/.storjnode`, or `%USERPROFILE%\.storjnode` on Windows).
pub const DEFAULT_DATA_DIR_NAME: &str = ".storjnode";

/// Interval between liveness PINGs to each seed contact.
pub const SEED_PING_INTERVAL: Duration = Duration::from_secs(60);

/// Maximum hops a published contract travels through the topic relay.
pub const PUBLISH_TTL: u8 = 6;

/// Number of contacts each publish hop forwards to.
pub const PUBLISH_FANOUT: usize = 3;

/// Maximum number of content hashes kept in the publish dedup cache.
pub const PUBLISH_SEEN_CACHE: usize = 10_000;

/// Per-request transport timeout. A peer that can't answer an RPC in ten
/// seconds isn't going to.
pub const TRANSPORT_TIMEOUT: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
