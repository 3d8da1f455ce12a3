// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # STORJ Protocol — Core Library
//!
//! A peer node for a distributed, content-addressed shard-storage network.
//! Peers play two roles: **renters** pay to have a shard stored and
//! periodically audited, **farmers** offer disk and bandwidth. Discovery
//! happens over a Kademlia-style overlay, contracts are negotiated on a
//! pub/sub topic built atop it, shard bytes move point-to-point, and
//! farmers prove continued possession through Merkle-tree audits.
//!
//! Every message on the wire is authenticated with a secp256k1 signature
//! bound to the sender's node identity — the RIPEMD-160 of the SHA-256 of
//! its compressed public key. No key registry, no certificates: the
//! signature *is* the identity.
//!
//! ## Architecture
//!
//! The crate is split into modules that mirror the actual concerns of a
//! storage peer:
//!
//! - **crypto** — Hashing and secp256k1 keys. Don't roll your own.
//! - **identity** — Node IDs and the signing identity derived from a keypair.
//! - **contact** — Peer addressing: URIs, the contact book, cached pubkeys.
//! - **message** — The signed JSON-RPC envelope and its sign/verify hooks.
//! - **contract** — The two-party storage contract and its role signatures.
//! - **audit** — Merkle audit trees: pre-committed challenges, proofs,
//!   verification.
//! - **pending** — The pending-offer table that carries `store()` across
//!   the publish → offer → consign round trip.
//! - **storage** — Shard bytes (sled) and per-shard storage items (JSON).
//! - **network** — The Overlay/Topics/Transport seams, the contract
//!   protocol handlers, and the `Node` façade.
//!
//! ## Design Philosophy
//!
//! 1. Correctness over performance (but we're still fast).
//! 2. Authentication failures are dropped, never answered — no oracles.
//! 3. Every state machine is an `async fn`, not a callback pyramid.
//! 4. If it touches a peer's bytes, it has tests. Plural.

pub mod audit;
pub mod config;
pub mod contact;
pub mod contract;
pub mod crypto;
pub mod error;
pub mod identity;
pub mod message;
pub mod network;
pub mod pending;
pub mod storage;

pub use contact::Contact;
pub use contract::Contract;
pub use error::NodeError;
pub use identity::{Identity, NodeId};
pub use network::node::{Node, NodeOptions};
