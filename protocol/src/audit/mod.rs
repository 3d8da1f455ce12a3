//! # Audit Trees
//!
//! A renter pre-commits a batch of possession challenges when it stores a
//! shard. For each random challenge `c`, the expected response is
//! `r = hash160(c ‖ data)` and the tree leaf is `hash160(r)` — so the
//! farmer's stored record reveals nothing about the responses themselves,
//! while a farmer who still holds the shard can recompute any response on
//! demand.
//!
//! Leaves are padded to the next power of two with `hash160("")` and
//! interior nodes are `hash160(left ‖ right)`, giving a perfect binary
//! tree of known depth.
//!
//! The construction splits into two records:
//!
//! - **public** (`root`, `depth`, hashed leaves) — handed to the farmer at
//!   consignment; enough to build proofs, useless for forging responses.
//! - **private** (`root`, `depth`, raw challenges) — retained by the
//!   renter; consumed front-to-back, one challenge per audit, never
//!   replayed.

mod verifier;

pub use verifier::Verifier;

use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use thiserror::Error;

use crate::crypto::hash::hash160;
use crate::identity::NodeId;

/// Length of a raw audit challenge in bytes (hex on the wire).
const CHALLENGE_LENGTH: usize = 32;

/// Errors from audit-tree arithmetic.
#[derive(Debug, Error)]
pub enum AuditError {
    /// The presented challenge does not correspond to any pre-committed
    /// leaf — either the challenge is bogus or the shard bytes changed.
    #[error("challenge does not match any pre-committed leaf")]
    UnknownChallenge,

    /// The challenge string is not valid hex.
    #[error("challenge is not valid hex")]
    BadChallengeEncoding,
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// The farmer-held half of an audit tree: hashed leaves only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicAuditRecord {
    /// Merkle root over the padded leaves.
    pub root: NodeId,
    /// Tree depth; every proof branch must have exactly this length.
    pub depth: u32,
    /// Padded leaf hashes, in challenge order then padding.
    pub leaves: Vec<NodeId>,
}

/// The renter-held half: the raw challenge pre-images.
///
/// Challenges are consumed front-to-back via
/// [`pop_challenge`](Self::pop_challenge); `issued` tracks how many have
/// been revealed so the verifier knows which leaf index to expect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivateAuditRecord {
    /// Merkle root, duplicated here so the verifier needs no farmer input.
    pub root: NodeId,
    /// Tree depth.
    pub depth: u32,
    /// Remaining unrevealed challenges, hex-encoded.
    pub challenges: VecDeque<String>,
    /// Number of challenges already revealed.
    pub issued: u32,
}

impl PrivateAuditRecord {
    /// Take the next unused challenge, returning it with its leaf index.
    /// Returns `None` once the pre-committed supply is exhausted.
    pub fn pop_challenge(&mut self) -> Option<(String, u32)> {
        let challenge = self.challenges.pop_front()?;
        let index = self.issued;
        self.issued += 1;
        Some((challenge, index))
    }

    /// How many unrevealed challenges remain.
    pub fn remaining(&self) -> usize {
        self.challenges.len()
    }
}

/// A farmer's possession proof for one revealed challenge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditProof {
    /// `hash160(challenge ‖ data)` — recomputable only with the shard.
    pub response: NodeId,
    /// Index of the matching leaf in the padded leaf array.
    pub leaf_index: u32,
    /// Sibling hashes from the leaf up to (excluding) the root.
    pub branch: Vec<NodeId>,
}

// ---------------------------------------------------------------------------
// Tree construction
// ---------------------------------------------------------------------------

/// A freshly built audit tree: both halves, ready to split between the
/// two parties.
#[derive(Debug, Clone)]
pub struct AuditTree {
    /// The farmer-bound public record.
    pub public: PublicAuditRecord,
    /// The renter-retained private record.
    pub private: PrivateAuditRecord,
}

impl AuditTree {
    /// Build an audit tree over `data` with `count` random challenges.
    pub fn generate(data: &[u8], count: u32) -> Self {
        let mut challenges = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let mut raw = [0u8; CHALLENGE_LENGTH];
            rand::rngs::OsRng.fill_bytes(&mut raw);
            challenges.push(hex::encode(raw));
        }
        Self::from_challenges(data, challenges)
    }

    /// Build a tree from explicit challenges. Split out so tests can use
    /// deterministic pre-images.
    pub fn from_challenges(data: &[u8], challenges: Vec<String>) -> Self {
        let mut leaves: Vec<NodeId> = challenges
            .iter()
            .map(|challenge| {
                let raw = hex::decode(challenge).expect("locally generated challenges are hex");
                leaf_for(&raw, data)
            })
            .collect();

        // Pad to a perfect binary tree. The pad leaf is a fixed value, so
        // padding positions can never collide with a real response hash
        // except by a hash160 collision.
        let padded_len = leaves.len().max(1).next_power_of_two();
        leaves.resize(padded_len, pad_leaf());

        let depth = padded_len.trailing_zeros();
        let root = merkle_root(&leaves);

        Self {
            public: PublicAuditRecord {
                root,
                depth,
                leaves,
            },
            private: PrivateAuditRecord {
                root,
                depth,
                challenges: challenges.into(),
                issued: 0,
            },
        }
    }
}

/// Build a possession proof from the public record, a revealed challenge,
/// and the shard bytes. This is the farmer side of an AUDIT round.
pub fn prove(
    record: &PublicAuditRecord,
    challenge_hex: &str,
    data: &[u8],
) -> Result<AuditProof, AuditError> {
    let challenge = hex::decode(challenge_hex).map_err(|_| AuditError::BadChallengeEncoding)?;
    let response = response_for(&challenge, data);
    let leaf = NodeId::from_bytes(hash160(response.as_bytes()));

    let leaf_index = record
        .leaves
        .iter()
        .position(|candidate| *candidate == leaf)
        .ok_or(AuditError::UnknownChallenge)? as u32;

    Ok(AuditProof {
        response,
        leaf_index,
        branch: merkle_branch(&record.leaves, leaf_index as usize),
    })
}

// ---------------------------------------------------------------------------
// Merkle arithmetic
// ---------------------------------------------------------------------------

/// The expected audit response: `hash160(challenge ‖ data)`.
fn response_for(challenge: &[u8], data: &[u8]) -> NodeId {
    let mut buf = Vec::with_capacity(challenge.len() + data.len());
    buf.extend_from_slice(challenge);
    buf.extend_from_slice(data);
    NodeId::from_bytes(hash160(&buf))
}

/// A pre-committed leaf: the hash of the expected response.
fn leaf_for(challenge: &[u8], data: &[u8]) -> NodeId {
    NodeId::from_bytes(hash160(response_for(challenge, data).as_bytes()))
}

/// The fixed padding leaf.
fn pad_leaf() -> NodeId {
    NodeId::from_bytes(hash160(b""))
}

fn merkle_parent(left: &NodeId, right: &NodeId) -> NodeId {
    let mut buf = [0u8; 40];
    buf[..20].copy_from_slice(left.as_bytes());
    buf[20..].copy_from_slice(right.as_bytes());
    NodeId::from_bytes(hash160(&buf))
}

/// Fold a power-of-two leaf level up to the root.
fn merkle_root(leaves: &[NodeId]) -> NodeId {
    let mut level = leaves.to_vec();
    while level.len() > 1 {
        level = level
            .chunks(2)
            .map(|pair| merkle_parent(&pair[0], &pair[1]))
            .collect();
    }
    level[0]
}

/// Sibling path for the leaf at `index`, bottom-up.
fn merkle_branch(leaves: &[NodeId], index: usize) -> Vec<NodeId> {
    let mut branch = Vec::new();
    let mut level = leaves.to_vec();
    let mut position = index;
    while level.len() > 1 {
        branch.push(level[position ^ 1]);
        level = level
            .chunks(2)
            .map(|pair| merkle_parent(&pair[0], &pair[1]))
            .collect();
        position /= 2;
    }
    branch
}

/// Recompute the root from a leaf, its index, and a sibling path.
/// Shared by the [`Verifier`].
pub(crate) fn fold_branch(leaf: &NodeId, index: u32, branch: &[NodeId]) -> NodeId {
    let mut current = *leaf;
    let mut position = index;
    for sibling in branch {
        current = if position & 1 == 0 {
            merkle_parent(&current, sibling)
        } else {
            merkle_parent(sibling, &current)
        };
        position >>= 1;
    }
    current
}

#[cfg(test)]
mod tests {
    use super::*;

    const DATA: &[u8] = b"the shard bytes under audit";

    fn fixed_challenges(count: usize) -> Vec<String> {
        (0..count)
            .map(|i| hex::encode([i as u8; CHALLENGE_LENGTH]))
            .collect()
    }

    #[test]
    fn twelve_challenges_pad_to_sixteen_leaves() {
        let tree = AuditTree::from_challenges(DATA, fixed_challenges(12));
        assert_eq!(tree.public.leaves.len(), 16);
        assert_eq!(tree.public.depth, 4);
        assert_eq!(tree.private.remaining(), 12);
        assert_eq!(tree.public.root, tree.private.root);
    }

    #[test]
    fn challenges_pop_front_to_back_with_indices() {
        let tree = AuditTree::from_challenges(DATA, fixed_challenges(3));
        let mut private = tree.private;

        let (first, i0) = private.pop_challenge().unwrap();
        let (_, i1) = private.pop_challenge().unwrap();
        assert_eq!(first, hex::encode([0u8; CHALLENGE_LENGTH]));
        assert_eq!((i0, i1), (0, 1));
        assert_eq!(private.remaining(), 1);

        private.pop_challenge().unwrap();
        assert!(private.pop_challenge().is_none());
    }

    #[test]
    fn every_challenge_proves_against_the_root() {
        let tree = AuditTree::from_challenges(DATA, fixed_challenges(12));
        let verifier = Verifier::new(&tree.private);

        let mut private = tree.private.clone();
        while let Some((challenge, index)) = private.pop_challenge() {
            let proof = prove(&tree.public, &challenge, DATA).unwrap();
            assert_eq!(proof.leaf_index, index);
            assert!(verifier.verify(&proof, index));
        }
    }

    #[test]
    fn proof_requires_the_actual_shard_bytes() {
        let tree = AuditTree::from_challenges(DATA, fixed_challenges(4));
        let challenge = &tree.private.challenges[0];

        // Without the true bytes the response hashes to no known leaf.
        assert!(matches!(
            prove(&tree.public, challenge, b"some other bytes"),
            Err(AuditError::UnknownChallenge)
        ));
    }

    #[test]
    fn bogus_challenge_is_rejected() {
        let tree = AuditTree::from_challenges(DATA, fixed_challenges(4));
        assert!(matches!(
            prove(&tree.public, "zzzz", DATA),
            Err(AuditError::BadChallengeEncoding)
        ));
        assert!(matches!(
            prove(&tree.public, &hex::encode([0xAB; 32]), DATA),
            Err(AuditError::UnknownChallenge)
        ));
    }

    #[test]
    fn single_challenge_tree_has_depth_zero() {
        let tree = AuditTree::from_challenges(DATA, fixed_challenges(1));
        assert_eq!(tree.public.depth, 0);
        assert_eq!(tree.public.leaves.len(), 1);

        let proof = prove(&tree.public, &tree.private.challenges[0], DATA).unwrap();
        assert!(proof.branch.is_empty());
        assert!(Verifier::new(&tree.private).verify(&proof, 0));
    }

    #[test]
    fn records_survive_json_roundtrip() {
        let tree = AuditTree::from_challenges(DATA, fixed_challenges(5));

        let public: PublicAuditRecord =
            serde_json::from_str(&serde_json::to_string(&tree.public).unwrap()).unwrap();
        let private: PrivateAuditRecord =
            serde_json::from_str(&serde_json::to_string(&tree.private).unwrap()).unwrap();
        assert_eq!(public, tree.public);
        assert_eq!(private, tree.private);
    }
}
