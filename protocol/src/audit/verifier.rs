//! Proof verification: the renter's half of an audit round.
//!
//! The verifier needs only the Merkle root and depth from the private
//! record — it never touches the shard, the leaves, or the farmer's
//! state. A proof is valid iff its branch has exactly `depth` siblings,
//! its leaf index matches the challenge that was revealed, and folding
//! the branch reproduces the root.

use super::{fold_branch, AuditProof, PrivateAuditRecord};
use crate::crypto::hash::hash160;
use crate::identity::NodeId;

/// Checks farmer possession proofs against a pre-committed root.
#[derive(Debug, Clone, Copy)]
pub struct Verifier {
    root: NodeId,
    depth: u32,
}

impl Verifier {
    /// Build a verifier from the renter's private record.
    pub fn new(record: &PrivateAuditRecord) -> Self {
        Self {
            root: record.root,
            depth: record.depth,
        }
    }

    /// Verify a proof for the challenge that was revealed at
    /// `expected_index`.
    pub fn verify(&self, proof: &AuditProof, expected_index: u32) -> bool {
        if proof.branch.len() != self.depth as usize {
            return false;
        }
        if proof.leaf_index != expected_index {
            return false;
        }
        if u64::from(proof.leaf_index) >= 1u64 << self.depth {
            return false;
        }

        let leaf = NodeId::from_bytes(hash160(proof.response.as_bytes()));
        fold_branch(&leaf, proof.leaf_index, &proof.branch) == self.root
    }
}
