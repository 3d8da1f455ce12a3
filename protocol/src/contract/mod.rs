//! # Storage Contracts
//!
//! A [`Contract`] is the agreement between a renter and a farmer about one
//! shard: who the parties are, what is stored, for how long, how many
//! audits are pre-committed, and where payment should land.
//!
//! ## Signing model
//!
//! The signing payload is the contract's canonical JSON form with both
//! signature fields stripped. The lifecycle is:
//!
//! 1. The renter builds the contract with the farmer half unset and
//!    publishes it on the contract topic — unsigned, because the farmer
//!    will still mutate it.
//! 2. A farmer fills in `farmer_id` and `payment_destination`, signs as
//!    `Role::Farmer`, and sends the contract in an OFFER.
//! 3. The renter verifies the farmer's signature, countersigns as
//!    `Role::Renter`, and returns the completed contract in the OFFER
//!    response.
//!
//! Both signatures cover the same payload because neither signature is
//! part of it. Once both roles have signed, the two node-ID fields are
//! sealed — mutating either fails with [`ContractError::Sealed`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crypto::keys::{self, CompactSignature};
use crate::identity::{Identity, NodeId};

/// Which side of the contract is acting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// The peer paying for storage.
    Renter,
    /// The peer providing storage.
    Farmer,
}

/// Errors from contract validation and signing.
#[derive(Debug, Error)]
pub enum ContractError {
    /// The contract carries no signature for the requested role.
    #[error("missing {0:?} signature")]
    MissingSignature(Role),

    /// The contract carries no node ID for the requested role.
    #[error("missing {0:?} node id")]
    MissingRoleId(Role),

    /// The stored role ID does not match the expected node ID.
    #[error("contract {0:?} id does not match expected node id")]
    IdMismatch(Role),

    /// The signature failed to decode or the recovered key does not hash
    /// to the role's node ID.
    #[error("{0:?} signature verification failed")]
    SignatureInvalid(Role),

    /// Both roles have signed; the party fields are immutable now.
    #[error("contract is sealed: both parties have signed")]
    Sealed,
}

/// A two-party shard storage contract.
///
/// Serializes to the canonical object form used both on the wire (inside
/// OFFER params and topic publications) and in persisted storage items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contract {
    /// The renter's node ID. Set at construction.
    pub renter_id: Option<NodeId>,
    /// Base64 compact signature by the renter over the signing payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub renter_signature: Option<String>,
    /// The farmer's node ID. Set when a farmer claims the contract.
    pub farmer_id: Option<NodeId>,
    /// Base64 compact signature by the farmer over the signing payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub farmer_signature: Option<String>,
    /// Content address of the shard under contract.
    pub data_hash: NodeId,
    /// Shard size in bytes.
    pub data_size: u64,
    /// Storage window start, unix milliseconds.
    pub store_begin: u64,
    /// Storage window end, unix milliseconds.
    pub store_end: u64,
    /// Number of pre-committed audit challenges.
    pub audit_count: u32,
    /// Where settlement for this contract should land (the farmer's
    /// payment address).
    pub payment_destination: Option<String>,
}

impl Contract {
    /// Topic identifier published contracts travel under.
    pub const TYPE_TAG: &'static str = "contract.v1";

    /// Build a fresh renter-side contract with the farmer half unset.
    pub fn new(
        renter_id: NodeId,
        data_hash: NodeId,
        data_size: u64,
        store_begin: u64,
        store_end: u64,
        audit_count: u32,
    ) -> Self {
        Self {
            renter_id: Some(renter_id),
            renter_signature: None,
            farmer_id: None,
            farmer_signature: None,
            data_hash,
            data_size,
            store_begin,
            store_end,
            audit_count,
            payment_destination: None,
        }
    }

    /// The pub/sub topic this contract type is negotiated on.
    pub fn type_tag(&self) -> &'static str {
        Self::TYPE_TAG
    }

    /// Whether both roles have signed.
    pub fn is_complete(&self) -> bool {
        self.renter_signature.is_some() && self.farmer_signature.is_some()
    }

    /// Claim the farmer side of this contract.
    ///
    /// Fails once both parties have signed — the node-ID fields are
    /// immutable from that point.
    pub fn set_farmer(&mut self, farmer_id: NodeId) -> Result<(), ContractError> {
        if self.is_complete() {
            return Err(ContractError::Sealed);
        }
        self.farmer_id = Some(farmer_id);
        Ok(())
    }

    /// Replace the renter ID. Same sealing rule as [`set_farmer`](Self::set_farmer).
    pub fn set_renter(&mut self, renter_id: NodeId) -> Result<(), ContractError> {
        if self.is_complete() {
            return Err(ContractError::Sealed);
        }
        self.renter_id = Some(renter_id);
        Ok(())
    }

    /// Set the payment destination (the farmer's address).
    pub fn set_payment_destination(&mut self, address: impl Into<String>) {
        self.payment_destination = Some(address.into());
    }

    /// Sign the canonical payload as the given role.
    pub fn sign(&mut self, role: Role, identity: &Identity) {
        let payload = self.signing_payload();
        let signature = identity.sign(&payload).to_base64();
        match role {
            Role::Renter => self.renter_signature = Some(signature),
            Role::Farmer => self.farmer_signature = Some(signature),
        }
    }

    /// Verify the given role's signature and that it binds to `expected`.
    ///
    /// Three checks: the stored role ID equals `expected`, a signature is
    /// present, and the key recovered from it hashes to `expected`.
    pub fn verify(&self, role: Role, expected: &NodeId) -> Result<(), ContractError> {
        let (role_id, signature) = match role {
            Role::Renter => (self.renter_id, self.renter_signature.as_deref()),
            Role::Farmer => (self.farmer_id, self.farmer_signature.as_deref()),
        };

        let role_id = role_id.ok_or(ContractError::MissingRoleId(role))?;
        if role_id != *expected {
            return Err(ContractError::IdMismatch(role));
        }

        let signature = signature.ok_or(ContractError::MissingSignature(role))?;
        let signature = CompactSignature::from_base64(signature)
            .map_err(|_| ContractError::SignatureInvalid(role))?;

        let payload = self.signing_payload();
        let recovered = keys::recover_public_key(&payload, &signature)
            .map_err(|_| ContractError::SignatureInvalid(role))?;
        if NodeId::from_public_key(&recovered.serialize()) != *expected {
            return Err(ContractError::SignatureInvalid(role));
        }
        Ok(())
    }

    /// Canonical object form (what travels on topics and in OFFER params).
    pub fn to_object(&self) -> serde_json::Value {
        serde_json::to_value(self).expect("contract serialization is infallible")
    }

    /// Decode the canonical object form.
    pub fn from_object(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    /// The byte string both signatures cover: the canonical JSON form with
    /// the signature fields absent. Struct field order is fixed, so this
    /// is deterministic across peers.
    fn signing_payload(&self) -> Vec<u8> {
        let mut unsigned = self.clone();
        unsigned.renter_signature = None;
        unsigned.farmer_signature = None;
        serde_json::to_vec(&unsigned).expect("contract serialization is infallible")
    }
}
