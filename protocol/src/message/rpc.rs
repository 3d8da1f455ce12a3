//! # JSON-RPC Envelope & Method Schemas
//!
//! Type-safe definitions for the peer RPC protocol. The wire format is
//! JSON-RPC 2.0 over HTTP; every request and response additionally carries
//! the signed-envelope fields (`__nonce`, `__signature`) inside its
//! `params` or `result` object — those are attached and stripped by the
//! [auth hooks](crate::message::auth), so the typed schemas here never see
//! them.
//!
//! ## Method Index
//!
//! | Method     | Direction       | Params                                   | Result          |
//! |------------|-----------------|------------------------------------------|-----------------|
//! | `PING`     | any → any       | `{contact}`                              | `{}`            |
//! | `OFFER`    | farmer → renter | `{contract, contact}`                    | `{contract}`    |
//! | `CONSIGN`  | renter → farmer | `{data_hash, data_shard, tree, contact}` | `{token}`       |
//! | `RETRIEVE` | client → farmer | `{data_hash, contact}`                   | `{data_shard}`  |
//! | `AUDIT`    | renter → farmer | `{data_hash, challenge, contact}`        | `{proof}`       |
//! | `PUBLISH`  | any → any       | `{topic, payload, ttl, contact}`         | `{}`            |
//!
//! Params structs use `deny_unknown_fields`: once the reserved envelope
//! fields are stripped, anything else unexpected in a body is a schema
//! violation, not data.

use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::audit::{AuditProof, PublicAuditRecord};
use crate::contact::Contact;
use crate::contract::Contract;
use crate::identity::NodeId;

// ---------------------------------------------------------------------------
// RPC Method Enumeration
// ---------------------------------------------------------------------------

/// Supported RPC methods. The string representation (e.g. `"OFFER"`) is
/// the wire form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RpcMethod {
    /// Liveness check and contact exchange.
    #[serde(rename = "PING")]
    Ping,
    /// A farmer offers to store the shard described by a published contract.
    #[serde(rename = "OFFER")]
    Offer,
    /// The renter delivers shard bytes and the public audit record.
    #[serde(rename = "CONSIGN")]
    Consign,
    /// Fetch shard bytes back from a farmer.
    #[serde(rename = "RETRIEVE")]
    Retrieve,
    /// Challenge a farmer to prove continued possession.
    #[serde(rename = "AUDIT")]
    Audit,
    /// One hop of the pub/sub relay carrying a published contract.
    #[serde(rename = "PUBLISH")]
    Publish,
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// A JSON-RPC 2.0 request.
///
/// `params` stays an opaque JSON value at this layer — the auth hook
/// strips the reserved fields, then the dispatcher decodes the typed
/// schema for the method.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    /// JSON-RPC version. Always "2.0".
    pub jsonrpc: String,
    /// Request identifier; part of the signed target (`id‖nonce`).
    pub id: String,
    /// The method to invoke.
    pub method: RpcMethod,
    /// Method-specific parameters plus the reserved envelope fields.
    pub params: serde_json::Value,
}

impl RpcRequest {
    /// Create a request with a fresh random id.
    pub fn new(method: RpcMethod, params: serde_json::Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: random_id(),
            method,
            params,
        }
    }
}

/// A JSON-RPC 2.0 response. Exactly one of `result` / `error` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    /// JSON-RPC version. Always "2.0".
    pub jsonrpc: String,
    /// Echoes the request id; part of the signed target.
    pub id: String,
    /// The successful result, carrying the reserved envelope fields.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// The error, if the method failed. Error replies are not signed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    /// Creates a successful response.
    pub fn success(id: impl Into<String>, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: id.into(),
            result: Some(result),
            error: None,
        }
    }

    /// Creates an error response.
    pub fn failure(id: impl Into<String>, error: RpcError) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: id.into(),
            result: None,
            error: Some(error),
        }
    }
}

/// Sixteen hex characters of request id. Uniqueness only has to hold
/// across a node's in-flight requests, and 64 bits is plenty for that.
fn random_id() -> String {
    let mut bytes = [0u8; 8];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

// ---------------------------------------------------------------------------
// RPC Errors
// ---------------------------------------------------------------------------

/// JSON-RPC 2.0 error object.
///
/// Standard codes follow the specification (`-32700` parse error through
/// `-32603` internal error); application failures use the `-32000` range.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcError {
    /// Numeric error code.
    pub code: i32,
    /// Human-readable error message.
    pub message: String,
}

impl RpcError {
    /// Invalid method parameters (schema violation after envelope strip).
    pub fn invalid_params(msg: impl Into<String>) -> Self {
        Self {
            code: -32602,
            message: msg.into(),
        }
    }

    /// Internal server error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self {
            code: -32603,
            message: msg.into(),
        }
    }

    /// The peer refuses the contract operation.
    pub fn rejected(msg: impl Into<String>) -> Self {
        Self {
            code: -32000,
            message: msg.into(),
        }
    }

    /// The requested shard is not held by this peer.
    pub fn shard_not_found(hash: &NodeId) -> Self {
        Self {
            code: -32001,
            message: format!("shard not found: {hash}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Typed Method Schemas
// ---------------------------------------------------------------------------

/// Params for `PING`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PingParams {
    /// The sender's own contact, so the receiver can record it.
    pub contact: Contact,
}

/// Params for `OFFER`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OfferParams {
    /// The contract, now countersigned by the offering farmer.
    pub contract: Contract,
    /// The farmer's contact.
    pub contact: Contact,
}

/// Result for `OFFER`: the contract carrying both signatures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfferResult {
    /// The fully signed contract.
    pub contract: Contract,
}

/// Params for `CONSIGN`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConsignParams {
    /// Content address of the shard being consigned.
    pub data_hash: NodeId,
    /// Hex-encoded shard bytes.
    pub data_shard: String,
    /// The public half of the audit tree the farmer must retain.
    pub tree: PublicAuditRecord,
    /// The renter's contact.
    pub contact: Contact,
}

/// Result for `CONSIGN`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsignResult {
    /// Opaque consignment token acknowledging receipt.
    pub token: String,
}

/// Params for `RETRIEVE`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetrieveParams {
    /// Content address of the shard to fetch.
    pub data_hash: NodeId,
    /// The requester's contact.
    pub contact: Contact,
}

/// Result for `RETRIEVE`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrieveResult {
    /// Hex-encoded shard bytes.
    pub data_shard: String,
}

/// Params for `AUDIT`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuditParams {
    /// Content address of the shard under audit.
    pub data_hash: NodeId,
    /// Hex-encoded pre-committed challenge being revealed.
    pub challenge: String,
    /// The auditing renter's contact.
    pub contact: Contact,
}

/// Result for `AUDIT`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditResult {
    /// The Merkle possession proof for the revealed challenge.
    pub proof: AuditProof,
}

/// Params for `PUBLISH` — one relay hop of a published contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PublishParams {
    /// Topic identifier (the contract type tag).
    pub topic: String,
    /// The published payload (a contract in canonical object form).
    pub payload: serde_json::Value,
    /// Remaining hops before the relay drops this publication.
    pub ttl: u8,
    /// The forwarding peer's contact.
    pub contact: Contact,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Identity;

    fn contact() -> Contact {
        Contact::new("127.0.0.1", 4000, Identity::generate().node_id())
    }

    #[test]
    fn methods_serialize_as_uppercase_tags() {
        for (method, tag) in [
            (RpcMethod::Ping, "\"PING\""),
            (RpcMethod::Offer, "\"OFFER\""),
            (RpcMethod::Consign, "\"CONSIGN\""),
            (RpcMethod::Retrieve, "\"RETRIEVE\""),
            (RpcMethod::Audit, "\"AUDIT\""),
            (RpcMethod::Publish, "\"PUBLISH\""),
        ] {
            assert_eq!(serde_json::to_string(&method).unwrap(), tag);
            let back: RpcMethod = serde_json::from_str(tag).unwrap();
            assert_eq!(back, method);
        }
    }

    #[test]
    fn request_ids_are_unique_hex() {
        let a = RpcRequest::new(RpcMethod::Ping, serde_json::json!({}));
        let b = RpcRequest::new(RpcMethod::Ping, serde_json::json!({}));
        assert_eq!(a.id.len(), 16);
        assert_ne!(a.id, b.id);
        assert!(a.id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn response_constructors() {
        let ok = RpcResponse::success("abc", serde_json::json!({"token": "t"}));
        assert!(ok.result.is_some());
        assert!(ok.error.is_none());

        let err = RpcResponse::failure("abc", RpcError::rejected("nope"));
        assert!(err.result.is_none());
        assert_eq!(err.error.unwrap().code, -32000);
    }

    #[test]
    fn ping_params_reject_unknown_fields() {
        // After the auth hook strips the reserved fields, nothing else
        // unexpected may remain.
        let value = serde_json::json!({
            "contact": contact(),
            "surprise": true,
        });
        assert!(serde_json::from_value::<PingParams>(value).is_err());
    }

    #[test]
    fn retrieve_params_roundtrip() {
        let params = RetrieveParams {
            data_hash: NodeId::from_content(b"shard"),
            contact: contact(),
        };
        let value = serde_json::to_value(&params).unwrap();
        let back: RetrieveParams = serde_json::from_value(value).unwrap();
        assert_eq!(back.data_hash, params.data_hash);
    }
}
