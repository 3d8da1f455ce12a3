//! Crate-level error type for node operations.
//!
//! Every failure a caller of the [`Node`](crate::network::node::Node)
//! façade can observe is one of these kinds. Per-module error enums
//! (key parsing, contract validation, audit arithmetic, …) convert into
//! `NodeError` at the façade boundary so application code matches on one
//! exhaustive set.
//!
//! Authentication failures are special: on the *inbound* path they are
//! logged and dropped without a reply (answering would hand attackers a
//! signature oracle); they only surface as errors when raised on the
//! outbound path, i.e. when a peer's *response* fails verification.

use thiserror::Error;

/// Errors surfaced by node operations. Never panics the node.
#[derive(Debug, Error)]
pub enum NodeError {
    /// `join()` was called on a node that is already open.
    #[error("node is already open")]
    AlreadyOpen,

    /// An operation requiring an open node was called before `join()`.
    #[error("node is not open")]
    NotOpen,

    /// Socket/HTTP-level failure, including request timeouts.
    #[error("transport error: {0}")]
    Transport(String),

    /// A signature failed to verify or could not be decoded.
    #[error("signature invalid")]
    SignatureInvalid,

    /// The message nonce is outside the acceptance window.
    #[error("nonce expired")]
    NonceExpired,

    /// The recovered public key does not hash to the claimed node ID.
    #[error("node id mismatch")]
    NodeIdMismatch,

    /// The overlay lookup returned no contact for the requested node ID.
    #[error("peer not found: {0}")]
    PeerNotFound(String),

    /// A peer's reply was malformed — missing fields, undecodable
    /// contract, wrong payload shape.
    #[error("bad response: {0}")]
    BadResponse(String),

    /// The counterparty refused the operation or returned an error object.
    #[error("contract rejected: {0}")]
    ContractRejected(String),

    /// An audit was attempted with no remaining pre-committed challenges.
    #[error("audit challenges exhausted")]
    ChallengesExhausted,

    /// Storage backend failure (sled, item files, or a missing item).
    #[error("storage error: {0}")]
    StorageError(String),
}

impl From<crate::storage::StoreError> for NodeError {
    fn from(err: crate::storage::StoreError) -> Self {
        NodeError::StorageError(err.to_string())
    }
}

impl From<crate::message::auth::AuthError> for NodeError {
    fn from(err: crate::message::auth::AuthError) -> Self {
        use crate::message::auth::AuthError;
        match err {
            AuthError::NonceExpired { .. } => NodeError::NonceExpired,
            AuthError::NodeIdMismatch => NodeError::NodeIdMismatch,
            _ => NodeError::SignatureInvalid,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_stable() {
        // These strings end up in logs and RPC error objects; renaming one
        // is a wire-visible change.
        assert_eq!(NodeError::AlreadyOpen.to_string(), "node is already open");
        assert_eq!(NodeError::NonceExpired.to_string(), "nonce expired");
        assert_eq!(
            NodeError::ChallengesExhausted.to_string(),
            "audit challenges exhausted"
        );
    }

    #[test]
    fn auth_errors_map_to_distinct_kinds() {
        use crate::message::auth::AuthError;

        let e: NodeError = AuthError::NodeIdMismatch.into();
        assert!(matches!(e, NodeError::NodeIdMismatch));

        let e: NodeError = AuthError::NonceExpired { age_ms: 20_000 }.into();
        assert!(matches!(e, NodeError::NonceExpired));

        let e: NodeError = AuthError::MissingEnvelope.into();
        assert!(matches!(e, NodeError::SignatureInvalid));
    }
}
