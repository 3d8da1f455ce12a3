//! # Message Authentication Hooks
//!
//! Two hooks wrap every RPC round trip:
//!
//! - **Outbound (sign)** — mint `nonce = unix_millis_now()`, sign the
//!   UTF-8 target `msg.id ‖ decimal(nonce)` through the magic-hash, and
//!   attach `__nonce` / `__signature` to the body (`params` for requests,
//!   `result` for responses — requests and responses are signed
//!   identically and symmetrically).
//! - **Inbound (verify)** — strip the reserved fields, reject stale
//!   nonces, reconstruct the target, recover the public key from the
//!   compact signature, and require that its hash equals the sender
//!   contact's node ID.
//!
//! On the inbound path a failure means the message is *dropped*, never
//! answered — an error reply would be a signature oracle. The drop is
//! counted so operators can see it happening.
//!
//! Replay within the nonce window is not suppressed at this layer. That is
//! a known v1 limitation; a per-peer nonce high-watermark is the upgrade
//! path if it ever matters in practice.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::config;
use crate::contact::{unix_millis, Contact, ContactBook};
use crate::crypto::keys::{self, CompactSignature};
use crate::identity::{Identity, NodeId};
use crate::message::rpc::{RpcRequest, RpcResponse};

/// Authentication failures. These never travel on the wire — inbound
/// failures are logged and swallowed; only response-verification failures
/// surface to the local caller.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The body is not a JSON object, so there is nowhere for the
    /// envelope fields to live.
    #[error("message body is not an object")]
    NotAnObject,

    /// One or both reserved envelope fields are missing or mistyped.
    #[error("missing or malformed envelope fields")]
    MissingEnvelope,

    /// The nonce is older than the acceptance window.
    #[error("nonce expired ({age_ms}ms old)")]
    NonceExpired {
        /// How far outside the window the nonce was.
        age_ms: u64,
    },

    /// The signature failed to decode or verify.
    #[error("signature verification failed")]
    SignatureInvalid,

    /// The signature verifies, but the recovered key does not hash to the
    /// claimed node ID.
    #[error("recovered key does not match claimed node id")]
    NodeIdMismatch,
}

/// The sign/verify hook pair, shared by the node façade, the overlay, and
/// the topic relay. Cheap to clone via `Arc`.
pub struct MessageAuth {
    identity: Identity,
    book: Arc<ContactBook>,
    failures: AtomicU64,
}

impl MessageAuth {
    /// Build the hooks around a signing identity and the shared contact
    /// book (whose pubkey cache this layer populates).
    pub fn new(identity: Identity, book: Arc<ContactBook>) -> Self {
        Self {
            identity,
            book,
            failures: AtomicU64::new(0),
        }
    }

    /// The identity these hooks sign with.
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// How many inbound messages have been dropped for failing
    /// authentication. Exported as the `auth_failures` metric.
    pub fn failure_count(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    // -- Outbound -----------------------------------------------------------

    /// Sign an outbound request: attach `__nonce` and `__signature` to its
    /// params object.
    pub fn sign_request(&self, request: &mut RpcRequest) {
        let id = request.id.clone();
        Self::attach(&self.identity, &id, &mut request.params);
    }

    /// Sign an outbound response. Error replies carry no result object and
    /// are left unsigned.
    pub fn sign_response(&self, response: &mut RpcResponse) {
        let id = response.id.clone();
        if let Some(result) = response.result.as_mut() {
            Self::attach(&self.identity, &id, result);
        }
    }

    fn attach(identity: &Identity, id: &str, body: &mut serde_json::Value) {
        let nonce = unix_millis();
        let target = format!("{id}{nonce}");
        let signature = identity.sign(target.as_bytes());

        let obj = match body.as_object_mut() {
            Some(obj) => obj,
            // Bodies are always objects by construction; a non-object here
            // is a local programming error, not peer input.
            None => {
                debug_assert!(false, "signing a non-object body");
                return;
            }
        };
        obj.insert(config::NONCE_FIELD.into(), serde_json::json!(nonce));
        obj.insert(
            config::SIGNATURE_FIELD.into(),
            serde_json::json!(signature.to_base64()),
        );
    }

    // -- Inbound ------------------------------------------------------------

    /// Verify an inbound request against the claimed sender contact,
    /// stripping the reserved fields from `params` so the typed schema
    /// decode that follows sees a clean body.
    pub fn verify_request(
        &self,
        sender: &Contact,
        request: &mut RpcRequest,
    ) -> Result<(), AuthError> {
        let id = request.id.clone();
        self.verify_body(&sender.node_id, &id, &mut request.params)
    }

    /// Verify an inbound response from the contact the request was sent
    /// to. Responses carrying an error object are not signed; callers
    /// handle the error body before verification.
    pub fn verify_response(
        &self,
        responder: &Contact,
        response: &mut RpcResponse,
    ) -> Result<(), AuthError> {
        let id = response.id.clone();
        let result = response.result.as_mut().ok_or(AuthError::MissingEnvelope)?;
        self.verify_body(&responder.node_id, &id, result)
    }

    fn verify_body(
        &self,
        claimed: &NodeId,
        id: &str,
        body: &mut serde_json::Value,
    ) -> Result<(), AuthError> {
        let outcome = Self::check_body(&self.book, claimed, id, body);
        if let Err(err) = &outcome {
            self.failures.fetch_add(1, Ordering::Relaxed);
            debug!(node_id = %claimed, error = %err, "dropping unauthenticated message");
        }
        outcome
    }

    fn check_body(
        book: &ContactBook,
        claimed: &NodeId,
        id: &str,
        body: &mut serde_json::Value,
    ) -> Result<(), AuthError> {
        let obj = body.as_object_mut().ok_or(AuthError::NotAnObject)?;

        let nonce = obj
            .remove(config::NONCE_FIELD)
            .and_then(|v| v.as_u64())
            .ok_or(AuthError::MissingEnvelope)?;
        let sig_b64 = obj
            .remove(config::SIGNATURE_FIELD)
            .and_then(|v| v.as_str().map(str::to_owned))
            .ok_or(AuthError::MissingEnvelope)?;

        let now = unix_millis();
        if now > nonce.saturating_add(config::NONCE_EXPIRE_MS) {
            return Err(AuthError::NonceExpired {
                age_ms: now - nonce,
            });
        }

        let signature =
            CompactSignature::from_base64(&sig_b64).map_err(|_| AuthError::SignatureInvalid)?;
        let target = format!("{id}{nonce}");

        // Fast path: a cached key skips ECDSA recovery. The derived node
        // ID is re-checked on every use — the cache is never authoritative.
        if let Some(key) = book.cached_pubkey(claimed) {
            if NodeId::from_public_key(&key.serialize()) == *claimed
                && keys::verify_with_key(target.as_bytes(), &signature, &key)
            {
                return Ok(());
            }
        }

        // Slow path: recover the key from the signature itself.
        let recovered = keys::recover_public_key(target.as_bytes(), &signature)
            .map_err(|_| AuthError::SignatureInvalid)?;
        if NodeId::from_public_key(&recovered.serialize()) != *claimed {
            return Err(AuthError::NodeIdMismatch);
        }

        book.cache_pubkey(*claimed, recovered);
        Ok(())
    }
}
