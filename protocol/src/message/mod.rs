//! The signed JSON-RPC message layer.
//!
//! [`rpc`] defines the wire envelope and the typed schema for each method;
//! [`auth`] is the pair of hooks that signs every outbound body and
//! verifies every inbound one. The two are deliberately separate: the
//! envelope knows nothing about keys, and the auth hooks treat the body as
//! an opaque JSON object with two reserved fields.

pub mod auth;
pub mod rpc;

pub use auth::{AuthError, MessageAuth};
pub use rpc::{RpcError, RpcMethod, RpcRequest, RpcResponse};
