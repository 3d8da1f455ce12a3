//! Networking: the external seams and the protocol built on them.
//!
//! Three traits — [`Overlay`], [`Topics`], [`Transport`] — are the
//! boundaries to the DHT routing layer, the pub/sub layer, and the RPC
//! wire. The contract-negotiation protocol and the [`node::Node`] façade
//! are written entirely against those seams, which is what lets the
//! integration tests run a whole cluster inside one process
//! ([`memory::MemoryGrid`]) while the binary wires up HTTP
//! ([`http::HttpTransport`]), a contact-table overlay
//! ([`overlay::StaticOverlay`]), and the gossip relay
//! ([`topics::GossipTopics`]).

pub mod http;
pub mod memory;
pub mod node;
pub mod overlay;
pub mod protocol;
pub mod topics;

pub use overlay::{NetError, Overlay, RpcHandler, Topics, Transport};
