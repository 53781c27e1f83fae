//! Peer-to-peer gossip networking
//!
//! Transactions and blocks propagate through a best-effort flood over
//! TCP, framed as newline-delimited JSON.

pub mod message;
pub mod node;
pub mod peer;

pub use message::Message;
pub use node::{Node, NodeError, READ_IDLE_TIMEOUT};
pub use peer::{Peer, PeerError};
