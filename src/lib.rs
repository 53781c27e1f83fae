//! Cinder: an educational proof-of-work blockchain node in Rust
//!
//! This crate provides a complete blockchain node featuring:
//! - Proof of Work consensus with adaptive difficulty
//! - ECDSA digital signatures (secp256k1)
//! - UTXO-based transaction model
//! - Merkle tree transaction commitments
//! - Fee-prioritised mempool
//! - TCP gossip overlay with newline-delimited JSON messages
//! - Pluggable block archive (sled-backed or in-memory)
//!
//! # Example
//!
//! ```no_run
//! use cinder::core::{Blockchain, UtxoSet};
//! use cinder::storage::MemoryArchive;
//! use cinder::wallet::Wallet;
//! use std::sync::Arc;
//!
//! let mut chain = Blockchain::new(Arc::new(MemoryArchive::new()));
//! let mut utxos = UtxoSet::new();
//! chain.initialize(&mut utxos).expect("chain initialises");
//!
//! let wallet = Wallet::new();
//! println!("address: {}", wallet.address());
//! println!("height: {}", chain.height());
//! ```

pub mod api;
pub mod core;
pub mod crypto;
pub mod mining;
pub mod network;
pub mod storage;
pub mod wallet;

// Re-export commonly used types
pub use crate::api::{create_router, ApiState};
pub use crate::core::{Block, Blockchain, Transaction, UtxoSet, BLOCK_REWARD};
pub use crate::crypto::KeyPair;
pub use crate::mining::{Mempool, Miner, ProofOfWork};
pub use crate::network::{Message, Node};
pub use crate::storage::{BlockArchive, MemoryArchive, SledArchive};
pub use crate::wallet::Wallet;
