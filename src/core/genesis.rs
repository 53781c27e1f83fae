//! Deterministic genesis block
//!
//! Every node materialises the same genesis: a fixed timestamp, a single
//! coinbase minting the initial supply to a well-known address, and no
//! proof-of-work (nonce 0, difficulty 1).

use crate::core::block::Block;
use crate::core::transaction::Transaction;
use chrono::{DateTime, Utc};

/// Address credited with the initial supply
pub const GENESIS_ADDRESS: &str = "04f8a1c2d3e4f5a6b7c8d9e0f1a2b3c4d5e6f7a8b9c0d1e2f3a4b5c6d7e8f9a0b1c2d3e4f5a6b7c8d9e0f1a2b3c4d5e6f7a8b9c0d1e2f3a4b5c6d7e8f9";

/// Initial supply minted by the genesis coinbase
pub const GENESIS_SUPPLY: u64 = 1_000_000;

/// Genesis timestamp: 2020-01-01T00:00:00Z
pub const GENESIS_TIMESTAMP: i64 = 1_577_836_800;

/// Build the genesis block
pub fn genesis_block() -> Block {
    let timestamp: DateTime<Utc> = DateTime::from_timestamp(GENESIS_TIMESTAMP, 0)
        .expect("genesis timestamp is a valid instant");

    let coinbase = Transaction::coinbase_at(GENESIS_ADDRESS, GENESIS_SUPPLY, timestamp);

    let mut genesis = Block {
        index: 0,
        timestamp,
        transactions: vec![coinbase],
        nonce: 0,
        previous_hash: "0".to_string(),
        merkle_root: String::new(),
        hash: String::new(),
        difficulty: 1,
    };
    genesis.merkle_root = genesis.compute_merkle_root();
    genesis.hash = genesis.compute_hash();
    genesis
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_genesis_is_deterministic() {
        let a = genesis_block();
        let b = genesis_block();
        assert_eq!(a.hash, b.hash);
        assert_eq!(a.transactions[0].id, b.transactions[0].id);
    }

    #[test]
    fn test_genesis_shape() {
        let genesis = genesis_block();
        assert_eq!(genesis.index, 0);
        assert_eq!(genesis.previous_hash, "0");
        assert_eq!(genesis.difficulty, 1);
        assert_eq!(genesis.nonce, 0);
        assert_eq!(genesis.transactions.len(), 1);

        let coinbase = &genesis.transactions[0];
        assert!(coinbase.is_coinbase());
        assert_eq!(coinbase.to, GENESIS_ADDRESS);
        assert_eq!(coinbase.amount, GENESIS_SUPPLY);
    }

    #[test]
    fn test_genesis_validates() {
        assert!(genesis_block().validate().is_ok());
    }
}
