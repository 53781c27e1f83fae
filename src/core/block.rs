//! Block implementation for the blockchain
//!
//! A block links to its predecessor through `previous_hash`, commits to
//! its transactions through a merkle root, and proves work through a
//! hash with a required number of leading zero hex characters.

use crate::core::transaction::{Transaction, TransactionError};
use crate::crypto::{build_merkle_root, sha256_hex};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Block-related errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum BlockError {
    #[error("genesis block must have previous hash of '0'")]
    BadGenesisLink,
    #[error("block hash is empty")]
    EmptyHash,
    #[error("block hash is invalid")]
    HashMismatch,
    #[error("merkle root mismatch")]
    MerkleRootMismatch,
    #[error("transaction {0} invalid: {1}")]
    InvalidTransaction(usize, TransactionError),
}

/// A block in the chain
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Block {
    /// Block height, starting at 0 for genesis
    pub index: u64,
    /// Block creation time
    pub timestamp: DateTime<Utc>,
    /// Transactions in this block; the first one is the coinbase
    pub transactions: Vec<Transaction>,
    /// Proof-of-work nonce
    pub nonce: u64,
    /// Hash of the previous block (the literal "0" for genesis)
    pub previous_hash: String,
    /// Merkle root over the transaction IDs
    pub merkle_root: String,
    /// Current block hash
    pub hash: String,
    /// Required count of leading '0' hex characters in the hash
    pub difficulty: usize,
}

impl Block {
    /// Create a new unmined block. The merkle root is computed here;
    /// `hash` stays empty until the nonce search sets it.
    pub fn new(
        index: u64,
        transactions: Vec<Transaction>,
        previous_hash: String,
        difficulty: usize,
    ) -> Self {
        let mut block = Self {
            index,
            timestamp: Utc::now(),
            transactions,
            nonce: 0,
            previous_hash,
            merkle_root: String::new(),
            hash: String::new(),
            difficulty,
        };
        block.merkle_root = block.compute_merkle_root();
        block
    }

    /// Compute the block hash: SHA-256 over index, timestamp, merkle
    /// root, previous hash, nonce, and difficulty
    pub fn compute_hash(&self) -> String {
        let data = format!(
            "{}{}{}{}{}{}",
            self.index,
            self.timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true),
            self.merkle_root,
            self.previous_hash,
            self.nonce,
            self.difficulty,
        );
        sha256_hex(data.as_bytes())
    }

    /// Compute and set the block hash
    pub fn set_hash(&mut self) {
        self.hash = self.compute_hash();
    }

    /// Compute the merkle root over the transaction IDs in order.
    /// An empty transaction list yields the empty string.
    pub fn compute_merkle_root(&self) -> String {
        let tx_ids: Vec<String> = self.transactions.iter().map(|tx| tx.id.clone()).collect();
        build_merkle_root(&tx_ids)
    }

    /// Validate block structure: genesis linkage, hash integrity,
    /// merkle commitment, and every transaction individually
    pub fn validate(&self) -> Result<(), BlockError> {
        if self.index == 0 && self.previous_hash != "0" {
            return Err(BlockError::BadGenesisLink);
        }

        if self.hash.is_empty() {
            return Err(BlockError::EmptyHash);
        }

        if self.hash != self.compute_hash() {
            return Err(BlockError::HashMismatch);
        }

        if self.merkle_root != self.compute_merkle_root() {
            return Err(BlockError::MerkleRootMismatch);
        }

        for (i, tx) in self.transactions.iter().enumerate() {
            tx.validate()
                .map_err(|e| BlockError::InvalidTransaction(i, e))?;
        }

        Ok(())
    }

    /// Whether the block hash has the required leading-zero prefix
    pub fn has_valid_proof_of_work(&self) -> bool {
        self.hash.len() >= self.difficulty
            && self.hash.chars().take(self.difficulty).all(|c| c == '0')
    }

    /// Find a transaction in this block by its ID
    pub fn transaction_by_id(&self, tx_id: &str) -> Option<&Transaction> {
        self.transactions.iter().find(|tx| tx.id == tx_id)
    }

    /// Sum of the non-coinbase fees in this block
    pub fn total_fees(&self) -> u64 {
        self.transactions
            .iter()
            .filter(|tx| !tx.is_coinbase())
            .map(|tx| tx.fee)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mined_block(index: u64, transactions: Vec<Transaction>, previous_hash: &str) -> Block {
        let mut block = Block::new(index, transactions, previous_hash.to_string(), 1);
        loop {
            block.set_hash();
            if block.has_valid_proof_of_work() {
                return block;
            }
            block.nonce += 1;
        }
    }

    #[test]
    fn test_block_validates_after_mining() {
        let coinbase = Transaction::coinbase("miner", 50);
        let block = mined_block(1, vec![coinbase], "abc");

        assert!(block.validate().is_ok());
        assert!(block.has_valid_proof_of_work());
    }

    #[test]
    fn test_empty_block_has_empty_merkle_root() {
        let block = Block::new(1, vec![], "abc".to_string(), 1);
        assert_eq!(block.merkle_root, "");
    }

    #[test]
    fn test_single_transaction_merkle_root_is_its_id() {
        let coinbase = Transaction::coinbase("miner", 50);
        let id = coinbase.id.clone();
        let block = Block::new(1, vec![coinbase], "abc".to_string(), 1);
        assert_eq!(block.merkle_root, id);
    }

    #[test]
    fn test_genesis_link_enforced() {
        let coinbase = Transaction::coinbase("miner", 50);
        let block = mined_block(0, vec![coinbase], "not-zero");
        assert_eq!(block.validate(), Err(BlockError::BadGenesisLink));
    }

    #[test]
    fn test_tampered_nonce_detected() {
        let block = mined_block(1, vec![Transaction::coinbase("miner", 50)], "abc");
        let mut tampered = block.clone();
        tampered.nonce += 1;
        assert_eq!(tampered.validate(), Err(BlockError::HashMismatch));
    }

    #[test]
    fn test_tampered_transaction_breaks_merkle_root() {
        let mut block = mined_block(1, vec![Transaction::coinbase("miner", 50)], "abc");
        block.transactions[0] = Transaction::coinbase("thief", 50);
        assert_eq!(block.validate(), Err(BlockError::MerkleRootMismatch));
    }

    #[test]
    fn test_total_fees_skips_coinbase() {
        let mut coinbase = Transaction::coinbase("miner", 60);
        coinbase.fee = 45; // junk fee on a coinbase is ignored
        coinbase.id = coinbase.hash();

        let mut tx = Transaction::new("sender", "recipient", 10, 7);
        tx.set_signature("aabb");

        let block = Block::new(1, vec![coinbase, tx], "abc".to_string(), 1);
        assert_eq!(block.total_fees(), 7);
    }

    #[test]
    fn test_json_round_trip() {
        let block = mined_block(1, vec![Transaction::coinbase("miner", 50)], "abc");
        let json = serde_json::to_vec(&block).unwrap();
        let decoded: Block = serde_json::from_slice(&json).unwrap();
        assert_eq!(decoded, block);
        assert!(decoded.validate().is_ok());
    }
}
