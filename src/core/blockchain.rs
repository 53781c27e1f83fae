//! Blockchain implementation
//!
//! An in-memory, append-only sequence of blocks plus a height counter.
//! Durability is delegated to a [`BlockArchive`]; on startup the chain
//! is reloaded from the archive when one was persisted, otherwise the
//! deterministic genesis block is materialised. Proof-of-work checking
//! belongs to the consensus layer and must happen before `add_block`.

use crate::core::block::{Block, BlockError};
use crate::core::genesis::genesis_block;
use crate::core::transaction::Transaction;
use crate::core::utxo::{UtxoError, UtxoSet};
use crate::storage::{ArchiveError, BlockArchive};
use std::sync::Arc;
use thiserror::Error;

/// Blockchain-related errors
#[derive(Error, Debug)]
pub enum BlockchainError {
    #[error("previous hash mismatch")]
    PreviousHashMismatch,
    #[error("invalid block index: expected {expected}, got {got}")]
    InvalidIndex { expected: u64, got: u64 },
    #[error("invalid block: {0}")]
    Block(#[from] BlockError),
    #[error("block {0} missing from archive")]
    MissingBlock(u64),
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error("block decode error: {0}")]
    Codec(#[from] serde_json::Error),
    #[error(transparent)]
    Utxo(#[from] UtxoError),
}

/// The ordered chain of blocks
pub struct Blockchain {
    blocks: Vec<Block>,
    height: u64,
    archive: Arc<dyn BlockArchive>,
}

impl Blockchain {
    pub fn new(archive: Arc<dyn BlockArchive>) -> Self {
        Self {
            blocks: Vec::new(),
            height: 0,
            archive,
        }
    }

    /// Load the chain from the archive when a persisted height exists,
    /// otherwise materialise and persist genesis. Either way the UTXO
    /// set is rebuilt from the resulting chain.
    pub fn initialize(&mut self, utxos: &mut UtxoSet) -> Result<(), BlockchainError> {
        match self.archive.height()? {
            Some(persisted) => {
                for index in 0..=persisted {
                    let data = self
                        .archive
                        .block(index)?
                        .ok_or(BlockchainError::MissingBlock(index))?;
                    let block: Block = serde_json::from_slice(&data)?;
                    self.blocks.push(block);
                }
                self.height = persisted;
            }
            None => {
                let genesis = genesis_block();
                let data = serde_json::to_vec(&genesis)?;
                self.archive.save_block(genesis.index, &genesis.hash, &data)?;
                self.blocks.push(genesis);
                self.height = 0;
            }
        }

        utxos.rebuild(&self.blocks)?;
        Ok(())
    }

    /// Check that a block extends the current tip, then run its
    /// self-validation
    pub fn validate_block(&self, block: &Block) -> Result<(), BlockchainError> {
        if let Some(tip) = self.latest_block() {
            if block.previous_hash != tip.hash {
                return Err(BlockchainError::PreviousHashMismatch);
            }
            if block.index != self.height + 1 {
                return Err(BlockchainError::InvalidIndex {
                    expected: self.height + 1,
                    got: block.index,
                });
            }
        }

        block.validate()?;
        Ok(())
    }

    /// Validate a block against the tip and append it. The block is
    /// then handed to the archive; an archive failure is surfaced to
    /// the caller while the block remains part of the in-memory chain.
    pub fn add_block(&mut self, block: Block) -> Result<(), BlockchainError> {
        self.validate_block(&block)?;

        let data = serde_json::to_vec(&block)?;
        let index = block.index;
        let hash = block.hash.clone();

        self.blocks.push(block);
        self.height += 1;

        self.archive.save_block(index, &hash, &data)?;
        Ok(())
    }

    pub fn height(&self) -> u64 {
        self.height
    }

    pub fn latest_block(&self) -> Option<&Block> {
        self.blocks.last()
    }

    pub fn block(&self, index: u64) -> Option<&Block> {
        self.blocks.get(index as usize)
    }

    pub fn block_by_hash(&self, hash: &str) -> Option<&Block> {
        self.blocks.iter().find(|b| b.hash == hash)
    }

    /// A slice of at most `limit` blocks starting at height `start`
    pub fn blocks(&self, start: u64, limit: u64) -> &[Block] {
        let start = (start as usize).min(self.blocks.len());
        let end = (start + limit as usize).min(self.blocks.len());
        &self.blocks[start..end]
    }

    /// All blocks in height order
    pub fn all_blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Search the whole chain for a confirmed transaction
    pub fn find_transaction(&self, tx_id: &str) -> Option<(&Block, &Transaction)> {
        self.blocks
            .iter()
            .find_map(|block| block.transaction_by_id(tx_id).map(|tx| (block, tx)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::genesis::{GENESIS_ADDRESS, GENESIS_SUPPLY};
    use crate::storage::MemoryArchive;

    fn fresh_chain() -> (Blockchain, UtxoSet) {
        let archive = Arc::new(MemoryArchive::new());
        let mut chain = Blockchain::new(archive);
        let mut utxos = UtxoSet::new();
        chain.initialize(&mut utxos).unwrap();
        (chain, utxos)
    }

    fn mined_next_block(chain: &Blockchain, transactions: Vec<Transaction>) -> Block {
        let tip = chain.latest_block().unwrap();
        let mut block = Block::new(chain.height() + 1, transactions, tip.hash.clone(), 1);
        loop {
            block.set_hash();
            if block.has_valid_proof_of_work() {
                return block;
            }
            block.nonce += 1;
        }
    }

    #[test]
    fn test_initialize_creates_genesis() {
        let (chain, utxos) = fresh_chain();

        assert_eq!(chain.height(), 0);
        let genesis = chain.latest_block().unwrap();
        assert_eq!(genesis.previous_hash, "0");
        assert_eq!(genesis.difficulty, 1);
        assert_eq!(genesis.transactions.len(), 1);
        assert!(genesis.transactions[0].is_coinbase());
        assert_eq!(utxos.balance(GENESIS_ADDRESS), GENESIS_SUPPLY);
    }

    #[test]
    fn test_add_block_advances_chain() {
        let (mut chain, _) = fresh_chain();

        let block = mined_next_block(&chain, vec![Transaction::coinbase("miner", 50)]);
        let hash = block.hash.clone();
        chain.add_block(block).unwrap();

        assert_eq!(chain.height(), 1);
        assert_eq!(chain.latest_block().unwrap().hash, hash);
        assert!(chain.block_by_hash(&hash).is_some());
    }

    #[test]
    fn test_previous_hash_mismatch_rejected() {
        let (mut chain, _) = fresh_chain();

        let mut block = mined_next_block(&chain, vec![Transaction::coinbase("miner", 50)]);
        block.previous_hash = "bogus".to_string();
        assert!(matches!(
            chain.add_block(block),
            Err(BlockchainError::PreviousHashMismatch)
        ));
        assert_eq!(chain.height(), 0);
    }

    #[test]
    fn test_index_skip_rejected() {
        let (mut chain, _) = fresh_chain();

        let tip_hash = chain.latest_block().unwrap().hash.clone();
        let mut block = Block::new(5, vec![Transaction::coinbase("miner", 50)], tip_hash, 1);
        loop {
            block.set_hash();
            if block.has_valid_proof_of_work() {
                break;
            }
            block.nonce += 1;
        }

        assert!(matches!(
            chain.add_block(block),
            Err(BlockchainError::InvalidIndex { expected: 1, got: 5 })
        ));
    }

    #[test]
    fn test_chain_reloads_from_archive() {
        let archive = Arc::new(MemoryArchive::new());

        let tip_hash = {
            let mut chain = Blockchain::new(archive.clone());
            let mut utxos = UtxoSet::new();
            chain.initialize(&mut utxos).unwrap();
            let block = mined_next_block(&chain, vec![Transaction::coinbase("miner", 50)]);
            chain.add_block(block).unwrap();
            chain.latest_block().unwrap().hash.clone()
        };

        let mut reloaded = Blockchain::new(archive);
        let mut utxos = UtxoSet::new();
        reloaded.initialize(&mut utxos).unwrap();

        assert_eq!(reloaded.height(), 1);
        assert_eq!(reloaded.latest_block().unwrap().hash, tip_hash);
        assert_eq!(utxos.balance("miner"), 50);
        assert_eq!(utxos.balance(GENESIS_ADDRESS), GENESIS_SUPPLY);
    }

    #[test]
    fn test_blocks_range_is_clamped() {
        let (mut chain, _) = fresh_chain();
        for _ in 0..3 {
            let block = mined_next_block(&chain, vec![Transaction::coinbase("miner", 50)]);
            chain.add_block(block).unwrap();
        }

        assert_eq!(chain.blocks(0, 2).len(), 2);
        assert_eq!(chain.blocks(2, 10).len(), 2);
        assert_eq!(chain.blocks(10, 5).len(), 0);
    }

    #[test]
    fn test_find_transaction() {
        let (mut chain, _) = fresh_chain();
        let coinbase = Transaction::coinbase("miner", 50);
        let tx_id = coinbase.id.clone();
        let block = mined_next_block(&chain, vec![coinbase]);
        chain.add_block(block).unwrap();

        let (found_block, found_tx) = chain.find_transaction(&tx_id).unwrap();
        assert_eq!(found_block.index, 1);
        assert_eq!(found_tx.id, tx_id);
        assert!(chain.find_transaction("missing").is_none());
    }
}
