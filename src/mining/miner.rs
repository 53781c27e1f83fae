//! Block production
//!
//! The miner drains the mempool by fee priority, prepends a coinbase
//! claiming the block reward plus fees, runs the proof-of-work search
//! on a blocking thread, and commits the result: append to the chain,
//! apply to the UTXO set, drop the mined transactions from the pool.
//! The nonce search holds no lock; the commit holds the chain write
//! lock across the UTXO update so appends are strictly serialised.

use crate::core::blockchain::BlockchainError;
use crate::core::{Block, Blockchain, Transaction, UtxoSet, BLOCK_REWARD};
use crate::mining::mempool::Mempool;
use crate::mining::pow::{PowError, ProofOfWork, DIFFICULTY_ADJUSTMENT_WINDOW};
use crate::network::Node;
use log::{error, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;

/// Most transactions a single block will carry, besides the coinbase
pub const MAX_BLOCK_TRANSACTIONS: usize = 100;

/// Miner errors
#[derive(Error, Debug)]
pub enum MinerError {
    #[error("mining cancelled")]
    Cancelled,
    #[error("chain is not initialized")]
    ChainNotInitialized,
    #[error(transparent)]
    Blockchain(#[from] BlockchainError),
    #[error("consensus invariant violated: {0}")]
    ConsensusInvariantViolated(String),
    #[error("mining task failed: {0}")]
    Task(String),
}

/// Builds and commits new blocks
pub struct Miner {
    chain: Arc<RwLock<Blockchain>>,
    utxos: Arc<RwLock<UtxoSet>>,
    mempool: Arc<RwLock<Mempool>>,
    pow: Arc<ProofOfWork>,
    stop: Arc<AtomicBool>,
}

impl Miner {
    pub fn new(
        chain: Arc<RwLock<Blockchain>>,
        utxos: Arc<RwLock<UtxoSet>>,
        mempool: Arc<RwLock<Mempool>>,
        pow: Arc<ProofOfWork>,
    ) -> Self {
        Self {
            chain,
            utxos,
            mempool,
            pow,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Request that the mining loop, and any in-flight nonce search,
    /// wind down
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    /// Mine one block to the given reward address and commit it
    pub async fn mine_block(&self, reward_address: &str) -> Result<Block, MinerError> {
        let selected = self.select_transactions().await;
        let fees: u64 = selected.iter().map(|tx| tx.fee).sum();
        let coinbase = Transaction::coinbase(reward_address, BLOCK_REWARD + fees);

        let (index, previous_hash) = {
            let chain = self.chain.read().await;
            let tip = chain
                .latest_block()
                .ok_or(MinerError::ChainNotInitialized)?;
            (chain.height() + 1, tip.hash.clone())
        };

        let mut transactions = Vec::with_capacity(selected.len() + 1);
        transactions.push(coinbase);
        transactions.extend(selected.iter().cloned());

        let block = Block::new(index, transactions, previous_hash, self.pow.difficulty());

        // The nonce search runs detached from every lock
        let pow = Arc::clone(&self.pow);
        let stop = Arc::clone(&self.stop);
        let mined = tokio::task::spawn_blocking(move || {
            let mut block = block;
            pow.mine(&mut block, &stop).map(|_| block)
        })
        .await
        .map_err(|e| MinerError::Task(e.to_string()))?
        .map_err(|e| match e {
            PowError::Cancelled => MinerError::Cancelled,
            other => MinerError::Task(other.to_string()),
        })?;

        {
            let mut chain = self.chain.write().await;
            match chain.add_block(mined.clone()) {
                Ok(()) => {}
                Err(BlockchainError::Archive(e)) => {
                    warn!("block {} not persisted, kept in memory: {e}", mined.index)
                }
                Err(e) => return Err(e.into()),
            }

            // Still under the chain lock: a failure past this point
            // leaves the chain ahead of the ledger state
            let mut utxos = self.utxos.write().await;
            utxos.apply_block(&mined).map_err(|e| {
                MinerError::ConsensusInvariantViolated(format!(
                    "block {} appended but state update failed: {e}",
                    mined.index
                ))
            })?;
        }

        {
            let mut mempool = self.mempool.write().await;
            for tx in &selected {
                mempool.remove_transaction(&tx.id);
            }
        }

        info!("block {} mined successfully: {}", mined.index, mined.hash);
        Ok(mined)
    }

    /// Draw fee-ordered candidates and keep only those that apply
    /// cleanly in sequence against the current ledger state.
    /// Infeasible entries are evicted so they cannot poison a later
    /// block commit.
    async fn select_transactions(&self) -> Vec<Transaction> {
        let candidates = {
            let mempool = self.mempool.read().await;
            mempool.transactions_by_fee(MAX_BLOCK_TRANSACTIONS)
        };
        if candidates.is_empty() {
            return candidates;
        }

        let mut selected = Vec::with_capacity(candidates.len());
        let mut evicted = Vec::new();
        {
            let utxos = self.utxos.read().await;
            let mut scratch = utxos.clone();
            for tx in candidates {
                match scratch.apply_transaction(&tx) {
                    Ok(()) => selected.push(tx),
                    Err(e) => {
                        warn!("evicting infeasible transaction {}: {e}", tx.id);
                        evicted.push(tx.id);
                    }
                }
            }
        }

        if !evicted.is_empty() {
            let mut mempool = self.mempool.write().await;
            for id in &evicted {
                mempool.remove_transaction(id);
            }
        }

        selected
    }

    /// Re-examine difficulty once per adjustment window
    async fn maybe_adjust_difficulty(&self) {
        let chain = self.chain.read().await;
        if (chain.height() + 1) % DIFFICULTY_ADJUSTMENT_WINDOW as u64 != 0 {
            return;
        }
        let blocks = chain.all_blocks();
        let start = blocks.len().saturating_sub(DIFFICULTY_ADJUSTMENT_WINDOW);
        self.pow.adjust_difficulty(&blocks[start..]);
    }

    /// Run the mining loop until `stop()`: sleep while the mempool is
    /// empty, otherwise mine, broadcast, and periodically adjust
    /// difficulty
    pub fn start(self: Arc<Self>, reward_address: &str, node: Arc<Node>) -> tokio::task::JoinHandle<()> {
        self.stop.store(false, Ordering::Relaxed);
        let miner = self;
        let reward_address = reward_address.to_string();

        tokio::spawn(async move {
            info!("miner started, waiting for transactions...");

            while !miner.stop.load(Ordering::Relaxed) {
                let pending = { miner.mempool.read().await.len() };
                if pending == 0 {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    continue;
                }

                match miner.mine_block(&reward_address).await {
                    Ok(block) => {
                        node.broadcast_block(&block).await;
                        miner.maybe_adjust_difficulty().await;
                    }
                    Err(MinerError::Cancelled) => break,
                    Err(e @ MinerError::ConsensusInvariantViolated(_)) => {
                        error!("{e}; halting node");
                        std::process::exit(1);
                    }
                    Err(e) => warn!("mining failed: {e}"),
                }

                tokio::time::sleep(Duration::from_secs(1)).await;
            }

            info!("miner stopped");
        })
    }
}
