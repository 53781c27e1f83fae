//! Transaction pool for pending transactions
//!
//! Admitted transactions wait here, keyed by ID, until a miner selects
//! them. Selection is fee-prioritised. The pool does not check
//! signatures or balances; admission callers validate first.

use crate::core::Transaction;
use std::cmp::Reverse;
use std::collections::HashMap;
use thiserror::Error;

/// Mempool errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum MempoolError {
    #[error("transaction already in mempool")]
    DuplicateTransaction,
}

/// Pending transactions, keyed by transaction ID
#[derive(Debug, Default)]
pub struct Mempool {
    transactions: HashMap<String, Transaction>,
}

impl Mempool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit a transaction; duplicates by ID are rejected
    pub fn add_transaction(&mut self, tx: Transaction) -> Result<(), MempoolError> {
        if self.transactions.contains_key(&tx.id) {
            return Err(MempoolError::DuplicateTransaction);
        }
        self.transactions.insert(tx.id.clone(), tx);
        Ok(())
    }

    /// Remove a transaction, returning it if it was present
    pub fn remove_transaction(&mut self, tx_id: &str) -> Option<Transaction> {
        self.transactions.remove(tx_id)
    }

    pub fn transaction(&self, tx_id: &str) -> Option<&Transaction> {
        self.transactions.get(tx_id)
    }

    pub fn contains(&self, tx_id: &str) -> bool {
        self.transactions.contains_key(tx_id)
    }

    /// Up to `limit` transactions, highest fee first. Ties break on the
    /// transaction ID so a single call is deterministic.
    pub fn transactions_by_fee(&self, limit: usize) -> Vec<Transaction> {
        let mut txs: Vec<Transaction> = self.transactions.values().cloned().collect();
        txs.sort_by(|a, b| (Reverse(a.fee), &a.id).cmp(&(Reverse(b.fee), &b.id)));
        txs.truncate(limit);
        txs
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    pub fn clear(&mut self) {
        self.transactions.clear();
    }
}
