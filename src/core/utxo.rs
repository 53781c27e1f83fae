//! Unspent transaction output (UTXO) tracking
//!
//! The UTXO set is the authoritative ledger state: every confirmed
//! transaction consumes some of the sender's unspent outputs and
//! creates new ones. The set carries no interior lock; it is shared as
//! `Arc<RwLock<UtxoSet>>` and every mutating operation takes `&mut
//! self`, so replaying a chain through `rebuild` runs the same apply
//! path under the borrow the caller already holds.

use crate::core::block::Block;
use crate::core::transaction::Transaction;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// UTXO-related errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum UtxoError {
    #[error("sender has no unspent outputs")]
    NoOutputs,
    #[error("insufficient balance: have {have}, need {need}")]
    InsufficientBalance { have: u64, need: u64 },
}

/// An unspent transaction output
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Utxo {
    /// Transaction that created this output
    pub tx_id: String,
    /// Output index within that transaction
    pub output_index: u32,
    /// Owner's address
    pub address: String,
    /// Amount held by this output
    pub amount: u64,
}

/// The set of all unspent outputs, keyed by `(tx_id, output_index)`
#[derive(Debug, Default, Clone)]
pub struct UtxoSet {
    utxos: HashMap<(String, u32), Utxo>,
}

impl UtxoSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an unspent output
    pub fn add(&mut self, utxo: Utxo) {
        self.utxos
            .insert((utxo.tx_id.clone(), utxo.output_index), utxo);
    }

    /// Remove a spent output
    pub fn remove(&mut self, tx_id: &str, output_index: u32) {
        self.utxos.remove(&(tx_id.to_string(), output_index));
    }

    /// Look up a specific output
    pub fn get(&self, tx_id: &str, output_index: u32) -> Option<&Utxo> {
        self.utxos.get(&(tx_id.to_string(), output_index))
    }

    /// All outputs owned by an address, in a stable order
    /// (sorted by transaction ID, then output index)
    pub fn utxos_for_address(&self, address: &str) -> Vec<Utxo> {
        let mut owned: Vec<Utxo> = self
            .utxos
            .values()
            .filter(|utxo| utxo.address == address)
            .cloned()
            .collect();
        owned.sort_by(|a, b| (&a.tx_id, a.output_index).cmp(&(&b.tx_id, b.output_index)));
        owned
    }

    /// Total balance of an address: the sum of its unspent outputs
    pub fn balance(&self, address: &str) -> u64 {
        self.utxos
            .values()
            .filter(|utxo| utxo.address == address)
            .map(|utxo| utxo.amount)
            .sum()
    }

    /// Number of unspent outputs in the set
    pub fn len(&self) -> usize {
        self.utxos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.utxos.is_empty()
    }

    /// Cheap admission precheck: a coinbase always passes; otherwise
    /// the sender's summed balance must cover amount plus fee. The
    /// authoritative check happens in `apply_transaction`.
    pub fn validate_transaction(&self, tx: &Transaction) -> Result<(), UtxoError> {
        if tx.is_coinbase() {
            return Ok(());
        }

        let balance = self.balance(&tx.from);
        let needed = tx.total();
        if balance < needed {
            return Err(UtxoError::InsufficientBalance {
                have: balance,
                need: needed,
            });
        }
        Ok(())
    }

    /// Apply a transaction: consume enough of the sender's outputs to
    /// cover amount plus fee, credit the recipient at output 0, and
    /// return any change to the sender at output 1. A coinbase only
    /// creates output 0 for the miner.
    pub fn apply_transaction(&mut self, tx: &Transaction) -> Result<(), UtxoError> {
        if tx.is_coinbase() {
            self.add(Utxo {
                tx_id: tx.id.clone(),
                output_index: 0,
                address: tx.to.clone(),
                amount: tx.amount,
            });
            return Ok(());
        }

        let sender_utxos = self.utxos_for_address(&tx.from);
        if sender_utxos.is_empty() {
            return Err(UtxoError::NoOutputs);
        }

        let needed = tx.total();
        let mut available = 0u64;
        let mut to_spend = Vec::new();

        for utxo in sender_utxos {
            available += utxo.amount;
            to_spend.push(utxo);
            if available >= needed {
                break;
            }
        }

        if available < needed {
            return Err(UtxoError::InsufficientBalance {
                have: available,
                need: needed,
            });
        }

        for utxo in &to_spend {
            self.remove(&utxo.tx_id, utxo.output_index);
        }

        self.add(Utxo {
            tx_id: tx.id.clone(),
            output_index: 0,
            address: tx.to.clone(),
            amount: tx.amount,
        });

        let change = available - needed;
        if change > 0 {
            self.add(Utxo {
                tx_id: tx.id.clone(),
                output_index: 1,
                address: tx.from.clone(),
                amount: change,
            });
        }

        Ok(())
    }

    /// Apply every transaction in a block in order, stopping at the
    /// first failure. Blocks are validated before this is called, so a
    /// failure here is an invariant violation the caller must not
    /// ignore.
    pub fn apply_block(&mut self, block: &Block) -> Result<(), UtxoError> {
        for tx in &block.transactions {
            self.apply_transaction(tx)?;
        }
        Ok(())
    }

    /// Reset the set and replay every block's transactions in height
    /// order. Used at startup from a persisted chain.
    pub fn rebuild(&mut self, blocks: &[Block]) -> Result<(), UtxoError> {
        self.utxos.clear();
        for block in blocks {
            self.apply_block(block)?;
        }
        Ok(())
    }

    /// Remove a transaction's outputs from the set. Spent inputs are
    /// not restored; there is no chain reorganisation support.
    pub fn revert_transaction(&mut self, tx: &Transaction) {
        self.remove(&tx.id, 0);
        self.remove(&tx.id, 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transfer(from: &str, to: &str, amount: u64, fee: u64) -> Transaction {
        let mut tx = Transaction::new(from, to, amount, fee);
        tx.set_signature("aabb");
        tx
    }

    fn funded_set(address: &str, amount: u64) -> (UtxoSet, Transaction) {
        let mut set = UtxoSet::new();
        let coinbase = Transaction::coinbase(address, amount);
        set.apply_transaction(&coinbase).unwrap();
        (set, coinbase)
    }

    #[test]
    fn test_coinbase_creates_single_output() {
        let (set, coinbase) = funded_set("miner", 50);
        assert_eq!(set.len(), 1);
        assert_eq!(set.balance("miner"), 50);
        assert_eq!(set.get(&coinbase.id, 0).unwrap().amount, 50);
        assert!(set.get(&coinbase.id, 1).is_none());
    }

    #[test]
    fn test_transfer_with_change() {
        let (mut set, _) = funded_set("alice", 100);

        let tx = transfer("alice", "bob", 30, 5);
        set.apply_transaction(&tx).unwrap();

        assert_eq!(set.balance("bob"), 30);
        assert_eq!(set.balance("alice"), 65);
        assert_eq!(set.get(&tx.id, 0).unwrap().address, "bob");
        assert_eq!(set.get(&tx.id, 1).unwrap().address, "alice");
    }

    #[test]
    fn test_transfer_exact_amount_creates_no_change() {
        let (mut set, _) = funded_set("alice", 35);

        let tx = transfer("alice", "bob", 30, 5);
        set.apply_transaction(&tx).unwrap();

        assert_eq!(set.balance("alice"), 0);
        assert!(set.get(&tx.id, 1).is_none());
    }

    #[test]
    fn test_insufficient_by_one_unit_rejected() {
        let (mut set, _) = funded_set("alice", 34);

        let tx = transfer("alice", "bob", 30, 5);
        assert_eq!(
            set.apply_transaction(&tx),
            Err(UtxoError::InsufficientBalance { have: 34, need: 35 })
        );
        // Failed application leaves the set untouched
        assert_eq!(set.balance("alice"), 34);
    }

    #[test]
    fn test_sender_without_outputs_rejected() {
        let mut set = UtxoSet::new();
        let tx = transfer("nobody", "bob", 1, 1);
        assert_eq!(set.apply_transaction(&tx), Err(UtxoError::NoOutputs));
    }

    #[test]
    fn test_validate_is_a_precheck_only() {
        let (set, _) = funded_set("alice", 100);
        assert!(set.validate_transaction(&transfer("alice", "bob", 90, 10)).is_ok());
        assert_eq!(
            set.validate_transaction(&transfer("alice", "bob", 100, 1)),
            Err(UtxoError::InsufficientBalance { have: 100, need: 101 })
        );
        // Coinbase is accepted unconditionally
        assert!(set.validate_transaction(&Transaction::coinbase("m", 50)).is_ok());
    }

    #[test]
    fn test_greedy_selection_consumes_multiple_outputs() {
        let mut set = UtxoSet::new();
        for _ in 0..3 {
            set.apply_transaction(&Transaction::coinbase("alice", 10)).unwrap();
        }

        let tx = transfer("alice", "bob", 22, 3);
        set.apply_transaction(&tx).unwrap();

        assert_eq!(set.balance("bob"), 22);
        assert_eq!(set.balance("alice"), 5);
    }

    #[test]
    fn test_conservation_across_transfer() {
        let (mut set, _) = funded_set("alice", 100);
        let before: u64 = set.balance("alice") + set.balance("bob");

        let tx = transfer("alice", "bob", 40, 6);
        set.apply_transaction(&tx).unwrap();

        // The fee leaves the ledger until a miner claims it
        let after = set.balance("alice") + set.balance("bob");
        assert_eq!(after, before - tx.fee);
    }

    #[test]
    fn test_rebuild_replays_blocks() {
        let coinbase = Transaction::coinbase("alice", 100);
        let block = Block::new(0, vec![coinbase], "0".to_string(), 1);

        let mut set = UtxoSet::new();
        set.apply_transaction(&Transaction::coinbase("stale", 1)).unwrap();
        set.rebuild(std::slice::from_ref(&block)).unwrap();

        assert_eq!(set.balance("stale"), 0);
        assert_eq!(set.balance("alice"), 100);
    }

    #[test]
    fn test_revert_removes_outputs() {
        let (mut set, _) = funded_set("alice", 100);
        let tx = transfer("alice", "bob", 30, 5);
        set.apply_transaction(&tx).unwrap();

        set.revert_transaction(&tx);
        assert_eq!(set.balance("bob"), 0);
        assert_eq!(set.balance("alice"), 0);
    }
}
