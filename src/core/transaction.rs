//! Transaction handling for the blockchain
//!
//! A transaction moves value from one address to another and carries an
//! ECDSA signature over its contents. Coinbase transactions have no
//! sender and mint the block reward plus fees to the miner.

use crate::crypto::sha256_hex;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Signature marker carried by coinbase transactions
pub const COINBASE_SIGNATURE: &str = "coinbase";

/// Transaction-related errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum TransactionError {
    #[error("sender address is required")]
    MissingSender,
    #[error("recipient address is required")]
    MissingRecipient,
    #[error("amount must be greater than zero")]
    ZeroAmount,
    #[error("fee must be greater than zero")]
    ZeroFee,
    #[error("transaction must be signed")]
    MissingSignature,
    #[error("transaction ID must be set")]
    MissingId,
    #[error("transaction ID mismatch")]
    IdMismatch,
}

/// A value transfer between two addresses
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transaction {
    /// SHA-256 over the transaction fields, assigned after signing
    pub id: String,
    /// Sender's address (empty for coinbase)
    pub from: String,
    /// Recipient's address
    pub to: String,
    /// Amount to transfer
    pub amount: u64,
    /// Mining fee
    pub fee: u64,
    /// ECDSA signature over `data_to_sign()`, DER-encoded hex
    pub signature: String,
    /// Transaction creation time
    pub timestamp: DateTime<Utc>,
}

impl Transaction {
    /// Create a new unsigned transaction with the current UTC timestamp
    pub fn new(from: &str, to: &str, amount: u64, fee: u64) -> Self {
        Self {
            id: String::new(),
            from: from.to_string(),
            to: to.to_string(),
            amount,
            fee,
            signature: String::new(),
            timestamp: Utc::now(),
        }
    }

    /// Create a coinbase transaction minting `amount` to the miner
    pub fn coinbase(to: &str, amount: u64) -> Self {
        Self::coinbase_at(to, amount, Utc::now())
    }

    /// Create a coinbase transaction with an explicit timestamp.
    /// Genesis needs this so the block is identical on every node.
    pub fn coinbase_at(to: &str, amount: u64, timestamp: DateTime<Utc>) -> Self {
        let mut tx = Self {
            id: String::new(),
            from: String::new(),
            to: to.to_string(),
            amount,
            fee: 0,
            signature: COINBASE_SIGNATURE.to_string(),
            timestamp,
        };
        tx.id = tx.hash();
        tx
    }

    /// The timestamp rendered at fixed nanosecond precision, as used in
    /// every hash preimage
    fn timestamp_rfc3339(&self) -> String {
        self.timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true)
    }

    /// Compute the transaction identifier: SHA-256 over all fields
    /// except the ID itself
    pub fn hash(&self) -> String {
        let data = format!(
            "{}{}{}{}{}{}",
            self.from,
            self.to,
            self.amount,
            self.fee,
            self.signature,
            self.timestamp_rfc3339(),
        );
        sha256_hex(data.as_bytes())
    }

    /// The 32-byte digest the sender signs: SHA-256 over all fields
    /// except the signature
    pub fn data_to_sign(&self) -> Vec<u8> {
        let data = format!(
            "{}{}{}{}{}",
            self.from,
            self.to,
            self.amount,
            self.fee,
            self.timestamp_rfc3339(),
        );
        crate::crypto::sha256(data.as_bytes())
    }

    /// Attach the signature and finalize the identifier
    pub fn set_signature(&mut self, signature: &str) {
        self.signature = signature.to_string();
        self.id = self.hash();
    }

    /// Whether this is a coinbase (mining reward) transaction
    pub fn is_coinbase(&self) -> bool {
        self.from.is_empty() && self.signature == COINBASE_SIGNATURE
    }

    /// Total deduction from the sender's balance
    pub fn total(&self) -> u64 {
        self.amount + self.fee
    }

    /// Validate field presence and identifier integrity.
    /// Coinbase skips the sender, fee, and signature requirements.
    pub fn validate(&self) -> Result<(), TransactionError> {
        if self.is_coinbase() {
            if self.to.is_empty() {
                return Err(TransactionError::MissingRecipient);
            }
            if self.amount == 0 {
                return Err(TransactionError::ZeroAmount);
            }
            if self.id.is_empty() {
                return Err(TransactionError::MissingId);
            }
            if self.id != self.hash() {
                return Err(TransactionError::IdMismatch);
            }
            return Ok(());
        }

        if self.from.is_empty() {
            return Err(TransactionError::MissingSender);
        }
        if self.to.is_empty() {
            return Err(TransactionError::MissingRecipient);
        }
        if self.amount == 0 {
            return Err(TransactionError::ZeroAmount);
        }
        if self.fee == 0 {
            return Err(TransactionError::ZeroFee);
        }
        if self.signature.is_empty() {
            return Err(TransactionError::MissingSignature);
        }
        if self.id.is_empty() {
            return Err(TransactionError::MissingId);
        }
        if self.id != self.hash() {
            return Err(TransactionError::IdMismatch);
        }
        Ok(())
    }
}
