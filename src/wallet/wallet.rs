//! Wallet implementation
//!
//! A wallet holds a key pair and signs transactions. The address is
//! the public key itself, so verifiers recover it straight from the
//! transaction's `from` field.

use crate::core::Transaction;
use crate::crypto::{address_to_public_key, verify_signature, KeyError, KeyPair};
use thiserror::Error;

/// Wallet-related errors
#[derive(Error, Debug)]
pub enum WalletError {
    #[error("transaction sender does not match wallet address")]
    AddressMismatch,
    #[error(transparent)]
    Key(#[from] KeyError),
}

/// A key pair with signing conveniences
pub struct Wallet {
    key_pair: KeyPair,
}

impl Wallet {
    /// Create a wallet with a freshly generated key pair
    pub fn new() -> Self {
        Self {
            key_pair: KeyPair::generate(),
        }
    }

    /// Restore a wallet from a backed-up private key
    pub fn from_private_key(private_key_hex: &str) -> Result<Self, WalletError> {
        Ok(Self {
            key_pair: KeyPair::from_private_key_hex(private_key_hex)?,
        })
    }

    /// The wallet's address
    pub fn address(&self) -> String {
        self.key_pair.address()
    }

    /// The private key and address, for backup.
    /// Keep the private key secret.
    pub fn export(&self) -> (String, String) {
        (self.key_pair.private_key_hex(), self.address())
    }

    /// Sign a transaction whose `from` matches this wallet, attaching
    /// the signature and finalizing the ID
    pub fn sign_transaction(&self, tx: &mut Transaction) -> Result<(), WalletError> {
        if tx.from != self.address() {
            return Err(WalletError::AddressMismatch);
        }

        let signature = self.key_pair.sign(&tx.data_to_sign())?;
        tx.set_signature(&signature);
        Ok(())
    }

    /// Build and sign a transfer in one step
    pub fn create_and_sign(
        &self,
        to: &str,
        amount: u64,
        fee: u64,
    ) -> Result<Transaction, WalletError> {
        let mut tx = Transaction::new(&self.address(), to, amount, fee);
        self.sign_transaction(&mut tx)?;
        Ok(tx)
    }
}

impl Default for Wallet {
    fn default() -> Self {
        Self::new()
    }
}

/// Verify a transaction's signature under the public key recovered
/// from its `from` address. Coinbase transactions pass unconditionally.
pub fn verify_transaction_signature(tx: &Transaction) -> Result<bool, WalletError> {
    if tx.is_coinbase() {
        return Ok(true);
    }

    let public_key = address_to_public_key(&tx.from)?;
    Ok(verify_signature(
        &public_key,
        &tx.data_to_sign(),
        &tx.signature,
    )?)
}
