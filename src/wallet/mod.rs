//! Wallet: key management and transaction signing

pub mod wallet;

pub use wallet::{verify_transaction_signature, Wallet, WalletError};
