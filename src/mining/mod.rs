//! Mining: mempool, proof-of-work, and block production

pub mod mempool;
pub mod miner;
pub mod pow;

pub use mempool::{Mempool, MempoolError};
pub use miner::{Miner, MinerError, MAX_BLOCK_TRANSACTIONS};
pub use pow::{PowError, ProofOfWork, DIFFICULTY_ADJUSTMENT_WINDOW};
