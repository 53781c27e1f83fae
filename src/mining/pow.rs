//! Proof-of-Work consensus
//!
//! A block is valid when its hash starts with `difficulty` zero hex
//! characters. Producing such a hash means walking the nonce space;
//! checking it is a single hash. The difficulty can adapt to keep the
//! inter-block interval near a target.

use crate::core::Block;
use log::{debug, info};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Blocks examined per difficulty adjustment
pub const DIFFICULTY_ADJUSTMENT_WINDOW: usize = 10;

/// How many nonce attempts between cancellation checks
const CANCEL_POLL_INTERVAL: u64 = 65_536;

/// Proof-of-Work errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum PowError {
    #[error("mining cancelled")]
    Cancelled,
    #[error("block hash is incorrect")]
    HashMismatch,
    #[error("block hash does not meet difficulty (need {required} leading zeros)")]
    DifficultyNotMet { required: usize },
}

/// Proof-of-Work parameters and operations
pub struct ProofOfWork {
    difficulty: AtomicUsize,
    target_block_time: Duration,
}

impl ProofOfWork {
    /// Create a Proof-of-Work instance. Difficulty is clamped to at
    /// least 1; a zero target block time falls back to 10 seconds.
    pub fn new(difficulty: usize, target_block_time: Duration) -> Self {
        let target_block_time = if target_block_time.is_zero() {
            Duration::from_secs(10)
        } else {
            target_block_time
        };

        Self {
            difficulty: AtomicUsize::new(difficulty.max(1)),
            target_block_time,
        }
    }

    pub fn difficulty(&self) -> usize {
        self.difficulty.load(Ordering::Relaxed)
    }

    pub fn set_difficulty(&self, difficulty: usize) {
        self.difficulty.store(difficulty.max(1), Ordering::Relaxed);
    }

    /// Search for a nonce that satisfies the difficulty. The `cancel`
    /// flag is polled every 65 536 attempts so shutdown interrupts the
    /// search promptly.
    pub fn mine(&self, block: &mut Block, cancel: &AtomicBool) -> Result<(), PowError> {
        let difficulty = self.difficulty();
        let target = "0".repeat(difficulty);
        debug!("mining block {} at difficulty {}", block.index, difficulty);

        let started = Instant::now();
        let mut hashes: u64 = 0;

        loop {
            block.set_hash();
            hashes += 1;

            if block.hash.starts_with(&target) {
                let elapsed = started.elapsed();
                let rate = hashes as f64 / elapsed.as_secs_f64().max(f64::EPSILON);
                info!(
                    "block {} mined: {} ({} hashes, {:.0} H/s)",
                    block.index, block.hash, hashes, rate
                );
                return Ok(());
            }

            block.nonce += 1;

            if hashes % CANCEL_POLL_INTERVAL == 0 && cancel.load(Ordering::Relaxed) {
                return Err(PowError::Cancelled);
            }
        }
    }

    /// Verify that a block's hash is correctly computed and meets the
    /// node's current difficulty
    pub fn validate_block(&self, block: &Block) -> Result<(), PowError> {
        if block.hash != block.compute_hash() {
            return Err(PowError::HashMismatch);
        }

        let required = self.difficulty();
        let target = "0".repeat(required);
        if !block.hash.starts_with(&target) {
            return Err(PowError::DifficultyNotMet { required });
        }

        Ok(())
    }

    /// Single-step difficulty adjustment from recent block timestamps:
    /// an average interval below half the target increments difficulty;
    /// above twice the target decrements it (never below 1). Needs at
    /// least 10 blocks, otherwise does nothing.
    pub fn adjust_difficulty(&self, recent_blocks: &[Block]) {
        if recent_blocks.len() < DIFFICULTY_ADJUSTMENT_WINDOW {
            return;
        }

        let total_ms: i64 = recent_blocks
            .windows(2)
            .map(|pair| {
                pair[1]
                    .timestamp
                    .signed_duration_since(pair[0].timestamp)
                    .num_milliseconds()
            })
            .sum();
        let average_ms = total_ms / (recent_blocks.len() as i64 - 1);
        let target_ms = self.target_block_time.as_millis() as i64;

        let current = self.difficulty();
        if average_ms < target_ms / 2 {
            self.set_difficulty(current + 1);
            info!(
                "difficulty increased to {} (avg block time {}ms)",
                current + 1,
                average_ms
            );
        } else if average_ms > target_ms * 2 && current > 1 {
            self.set_difficulty(current - 1);
            info!(
                "difficulty decreased to {} (avg block time {}ms)",
                current - 1,
                average_ms
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Transaction;
    use chrono::{Duration as ChronoDuration, Utc};

    fn unmined_block() -> Block {
        Block::new(
            1,
            vec![Transaction::coinbase("miner", 50)],
            "abc".to_string(),
            1,
        )
    }

    fn blocks_spaced_by(seconds: i64, count: usize) -> Vec<Block> {
        let start = Utc::now();
        (0..count)
            .map(|i| {
                let mut block = unmined_block();
                block.index = i as u64;
                block.timestamp = start + ChronoDuration::seconds(seconds * i as i64);
                block
            })
            .collect()
    }

    #[test]
    fn test_mine_and_validate() {
        let pow = ProofOfWork::new(1, Duration::from_secs(10));
        let cancel = AtomicBool::new(false);

        let mut block = unmined_block();
        pow.mine(&mut block, &cancel).unwrap();

        assert!(block.has_valid_proof_of_work());
        assert!(pow.validate_block(&block).is_ok());
    }

    #[test]
    fn test_validate_rejects_recomputed_mismatch() {
        let pow = ProofOfWork::new(1, Duration::from_secs(10));
        let cancel = AtomicBool::new(false);

        let mut block = unmined_block();
        pow.mine(&mut block, &cancel).unwrap();
        block.nonce += 1;

        assert_eq!(pow.validate_block(&block), Err(PowError::HashMismatch));
    }

    #[test]
    fn test_validate_rejects_weak_hash() {
        let pow = ProofOfWork::new(1, Duration::from_secs(10));
        let cancel = AtomicBool::new(false);

        let mut block = unmined_block();
        pow.mine(&mut block, &cancel).unwrap();

        // A stricter node rejects the same block
        let strict = ProofOfWork::new(60, Duration::from_secs(10));
        assert_eq!(
            strict.validate_block(&block),
            Err(PowError::DifficultyNotMet { required: 60 })
        );
    }

    #[test]
    fn test_mining_is_cancellable() {
        // A difficulty no realistic search satisfies, so only the
        // cancellation path can end the loop
        let pow = ProofOfWork::new(64, Duration::from_secs(10));
        let cancel = AtomicBool::new(true);

        let mut block = unmined_block();
        assert_eq!(pow.mine(&mut block, &cancel), Err(PowError::Cancelled));
    }

    #[test]
    fn test_minimum_difficulty_is_one() {
        let pow = ProofOfWork::new(0, Duration::from_secs(10));
        assert_eq!(pow.difficulty(), 1);
        pow.set_difficulty(0);
        assert_eq!(pow.difficulty(), 1);
    }

    #[test]
    fn test_adjust_requires_ten_blocks() {
        let pow = ProofOfWork::new(4, Duration::from_secs(10));
        pow.adjust_difficulty(&blocks_spaced_by(1, 5));
        assert_eq!(pow.difficulty(), 4);
    }

    #[test]
    fn test_adjust_increments_when_fast() {
        let pow = ProofOfWork::new(4, Duration::from_secs(10));
        pow.adjust_difficulty(&blocks_spaced_by(1, 10));
        assert_eq!(pow.difficulty(), 5);
    }

    #[test]
    fn test_adjust_decrements_when_slow() {
        let pow = ProofOfWork::new(4, Duration::from_secs(10));
        pow.adjust_difficulty(&blocks_spaced_by(30, 10));
        assert_eq!(pow.difficulty(), 3);
    }

    #[test]
    fn test_adjust_never_drops_below_one() {
        let pow = ProofOfWork::new(1, Duration::from_secs(10));
        pow.adjust_difficulty(&blocks_spaced_by(30, 10));
        assert_eq!(pow.difficulty(), 1);
    }

    #[test]
    fn test_adjust_holds_steady_near_target() {
        let pow = ProofOfWork::new(4, Duration::from_secs(10));
        pow.adjust_difficulty(&blocks_spaced_by(10, 10));
        assert_eq!(pow.difficulty(), 4);
    }
}
