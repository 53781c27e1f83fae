//! Block archive
//!
//! Durability for the chain is delegated to an archive that stores
//! opaque block bytes keyed by height and by hash, plus the latest
//! height. The chain itself stays in memory; the archive only has to
//! answer lookups at startup and absorb appends afterwards.

use sled::transaction::TransactionError;
use std::collections::HashMap;
use std::path::Path;
use std::sync::RwLock;
use thiserror::Error;

/// Archive errors
#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("archive backend error: {0}")]
    Backend(#[from] sled::Error),
    #[error("archive codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Persistence capability for blocks, keyed by height and hash
pub trait BlockArchive: Send + Sync {
    /// Persist a block under both keys and advance the stored height,
    /// atomically
    fn save_block(&self, index: u64, hash: &str, data: &[u8]) -> Result<(), ArchiveError>;

    /// Raw block bytes at a height
    fn block(&self, index: u64) -> Result<Option<Vec<u8>>, ArchiveError>;

    /// Raw block bytes by block hash
    fn block_by_hash(&self, hash: &str) -> Result<Option<Vec<u8>>, ArchiveError>;

    /// Latest persisted height, or `None` when nothing was saved yet
    fn height(&self) -> Result<Option<u64>, ArchiveError>;

    /// Flush and release the archive
    fn close(&self) -> Result<(), ArchiveError>;
}

const HEIGHT_KEY: &[u8] = b"blockchain:height";

fn index_key(index: u64) -> Vec<u8> {
    format!("block:index:{index}").into_bytes()
}

fn hash_key(hash: &str) -> Vec<u8> {
    format!("block:hash:{hash}").into_bytes()
}

/// Archive backed by a sled key/value store
pub struct SledArchive {
    db: sled::Db,
}

impl SledArchive {
    /// Open (or create) the archive at the given directory
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ArchiveError> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }
}

impl BlockArchive for SledArchive {
    fn save_block(&self, index: u64, hash: &str, data: &[u8]) -> Result<(), ArchiveError> {
        let index_key = index_key(index);
        let hash_key = hash_key(hash);
        let height = serde_json::to_vec(&index)?;

        let result: sled::transaction::TransactionResult<(), sled::Error> =
            self.db.transaction(|txn| {
                txn.insert(index_key.as_slice(), data)?;
                txn.insert(hash_key.as_slice(), data)?;
                txn.insert(HEIGHT_KEY, height.as_slice())?;
                Ok(())
            });

        result.map_err(|e| match e {
            TransactionError::Storage(e) | TransactionError::Abort(e) => ArchiveError::Backend(e),
        })
    }

    fn block(&self, index: u64) -> Result<Option<Vec<u8>>, ArchiveError> {
        Ok(self.db.get(index_key(index))?.map(|v| v.to_vec()))
    }

    fn block_by_hash(&self, hash: &str) -> Result<Option<Vec<u8>>, ArchiveError> {
        Ok(self.db.get(hash_key(hash))?.map(|v| v.to_vec()))
    }

    fn height(&self) -> Result<Option<u64>, ArchiveError> {
        match self.db.get(HEIGHT_KEY)? {
            Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            None => Ok(None),
        }
    }

    fn close(&self) -> Result<(), ArchiveError> {
        self.db.flush()?;
        Ok(())
    }
}

/// In-memory archive for tests and ephemeral nodes
#[derive(Default)]
pub struct MemoryArchive {
    entries: RwLock<HashMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryArchive {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlockArchive for MemoryArchive {
    fn save_block(&self, index: u64, hash: &str, data: &[u8]) -> Result<(), ArchiveError> {
        let height = serde_json::to_vec(&index)?;
        let mut entries = self.entries.write().expect("archive lock poisoned");
        entries.insert(index_key(index), data.to_vec());
        entries.insert(hash_key(hash), data.to_vec());
        entries.insert(HEIGHT_KEY.to_vec(), height);
        Ok(())
    }

    fn block(&self, index: u64) -> Result<Option<Vec<u8>>, ArchiveError> {
        let entries = self.entries.read().expect("archive lock poisoned");
        Ok(entries.get(&index_key(index)).cloned())
    }

    fn block_by_hash(&self, hash: &str) -> Result<Option<Vec<u8>>, ArchiveError> {
        let entries = self.entries.read().expect("archive lock poisoned");
        Ok(entries.get(&hash_key(hash)).cloned())
    }

    fn height(&self) -> Result<Option<u64>, ArchiveError> {
        let entries = self.entries.read().expect("archive lock poisoned");
        match entries.get(HEIGHT_KEY) {
            Some(raw) => Ok(Some(serde_json::from_slice(raw)?)),
            None => Ok(None),
        }
    }

    fn close(&self) -> Result<(), ArchiveError> {
        Ok(())
    }
}
