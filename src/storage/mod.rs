//! Block persistence

pub mod archive;

pub use archive::{ArchiveError, BlockArchive, MemoryArchive, SledArchive};
