use std::io;
use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy surfaced by the store.
#[derive(Debug, Error)]
pub enum Error {
    /// A key or value failed validation (empty key, key > 255 bytes, ...).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Lookup found no matching key.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// A write transaction could not acquire the file's exclusive lock.
    #[error("database is locked by another writer")]
    Busy,

    /// The open handle observed a tombstoned meta page: a compactor has
    /// replaced the underlying file.
    #[error("database file was replaced by compaction")]
    Stale,

    /// Propagated I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Allocation failure (page buffer, key buffer, ...).
    #[error("out of memory: {0}")]
    NoMemory(String),

    /// Structural corruption: bad magic/version, checksum mismatch, or an
    /// invariant violated by on-disk bytes.
    #[error("corrupt database: {0}")]
    Corrupt(String),

    /// A mutating call was made against a read-only transaction.
    #[error("permission denied: write attempted on a read-only transaction")]
    Perm,
}
