//! Error types for keyrepo_core operations.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for keyrepo_core operations.
///
/// Contract violations (reserved unit ids, unknown handler codes, conflicting
/// cache-once offsets) are not represented here: they panic at the point of
/// detection because the identity invariants are already broken.
#[derive(Error, Debug)]
pub enum KeyRepoError {
    /// I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The underlying storage engine failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// Compression or decompression of a stored value failed.
    #[error("compression error: {0}")]
    Compression(String),

    /// A key or value stream ended before a complete record was read.
    #[error("truncated stream: needed {needed} more bytes at offset {offset}")]
    Truncated {
        /// Read position where the stream ran out
        offset: usize,
        /// Number of bytes the reader still expected
        needed: usize,
    },

    /// A string in a stream is not valid modified UTF-8.
    #[error("invalid modified UTF-8 at offset {offset}: {reason}")]
    InvalidString {
        /// Read position of the offending string
        offset: usize,
        /// Description of the encoding problem
        reason: String,
    },

    /// A string is too long for the 16-bit length prefix.
    #[error("string too long to encode: {len} bytes exceeds {limit}")]
    StringTooLong {
        /// Encoded length of the string
        len: usize,
        /// Maximum encodable length
        limit: usize,
    },

    /// The single-NUL string is the encoding of an absent string.
    #[error("a string holding a single NUL character cannot be encoded")]
    ReservedString,

    /// A stored record is malformed in a way the reader can report.
    #[error("corrupted record: {0}")]
    Corrupted(String),

    /// Persistence format version on disk differs from the running build.
    #[error("persistence version mismatch: found {found}, expected {expected}")]
    VersionMismatch {
        /// Version recorded in the repository
        found: i32,
        /// Version of the running build
        expected: i32,
    },

    /// Configuration error (loading, parsing, invalid values).
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// No unit is registered under the given name.
    #[error("unit not found: {0}")]
    UnitNotFound(String),

    /// Repository is locked by another process.
    #[error("repository locked by another process: {}", path.display())]
    RepositoryLocked {
        /// Path of the lock file
        path: PathBuf,
    },

    /// Failure injected on purpose by diagnostics and tests.
    ///
    /// The lifecycle manager never counts these against a unit.
    #[error("INTENTIONAL: {0}")]
    Intentional(String),
}

impl KeyRepoError {
    /// Returns true for failures injected on purpose by diagnostics.
    pub fn is_intentional(&self) -> bool {
        matches!(self, Self::Intentional(_))
    }

    /// Returns a user-friendly recovery suggestion for the error, if available.
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            Self::VersionMismatch { .. } => {
                Some("The repository was written by a different build; it will be rebuilt on next open.")
            }
            Self::Corrupted(_) | Self::Truncated { .. } | Self::InvalidString { .. } => {
                Some("Run 'keyrepo verify' to find damaged entries, then 'keyrepo wipe <unit>' to reindex the unit.")
            }
            Self::RepositoryLocked { .. } => {
                Some("Wait for the other process to finish, or remove the LOCK file if that process is dead.")
            }
            Self::UnitNotFound(_) => Some("List known units with 'keyrepo units'."),
            Self::ConfigError(_) => Some("Check config.toml in the repository directory."),
            _ => None,
        }
    }
}

impl From<redb::Error> for KeyRepoError {
    fn from(e: redb::Error) -> Self {
        Self::Storage(e.to_string())
    }
}

impl From<redb::DatabaseError> for KeyRepoError {
    fn from(e: redb::DatabaseError) -> Self {
        Self::Storage(e.to_string())
    }
}

impl From<redb::TransactionError> for KeyRepoError {
    fn from(e: redb::TransactionError) -> Self {
        Self::Storage(e.to_string())
    }
}

impl From<redb::TableError> for KeyRepoError {
    fn from(e: redb::TableError) -> Self {
        Self::Storage(e.to_string())
    }
}

impl From<redb::StorageError> for KeyRepoError {
    fn from(e: redb::StorageError) -> Self {
        Self::Storage(e.to_string())
    }
}

impl From<redb::CommitError> for KeyRepoError {
    fn from(e: redb::CommitError) -> Self {
        Self::Storage(e.to_string())
    }
}

/// Convenience Result type for keyrepo_core operations.
pub type Result<T> = std::result::Result<T, KeyRepoError>;
