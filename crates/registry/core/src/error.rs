//! Error types for registry persistence.
//!
//! Everything here is recoverable by design: a failed snapshot load leaves
//! the state empty and the caller rebuilds from the live data source.
//! Contract violations (wrong thread, duplicate identifiers) are panics,
//! not errors — they indicate a programming error by a collaborator.

use thiserror::Error;

/// Failure while writing a registry snapshot.
#[derive(Debug, Error)]
pub enum SaveError {
    #[error("failed to encode snapshot body: {0}")]
    Encode(#[from] bincode::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Failure while reading a registry snapshot.
///
/// Variants mirror the load validation ladder; whichever stage fails, the
/// state is reset to empty and no partial data is retained.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("snapshot magic mismatch")]
    BadMagic,

    #[error("snapshot version {found} is newer than the supported {latest}")]
    NewerVersion { found: u32, latest: u32 },

    #[error("snapshot was produced by data source '{found}', expected '{expected}'")]
    DataSourceMismatch { expected: String, found: String },

    #[error("snapshot cooked flag is {found}, expected {expected}")]
    CookedMismatch { expected: bool, found: bool },

    #[error("snapshot body checksum mismatch: expected {expected:#010x}, found {found:#010x}")]
    ChecksumMismatch { expected: u32, found: u32 },

    #[error("snapshot body is truncated or malformed")]
    Malformed,

    #[error("snapshot references an unknown payload schema '{schema}'")]
    UnknownSchema { schema: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
