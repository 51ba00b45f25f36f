//! Error types for patricia_kv

use thiserror::Error;

/// Result type alias for patricia_kv operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in patricia_kv operations
///
/// Absent keys are never errors: lookups and deletes report them as `None`.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A node the trie refers to is missing from the backing store, or its
    /// stored bytes no longer match their content address.
    #[error("Corruption detected: {0}")]
    Corruption(String),

    #[error("Invalid node encoding: {0}")]
    InvalidNode(String),

    #[error("Invalid hash: {0}")]
    InvalidHash(String),

    #[error("Invalid state file: {0}")]
    InvalidFile(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl From<hex::FromHexError> for Error {
    fn from(error: hex::FromHexError) -> Self {
        Error::InvalidHash(error.to_string())
    }
}
