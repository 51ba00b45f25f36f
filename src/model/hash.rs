//! Content-addressed hash type and pluggable hash providers

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A 32-byte digest used as a node's content address and as the trie root
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Hash([u8; 32]);

impl Hash {
    /// Width of every digest in bytes
    pub const LEN: usize = 32;

    /// Create a hash from raw bytes
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Hash(bytes)
    }

    /// Create a hash from a slice, if it has the right width
    pub fn from_slice(slice: &[u8]) -> Option<Self> {
        let bytes: [u8; 32] = slice.try_into().ok()?;
        Some(Hash(bytes))
    }

    /// Hash arbitrary data with the given provider
    pub fn digest<H: NodeHasher>(data: &[u8]) -> Self {
        H::digest(data)
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string, with or without a `0x` prefix
    pub fn from_hex(s: &str) -> Result<Self> {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(digits)?;
        Hash::from_slice(&bytes).ok_or_else(|| {
            Error::InvalidHash(format!("expected {} bytes, got {}", Self::LEN, bytes.len()))
        })
    }

    /// Get a short prefix for display (first 7 chars, like git)
    pub fn short(&self) -> String {
        self.to_hex()[..7].to_string()
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", self.short())
    }
}

impl AsRef<[u8]> for Hash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// A fixed-width cryptographic hash function used to commit to nodes
///
/// Root hashes are only comparable between tries built with the same provider.
pub trait NodeHasher: Send + Sync + 'static {
    /// Stable name, recorded in state files
    const NAME: &'static str;

    /// Hash arbitrary data
    fn digest(data: &[u8]) -> Hash;
}

/// BLAKE3, the default provider
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Blake3;

impl NodeHasher for Blake3 {
    const NAME: &'static str = "blake3";

    fn digest(data: &[u8]) -> Hash {
        Hash(*blake3::hash(data).as_bytes())
    }
}

/// SHA-256 through the RustCrypto `digest` interface
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Sha256;

impl NodeHasher for Sha256 {
    const NAME: &'static str = "sha256";

    fn digest(data: &[u8]) -> Hash {
        use sha2::Digest;

        let mut hasher = sha2::Sha256::new();
        hasher.update(data);
        Hash(hasher.finalize().into())
    }
}
