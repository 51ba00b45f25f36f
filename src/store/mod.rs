//! Content-addressed node storage
//!
//! The trie only talks to storage through [`NodeStore`]: canonical node bytes
//! saved and loaded by their hash. [`MemoryStore`] is the in-process backend;
//! slower backends (disk, network) plug in behind the same trait.

mod memory_store;

pub use memory_store::MemoryStore;

use crate::model::Hash;
use crate::Result;
use std::sync::Arc;

/// Backing table mapping content addresses to canonical node bytes
///
/// Implementations take `&self` so one store can serve many readers while a
/// single writer appends new nodes. Every operation must be idempotent, so a
/// failed call can simply be retried.
pub trait NodeStore: Send + Sync {
    /// Fetch the bytes saved under `hash`, if any
    fn load(&self, hash: &Hash) -> Result<Option<Vec<u8>>>;

    /// Save canonical bytes under their hash. Saving an existing hash is a no-op.
    fn save(&self, hash: Hash, encoded: Vec<u8>) -> Result<()>;

    /// Drop a node. Removing an unknown hash is a no-op.
    fn remove(&self, hash: &Hash) -> Result<()>;

    /// Check if a hash exists
    fn contains(&self, hash: &Hash) -> Result<bool> {
        Ok(self.load(hash)?.is_some())
    }
}

impl<S: NodeStore + ?Sized> NodeStore for Arc<S> {
    fn load(&self, hash: &Hash) -> Result<Option<Vec<u8>>> {
        (**self).load(hash)
    }

    fn save(&self, hash: Hash, encoded: Vec<u8>) -> Result<()> {
        (**self).save(hash, encoded)
    }

    fn remove(&self, hash: &Hash) -> Result<()> {
        (**self).remove(hash)
    }

    fn contains(&self, hash: &Hash) -> Result<bool> {
        (**self).contains(hash)
    }
}

impl<S: NodeStore + ?Sized> NodeStore for &S {
    fn load(&self, hash: &Hash) -> Result<Option<Vec<u8>>> {
        (**self).load(hash)
    }

    fn save(&self, hash: Hash, encoded: Vec<u8>) -> Result<()> {
        (**self).save(hash, encoded)
    }

    fn remove(&self, hash: &Hash) -> Result<()> {
        (**self).remove(hash)
    }

    fn contains(&self, hash: &Hash) -> Result<bool> {
        (**self).contains(hash)
    }
}
