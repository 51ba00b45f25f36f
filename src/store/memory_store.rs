//! In-memory node store

use super::NodeStore;
use crate::model::Hash;
use crate::Result;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};

/// A content-addressed node table held in memory
///
/// Nodes are never mutated once saved, so readers holding an old root keep
/// seeing the same version until [`MemoryStore::retain`] sweeps it.
#[derive(Default)]
pub struct MemoryStore {
    nodes: RwLock<HashMap<Hash, Vec<u8>>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        MemoryStore {
            nodes: RwLock::new(HashMap::new()),
        }
    }

    /// Get the number of nodes in the store
    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    /// Check if the store holds no nodes
    pub fn is_empty(&self) -> bool {
        self.nodes.read().is_empty()
    }

    /// All hashes currently stored
    pub fn hashes(&self) -> Vec<Hash> {
        self.nodes.read().keys().copied().collect()
    }

    /// Drop every node not in `live`, returning how many were removed
    ///
    /// `live` is usually the union of `Trie::reachable_hashes` over every
    /// version the caller still needs.
    pub fn retain(&self, live: &HashSet<Hash>) -> usize {
        let mut nodes = self.nodes.write();
        let before = nodes.len();
        nodes.retain(|hash, _| live.contains(hash));
        let removed = before - nodes.len();
        tracing::debug!(
            target: "pkv::store",
            removed,
            kept = nodes.len(),
            "swept unreachable nodes"
        );
        removed
    }
}

impl NodeStore for MemoryStore {
    fn load(&self, hash: &Hash) -> Result<Option<Vec<u8>>> {
        Ok(self.nodes.read().get(hash).cloned())
    }

    fn save(&self, hash: Hash, encoded: Vec<u8>) -> Result<()> {
        self.nodes.write().entry(hash).or_insert(encoded);
        Ok(())
    }

    fn remove(&self, hash: &Hash) -> Result<()> {
        self.nodes.write().remove(hash);
        Ok(())
    }

    fn contains(&self, hash: &Hash) -> Result<bool> {
        Ok(self.nodes.read().contains_key(hash))
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("nodes", &self.len())
            .finish()
    }
}
