//! High-level Database API
//!
//! A [`Trie`] over an in-memory store, paired with a JSON state file so the
//! `pkv` command line can keep a key-value set between invocations. The file
//! records the entries, the hash algorithm and the root they produced;
//! reopening replays the entries and checks that the same root comes back.

use crate::model::{Blake3, Hash, NodeHasher};
use crate::store::MemoryStore;
use crate::trie::{Proof, Trie};
use crate::{Error, Result, STATE_FORMAT};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// On-disk form of a database: hex keys and values plus the committed root
#[derive(Debug, Serialize, Deserialize)]
struct StateFile {
    format: u32,
    hasher: String,
    root: String,
    entries: BTreeMap<String, String>,
}

/// A key-value set kept in a Merkle Patricia trie and saved to a state file
pub struct Database<H: NodeHasher = Blake3> {
    path: PathBuf,
    store: Arc<MemoryStore>,
    trie: Trie<Arc<MemoryStore>, H>,
    /// Whether there are unsaved changes
    dirty: bool,
}

impl<H: NodeHasher> Database<H> {
    /// Create a new, empty database at the given path
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let store = Arc::new(MemoryStore::new());
        let db = Database {
            path: path.as_ref().to_path_buf(),
            trie: Trie::with_hasher(store.clone()),
            store,
            dirty: false,
        };
        db.write_state()?;
        Ok(db)
    }

    /// Open an existing database
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let text = std::fs::read_to_string(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::NotFound(path.display().to_string()),
            _ => Error::Io(e),
        })?;

        let state: StateFile = serde_json::from_str(&text)
            .map_err(|e| Error::InvalidFile(format!("{}: {}", path.display(), e)))?;
        if state.format != STATE_FORMAT {
            return Err(Error::InvalidFile(format!(
                "unsupported state format {} (expected {})",
                state.format, STATE_FORMAT
            )));
        }
        if state.hasher != H::NAME {
            return Err(Error::InvalidFile(format!(
                "state was written with {}, opened with {}",
                state.hasher,
                H::NAME
            )));
        }
        let recorded = Hash::from_hex(&state.root)
            .map_err(|e| Error::InvalidFile(format!("bad root {}: {}", state.root, e)))?;

        let store = Arc::new(MemoryStore::new());
        let mut trie = Trie::with_hasher(store.clone());
        for (key, value) in &state.entries {
            let key = hex::decode(key)
                .map_err(|e| Error::InvalidFile(format!("bad key {}: {}", key, e)))?;
            let value = hex::decode(value)
                .map_err(|e| Error::InvalidFile(format!("bad value {}: {}", value, e)))?;
            trie.put(&key, &value)?;
        }

        if trie.root_hash() != recorded {
            return Err(Error::Corruption(format!(
                "state file records root {} but its entries produce {}",
                recorded,
                trie.root_hash()
            )));
        }

        tracing::debug!(
            target: "pkv::store",
            path = %path.display(),
            entries = state.entries.len(),
            root = %recorded,
            "opened state file"
        );

        Ok(Database {
            path,
            store,
            trie,
            dirty: false,
        })
    }

    /// Open or create a database
    pub fn open_or_create(path: impl AsRef<Path>) -> Result<Self> {
        if path.as_ref().exists() {
            Self::open(path)
        } else {
            Self::create(path)
        }
    }

    // === Key-value operations ===

    pub fn put(&mut self, key: &[u8], value: &[u8]) -> Result<Hash> {
        let before = self.trie.root_hash();
        self.trie.put(key, value)?;
        if self.trie.root_hash() != before {
            self.dirty = true;
        }
        Ok(self.trie.root_hash())
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.trie.get(key)
    }

    /// Delete a key, returning its previous value
    pub fn delete(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let removed = self.trie.delete(key)?;
        if removed.is_some() {
            self.dirty = true;
        }
        Ok(removed)
    }

    pub fn root_hash(&self) -> Hash {
        self.trie.root_hash()
    }

    /// Entries whose key starts with `prefix`, in key order
    pub fn entries(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        self.trie.entries_with_prefix(prefix)
    }

    pub fn generate_proof(&self, key: &[u8]) -> Result<Proof> {
        self.trie.generate_proof(key)
    }

    /// The underlying trie
    pub fn trie(&self) -> &Trie<Arc<MemoryStore>, H> {
        &self.trie
    }

    /// Number of nodes currently held in the store
    pub fn node_count(&self) -> usize {
        self.store.len()
    }

    /// Check if there are unsaved changes
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the current state to disk, then drop nodes older versions left behind
    pub fn sync(&mut self) -> Result<()> {
        self.write_state()?;
        self.dirty = false;

        let live = self.trie.reachable_hashes()?;
        self.store.retain(&live);
        Ok(())
    }

    fn write_state(&self) -> Result<()> {
        let entries = self
            .trie
            .entries()?
            .into_iter()
            .map(|(k, v)| (hex::encode(k), hex::encode(v)))
            .collect();
        let state = StateFile {
            format: STATE_FORMAT,
            hasher: H::NAME.to_string(),
            root: self.trie.root_hash().to_hex(),
            entries,
        };

        // Atomic replace via rename.
        let tmp = self.path.with_extension("tmp");
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp)?;
        file.write_all(serde_json::to_string_pretty(&state)?.as_bytes())?;
        file.sync_all()?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl<H: NodeHasher> std::fmt::Debug for Database<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("path", &self.path)
            .field("trie", &self.trie)
            .field("dirty", &self.dirty)
            .finish()
    }
}
