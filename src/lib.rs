//! # patricia_kv
//!
//! An authenticated key-value store built on a Merkle Patricia trie.
//!
//! Every key-value set has a single root hash. Nodes are stored by the hash of
//! their canonical encoding, so versions share unchanged subtrees, and any
//! lookup can be proven to a party that holds only the root.
//!
//! ## Core Concepts
//!
//! - **Nibble paths**: keys are routed half a byte at a time
//! - **Nodes**: leaf, extension and branch, each with one canonical encoding
//! - **Store**: a content-addressed table behind the [`NodeStore`] trait
//! - **Proofs**: the stored nodes on a lookup path, checked by [`verify_proof`]
//!
//! ## Example
//!
//! ```
//! use patricia_kv::{verify_proof, Blake3, Trie};
//!
//! let mut trie = Trie::in_memory();
//! trie.put(b"0xA", b"100")?;
//! trie.put(b"0xB", b"200")?;
//!
//! let proof = trie.generate_proof(b"0xA")?;
//! assert!(verify_proof::<Blake3>(&trie.root_hash(), b"0xA", Some(b"100"), &proof));
//! # Ok::<(), patricia_kv::Error>(())
//! ```

pub mod model;
pub mod store;
pub mod trie;

mod database;
mod error;

pub use database::Database;
pub use error::{Error, Result};
pub use model::{Blake3, Hash, NodeHasher, Sha256};
pub use store::{MemoryStore, NodeStore};
pub use trie::{empty_root, verify_proof, Node, NodeRef, Proof, Trie};

/// Crate version, reported by the CLI
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Version of the JSON state file layout written by [`Database`]
pub const STATE_FORMAT: u32 = 1;
