//! Core data model types for patricia_kv

mod hash;

pub use hash::{Blake3, Hash, NodeHasher, Sha256};
