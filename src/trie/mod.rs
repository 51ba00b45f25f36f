//! Merkle Patricia trie
//!
//! Keys are split into nibbles and routed through leaf, extension and branch
//! nodes. Each node's hash covers its children's hashes, so:
//! - the root hash commits to the entire key-value set
//! - unchanged subtrees are shared between versions in the store
//! - any single lookup can be proven against the root alone

pub mod nibbles;
mod node;
mod proof;
mod tree;

pub use nibbles::Nibbles;
pub use node::{Node, NodeRef, INLINE_THRESHOLD, MAX_ITEM_LEN};
pub use proof::{verify_proof, Proof};
pub use tree::{empty_root, Trie};
