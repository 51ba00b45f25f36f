//! Merkle proofs
//!
//! A proof for a key is the list of stored nodes met while looking the key
//! up, root first, each as its canonical bytes. Inline nodes travel inside
//! their parent's bytes. The same shape proves absence: the walk simply ends
//! at an empty slot or a diverging path.

use super::nibbles::Nibbles;
use super::node::{Node, NodeRef};
use super::tree::Trie;
use crate::model::{Hash, NodeHasher};
use crate::store::NodeStore;
use crate::{Error, Result};
use tracing::trace;

/// Ordered node encodings from the root down to where a lookup ends
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Proof {
    nodes: Vec<Vec<u8>>,
}

impl Proof {
    /// Build from raw node encodings, root first
    pub fn from_nodes(nodes: Vec<Vec<u8>>) -> Self {
        Proof { nodes }
    }

    /// The node encodings, root first
    pub fn nodes(&self) -> &[Vec<u8>] {
        &self.nodes
    }

    pub fn into_nodes(self) -> Vec<Vec<u8>> {
        self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Hex-encode each node
    pub fn to_hex(&self) -> Vec<String> {
        self.nodes.iter().map(hex::encode).collect()
    }

    /// Parse hex-encoded nodes, as produced by [`Proof::to_hex`]
    pub fn from_hex<I, T>(nodes: I) -> Result<Self>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        let nodes = nodes
            .into_iter()
            .map(|s| hex::decode(s.as_ref().trim_start_matches("0x")))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::InvalidNode(format!("bad proof node: {}", e)))?;
        Ok(Proof { nodes })
    }
}

impl<S: NodeStore, H: NodeHasher> Trie<S, H> {
    /// Prove the presence or absence of `key` under the current root
    pub fn generate_proof(&self, key: &[u8]) -> Result<Proof> {
        let mut nodes = vec![self.root().canonical_bytes()];
        self.descend(&Nibbles::from_bytes(key), |bytes| nodes.push(bytes.to_vec()))?;
        trace!(
            target: "pkv::proof",
            key = %hex::encode(key),
            nodes = nodes.len(),
            "generated proof"
        );
        Ok(Proof { nodes })
    }
}

/// Check that `proof` shows `key` maps to `value` under `root`
///
/// `value = None` checks absence. Any malformed, tampered, truncated or
/// padded proof yields `false`.
pub fn verify_proof<H: NodeHasher>(
    root: &Hash,
    key: &[u8],
    value: Option<&[u8]>,
    proof: &Proof,
) -> bool {
    match walk::<H>(root, key, proof) {
        Ok(found) => found.as_deref() == value,
        Err(reason) => {
            trace!(target: "pkv::proof", %root, %reason, "proof rejected");
            false
        }
    }
}

/// Replay the lookup of `key` over the proof nodes, checking every hop
fn walk<H: NodeHasher>(
    root: &Hash,
    key: &[u8],
    proof: &Proof,
) -> std::result::Result<Option<Vec<u8>>, String> {
    let path = Nibbles::from_bytes(key);
    let path = path.as_slice();
    let mut pos = 0;
    let mut expected = *root;
    let mut used = 0;

    let found = 'stored: loop {
        let bytes = proof
            .nodes
            .get(used)
            .ok_or_else(|| format!("proof ends before node {}", expected.short()))?;
        if H::digest(bytes) != expected {
            return Err(format!("node {} does not match expected hash", used));
        }
        let mut node = Node::decode(bytes).map_err(|e| e.to_string())?;
        used += 1;

        // Inline children are already covered by the parent's digest.
        loop {
            let rest = &path[pos..];
            let next = match node {
                Node::Empty => break 'stored None,
                Node::Leaf {
                    path: leaf_path,
                    value,
                } => break 'stored (leaf_path.as_slice() == rest).then_some(value),
                Node::Extension {
                    path: ext_path,
                    child,
                } => {
                    if !rest.starts_with(ext_path.as_slice()) {
                        break 'stored None;
                    }
                    pos += ext_path.len();
                    child
                }
                Node::Branch {
                    mut children,
                    value,
                } => match rest.first() {
                    None => break 'stored value,
                    Some(nibble) => {
                        pos += 1;
                        std::mem::take(&mut children[*nibble as usize])
                    }
                },
            };

            match next {
                NodeRef::Empty => break 'stored None,
                NodeRef::Inline(child) => node = *child,
                NodeRef::Hash(hash) => {
                    expected = hash;
                    break;
                }
            }
        }
    };

    if used != proof.nodes.len() {
        return Err(format!(
            "{} trailing nodes not on the lookup path",
            proof.nodes.len() - used
        ));
    }
    Ok(found)
}
