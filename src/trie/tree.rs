//! Merkle Patricia trie engine
//!
//! Nodes are values: every mutation rebuilds the nodes on the affected path
//! and commits them to the store, leaving the previous version intact. The
//! trie keeps its shape canonical so the root hash depends only on the
//! current key-value set:
//! - no extension has an empty path, and every extension points at a branch
//! - every branch holds at least two of (children, own value)

use super::nibbles::{common_prefix_len, Nibbles};
use super::node::{Node, NodeRef, INLINE_THRESHOLD, MAX_ITEM_LEN};
use crate::model::{Blake3, Hash, NodeHasher};
use crate::store::{MemoryStore, NodeStore};
use crate::{Error, Result};
use std::borrow::Cow;
use std::collections::HashSet;
use std::marker::PhantomData;
use tracing::{trace, warn};

/// Root hash of a trie with no keys: the digest of the empty node's encoding
pub fn empty_root<H: NodeHasher>() -> Hash {
    Node::Empty.hash::<H>()
}

/// An authenticated key-value map
///
/// Single writer, many readers: `put` and `delete` take `&mut self`, while
/// [`Trie::snapshot`] hands out read-only versions that share the store and
/// are unaffected by later writes.
pub struct Trie<S: NodeStore, H: NodeHasher = Blake3> {
    store: S,
    root: Node,
    root_hash: Hash,
    _hasher: PhantomData<fn() -> H>,
}

impl Trie<MemoryStore, Blake3> {
    /// Create an empty trie over a fresh in-memory store
    pub fn in_memory() -> Self {
        Trie::new(MemoryStore::new())
    }
}

impl<S: NodeStore> Trie<S, Blake3> {
    /// Create an empty trie hashing with BLAKE3
    pub fn new(store: S) -> Self {
        Trie::with_hasher(store)
    }
}

impl<S: NodeStore, H: NodeHasher> Trie<S, H> {
    /// Create an empty trie with an explicit hash provider
    pub fn with_hasher(store: S) -> Self {
        Trie {
            store,
            root: Node::Empty,
            root_hash: empty_root::<H>(),
            _hasher: PhantomData,
        }
    }

    /// Reopen a committed version by its root hash
    pub fn from_root(store: S, root_hash: Hash) -> Result<Self> {
        let mut trie = Trie::with_hasher(store);
        if root_hash != trie.root_hash {
            trie.root = trie.load_node(&root_hash)?;
            trie.root_hash = root_hash;
        }
        Ok(trie)
    }

    /// Get the root hash
    pub fn root_hash(&self) -> Hash {
        self.root_hash
    }

    /// The current root node
    pub fn root(&self) -> &Node {
        &self.root
    }

    /// The backing store
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Check if trie is empty
    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    /// A read-only copy of the current version sharing the same store
    pub fn snapshot(&self) -> Self
    where
        S: Clone,
    {
        Trie {
            store: self.store.clone(),
            root: self.root.clone(),
            root_hash: self.root_hash,
            _hasher: PhantomData,
        }
    }

    /// Get value for key
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.descend(&Nibbles::from_bytes(key), |_| {})
    }

    /// Check if a key is present
    pub fn contains(&self, key: &[u8]) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Insert or overwrite a key-value pair
    pub fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        if key.len() > MAX_ITEM_LEN || value.len() > MAX_ITEM_LEN {
            return Err(Error::InvalidNode(format!(
                "key of {} bytes or value of {} bytes is too large",
                key.len(),
                value.len()
            )));
        }

        let path = Nibbles::from_bytes(key);
        let new_root = self.insert_at(self.root.clone(), path.as_slice(), value.to_vec())?;
        self.set_root(new_root)?;
        trace!(target: "pkv::trie", key = %hex::encode(key), root = %self.root_hash, "put");
        Ok(())
    }

    /// Delete a key, returning its value. Deleting an absent key changes nothing.
    pub fn delete(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let path = Nibbles::from_bytes(key);
        let Some((new_root, removed)) = self.remove_at(&self.root, path.as_slice())? else {
            return Ok(None);
        };
        self.set_root(new_root)?;
        trace!(target: "pkv::trie", key = %hex::encode(key), root = %self.root_hash, "delete");
        Ok(Some(removed))
    }

    /// All key-value pairs, in key order
    pub fn entries(&self) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        self.entries_with_prefix(&[])
    }

    /// All key-value pairs whose key starts with `prefix`, in key order
    pub fn entries_with_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut results = Vec::new();
        self.collect_prefix(
            &self.root,
            &Nibbles::from_bytes(prefix),
            Nibbles::new(),
            &mut results,
        )?;
        Ok(results)
    }

    /// Number of keys
    pub fn len(&self) -> Result<usize> {
        Ok(self.entries()?.len())
    }

    /// Every stored hash reachable from the root, including the root itself
    pub fn reachable_hashes(&self) -> Result<HashSet<Hash>> {
        let mut live = HashSet::new();
        if !self.root.is_empty() {
            live.insert(self.root_hash);
            self.mark(&self.root, &mut live)?;
        }
        Ok(live)
    }

    // === Internal helpers ===

    /// Follow `path` from the root, handing `visit` the stored bytes of every
    /// hash-referenced node on the way down.
    pub(crate) fn descend(
        &self,
        path: &Nibbles,
        mut visit: impl FnMut(&[u8]),
    ) -> Result<Option<Vec<u8>>> {
        let path = path.as_slice();
        let mut pos = 0;
        let mut current: Cow<'_, Node> = Cow::Borrowed(&self.root);

        loop {
            let rest = &path[pos..];
            let next = match &*current {
                Node::Empty => return Ok(None),
                Node::Leaf {
                    path: leaf_path,
                    value,
                } => {
                    return Ok((leaf_path.as_slice() == rest).then(|| value.clone()));
                }
                Node::Extension {
                    path: ext_path,
                    child,
                } => {
                    if !rest.starts_with(ext_path.as_slice()) {
                        return Ok(None);
                    }
                    pos += ext_path.len();
                    child.clone()
                }
                Node::Branch { children, value } => match rest.first() {
                    None => return Ok(value.clone()),
                    Some(nibble) => {
                        pos += 1;
                        children[*nibble as usize].clone()
                    }
                },
            };

            current = match next {
                NodeRef::Empty => return Ok(None),
                NodeRef::Inline(node) => Cow::Owned(*node),
                NodeRef::Hash(hash) => {
                    let (node, bytes) = self.load_encoded(&hash)?;
                    visit(&bytes);
                    Cow::Owned(node)
                }
            };
        }
    }

    fn set_root(&mut self, root: Node) -> Result<()> {
        if root.is_empty() {
            self.root_hash = empty_root::<H>();
        } else {
            let bytes = root.canonical_bytes();
            let hash = H::digest(&bytes);
            self.store.save(hash, bytes)?;
            self.root_hash = hash;
        }
        self.root = root;
        Ok(())
    }

    fn load_encoded(&self, hash: &Hash) -> Result<(Node, Vec<u8>)> {
        let bytes = self.store.load(hash)?.ok_or_else(|| {
            warn!(target: "pkv::trie", %hash, "referenced node missing from store");
            Error::Corruption(format!("node {} missing from store", hash))
        })?;
        if H::digest(&bytes) != *hash {
            return Err(Error::Corruption(format!(
                "node {} does not match its content address",
                hash
            )));
        }
        let node = Node::decode(&bytes)
            .map_err(|e| Error::Corruption(format!("node {} is undecodable: {}", hash, e)))?;
        Ok((node, bytes))
    }

    fn load_node(&self, hash: &Hash) -> Result<Node> {
        self.load_encoded(hash).map(|(node, _)| node)
    }

    fn resolve<'a>(&self, node_ref: &'a NodeRef) -> Result<Cow<'a, Node>> {
        match node_ref {
            NodeRef::Empty => Ok(Cow::Owned(Node::Empty)),
            NodeRef::Inline(node) => Ok(Cow::Borrowed(node.as_ref())),
            NodeRef::Hash(hash) => self.load_node(hash).map(Cow::Owned),
        }
    }

    /// Turn a rebuilt child into the reference its parent will hold
    fn commit_child(&self, node: Node) -> Result<NodeRef> {
        if node.is_empty() {
            return Ok(NodeRef::Empty);
        }

        let bytes = node.canonical_bytes();
        if bytes.len() < INLINE_THRESHOLD {
            return Ok(NodeRef::Inline(Box::new(node)));
        }

        let hash = H::digest(&bytes);
        self.store.save(hash, bytes)?;
        Ok(NodeRef::Hash(hash))
    }

    /// Put `value` into a fresh branch at `rest`: its own value when `rest`
    /// is exhausted, otherwise a leaf under the first nibble.
    fn place(
        &self,
        children: &mut [NodeRef; 16],
        slot_value: &mut Option<Vec<u8>>,
        rest: &[u8],
        value: Vec<u8>,
    ) -> Result<()> {
        match rest.split_first() {
            None => *slot_value = Some(value),
            Some((nibble, tail)) => {
                let leaf = Node::leaf(Nibbles::from_slice(tail), value);
                children[*nibble as usize] = self.commit_child(leaf)?;
            }
        }
        Ok(())
    }

    fn wrap_in_extension(&self, prefix: &[u8], branch: Node) -> Result<Node> {
        if prefix.is_empty() {
            Ok(branch)
        } else {
            let child = self.commit_child(branch)?;
            Ok(Node::extension(Nibbles::from_slice(prefix), child))
        }
    }

    /// Insert below `node`; `path` is the part of the key not yet consumed
    fn insert_at(&self, node: Node, path: &[u8], value: Vec<u8>) -> Result<Node> {
        match node {
            Node::Empty => Ok(Node::leaf(Nibbles::from_slice(path), value)),

            Node::Leaf {
                path: leaf_path,
                value: leaf_value,
            } => {
                if leaf_path.as_slice() == path {
                    return Ok(Node::leaf(leaf_path, value));
                }

                // Split at the divergence point; the two keys differ there.
                let leaf_path = leaf_path.as_slice();
                let common = common_prefix_len(path, leaf_path);
                let mut children: [NodeRef; 16] = Default::default();
                let mut branch_value = None;
                self.place(
                    &mut children,
                    &mut branch_value,
                    &leaf_path[common..],
                    leaf_value,
                )?;
                self.place(&mut children, &mut branch_value, &path[common..], value)?;

                let branch = Node::Branch {
                    children: Box::new(children),
                    value: branch_value,
                };
                self.wrap_in_extension(&path[..common], branch)
            }

            Node::Extension {
                path: ext_path,
                child,
            } => {
                let common = common_prefix_len(path, ext_path.as_slice());

                if common == ext_path.len() {
                    let child_node = self.resolve(&child)?.into_owned();
                    let new_child = self.insert_at(child_node, &path[common..], value)?;
                    return Ok(Node::extension(ext_path, self.commit_child(new_child)?));
                }

                // Split the extension: its tail hangs off a new branch.
                let ext = ext_path.as_slice();
                let ext_tail = &ext[common + 1..];
                let mut children: [NodeRef; 16] = Default::default();
                let mut branch_value = None;

                children[ext[common] as usize] = if ext_tail.is_empty() {
                    child
                } else {
                    let shorter = Node::extension(Nibbles::from_slice(ext_tail), child);
                    self.commit_child(shorter)?
                };
                self.place(&mut children, &mut branch_value, &path[common..], value)?;

                let branch = Node::Branch {
                    children: Box::new(children),
                    value: branch_value,
                };
                self.wrap_in_extension(&ext[..common], branch)
            }

            Node::Branch {
                mut children,
                value: branch_value,
            } => match path.split_first() {
                None => Ok(Node::Branch {
                    children,
                    value: Some(value),
                }),
                Some((nibble, tail)) => {
                    let idx = *nibble as usize;
                    let child = std::mem::take(&mut children[idx]);
                    let child_node = self.resolve(&child)?.into_owned();
                    let new_child = self.insert_at(child_node, tail, value)?;
                    children[idx] = self.commit_child(new_child)?;

                    Ok(Node::Branch {
                        children,
                        value: branch_value,
                    })
                }
            },
        }
    }

    /// Remove `path` below `node`. `None` means the key is absent and nothing changes.
    fn remove_at(&self, node: &Node, path: &[u8]) -> Result<Option<(Node, Vec<u8>)>> {
        match node {
            Node::Empty => Ok(None),

            Node::Leaf {
                path: leaf_path,
                value,
            } => {
                if leaf_path.as_slice() == path {
                    Ok(Some((Node::Empty, value.clone())))
                } else {
                    Ok(None)
                }
            }

            Node::Extension {
                path: ext_path,
                child,
            } => {
                let Some(tail) = path.strip_prefix(ext_path.as_slice()) else {
                    return Ok(None);
                };

                let child_node = self.resolve(child)?;
                match self.remove_at(&child_node, tail)? {
                    None => Ok(None),
                    Some((new_child, removed)) => Ok(Some((
                        self.collapse_extension(ext_path.clone(), new_child)?,
                        removed,
                    ))),
                }
            }

            Node::Branch { children, value } => {
                let Some((nibble, tail)) = path.split_first() else {
                    return match value {
                        None => Ok(None),
                        Some(removed) => Ok(Some((
                            self.collapse_branch(children.clone(), None)?,
                            removed.clone(),
                        ))),
                    };
                };

                let idx = *nibble as usize;
                if children[idx].is_empty() {
                    return Ok(None);
                }

                let child_node = self.resolve(&children[idx])?;
                match self.remove_at(&child_node, tail)? {
                    None => Ok(None),
                    Some((new_child, removed)) => {
                        let mut children = children.clone();
                        children[idx] = self.commit_child(new_child)?;
                        let collapsed = self.collapse_branch(children, value.clone())?;
                        Ok(Some((collapsed, removed)))
                    }
                }
            }
        }
    }

    /// Re-attach an extension's path to its rewritten child
    fn collapse_extension(&self, path: Nibbles, child: Node) -> Result<Node> {
        match child {
            Node::Empty => Ok(Node::Empty),

            Node::Leaf {
                path: child_path,
                value,
            } => {
                let mut merged = path;
                merged.extend(&child_path);
                Ok(Node::leaf(merged, value))
            }

            Node::Extension {
                path: child_path,
                child: grandchild,
            } => {
                let mut merged = path;
                merged.extend(&child_path);
                Ok(Node::extension(merged, grandchild))
            }

            branch @ Node::Branch { .. } => {
                Ok(Node::extension(path, self.commit_child(branch)?))
            }
        }
    }

    /// Bring a branch that lost an occupant back to canonical shape
    fn collapse_branch(
        &self,
        children: Box<[NodeRef; 16]>,
        value: Option<Vec<u8>>,
    ) -> Result<Node> {
        let occupied: Vec<usize> = children
            .iter()
            .enumerate()
            .filter(|(_, child)| !child.is_empty())
            .map(|(idx, _)| idx)
            .collect();

        match (occupied.as_slice(), value) {
            ([], None) => Ok(Node::Empty),
            ([], Some(value)) => Ok(Node::leaf(Nibbles::new(), value)),
            ([idx], None) => {
                let idx = *idx;
                let child_ref = &children[idx];
                let nibble = idx as u8;

                match self.resolve(child_ref)?.into_owned() {
                    Node::Empty => Ok(Node::Empty),
                    Node::Leaf { path, value } => {
                        Ok(Node::leaf(Nibbles::new().join(nibble, &path), value))
                    }
                    Node::Extension { path, child } => {
                        Ok(Node::extension(Nibbles::new().join(nibble, &path), child))
                    }
                    Node::Branch { .. } => {
                        Ok(Node::extension(Nibbles::single(nibble), child_ref.clone()))
                    }
                }
            }
            (_, value) => Ok(Node::Branch { children, value }),
        }
    }

    fn collect_prefix(
        &self,
        node: &Node,
        prefix: &Nibbles,
        current: Nibbles,
        results: &mut Vec<(Vec<u8>, Vec<u8>)>,
    ) -> Result<()> {
        // Only keep going while the walked path and the prefix agree.
        if !current.starts_with(prefix) && !prefix.starts_with(&current) {
            return Ok(());
        }

        match node {
            Node::Empty => {}
            Node::Leaf { path, value } => {
                let mut full = current;
                full.extend(path);
                if full.starts_with(prefix) {
                    results.push((self.key_bytes(&full)?, value.clone()));
                }
            }
            Node::Extension { path, child } => {
                let mut below = current;
                below.extend(path);
                let child_node = self.resolve(child)?;
                self.collect_prefix(&child_node, prefix, below, results)?;
            }
            Node::Branch { children, value } => {
                if let Some(v) = value {
                    if current.starts_with(prefix) {
                        results.push((self.key_bytes(&current)?, v.clone()));
                    }
                }
                for (idx, child) in children.iter().enumerate() {
                    if child.is_empty() {
                        continue;
                    }
                    let mut below = current.clone();
                    below.push(idx as u8);
                    let child_node = self.resolve(child)?;
                    self.collect_prefix(&child_node, prefix, below, results)?;
                }
            }
        }
        Ok(())
    }

    fn key_bytes(&self, path: &Nibbles) -> Result<Vec<u8>> {
        let Some(bytes) = path.to_bytes() else {
            return Err(Error::Corruption(format!("value stored at odd-length path {}", path)));
        };
        Ok(bytes)
    }

    fn mark(&self, node: &Node, live: &mut HashSet<Hash>) -> Result<()> {
        let refs: Vec<&NodeRef> = match node {
            Node::Empty | Node::Leaf { .. } => return Ok(()),
            Node::Extension { child, .. } => vec![child],
            Node::Branch { children, .. } => children.iter().collect(),
        };

        for child in refs {
            match child {
                NodeRef::Empty => {}
                NodeRef::Inline(inline) => self.mark(inline, live)?,
                NodeRef::Hash(hash) => {
                    if live.insert(*hash) {
                        let loaded = self.load_node(hash)?;
                        self.mark(&loaded, live)?;
                    }
                }
            }
        }
        Ok(())
    }
}

impl<S: NodeStore, H: NodeHasher> std::fmt::Debug for Trie<S, H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Trie")
            .field("hasher", &H::NAME)
            .field("root_hash", &self.root_hash)
            .field("root", &self.root.kind())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Sha256;
    use std::sync::Arc;

    fn build(pairs: &[(&[u8], &[u8])]) -> Trie<MemoryStore> {
        let mut trie = Trie::in_memory();
        for (k, v) in pairs {
            trie.put(k, v).unwrap();
        }
        trie
    }

    #[test]
    fn test_empty_trie() {
        let trie = Trie::in_memory();
        assert!(trie.is_empty());
        assert_eq!(trie.root_hash(), empty_root::<Blake3>());
        assert_eq!(trie.root_hash(), Blake3::digest(&[0x00]));
        assert_eq!(trie.get(b"anything").unwrap(), None);
    }

    #[test]
    fn test_empty_root_depends_on_hasher() {
        let trie: Trie<MemoryStore, Sha256> = Trie::with_hasher(MemoryStore::new());
        assert_eq!(trie.root_hash(), Sha256::digest(&[0x00]));
        assert_ne!(trie.root_hash(), empty_root::<Blake3>());
    }

    #[test]
    fn test_single_key_is_one_leaf() {
        let trie = build(&[(b"hello", b"world")]);

        let leaf = Node::leaf(Nibbles::from_bytes(b"hello"), b"world".to_vec());
        assert_eq!(trie.root(), &leaf);
        assert_eq!(trie.root_hash(), leaf.hash::<Blake3>());
        assert_eq!(trie.get(b"hello").unwrap(), Some(b"world".to_vec()));
        assert_eq!(trie.get(b"hell").unwrap(), None);
        assert_eq!(trie.get(b"hello!").unwrap(), None);
    }

    #[test]
    fn test_shared_prefix_keys() {
        let trie = build(&[
            (b"do", b"verb"),
            (b"dog", b"puppy"),
            (b"doge", b"coin"),
            (b"horse", b"stallion"),
        ]);

        assert_eq!(trie.get(b"do").unwrap(), Some(b"verb".to_vec()));
        assert_eq!(trie.get(b"dog").unwrap(), Some(b"puppy".to_vec()));
        assert_eq!(trie.get(b"doge").unwrap(), Some(b"coin".to_vec()));
        assert_eq!(trie.get(b"horse").unwrap(), Some(b"stallion".to_vec()));
        assert_eq!(trie.get(b"d").unwrap(), None);
        assert_eq!(trie.get(b"cat").unwrap(), None);
        assert_eq!(trie.len().unwrap(), 4);
    }

    #[test]
    fn test_empty_key() {
        let mut trie = build(&[(b"", b"root value"), (b"a", b"1")]);
        assert_eq!(trie.get(b"").unwrap(), Some(b"root value".to_vec()));
        assert_eq!(trie.get(b"a").unwrap(), Some(b"1".to_vec()));

        trie.delete(b"").unwrap();
        assert_eq!(trie.root_hash(), build(&[(b"a", b"1")]).root_hash());
    }

    #[test]
    fn test_update_and_idempotence() {
        let mut trie = build(&[(b"key", b"value1"), (b"other", b"x")]);
        let before = trie.root_hash();

        trie.put(b"key", b"value1").unwrap();
        assert_eq!(trie.root_hash(), before);

        trie.put(b"key", b"value2").unwrap();
        assert_eq!(trie.get(b"key").unwrap(), Some(b"value2".to_vec()));
        assert_ne!(trie.root_hash(), before);
    }

    #[test]
    fn test_account_scenario() {
        let mut trie = build(&[(b"0xA", b"100"), (b"0xB", b"200"), (b"0xC", b"300")]);
        let r1 = trie.root_hash();

        trie.put(b"0xB", b"250").unwrap();
        let r2 = trie.root_hash();
        assert_ne!(r1, r2);

        assert_eq!(trie.delete(b"0xB").unwrap(), Some(b"250".to_vec()));
        trie.put(b"0xB", b"200").unwrap();
        assert_eq!(trie.root_hash(), r1);
    }

    #[test]
    fn test_delete_restores_previous_root() {
        let mut trie = build(&[
            (b"do", b"verb"),
            (b"dog", b"puppy"),
            (b"horse", b"stallion"),
        ]);
        let before = trie.root_hash();

        for key in [&b"doge"[..], b"d", b"", b"horses", b"zebra"] {
            trie.put(key, b"temporary").unwrap();
            assert_ne!(trie.root_hash(), before);
            trie.delete(key).unwrap();
            assert_eq!(trie.root_hash(), before, "key {:?}", key);
        }
    }

    #[test]
    fn test_delete_collapses_to_fresh_shape() {
        let mut trie = build(&[
            (b"do", b"verb"),
            (b"dog", b"puppy"),
            (b"doge", b"coin"),
            (b"horse", b"stallion"),
        ]);

        trie.delete(b"dog").unwrap();
        trie.delete(b"horse").unwrap();

        let fresh = build(&[(b"do", b"verb"), (b"doge", b"coin")]);
        assert_eq!(trie.root(), fresh.root());
        assert_eq!(trie.root_hash(), fresh.root_hash());

        trie.delete(b"do").unwrap();
        trie.delete(b"doge").unwrap();
        assert!(trie.is_empty());
        assert_eq!(trie.root_hash(), empty_root::<Blake3>());
    }

    #[test]
    fn test_delete_absent_is_noop() {
        let mut trie = build(&[(b"dog", b"puppy"), (b"doge", b"coin")]);
        let before = trie.root_hash();

        assert_eq!(trie.delete(b"do").unwrap(), None);
        assert_eq!(trie.delete(b"cat").unwrap(), None);
        assert_eq!(trie.delete(b"dogecoin").unwrap(), None);
        assert_eq!(trie.root_hash(), before);

        let mut empty = Trie::in_memory();
        assert_eq!(empty.delete(b"x").unwrap(), None);
    }

    #[test]
    fn test_many_keys() {
        let mut trie = Trie::in_memory();
        for i in 0u32..200 {
            trie.put(format!("key{}", i).as_bytes(), format!("value{}", i).as_bytes())
                .unwrap();
        }
        for i in 0u32..200 {
            assert_eq!(
                trie.get(format!("key{}", i).as_bytes()).unwrap(),
                Some(format!("value{}", i).into_bytes())
            );
        }
        for i in (0u32..200).step_by(2) {
            trie.delete(format!("key{}", i).as_bytes()).unwrap();
        }
        assert_eq!(trie.len().unwrap(), 100);
        assert_eq!(trie.get(b"key10").unwrap(), None);
        assert_eq!(trie.get(b"key11").unwrap(), Some(b"value11".to_vec()));
    }

    #[test]
    fn test_small_children_are_inlined() {
        let trie = build(&[(b"a", b"1"), (b"b", b"2")]);

        // "a" and "b" share their high nibble: extension [6] over a branch
        // whose two tiny leaves are embedded rather than stored.
        let branch_hash = match trie.root() {
            Node::Extension { path, child } => {
                assert_eq!(path, &Nibbles::single(6));
                child.as_hash().unwrap()
            }
            other => panic!("expected extension, got {:?}", other),
        };
        let branch = Node::decode(&trie.store().load(&branch_hash).unwrap().unwrap()).unwrap();
        match branch {
            Node::Branch { children, value } => {
                assert!(value.is_none());
                assert!(matches!(children[1], NodeRef::Inline(_)));
                assert!(matches!(children[2], NodeRef::Inline(_)));
            }
            other => panic!("expected branch, got {:?}", other),
        }
        // The first version's root leaf is still stored until swept.
        let live = trie.reachable_hashes().unwrap();
        assert_eq!(live, HashSet::from([trie.root_hash(), branch_hash]));
        assert_eq!(trie.store().len(), 3);
        assert_eq!(trie.store().retain(&live), 1);
        assert_eq!(trie.store().len(), 2);
        assert_eq!(trie.get(b"a").unwrap(), Some(b"1".to_vec()));
    }

    #[test]
    fn test_deeply_nested_keys() {
        // Each key extends the previous one, so every insert splits a leaf
        // or extension at the end of a long shared run.
        let keys: Vec<Vec<u8>> = (1..=200).map(|n| vec![0xab; n]).collect();
        let mut trie = Trie::in_memory();
        let mut roots = vec![trie.root_hash()];
        for (i, key) in keys.iter().enumerate() {
            trie.put(key, format!("depth {}", i).as_bytes()).unwrap();
            roots.push(trie.root_hash());
        }

        for (i, key) in keys.iter().enumerate() {
            assert_eq!(trie.get(key).unwrap(), Some(format!("depth {}", i).into_bytes()));
        }
        assert_eq!(trie.get(&[0xab; 201]).unwrap(), None);
        assert_eq!(trie.get(&[0xab, 0xac]).unwrap(), None);

        for key in keys.iter().rev() {
            roots.pop();
            assert!(trie.delete(key).unwrap().is_some());
            assert_eq!(Some(&trie.root_hash()), roots.last());
        }
        assert!(trie.is_empty());
    }

    #[test]
    fn test_entries_with_prefix() {
        let trie = build(&[
            (b"t:thought1", b"t1"),
            (b"t:thought2", b"t2"),
            (b"e:edge1", b"e1"),
        ]);

        let thoughts = trie.entries_with_prefix(b"t:").unwrap();
        assert_eq!(
            thoughts,
            vec![
                (b"t:thought1".to_vec(), b"t1".to_vec()),
                (b"t:thought2".to_vec(), b"t2".to_vec()),
            ]
        );
        assert_eq!(trie.entries_with_prefix(b"e:").unwrap().len(), 1);
        assert_eq!(trie.entries().unwrap().len(), 3);
        assert!(trie.entries_with_prefix(b"x").unwrap().is_empty());
    }

    #[test]
    fn test_from_root_reopens_version() {
        let store = Arc::new(MemoryStore::new());
        let mut trie = Trie::new(store.clone());
        trie.put(b"apple", b"red").unwrap();
        trie.put(b"banana", b"yellow").unwrap();
        let v1 = trie.root_hash();

        trie.put(b"apple", b"green").unwrap();

        let old = Trie::<_, Blake3>::from_root(store.clone(), v1).unwrap();
        assert_eq!(old.get(b"apple").unwrap(), Some(b"red".to_vec()));
        assert_eq!(old.root_hash(), v1);

        let empty = Trie::<_, Blake3>::from_root(store, empty_root::<Blake3>()).unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn test_from_unknown_root_is_corruption() {
        let result = Trie::<_, Blake3>::from_root(MemoryStore::new(), Blake3::digest(b"nope"));
        assert!(matches!(result, Err(Error::Corruption(_))));
    }

    #[test]
    fn test_missing_node_is_corruption() {
        let store = Arc::new(MemoryStore::new());
        let mut trie = Trie::new(store.clone());
        for i in 0u32..20 {
            let value = format!("a value long enough to be stored on its own {}", i);
            trie.put(format!("key{}", i).as_bytes(), value.as_bytes()).unwrap();
        }

        let root = trie.root_hash();
        for hash in store.hashes() {
            if hash != root {
                store.remove(&hash).unwrap();
            }
        }

        assert!(matches!(trie.get(b"key7"), Err(Error::Corruption(_))));
        assert!(matches!(trie.put(b"key7", b"x"), Err(Error::Corruption(_))));
        // A failed write leaves the trie on its previous root.
        assert_eq!(trie.root_hash(), root);
    }

    #[test]
    fn test_snapshot_is_isolated() {
        let mut trie = Trie::new(Arc::new(MemoryStore::new()));
        trie.put(b"k", b"v1").unwrap();

        let snapshot = trie.snapshot();
        trie.put(b"k", b"v2").unwrap();
        trie.put(b"k2", b"v3").unwrap();

        assert_eq!(snapshot.get(b"k").unwrap(), Some(b"v1".to_vec()));
        assert_eq!(snapshot.get(b"k2").unwrap(), None);
        assert_eq!(trie.get(b"k").unwrap(), Some(b"v2".to_vec()));
    }

    #[test]
    fn test_concurrent_readers() {
        let mut trie = Trie::new(Arc::new(MemoryStore::new()));
        for i in 0u32..100 {
            trie.put(&i.to_be_bytes(), format!("value {}", i).as_bytes()).unwrap();
        }
        let snapshot = trie.snapshot();

        std::thread::scope(|scope| {
            for t in 0u32..4 {
                let reader = &snapshot;
                scope.spawn(move || {
                    for i in (t..100).step_by(4) {
                        assert_eq!(
                            reader.get(&i.to_be_bytes()).unwrap(),
                            Some(format!("value {}", i).into_bytes())
                        );
                    }
                });
            }

            // The writer keeps going on its own version.
            for i in 0u32..100 {
                trie.put(&i.to_be_bytes(), b"rewritten").unwrap();
            }
        });

        assert_eq!(snapshot.get(&7u32.to_be_bytes()).unwrap(), Some(b"value 7".to_vec()));
        assert_eq!(trie.get(&7u32.to_be_bytes()).unwrap(), Some(b"rewritten".to_vec()));
    }

    #[test]
    fn test_reachable_hashes_and_gc() {
        let store = Arc::new(MemoryStore::new());
        let mut trie = Trie::new(store.clone());
        for i in 0u32..50 {
            let value = format!("value number {} padded past the inline limit", i);
            trie.put(format!("key{}", i).as_bytes(), value.as_bytes()).unwrap();
        }
        for i in 0u32..25 {
            trie.delete(format!("key{}", i).as_bytes()).unwrap();
        }

        let live = trie.reachable_hashes().unwrap();
        assert!(live.contains(&trie.root_hash()));
        let removed = store.retain(&live);
        assert!(removed > 0);
        assert_eq!(store.len(), live.len());

        for i in 25u32..50 {
            assert!(trie.contains(format!("key{}", i).as_bytes()).unwrap());
        }
    }
}
