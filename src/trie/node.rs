//! Trie node types and their canonical encoding
//!
//! Every node has exactly one byte representation. Lengths are explicit, so
//! no two distinct nodes (of the same or different variants) can serialize to
//! the same bytes, and the digest of those bytes is the node's content address.
//!
//! ```text
//! Empty      0x00
//! Leaf       0x01 | path | value
//! Extension  0x02 | path | ref
//! Branch     0x03 | ref x 16 | 0x00              (no value)
//!            0x03 | ref x 16 | 0x01 | value
//!
//! path   = nibble count (u32 BE) | nibbles packed two per byte
//! value  = byte length (u32 BE)  | bytes
//! ref    = 0x00                                   (absent)
//!        | 0x01 | 32-byte hash                    (stored node)
//!        | 0x02 | length (u32 BE) | node bytes    (inlined node)
//! ```

use super::nibbles::Nibbles;
use crate::model::{Hash, NodeHasher};
use crate::{Error, Result};

/// Nodes whose canonical encoding is shorter than this are embedded in their
/// parent instead of being stored under their own hash. The root is always
/// hashed regardless of its size.
pub const INLINE_THRESHOLD: usize = 32;

/// Longest key or value the encoding can represent
pub const MAX_ITEM_LEN: usize = u32::MAX as usize / 2;

const TAG_EMPTY: u8 = 0x00;
const TAG_LEAF: u8 = 0x01;
const TAG_EXTENSION: u8 = 0x02;
const TAG_BRANCH: u8 = 0x03;

const REF_EMPTY: u8 = 0x00;
const REF_HASH: u8 = 0x01;
const REF_INLINE: u8 = 0x02;

const VALUE_NONE: u8 = 0x00;
const VALUE_SOME: u8 = 0x01;

/// Reference from a parent to a child node
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum NodeRef {
    /// No child
    #[default]
    Empty,
    /// Content address of a node held in the backing store
    Hash(Hash),
    /// A small node embedded directly in its parent
    Inline(Box<Node>),
}

impl NodeRef {
    /// Check if empty
    pub fn is_empty(&self) -> bool {
        matches!(self, NodeRef::Empty)
    }

    /// Get hash if this is a hash reference
    pub fn as_hash(&self) -> Option<Hash> {
        match self {
            NodeRef::Hash(h) => Some(*h),
            _ => None,
        }
    }

    fn encode_into(&self, out: &mut Vec<u8>) {
        match self {
            NodeRef::Empty => out.push(REF_EMPTY),
            NodeRef::Hash(hash) => {
                out.push(REF_HASH);
                out.extend_from_slice(hash.as_bytes());
            }
            NodeRef::Inline(node) => {
                let bytes = node.canonical_bytes();
                out.push(REF_INLINE);
                push_len(out, bytes.len());
                out.extend_from_slice(&bytes);
            }
        }
    }
}

/// A trie node
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Node {
    /// Absence of any key
    #[default]
    Empty,

    /// Terminal node; `path` holds the remaining nibbles of the key
    Leaf { path: Nibbles, value: Vec<u8> },

    /// A shared nibble run above a single branch
    Extension { path: Nibbles, child: NodeRef },

    /// 16-way fan-out plus the value of a key ending exactly here
    Branch {
        children: Box<[NodeRef; 16]>,
        value: Option<Vec<u8>>,
    },
}

impl Node {
    /// Create leaf node
    pub fn leaf(path: Nibbles, value: Vec<u8>) -> Self {
        Node::Leaf { path, value }
    }

    /// Create extension node
    pub fn extension(path: Nibbles, child: NodeRef) -> Self {
        Node::Extension { path, child }
    }

    /// Check if node is empty
    pub fn is_empty(&self) -> bool {
        matches!(self, Node::Empty)
    }

    /// Short variant name, for logs
    pub fn kind(&self) -> &'static str {
        match self {
            Node::Empty => "empty",
            Node::Leaf { .. } => "leaf",
            Node::Extension { .. } => "extension",
            Node::Branch { .. } => "branch",
        }
    }

    /// The unique byte representation of this node
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.encode_into(&mut out);
        out
    }

    /// Content address of this node under the given hash provider
    pub fn hash<H: NodeHasher>(&self) -> Hash {
        H::digest(&self.canonical_bytes())
    }

    /// Decode canonical bytes. Rejects anything [`Node::canonical_bytes`]
    /// would not produce.
    pub fn decode(bytes: &[u8]) -> Result<Node> {
        let mut reader = Reader::new(bytes);
        let node = reader.node()?;
        reader.finish()?;
        Ok(node)
    }

    fn encode_into(&self, out: &mut Vec<u8>) {
        match self {
            Node::Empty => out.push(TAG_EMPTY),
            Node::Leaf { path, value } => {
                out.push(TAG_LEAF);
                push_path(out, path);
                push_len(out, value.len());
                out.extend_from_slice(value);
            }
            Node::Extension { path, child } => {
                out.push(TAG_EXTENSION);
                push_path(out, path);
                child.encode_into(out);
            }
            Node::Branch { children, value } => {
                out.push(TAG_BRANCH);
                for child in children.iter() {
                    child.encode_into(out);
                }
                match value {
                    None => out.push(VALUE_NONE),
                    Some(v) => {
                        out.push(VALUE_SOME);
                        push_len(out, v.len());
                        out.extend_from_slice(v);
                    }
                }
            }
        }
    }
}

fn push_len(out: &mut Vec<u8>, len: usize) {
    debug_assert!(len <= u32::MAX as usize);
    out.extend_from_slice(&(len as u32).to_be_bytes());
}

fn push_path(out: &mut Vec<u8>, path: &Nibbles) {
    push_len(out, path.len());
    out.extend_from_slice(&path.pack());
}

/// Bounds-checked cursor over canonical bytes
struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Reader { bytes, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self.pos.saturating_add(n);
        if end > self.bytes.len() {
            let message = format!("truncated: wanted {} bytes at offset {}", n, self.pos);
            return Err(Error::InvalidNode(message));
        }
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn byte(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn len(&mut self) -> Result<usize> {
        let raw = self.take(4)?;
        Ok(u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]) as usize)
    }

    fn path(&mut self) -> Result<Nibbles> {
        let count = self.len()?;
        let packed = self.take(count.div_ceil(2))?;
        Nibbles::unpack(packed, count)
            .ok_or_else(|| Error::InvalidNode("non-zero nibble padding".into()))
    }

    fn value(&mut self) -> Result<Vec<u8>> {
        let len = self.len()?;
        Ok(self.take(len)?.to_vec())
    }

    fn node_ref(&mut self) -> Result<NodeRef> {
        match self.byte()? {
            REF_EMPTY => Ok(NodeRef::Empty),
            REF_HASH => {
                let raw = self.take(Hash::LEN)?;
                Hash::from_slice(raw)
                    .map(NodeRef::Hash)
                    .ok_or_else(|| Error::InvalidNode("bad hash width".into()))
            }
            REF_INLINE => {
                let len = self.len()?;
                if len >= INLINE_THRESHOLD {
                    return Err(Error::InvalidNode(format!(
                        "inline node of {} bytes exceeds threshold",
                        len
                    )));
                }
                let node = Node::decode(self.take(len)?)?;
                if node.is_empty() {
                    return Err(Error::InvalidNode("inline empty node".into()));
                }
                Ok(NodeRef::Inline(Box::new(node)))
            }
            tag => Err(Error::InvalidNode(format!("unknown reference tag {:#04x}", tag))),
        }
    }

    fn node(&mut self) -> Result<Node> {
        match self.byte()? {
            TAG_EMPTY => Ok(Node::Empty),
            TAG_LEAF => {
                let path = self.path()?;
                let value = self.value()?;
                Ok(Node::Leaf { path, value })
            }
            TAG_EXTENSION => {
                let path = self.path()?;
                let child = self.node_ref()?;
                Ok(Node::Extension { path, child })
            }
            TAG_BRANCH => {
                let mut children: [NodeRef; 16] = Default::default();
                for slot in children.iter_mut() {
                    *slot = self.node_ref()?;
                }
                let value = match self.byte()? {
                    VALUE_NONE => None,
                    VALUE_SOME => Some(self.value()?),
                    marker => {
                        return Err(Error::InvalidNode(format!(
                            "unknown value marker {:#04x}",
                            marker
                        )))
                    }
                };
                Ok(Node::Branch {
                    children: Box::new(children),
                    value,
                })
            }
            tag => Err(Error::InvalidNode(format!("unknown node tag {:#04x}", tag))),
        }
    }

    fn finish(&self) -> Result<()> {
        if self.pos == self.bytes.len() {
            Ok(())
        } else {
            Err(Error::InvalidNode(format!(
                "{} trailing bytes",
                self.bytes.len() - self.pos
            )))
        }
    }
}
