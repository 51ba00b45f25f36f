//! Nibble paths
//!
//! Keys are descended half a byte at a time, so every byte of a key becomes
//! two path components (high nibble first) and each branch fans out 16 ways.

use std::fmt;

/// A sequence of nibbles (4-bit values)
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct Nibbles {
    data: Vec<u8>,
}

/// Convert a raw key into its nibble path
pub fn encode(key: &[u8]) -> Nibbles {
    Nibbles::from_bytes(key)
}

/// Length of the longest shared leading run of two paths
pub fn common_prefix_len(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count()
}

impl Nibbles {
    /// Create an empty path
    pub fn new() -> Self {
        Nibbles { data: Vec::new() }
    }

    /// Create from bytes (each byte becomes 2 nibbles)
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut data = Vec::with_capacity(bytes.len() * 2);
        for byte in bytes {
            data.push(byte >> 4);
            data.push(byte & 0x0f);
        }
        Nibbles { data }
    }

    /// Create from raw nibbles. Returns `None` if any value is 16 or more.
    pub fn from_raw(nibbles: Vec<u8>) -> Option<Self> {
        if nibbles.iter().all(|n| *n < 16) {
            Some(Nibbles { data: nibbles })
        } else {
            None
        }
    }

    /// Copy a run of nibbles borrowed from another path
    pub(crate) fn from_slice(nibbles: &[u8]) -> Self {
        debug_assert!(nibbles.iter().all(|n| *n < 16));
        Nibbles {
            data: nibbles.to_vec(),
        }
    }

    /// Path made of a single nibble
    pub fn single(nibble: u8) -> Self {
        debug_assert!(nibble < 16);
        Nibbles { data: vec![nibble] }
    }

    /// Convert back to bytes. Only paths of even length map to a key.
    pub fn to_bytes(&self) -> Option<Vec<u8>> {
        if self.data.len() % 2 != 0 {
            return None;
        }
        Some(
            self.data
                .chunks(2)
                .map(|pair| (pair[0] << 4) | pair[1])
                .collect(),
        )
    }

    /// Pack two nibbles per byte, high nibble first, padding an odd tail with zero
    pub fn pack(&self) -> Vec<u8> {
        self.data
            .chunks(2)
            .map(|chunk| {
                let low = chunk.get(1).copied().unwrap_or(0);
                (chunk[0] << 4) | low
            })
            .collect()
    }

    /// Inverse of [`Nibbles::pack`]. Returns `None` unless `packed` holds
    /// exactly `len` nibbles with zero padding.
    pub fn unpack(packed: &[u8], len: usize) -> Option<Self> {
        if packed.len() != len.div_ceil(2) {
            return None;
        }
        let mut nibbles = Nibbles::from_bytes(packed);
        if nibbles.data.len() > len && nibbles.data.pop() != Some(0) {
            return None;
        }
        Some(nibbles)
    }

    /// Get length
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Get nibble at index
    pub fn get(&self, index: usize) -> Option<u8> {
        self.data.get(index).copied()
    }

    /// Get first nibble
    pub fn first(&self) -> Option<u8> {
        self.data.first().copied()
    }

    /// Get slice from index
    pub fn slice(&self, start: usize) -> Self {
        Nibbles {
            data: self.data[start..].to_vec(),
        }
    }

    /// Get slice range
    pub fn slice_range(&self, start: usize, end: usize) -> Self {
        Nibbles {
            data: self.data[start..end].to_vec(),
        }
    }

    /// Find common prefix length with another path
    pub fn common_prefix_len(&self, other: &Nibbles) -> usize {
        common_prefix_len(&self.data, &other.data)
    }

    /// Check whether `prefix` is a leading run of this path
    pub fn starts_with(&self, prefix: &Nibbles) -> bool {
        self.data.starts_with(&prefix.data)
    }

    /// Append another path
    pub fn extend(&mut self, other: &Nibbles) {
        self.data.extend_from_slice(&other.data);
    }

    /// Push a single nibble
    pub fn push(&mut self, nibble: u8) {
        debug_assert!(nibble < 16);
        self.data.push(nibble);
    }

    /// `self ++ [nibble] ++ rest`, the path that collapses a branch slot into its child
    pub fn join(&self, nibble: u8, rest: &Nibbles) -> Self {
        let mut data = Vec::with_capacity(self.data.len() + 1 + rest.data.len());
        data.extend_from_slice(&self.data);
        data.push(nibble);
        data.extend_from_slice(&rest.data);
        Nibbles { data }
    }

    /// Get as slice
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }
}

impl fmt::Debug for Nibbles {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Nibbles({})", self)
    }
}

impl fmt::Display for Nibbles {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for n in &self.data {
            write!(f, "{:x}", n)?;
        }
        Ok(())
    }
}
