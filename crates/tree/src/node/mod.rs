// Path: crates/tree/src/node/mod.rs
//! Node model: internal and leaf nodes, canonical serialization, and
//! domain-separated hashing.
//!
//! Canonical encodings are byte-identical for identical logical content on
//! every platform; they are what gets hashed (behind a domain separator) and
//! what the byte store persists (behind a one-byte tag, see [`codec`]).

pub mod codec;

use arbor_crypto::blake3_512_prefixed;
use arbor_types::{Hash, TreeError, Version, HASH_LEN};

use crate::bitmap::ChildBitmap;
use crate::path::NibblePath;

/// Domain separator prefixed to every internal-node hash input.
///
/// Both separators are part of the persisted contract: changing either
/// re-roots the entire database.
pub const INTERNAL_NODE_DOMAIN: &[u8] = b"ARBOR_InternalNode_V1_PQ";

/// Domain separator prefixed to every leaf-node hash input.
pub const LEAF_NODE_DOMAIN: &[u8] = b"ARBOR_LeafNode_V1_PQ";

/// Pointer to a child node: its hash and the version it was created at.
///
/// The child is guaranteed to exist at `NodeKey(version, parent_path ·
/// nibble)`.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct ChildInfo {
    /// Hash of the child node.
    pub hash: Hash,
    /// Version the child node was emitted at.
    pub version: Version,
}

impl std::fmt::Debug for ChildInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "ChildInfo({}..@v{})",
            hex::encode(self.hash.get(..8).unwrap_or_default()),
            self.version
        )
    }
}

/// An internal node: a sparse 16-ary branch.
///
/// The bitmap records which nibble slots are occupied; `children` stores the
/// occupied slots densely in nibble-ascending order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InternalNode {
    bitmap: ChildBitmap,
    children: Vec<ChildInfo>,
}

impl InternalNode {
    /// An internal node with no children.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds an internal node from its serialized parts.
    pub(crate) fn from_parts(bitmap: ChildBitmap, children: Vec<ChildInfo>) -> Self {
        Self { bitmap, children }
    }

    /// The child at `nibble`, if present.
    pub fn child(&self, nibble: u8) -> Option<&ChildInfo> {
        if !self.bitmap.exists(nibble) {
            return None;
        }
        self.children.get(self.bitmap.index_of(nibble))
    }

    /// Inserts or replaces the child at `nibble`.
    pub fn set_child(&mut self, nibble: u8, info: ChildInfo) {
        if self.bitmap.exists(nibble) {
            let idx = self.bitmap.index_of(nibble);
            if let Some(slot) = self.children.get_mut(idx) {
                *slot = info;
            }
        } else {
            self.bitmap.set(nibble);
            let idx = self.bitmap.index_of(nibble);
            self.children.insert(idx, info);
        }
    }

    /// Removes the child at `nibble`, returning it if it was present.
    pub fn remove_child(&mut self, nibble: u8) -> Option<ChildInfo> {
        if !self.bitmap.exists(nibble) {
            return None;
        }
        let idx = self.bitmap.index_of(nibble);
        self.bitmap.clear(nibble);
        if idx < self.children.len() {
            Some(self.children.remove(idx))
        } else {
            None
        }
    }

    /// Number of children.
    pub fn child_count(&self) -> usize {
        self.bitmap.count()
    }

    /// Whether the node has no children.
    pub fn is_empty(&self) -> bool {
        self.bitmap.is_empty()
    }

    /// The presence bitmap.
    pub fn bitmap(&self) -> ChildBitmap {
        self.bitmap
    }

    /// Iterates `(nibble, child)` pairs in ascending nibble order.
    pub fn children(&self) -> impl Iterator<Item = (u8, &ChildInfo)> {
        self.bitmap.nibbles().zip(self.children.iter())
    }

    /// Iterates `(nibble, child)` pairs mutably in ascending nibble order.
    pub(crate) fn children_mut(&mut self) -> impl Iterator<Item = (u8, &mut ChildInfo)> {
        self.bitmap.nibbles().zip(self.children.iter_mut())
    }

    /// The sole child, when exactly one is present.
    pub fn sole_child(&self) -> Option<(u8, ChildInfo)> {
        if self.child_count() != 1 {
            return None;
        }
        self.children().next().map(|(n, c)| (n, *c))
    }

    /// Canonical encoding: `u16 bitmap (LE) || children in nibble order,
    /// each hash (64 bytes) then version (u64 LE)`.
    pub fn serialize_canonical(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(2 + self.children.len() * (HASH_LEN + 8));
        buf.extend_from_slice(&self.bitmap.raw_mask().to_le_bytes());
        for child in &self.children {
            buf.extend_from_slice(&child.hash);
            buf.extend_from_slice(&child.version.to_le_bytes());
        }
        buf
    }

    /// Domain-separated hash of the canonical encoding.
    pub fn hash(&self) -> Hash {
        blake3_512_prefixed(INTERNAL_NODE_DOMAIN, &self.serialize_canonical())
    }
}

/// A leaf node: the full hashed account key plus an opaque value hash.
#[derive(Clone, PartialEq, Eq)]
pub struct LeafNode {
    /// The full hashed key this leaf stores.
    pub account_key: Hash,
    /// The value hash, opaque to the tree.
    pub value_hash: Hash,
}

impl LeafNode {
    /// Creates a leaf.
    pub fn new(account_key: Hash, value_hash: Hash) -> Self {
        Self {
            account_key,
            value_hash,
        }
    }

    /// Canonical encoding: `account_key || value_hash`.
    pub fn serialize_canonical(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(2 * HASH_LEN);
        buf.extend_from_slice(&self.account_key);
        buf.extend_from_slice(&self.value_hash);
        buf
    }

    /// Domain-separated hash of the canonical encoding.
    pub fn hash(&self) -> Hash {
        blake3_512_prefixed(LEAF_NODE_DOMAIN, &self.serialize_canonical())
    }
}

impl std::fmt::Debug for LeafNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "LeafNode(key {}.., value {}..)",
            hex::encode(self.account_key.get(..8).unwrap_or_default()),
            hex::encode(self.value_hash.get(..8).unwrap_or_default())
        )
    }
}

/// A tree node. Matched exhaustively everywhere.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Node {
    /// A sparse 16-ary branch.
    Internal(InternalNode),
    /// A key/value-hash pair.
    Leaf(LeafNode),
}

impl Node {
    /// Whether this node is a leaf.
    pub fn is_leaf(&self) -> bool {
        matches!(self, Node::Leaf(_))
    }

    /// Domain-separated hash of the node.
    pub fn hash(&self) -> Hash {
        match self {
            Node::Internal(n) => n.hash(),
            Node::Leaf(n) => n.hash(),
        }
    }
}

impl From<InternalNode> for Node {
    fn from(node: InternalNode) -> Self {
        Node::Internal(node)
    }
}

impl From<LeafNode> for Node {
    fn from(node: LeafNode) -> Self {
        Node::Leaf(node)
    }
}

/// Identifier of a stored node: the version it was emitted at plus its
/// position in the trie.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeKey {
    version: Version,
    path: NibblePath,
}

impl NodeKey {
    /// Serialized key length ahead of the packed path bytes.
    const HEADER_LEN: usize = 8 + 4;

    /// Creates a node key.
    pub fn new(version: Version, path: NibblePath) -> Self {
        Self { version, path }
    }

    /// The root position at `version`.
    pub fn new_root(version: Version) -> Self {
        Self {
            version,
            path: NibblePath::new(),
        }
    }

    /// The version component.
    pub fn version(&self) -> Version {
        self.version
    }

    /// The path component.
    pub fn path(&self) -> &NibblePath {
        &self.path
    }

    /// Serializes to `version (u64 LE) || nibble count (u32 LE) || packed
    /// path bytes`. This is the byte-store key for the node.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::HEADER_LEN + self.path.bytes().len());
        buf.extend_from_slice(&self.version.to_le_bytes());
        buf.extend_from_slice(&(self.path.len() as u32).to_le_bytes());
        buf.extend_from_slice(self.path.bytes());
        buf
    }

    /// Parses a serialized node key. The buffer must contain exactly the
    /// serialized form.
    pub fn deserialize(bytes: &[u8]) -> Result<Self, TreeError> {
        let header = bytes.get(..Self::HEADER_LEN).ok_or_else(|| {
            TreeError::InvalidInput(format!("node key too short: {} bytes", bytes.len()))
        })?;
        let (version_bytes, count_bytes) = header.split_at(8);
        let version = u64::from_le_bytes(version_bytes.try_into().unwrap_or_default());
        let num_nibbles = u32::from_le_bytes(count_bytes.try_into().unwrap_or_default()) as usize;
        let path_bytes = bytes.get(Self::HEADER_LEN..).unwrap_or_default();
        if path_bytes.len() != num_nibbles.div_ceil(2) {
            return Err(TreeError::InvalidInput(format!(
                "node key path length mismatch: {} bytes for {} nibbles",
                path_bytes.len(),
                num_nibbles
            )));
        }
        let path = NibblePath::from_bytes(path_bytes, num_nibbles)?;
        Ok(Self { version, path })
    }

    /// Display form used in errors: version plus hex path.
    pub fn to_display(&self) -> String {
        format!("v{}:[{}]", self.version, self.path.to_hex())
    }
}
