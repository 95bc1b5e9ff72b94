// Path: crates/tree/src/node/codec.rs
//! Prefixed node codec used by the byte store.
//!
//! A stored node is a one-byte tag followed by the node's canonical
//! encoding. The decoder is strict: it rejects empty input, unknown tags,
//! truncated bodies, and any trailing bytes beyond the exactly-consumed
//! body. Non-canonical bytes must never round-trip into a node.

use thiserror::Error;

use arbor_types::{Hash, HASH_LEN};

use crate::bitmap::ChildBitmap;
use crate::node::{ChildInfo, InternalNode, LeafNode, Node};

/// Storage tag for internal nodes.
pub const INTERNAL_NODE_TAG: u8 = 0x01;
/// Storage tag for leaf nodes.
pub const LEAF_NODE_TAG: u8 = 0x02;

const CHILD_RECORD_LEN: usize = HASH_LEN + 8;
const LEAF_BODY_LEN: usize = 2 * HASH_LEN;

/// Reasons the strict decoder rejects stored bytes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NodeDecodeError {
    /// The input was empty.
    #[error("empty input")]
    Empty,
    /// The leading tag byte was not a known node kind.
    #[error("unknown node tag {0:#04x}")]
    UnknownTag(u8),
    /// The body was shorter than its header demands.
    #[error("truncated body: got {got} bytes, need {need}")]
    Truncated {
        /// Bytes present.
        got: usize,
        /// Bytes the header requires.
        need: usize,
    },
    /// Bytes remained after the exactly-consumed body.
    #[error("trailing bytes: got {got} bytes, body ends at {need}")]
    TrailingBytes {
        /// Bytes present.
        got: usize,
        /// Bytes the body occupies.
        need: usize,
    },
}

/// Encodes a node as `tag || canonical_encoding`.
pub fn encode_node(node: &Node) -> Vec<u8> {
    let (tag, body) = match node {
        Node::Internal(n) => (INTERNAL_NODE_TAG, n.serialize_canonical()),
        Node::Leaf(n) => (LEAF_NODE_TAG, n.serialize_canonical()),
    };
    let mut buf = Vec::with_capacity(1 + body.len());
    buf.push(tag);
    buf.extend_from_slice(&body);
    buf
}

/// Decodes a stored node, enforcing strict length.
pub fn decode_node(bytes: &[u8]) -> Result<Node, NodeDecodeError> {
    let (tag, body) = match bytes.split_first() {
        Some(split) => split,
        None => return Err(NodeDecodeError::Empty),
    };
    match *tag {
        INTERNAL_NODE_TAG => decode_internal(body).map(Node::Internal),
        LEAF_NODE_TAG => decode_leaf(body).map(Node::Leaf),
        other => Err(NodeDecodeError::UnknownTag(other)),
    }
}

fn decode_internal(body: &[u8]) -> Result<InternalNode, NodeDecodeError> {
    let mask_bytes = body.get(..2).ok_or(NodeDecodeError::Truncated {
        got: body.len() + 1,
        need: 3,
    })?;
    let mask = u16::from_le_bytes(mask_bytes.try_into().unwrap_or_default());
    let bitmap = ChildBitmap::from_mask(mask);

    let need = 2 + bitmap.count() * CHILD_RECORD_LEN;
    match body.len().cmp(&need) {
        std::cmp::Ordering::Less => {
            return Err(NodeDecodeError::Truncated {
                got: body.len() + 1,
                need: need + 1,
            })
        }
        std::cmp::Ordering::Greater => {
            return Err(NodeDecodeError::TrailingBytes {
                got: body.len() + 1,
                need: need + 1,
            })
        }
        std::cmp::Ordering::Equal => {}
    }

    let mut children = Vec::with_capacity(bitmap.count());
    let records = body.get(2..).unwrap_or_default();
    for record in records.chunks_exact(CHILD_RECORD_LEN) {
        let (hash_bytes, version_bytes) = record.split_at(HASH_LEN);
        let mut hash: Hash = [0u8; HASH_LEN];
        hash.copy_from_slice(hash_bytes);
        let version = u64::from_le_bytes(version_bytes.try_into().unwrap_or_default());
        children.push(ChildInfo { hash, version });
    }
    Ok(InternalNode::from_parts(bitmap, children))
}

fn decode_leaf(body: &[u8]) -> Result<LeafNode, NodeDecodeError> {
    match body.len().cmp(&LEAF_BODY_LEN) {
        std::cmp::Ordering::Less => {
            return Err(NodeDecodeError::Truncated {
                got: body.len() + 1,
                need: LEAF_BODY_LEN + 1,
            })
        }
        std::cmp::Ordering::Greater => {
            return Err(NodeDecodeError::TrailingBytes {
                got: body.len() + 1,
                need: LEAF_BODY_LEN + 1,
            })
        }
        std::cmp::Ordering::Equal => {}
    }
    let (key_bytes, value_bytes) = body.split_at(HASH_LEN);
    let mut account_key: Hash = [0u8; HASH_LEN];
    account_key.copy_from_slice(key_bytes);
    let mut value_hash: Hash = [0u8; HASH_LEN];
    value_hash.copy_from_slice(value_bytes);
    Ok(LeafNode::new(account_key, value_hash))
}
