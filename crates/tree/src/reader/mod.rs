// Path: crates/tree/src/reader/mod.rs
//! Read contract against the external byte store.
//!
//! The engine never writes to the store: callers persist the `new_nodes` of
//! each batch themselves, keyed by `NodeKey::serialize()` with the prefixed
//! node encoding as the value. The engine only ever issues point reads
//! through this trait.

use std::collections::HashMap;
use std::sync::RwLock;

use arbor_types::TreeError;

use crate::node::codec::encode_node;
use crate::node::NodeKey;
use crate::tree::TreeUpdateBatch;

/// Point-read access to persisted node bytes.
///
/// `Ok(None)` means the key is not present, which a well-formed history only
/// produces for genesis or an empty tree.
pub trait TreeReader: Send + Sync {
    /// Fetches the stored bytes for `key`.
    fn get_node_bytes(&self, key: &NodeKey) -> Result<Option<Vec<u8>>, TreeError>;
}

/// A reader with no backing store; every lookup misses.
///
/// Used for test and in-memory modes where the whole tree lives in the cache
/// and in returned batches.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullReader;

impl TreeReader for NullReader {
    fn get_node_bytes(&self, _key: &NodeKey) -> Result<Option<Vec<u8>>, TreeError> {
        Ok(None)
    }
}

/// A thread-safe in-memory byte store.
///
/// Mirrors how a production store lays nodes out (serialized key, prefixed
/// encoding) so tests exercise the same decode path as deployments.
#[derive(Debug, Default)]
pub struct MemoryReader {
    nodes: RwLock<HashMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryReader {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores raw bytes under a serialized key.
    pub fn insert_bytes(&self, key: Vec<u8>, bytes: Vec<u8>) {
        if let Ok(mut nodes) = self.nodes.write() {
            nodes.insert(key, bytes);
        }
    }

    /// Persists every node of a batch, the way a deployment would after a
    /// successful `put_value_set`.
    pub fn apply_batch(&self, batch: &TreeUpdateBatch) {
        if let Ok(mut nodes) = self.nodes.write() {
            for (key, node) in &batch.new_nodes {
                nodes.insert(key.serialize(), encode_node(node));
            }
        }
    }

    /// Number of stored nodes.
    pub fn len(&self) -> usize {
        self.nodes.read().map(|n| n.len()).unwrap_or(0)
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TreeReader for MemoryReader {
    fn get_node_bytes(&self, key: &NodeKey) -> Result<Option<Vec<u8>>, TreeError> {
        let nodes = self
            .nodes
            .read()
            .map_err(|_| TreeError::InvalidInput("memory reader lock poisoned".into()))?;
        Ok(nodes.get(&key.serialize()).cloned())
    }
}
