// Path: crates/tree/src/adapter/mod.rs
//! Accumulator façade over the tree engine.
//!
//! Legacy callers hand the state layer one `(key, value_hash)` pair at a
//! time and periodically ask for a new root. The adapter buffers those
//! puts, merges them with any explicit updates at flush time, and drives
//! `put_value_set` with deterministically sorted input. It is also the one
//! place raw keys are hashed into the fixed-width path domain, so the
//! engine only ever sees full-width keys.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use arbor_crypto::blake3_512;
use arbor_types::{Hash, TreeError, Version, HASH_LEN};

use crate::cache::{LruNodeCache, NodeCache, SpeculativeNodeCache};
use crate::node::codec::decode_node;
use crate::node::NodeKey;
use crate::reader::{NullReader, TreeReader};
use crate::tree::{JellyfishMerkleTree, TreeUpdateBatch};

/// Accumulator adapter exposing the legacy state-root API.
pub struct StateTreeAdapter {
    reader: Arc<dyn TreeReader>,
    cache: Arc<LruNodeCache>,
    tree: JellyfishMerkleTree,
    pending: Mutex<BTreeMap<Hash, Hash>>,
}

impl StateTreeAdapter {
    /// Creates an adapter over a byte-store reader with the default cache
    /// capacity.
    pub fn new(reader: Arc<dyn TreeReader>) -> Self {
        Self::with_cache_capacity(reader, crate::cache::DEFAULT_NODE_CACHE_CAPACITY)
    }

    /// Creates an adapter with an explicit node-cache capacity.
    pub fn with_cache_capacity(reader: Arc<dyn TreeReader>, capacity: usize) -> Self {
        let cache = Arc::new(LruNodeCache::new(capacity));
        let tree = JellyfishMerkleTree::new(
            Arc::clone(&reader),
            Arc::clone(&cache) as Arc<dyn NodeCache>,
        );
        Self {
            reader,
            cache,
            tree,
            pending: Mutex::new(BTreeMap::new()),
        }
    }

    /// Hashes a raw key into the fixed-width path domain.
    fn hash_key(raw_key: &[u8]) -> Hash {
        blake3_512(raw_key)
    }

    /// Buffers a single update. The version argument is accepted for API
    /// compatibility; versions are assigned when the batch is flushed.
    pub fn put(&self, raw_key: &[u8], value_hash: Hash, _version: Version) {
        let key_hash = Self::hash_key(raw_key);
        if let Ok(mut pending) = self.pending.lock() {
            pending.insert(key_hash, value_hash);
        }
    }

    /// Number of buffered updates.
    pub fn pending_len(&self) -> usize {
        self.pending.lock().map(|p| p.len()).unwrap_or(0)
    }

    /// Flushes the buffered updates merged with `updates` into one batch at
    /// `version`, clearing the buffer on success.
    ///
    /// Buffered entries are appended after the explicit ones, so on a key
    /// collision the buffered value wins after the engine's stable sort. An
    /// all-empty merge still registers the version with the unchanged base
    /// root.
    pub fn calculate_root(
        &self,
        updates: &[(Vec<u8>, Hash)],
        base_root: Hash,
        version: Version,
        base_version: Option<Version>,
    ) -> Result<TreeUpdateBatch, TreeError> {
        let mut merged: Vec<(Hash, Option<Vec<u8>>)> =
            Vec::with_capacity(updates.len() + self.pending_len());
        for (raw_key, value_hash) in updates {
            merged.push((Self::hash_key(raw_key), Some(value_hash.to_vec())));
        }
        {
            let pending = self
                .pending
                .lock()
                .map_err(|_| TreeError::InvalidInput("pending buffer lock poisoned".into()))?;
            for (key_hash, value_hash) in pending.iter() {
                merged.push((*key_hash, Some(value_hash.to_vec())));
            }
        }

        let batch = self
            .tree
            .put_value_set(merged, version, Some(base_root), base_version)?;

        if let Ok(mut pending) = self.pending.lock() {
            pending.clear();
        }
        Ok(batch)
    }

    /// Computes a batch against a disposable overlay cache, optionally
    /// seeded with serialized parent speculative nodes.
    ///
    /// The shared cache, the version index, and the pending buffer are left
    /// untouched; entries the speculation reads through from committed
    /// state may still be promoted in the shared cache.
    pub fn calculate_root_speculative(
        &self,
        updates: &[(Vec<u8>, Hash)],
        base_root: Hash,
        version: Version,
        base_version: Option<Version>,
        parent_nodes: Option<&[(Vec<u8>, Vec<u8>)]>,
    ) -> Result<TreeUpdateBatch, TreeError> {
        let overlay = Arc::new(SpeculativeNodeCache::new(
            Arc::clone(&self.cache) as Arc<dyn NodeCache>
        ));
        if let Some(parents) = parent_nodes {
            for (key_bytes, node_bytes) in parents {
                let parsed = NodeKey::deserialize(key_bytes)
                    .ok()
                    .zip(decode_node(node_bytes).ok());
                match parsed {
                    Some((key, node)) => overlay.inject_node(key, node),
                    None => {
                        log::warn!("[adapter] skipping undecodable injected parent node");
                    }
                }
            }
        }

        let speculative_tree = JellyfishMerkleTree::new(
            Arc::clone(&self.reader),
            overlay as Arc<dyn NodeCache>,
        );
        let converted: Vec<(Hash, Option<Vec<u8>>)> = updates
            .iter()
            .map(|(raw_key, value_hash)| (Self::hash_key(raw_key), Some(value_hash.to_vec())))
            .collect();
        speculative_tree.put_value_set(converted, version, Some(base_root), base_version)
    }

    /// Applies explicit updates directly, bypassing the pending buffer.
    /// Legacy optimization path for callers that already batched upstream.
    pub fn update_batch(
        &self,
        updates: &[(Vec<u8>, Hash)],
        version: Version,
        base_root: Option<Hash>,
        base_version: Option<Version>,
    ) -> Result<TreeUpdateBatch, TreeError> {
        let converted: Vec<(Hash, Option<Vec<u8>>)> = updates
            .iter()
            .map(|(raw_key, value_hash)| (Self::hash_key(raw_key), Some(value_hash.to_vec())))
            .collect();
        self.tree
            .put_value_set(converted, version, base_root, base_version)
    }

    /// Looks up the value hash stored for a raw key as of `version`.
    ///
    /// Stored values of the wrong width are rejected rather than padded or
    /// truncated.
    pub fn get(&self, raw_key: &[u8], version: Version) -> Result<Option<Hash>, TreeError> {
        let key_hash = Self::hash_key(raw_key);
        let Some(bytes) = self.tree.get(&key_hash, version)? else {
            return Ok(None);
        };
        if bytes.len() != HASH_LEN {
            return Err(TreeError::InvalidInput(format!(
                "stored value width {} (expected {HASH_LEN})",
                bytes.len()
            )));
        }
        let mut value_hash = [0u8; HASH_LEN];
        value_hash.copy_from_slice(&bytes);
        Ok(Some(value_hash))
    }

    /// Root hash of a committed version.
    pub fn get_root_hash(&self, version: Version) -> Result<Hash, TreeError> {
        self.tree.get_root_hash(version)
    }

    /// Number of entries in the shared node cache.
    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }
}

impl Default for StateTreeAdapter {
    fn default() -> Self {
        Self::new(Arc::new(NullReader))
    }
}

#[cfg(test)]
mod tests;
