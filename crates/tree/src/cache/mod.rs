// Path: crates/tree/src/cache/mod.rs
//! Node caches.
//!
//! The LRU cache is the only shared mutable state inside the core. Enclave
//! deployments have tight memory ceilings, so the cache is strictly bounded
//! and evicts least-recently-used nodes once full.

pub mod overlay;

use std::num::NonZeroUsize;
use std::sync::Mutex;

use lru::LruCache;

use crate::node::{Node, NodeKey};

pub use overlay::SpeculativeNodeCache;

/// Default capacity: roughly 64 MiB of nodes, sized for enclave memory.
pub const DEFAULT_NODE_CACHE_CAPACITY: usize = 100_000;

/// Shared cache of decoded nodes keyed by [`NodeKey`].
///
/// `get` promotes the entry to most-recently-used, so it is not logically
/// read-only; implementations serialize LRU updates internally. At most one
/// mutation proceeds at a time.
pub trait NodeCache: Send + Sync {
    /// Returns a copy of the cached node, promoting it to MRU.
    fn get(&self, key: &NodeKey) -> Option<Node>;
    /// Inserts or replaces a node, evicting the LRU entry when over
    /// capacity.
    fn put(&self, key: NodeKey, node: Node);
    /// Drops every entry.
    fn clear(&self);
    /// Number of cached entries.
    fn len(&self) -> usize;
    /// Whether the cache is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Bounded LRU cache over decoded nodes.
pub struct LruNodeCache {
    inner: Mutex<LruCache<NodeKey, Node>>,
    capacity: usize,
}

impl LruNodeCache {
    /// Creates a cache bounded to `capacity` entries (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(LruCache::new(cap)),
            capacity: cap.get(),
        }
    }

    /// The capacity bound.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns a copy of the cached node without promoting it.
    pub fn peek(&self, key: &NodeKey) -> Option<Node> {
        match self.inner.lock() {
            Ok(inner) => inner.peek(key).cloned(),
            Err(_) => None,
        }
    }
}

impl Default for LruNodeCache {
    fn default() -> Self {
        Self::new(DEFAULT_NODE_CACHE_CAPACITY)
    }
}

impl NodeCache for LruNodeCache {
    fn get(&self, key: &NodeKey) -> Option<Node> {
        match self.inner.lock() {
            Ok(mut inner) => inner.get(key).cloned(),
            Err(_) => None,
        }
    }

    fn put(&self, key: NodeKey, node: Node) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.put(key, node);
        }
    }

    fn clear(&self) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.clear();
        }
    }

    fn len(&self) -> usize {
        self.inner.lock().map(|inner| inner.len()).unwrap_or(0)
    }
}
