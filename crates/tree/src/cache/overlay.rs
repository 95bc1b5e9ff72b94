// Path: crates/tree/src/cache/overlay.rs
//! Speculative cache overlay.
//!
//! Speculative roots evaluate trial batches against a disposable overlay so
//! they can never evict or mutate entries in the shared base cache. Reads
//! consult the overlay first, then caller-injected parent state, then the
//! base; writes land only in the overlay.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::cache::NodeCache;
use crate::node::{Node, NodeKey};

/// Isolated overlay over a shared base cache.
pub struct SpeculativeNodeCache {
    base: Arc<dyn NodeCache>,
    overlay: Mutex<HashMap<NodeKey, Node>>,
    injected: Mutex<HashMap<NodeKey, Node>>,
}

impl SpeculativeNodeCache {
    /// Wraps `base` with an empty overlay.
    pub fn new(base: Arc<dyn NodeCache>) -> Self {
        Self {
            base,
            overlay: Mutex::new(HashMap::new()),
            injected: Mutex::new(HashMap::new()),
        }
    }

    /// Pre-seeds a node representing parent speculative state that has not
    /// been committed yet. Injected nodes shadow the base but not the
    /// overlay.
    pub fn inject_node(&self, key: NodeKey, node: Node) {
        if let Ok(mut injected) = self.injected.lock() {
            injected.insert(key, node);
        }
    }
}

impl NodeCache for SpeculativeNodeCache {
    fn get(&self, key: &NodeKey) -> Option<Node> {
        if let Ok(overlay) = self.overlay.lock() {
            if let Some(node) = overlay.get(key) {
                return Some(node.clone());
            }
        }
        if let Ok(injected) = self.injected.lock() {
            if let Some(node) = injected.get(key) {
                return Some(node.clone());
            }
        }
        // A base hit may promote there: the node is committed state, not
        // speculative.
        self.base.get(key)
    }

    fn put(&self, key: NodeKey, node: Node) {
        if let Ok(mut overlay) = self.overlay.lock() {
            overlay.insert(key, node);
        }
    }

    fn clear(&self) {
        if let Ok(mut overlay) = self.overlay.lock() {
            overlay.clear();
        }
        if let Ok(mut injected) = self.injected.lock() {
            injected.clear();
        }
    }

    fn len(&self) -> usize {
        let overlay = self.overlay.lock().map(|m| m.len()).unwrap_or(0);
        let injected = self.injected.lock().map(|m| m.len()).unwrap_or(0);
        overlay + injected
    }
}
