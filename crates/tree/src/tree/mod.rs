// Path: crates/tree/src/tree/mod.rs
//! The versioned tree engine.
//!
//! `put_value_set` applies a batch of `(key, Option<value>)` updates at a
//! new version with copy-on-write semantics: every touched ancestor is
//! re-emitted under the new version and the superseded node keys are
//! reported as stale. Nothing is written to the byte store; the caller
//! persists the returned batch.
//!
//! All traversal is iterative. Insertion and deletion record the descent in
//! an explicit trace (bounded by the key width in nibbles) and splice or
//! collapse copies upward from it, so stack usage stays flat regardless of
//! tree shape. Structural rules:
//!
//! - A subtree holding exactly one leaf is represented by that leaf; lone
//!   leaf children are promoted upward on delete.
//! - An internal node may carry a single *internal* child: deep splits
//!   materialize the connecting links between the slot being split and the
//!   first divergent nibble, because a node's position must equal its
//!   logical depth for lookup to consume one nibble per internal.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, RwLock};

use arbor_types::{Hash, TreeError, Version, HASH_LEN, ZERO_HASH};

use crate::cache::NodeCache;
use crate::node::codec::decode_node;
use crate::node::{ChildInfo, InternalNode, LeafNode, Node, NodeKey};
use crate::path::{NibblePath, MAX_NIBBLE_LEN};
use crate::reader::TreeReader;

/// The output of one write: the new root, the nodes to persist, and the
/// node keys superseded by this version.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TreeUpdateBatch {
    /// Root hash of the tree at the new version. The zero sentinel when the
    /// batch empties the tree.
    pub new_root_hash: Hash,
    /// Newly created nodes, keyed for persistence. Order is unspecified.
    pub new_nodes: Vec<(NodeKey, Node)>,
    /// Keys of nodes this version supersedes.
    pub stale_nodes: Vec<NodeKey>,
}

/// Where the in-flight root of a batch currently lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RootSlot {
    /// The tree is empty.
    Empty,
    /// The root is the committed node at `(version, [])`.
    Committed(Version),
    /// The root is the pending node at the empty path.
    Pending,
}

/// Staged state of one batch. Pending nodes all carry the new version and
/// are keyed by path alone.
struct PendingBatch {
    nodes: BTreeMap<NibblePath, Node>,
    stale: BTreeSet<NodeKey>,
    root: RootSlot,
}

/// One internal node passed on the way down, with enough context to splice
/// an updated copy back in on the way up.
struct TraceEntry {
    path: NibblePath,
    node: InternalNode,
    nibble: u8,
    /// The committed key this copy supersedes; `None` when the node was
    /// already pending in this batch.
    origin: Option<NodeKey>,
}

/// Which way the slot below the current trace entry resolved during a
/// collapse walk.
enum SlotOutcome {
    /// The child slot became empty.
    Removed,
    /// The slot was re-emitted at the new version.
    Updated,
}

#[derive(Default)]
struct VersionIndex {
    latest: Option<Version>,
    roots: BTreeMap<Version, Hash>,
}

/// The versioned radix-16 authenticated tree engine.
///
/// Reads go through the shared node cache and fall back to the byte-store
/// reader. Multiple readers may run concurrently with at most one in-flight
/// writer; callers serialize `put_value_set`.
pub struct JellyfishMerkleTree {
    reader: Arc<dyn TreeReader>,
    cache: Arc<dyn NodeCache>,
    versions: RwLock<VersionIndex>,
}

impl JellyfishMerkleTree {
    /// Creates an engine over a reader and a shared node cache.
    pub fn new(reader: Arc<dyn TreeReader>, cache: Arc<dyn NodeCache>) -> Self {
        Self {
            reader,
            cache,
            versions: RwLock::new(VersionIndex::default()),
        }
    }

    /// The latest committed version, if any batch has been applied.
    pub fn latest_version(&self) -> Option<Version> {
        self.versions.read().ok().and_then(|index| index.latest)
    }

    /// Applies a batch of updates at `new_version` on top of `base_root`.
    ///
    /// `None` as a value means delete; deletes of absent keys are no-ops.
    /// Updates are stable-sorted by key and deduplicated last-writer-wins
    /// before any tree work, so the result is independent of input order.
    /// `base_root` of `None` (or the zero sentinel) selects the empty tree;
    /// otherwise `base_version` locates the base, defaulting to the latest
    /// committed version.
    ///
    /// On error the engine state is untouched; the cache may retain nodes
    /// read through before the failure, which are valid committed state.
    pub fn put_value_set(
        &self,
        updates: Vec<(Hash, Option<Vec<u8>>)>,
        new_version: Version,
        base_root: Option<Hash>,
        base_version: Option<Version>,
    ) -> Result<TreeUpdateBatch, TreeError> {
        let update_count = updates.len();
        let deduped = normalize_updates(updates)?;

        let latest = self.latest_version();
        if let Some(latest) = latest {
            if new_version <= latest {
                return Err(TreeError::VersionRegression {
                    requested: new_version,
                    latest,
                });
            }
        }

        let (root_slot, base_root_hash) = match base_root {
            None => (RootSlot::Empty, None),
            Some(root) if root == ZERO_HASH => (RootSlot::Empty, None),
            Some(root) => {
                let resolved = base_version.or(latest).ok_or_else(|| {
                    TreeError::InvalidInput(
                        "base version required: non-empty base root with no committed history"
                            .into(),
                    )
                })?;
                if resolved >= new_version {
                    return Err(TreeError::VersionRegression {
                        requested: new_version,
                        latest: resolved,
                    });
                }
                (RootSlot::Committed(resolved), Some(root))
            }
        };

        let mut pending = PendingBatch {
            nodes: BTreeMap::new(),
            stale: BTreeSet::new(),
            root: root_slot,
        };
        for (key, value) in &deduped {
            self.apply_update(&mut pending, key, value.as_ref(), new_version)?;
        }

        let batch = self.finalize(pending, new_version, base_root_hash)?;

        let mut index = self
            .versions
            .write()
            .map_err(|_| TreeError::InvalidInput("version index lock poisoned".into()))?;
        index.latest = Some(index.latest.map_or(new_version, |l| l.max(new_version)));
        index.roots.insert(new_version, batch.new_root_hash);
        drop(index);

        log::debug!(
            "[tree] committed version {new_version}: root {}, {update_count} updates, {} new nodes, {} stale",
            arbor_types::hash::short_hex(&batch.new_root_hash),
            batch.new_nodes.len(),
            batch.stale_nodes.len()
        );
        Ok(batch)
    }

    /// Point lookup of `key` as of `version`.
    pub fn get(&self, key: &Hash, version: Version) -> Result<Option<Vec<u8>>, TreeError> {
        let known_root = self
            .versions
            .read()
            .ok()
            .and_then(|index| index.roots.get(&version).copied());
        if known_root == Some(ZERO_HASH) {
            return Ok(None);
        }

        let key_path = NibblePath::from_key(key);
        let mut node_key = NodeKey::new_root(version);
        let mut node = match self.read_committed(&node_key) {
            Ok(node) => node,
            // No recorded root and nothing stored: the version is unknown,
            // not an inconsistency.
            Err(TreeError::MissingNode(_)) if known_root.is_none() => {
                return Err(TreeError::UnknownVersion(version))
            }
            Err(err) => return Err(err),
        };

        let mut depth = 0usize;
        loop {
            if depth >= MAX_NIBBLE_LEN {
                return Err(TreeError::CorruptNode {
                    key: node_key.to_display(),
                    reason: "descent exceeded the key width".into(),
                });
            }
            match node {
                Node::Internal(internal) => {
                    let nibble = key_path.get(depth)?;
                    match internal.child(nibble) {
                        None => return Ok(None),
                        Some(info) => {
                            let child_path = node_key.path().child(nibble)?;
                            node_key = NodeKey::new(info.version, child_path);
                            node = self.read_committed(&node_key)?;
                            depth += 1;
                        }
                    }
                }
                Node::Leaf(leaf) => {
                    return Ok((leaf.account_key == *key).then(|| leaf.value_hash.to_vec()));
                }
            }
        }
    }

    /// Root hash of a committed version.
    ///
    /// Served from the version index when available; otherwise re-derived
    /// from the stored root node, so an engine reopened over an existing
    /// store answers for persisted history.
    pub fn get_root_hash(&self, version: Version) -> Result<Hash, TreeError> {
        if let Ok(index) = self.versions.read() {
            if let Some(root) = index.roots.get(&version) {
                return Ok(*root);
            }
        }
        match self.read_committed(&NodeKey::new_root(version)) {
            Ok(node) => Ok(node.hash()),
            Err(TreeError::MissingNode(_)) => Err(TreeError::UnknownVersion(version)),
            Err(err) => Err(err),
        }
    }

    /// Reads a committed node through the cache, falling back to the byte
    /// store and caching the decoded result.
    fn read_committed(&self, key: &NodeKey) -> Result<Node, TreeError> {
        if let Some(node) = self.cache.get(key) {
            return Ok(node);
        }
        let bytes = self
            .reader
            .get_node_bytes(key)?
            .ok_or_else(|| TreeError::MissingNode(key.to_display()))?;
        let node = decode_node(&bytes).map_err(|err| TreeError::CorruptNode {
            key: key.to_display(),
            reason: err.to_string(),
        })?;
        self.cache.put(key.clone(), node.clone());
        Ok(node)
    }

    /// Fetches the node at `(version, path)`, from the pending batch when
    /// the version is the one being built.
    fn node_at(
        &self,
        pending: &PendingBatch,
        version: Version,
        path: &NibblePath,
        new_version: Version,
    ) -> Result<Node, TreeError> {
        if version == new_version {
            pending
                .nodes
                .get(path)
                .cloned()
                .ok_or_else(|| TreeError::MissingNode(NodeKey::new(version, path.clone()).to_display()))
        } else {
            self.read_committed(&NodeKey::new(version, path.clone()))
        }
    }

    /// Applies a single `(key, value)` update against the in-flight tree.
    fn apply_update(
        &self,
        pending: &mut PendingBatch,
        key: &Hash,
        value: Option<&Hash>,
        new_version: Version,
    ) -> Result<(), TreeError> {
        let key_path = NibblePath::from_key(key);

        let (mut version, mut path) = match pending.root {
            RootSlot::Empty => {
                if let Some(value_hash) = value {
                    pending
                        .nodes
                        .insert(NibblePath::new(), Node::Leaf(LeafNode::new(*key, *value_hash)));
                    pending.root = RootSlot::Pending;
                }
                return Ok(());
            }
            RootSlot::Committed(version) => (version, NibblePath::new()),
            RootSlot::Pending => (new_version, NibblePath::new()),
        };

        let mut trace: Vec<TraceEntry> = Vec::with_capacity(MAX_NIBBLE_LEN);
        let mut node = self.node_at(pending, version, &path, new_version)?;

        loop {
            let depth = path.len();
            if depth >= MAX_NIBBLE_LEN {
                return Err(TreeError::CorruptNode {
                    key: NodeKey::new(version, path).to_display(),
                    reason: "descent exceeded the key width".into(),
                });
            }
            match node {
                Node::Internal(internal) => {
                    let nibble = key_path.get(depth)?;
                    let child = internal.child(nibble).copied();
                    let origin =
                        (version != new_version).then(|| NodeKey::new(version, path.clone()));
                    match child {
                        Some(info) => {
                            trace.push(TraceEntry {
                                path: path.clone(),
                                node: internal,
                                nibble,
                                origin,
                            });
                            path.push(nibble)?;
                            version = info.version;
                            node = self.node_at(pending, info.version, &path, new_version)?;
                        }
                        None => {
                            let Some(value_hash) = value else {
                                // Delete of an absent key: nothing copied yet,
                                // nothing to undo.
                                return Ok(());
                            };
                            trace.push(TraceEntry {
                                path: path.clone(),
                                node: internal,
                                nibble,
                                origin,
                            });
                            let leaf_path = path.child(nibble)?;
                            pending
                                .nodes
                                .insert(leaf_path, Node::Leaf(LeafNode::new(*key, *value_hash)));
                            splice_up(pending, trace, new_version);
                            return Ok(());
                        }
                    }
                }
                Node::Leaf(leaf) => {
                    if leaf.account_key == *key {
                        retire(pending, version, &path, new_version);
                        match value {
                            Some(value_hash) => {
                                pending
                                    .nodes
                                    .insert(path, Node::Leaf(LeafNode::new(*key, *value_hash)));
                                splice_up(pending, trace, new_version);
                            }
                            None => {
                                self.collapse_up(pending, trace, new_version)?;
                            }
                        }
                        return Ok(());
                    }
                    let Some(value_hash) = value else {
                        return Ok(());
                    };
                    self.split_leaf(pending, trace, path, leaf, &key_path, *key, *value_hash,
                        version, new_version)?;
                    return Ok(());
                }
            }
        }
    }

    /// Splits an occupied leaf slot between the existing leaf and a new key,
    /// materializing the branch at the first divergent nibble plus the
    /// connecting links above it.
    #[allow(clippy::too_many_arguments)]
    fn split_leaf(
        &self,
        pending: &mut PendingBatch,
        trace: Vec<TraceEntry>,
        path: NibblePath,
        existing: LeafNode,
        key_path: &NibblePath,
        key: Hash,
        value_hash: Hash,
        version: Version,
        new_version: Version,
    ) -> Result<(), TreeError> {
        retire(pending, version, &path, new_version);

        let depth = path.len();
        let existing_path = NibblePath::from_key(&existing.account_key);
        let mut divergence = depth;
        while divergence < MAX_NIBBLE_LEN
            && key_path.get(divergence)? == existing_path.get(divergence)?
        {
            divergence += 1;
        }
        if divergence >= MAX_NIBBLE_LEN {
            return Err(TreeError::InvalidInput(
                "split of identical keys".into(),
            ));
        }

        let mut branch_path = path;
        for i in depth..divergence {
            branch_path.push(key_path.get(i)?)?;
        }
        let new_nibble = key_path.get(divergence)?;
        let old_nibble = existing_path.get(divergence)?;

        let mut branch = InternalNode::new();
        branch.set_child(
            new_nibble,
            ChildInfo {
                hash: ZERO_HASH,
                version: new_version,
            },
        );
        branch.set_child(
            old_nibble,
            ChildInfo {
                hash: ZERO_HASH,
                version: new_version,
            },
        );
        pending.nodes.insert(
            branch_path.child(new_nibble)?,
            Node::Leaf(LeafNode::new(key, value_hash)),
        );
        pending
            .nodes
            .insert(branch_path.child(old_nibble)?, Node::Leaf(existing));
        pending
            .nodes
            .insert(branch_path.clone(), Node::Internal(branch));

        // Connecting links from the branch back up to the split slot, each
        // carrying one internal child.
        let mut link_path = branch_path;
        for i in (depth..divergence).rev() {
            link_path.pop();
            let mut link = InternalNode::new();
            link.set_child(
                key_path.get(i)?,
                ChildInfo {
                    hash: ZERO_HASH,
                    version: new_version,
                },
            );
            pending.nodes.insert(link_path.clone(), Node::Internal(link));
        }

        splice_up(pending, trace, new_version);
        Ok(())
    }

    /// Walks the trace upward after a leaf removal, collapsing ancestors
    /// whose subtrees shrank to a single leaf.
    fn collapse_up(
        &self,
        pending: &mut PendingBatch,
        mut trace: Vec<TraceEntry>,
        new_version: Version,
    ) -> Result<(), TreeError> {
        if trace.is_empty() {
            pending.root = RootSlot::Empty;
            return Ok(());
        }

        let mut outcome = SlotOutcome::Removed;
        while let Some(TraceEntry {
            path,
            mut node,
            nibble,
            origin,
        }) = trace.pop()
        {
            match outcome {
                SlotOutcome::Removed => {
                    node.remove_child(nibble);
                }
                SlotOutcome::Updated => {
                    node.set_child(
                        nibble,
                        ChildInfo {
                            hash: ZERO_HASH,
                            version: new_version,
                        },
                    );
                }
            }

            match node.child_count() {
                0 => {
                    if let Some(key) = origin {
                        pending.stale.insert(key);
                    } else {
                        pending.nodes.remove(&path);
                    }
                    outcome = SlotOutcome::Removed;
                }
                1 => {
                    let Some((only_nibble, only_child)) = node.sole_child() else {
                        if let Some(key) = origin {
                            pending.stale.insert(key);
                        }
                        pending.nodes.insert(path, Node::Internal(node));
                        outcome = SlotOutcome::Updated;
                        continue;
                    };
                    let child_path = path.child(only_nibble)?;
                    let child_node =
                        self.node_at(pending, only_child.version, &child_path, new_version)?;
                    match child_node {
                        Node::Leaf(leaf) => {
                            // Promote the lone surviving leaf into this slot;
                            // the internal itself is not emitted.
                            retire(pending, only_child.version, &child_path, new_version);
                            if let Some(key) = origin {
                                pending.stale.insert(key);
                            }
                            pending.nodes.insert(path, Node::Leaf(leaf));
                            outcome = SlotOutcome::Updated;
                        }
                        Node::Internal(_) => {
                            // A lone internal child stays put: its branch
                            // depth is fixed by its position.
                            if let Some(key) = origin {
                                pending.stale.insert(key);
                            }
                            pending.nodes.insert(path, Node::Internal(node));
                            outcome = SlotOutcome::Updated;
                        }
                    }
                }
                _ => {
                    if let Some(key) = origin {
                        pending.stale.insert(key);
                    }
                    pending.nodes.insert(path, Node::Internal(node));
                    outcome = SlotOutcome::Updated;
                }
            }
        }

        pending.root = match outcome {
            SlotOutcome::Removed => RootSlot::Empty,
            SlotOutcome::Updated => RootSlot::Pending,
        };
        Ok(())
    }

    /// Hashes the pending nodes bottom-up, resolves placeholder child
    /// hashes, and assembles the batch.
    fn finalize(
        &self,
        pending: PendingBatch,
        new_version: Version,
        base_root_hash: Option<Hash>,
    ) -> Result<TreeUpdateBatch, TreeError> {
        let root_slot = pending.root;
        let stale_nodes: Vec<NodeKey> = pending.stale.into_iter().collect();

        // BTreeMap order is (length, bytes); walking it in reverse visits
        // every child before its parent.
        let mut entries: Vec<(NibblePath, Node)> = pending.nodes.into_iter().collect();
        let mut hashes: HashMap<NibblePath, Hash> = HashMap::with_capacity(entries.len());
        for (path, node) in entries.iter_mut().rev() {
            if let Node::Internal(internal) = node {
                for (nibble, child) in internal.children_mut() {
                    if child.version == new_version {
                        let child_path = path.child(nibble)?;
                        child.hash = *hashes.get(&child_path).ok_or_else(|| {
                            TreeError::MissingNode(
                                NodeKey::new(new_version, child_path.clone()).to_display(),
                            )
                        })?;
                    }
                }
            }
            let hash = node.hash();
            hashes.insert(path.clone(), hash);
        }

        let new_root_hash = match root_slot {
            RootSlot::Pending => hashes
                .get(&NibblePath::new())
                .copied()
                .ok_or_else(|| {
                    TreeError::MissingNode(NodeKey::new_root(new_version).to_display())
                })?,
            RootSlot::Empty => ZERO_HASH,
            RootSlot::Committed(_) => base_root_hash.unwrap_or(ZERO_HASH),
        };

        let new_nodes = entries
            .into_iter()
            .map(|(path, node)| (NodeKey::new(new_version, path), node))
            .collect();
        Ok(TreeUpdateBatch {
            new_root_hash,
            new_nodes,
            stale_nodes,
        })
    }
}

/// Validates value widths, stable-sorts by key, and collapses duplicate
/// keys last-writer-wins.
fn normalize_updates(
    updates: Vec<(Hash, Option<Vec<u8>>)>,
) -> Result<Vec<(Hash, Option<Hash>)>, TreeError> {
    let mut normalized: Vec<(Hash, Option<Hash>)> = Vec::with_capacity(updates.len());
    for (key, value) in updates {
        let value_hash = match value {
            Some(bytes) => {
                if bytes.len() != HASH_LEN {
                    return Err(TreeError::InvalidInput(format!(
                        "value width {} (expected {HASH_LEN})",
                        bytes.len()
                    )));
                }
                let mut hash = ZERO_HASH;
                hash.copy_from_slice(&bytes);
                Some(hash)
            }
            None => None,
        };
        normalized.push((key, value_hash));
    }
    normalized.sort_by(|a, b| a.0.cmp(&b.0));

    let mut deduped: Vec<(Hash, Option<Hash>)> = Vec::with_capacity(normalized.len());
    for update in normalized {
        match deduped.last_mut() {
            Some(last) if last.0 == update.0 => *last = update,
            _ => deduped.push(update),
        }
    }
    Ok(deduped)
}

/// Supersedes the node at `(version, path)`: committed nodes are marked
/// stale, in-batch nodes are simply withdrawn.
fn retire(pending: &mut PendingBatch, version: Version, path: &NibblePath, new_version: Version) {
    if version == new_version {
        pending.nodes.remove(path);
    } else {
        pending.stale.insert(NodeKey::new(version, path.clone()));
    }
}

/// Re-emits every traced ancestor with its child pointer redirected to the
/// freshly written slot below it.
fn splice_up(pending: &mut PendingBatch, trace: Vec<TraceEntry>, new_version: Version) {
    for entry in trace.into_iter().rev() {
        let TraceEntry {
            path,
            mut node,
            nibble,
            origin,
        } = entry;
        node.set_child(
            nibble,
            ChildInfo {
                hash: ZERO_HASH,
                version: new_version,
            },
        );
        if let Some(key) = origin {
            pending.stale.insert(key);
        }
        pending.nodes.insert(path, Node::Internal(node));
    }
    pending.root = RootSlot::Pending;
}
