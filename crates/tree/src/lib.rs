// Path: crates/tree/src/lib.rs
#![forbid(unsafe_code)]
#![cfg_attr(
    not(test),
    deny(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::indexing_slicing
    )
)]

//! # Arbor state tree
//!
//! A persistent (multi-version) radix-16 authenticated key/value tree. Each
//! write is a batch of `(key, Option<value>)` updates applied at a new,
//! strictly greater version; the batch produces a new root hash and the set
//! of nodes to persist. Old nodes are never mutated, so lookups at any
//! committed version walk the tree exactly as it existed then.
//!
//! The engine is iterative throughout: insertion, splitting, and collapse
//! use an explicit descent trace instead of recursion, keeping stack usage
//! bounded for execution inside enclaves.

pub mod adapter;
pub mod bitmap;
pub mod cache;
pub mod node;
pub mod path;
pub mod reader;
pub mod tree;

pub use adapter::StateTreeAdapter;
pub use bitmap::ChildBitmap;
pub use cache::{LruNodeCache, NodeCache, SpeculativeNodeCache};
pub use node::{ChildInfo, InternalNode, LeafNode, Node, NodeKey};
pub use path::NibblePath;
pub use reader::{MemoryReader, NullReader, TreeReader};
pub use tree::{JellyfishMerkleTree, TreeUpdateBatch};
