// Path: crates/types/src/error/mod.rs
//! Error taxonomy for the Arbor state tree.

use thiserror::Error;

/// Errors surfaced by the tree engine, cache, and adapter.
///
/// All errors are fatal to the operation that raised them: the engine never
/// retries and never suppresses an error, and a failed batch leaves no
/// observable effect on the pending batch or the version index.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    /// A batch was submitted at a version not strictly greater than the
    /// latest committed one.
    #[error("version regression: requested {requested}, latest committed {latest}")]
    VersionRegression {
        /// The version the caller asked to commit.
        requested: u64,
        /// The latest version already known to the engine.
        latest: u64,
    },
    /// A read was issued against a version with no known root.
    #[error("unknown version: {0}")]
    UnknownVersion(u64),
    /// The byte store returned nothing for a node the tree expected.
    #[error("missing node: {0}")]
    MissingNode(String),
    /// Persisted node bytes were rejected by the decoder.
    #[error("corrupt node at {key}: {reason}")]
    CorruptNode {
        /// Display form of the offending node key.
        key: String,
        /// Why the decoder rejected the bytes.
        reason: String,
    },
    /// Malformed caller input: bad nibble, out-of-range index, or a value of
    /// the wrong width.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}
