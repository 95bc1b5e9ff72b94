// Path: crates/types/src/lib.rs
#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! Shared primitives and error types for the Arbor state tree.

pub mod error;
pub mod hash;

pub use error::TreeError;
pub use hash::{Hash, Version, HASH_LEN, ZERO_HASH};
