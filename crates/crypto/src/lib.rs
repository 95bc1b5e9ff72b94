// Path: crates/crypto/src/lib.rs
#![forbid(unsafe_code)]

//! Digest functions for the Arbor state tree.
//!
//! The deployment digest is BLAKE3 in extended-output mode, widened to the
//! 64-byte hash width the on-disk format is built around. The tree engine is
//! agnostic to the digest choice as long as the width is consistent.

pub mod hash;

pub use hash::{blake3_512, blake3_512_prefixed};
