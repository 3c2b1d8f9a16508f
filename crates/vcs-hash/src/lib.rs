//! Object identity for the vcs storage core.
//!
//! Provides the `ObjectId` key type, hex encoding/decoding, streaming hash
//! computation over the `"<type> <size>\0<content>"` preimage, and the
//! fan-out helpers shared by the pack index reader and writer.

mod algorithm;
pub mod fanout;
pub mod hasher;
pub mod hex;
mod oid;

pub use algorithm::HashAlgorithm;
pub use oid::ObjectId;

/// Errors produced by identity and hashing operations.
#[derive(Debug, thiserror::Error)]
pub enum HashError {
    #[error("invalid hex length: expected {expected}, got {actual}")]
    InvalidHexLength { expected: usize, actual: usize },

    #[error("invalid hex character '{character}' at position {position}")]
    InvalidHex { position: usize, character: char },

    #[error("invalid digest length: expected {expected}, got {actual}")]
    InvalidDigestLength { expected: usize, actual: usize },

    #[error("SHA-1 collision attack detected")]
    Sha1Collision,
}
