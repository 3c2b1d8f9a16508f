//! Delta compression model and the delta-aware store contract.
//!
//! A binary delta is an ordered list of copy/insert instructions plus base
//! and target sizes, encoded in the pack delta wire format. Trees can
//! alternatively be deltified structurally (per-entry add/modify/remove);
//! the pack backend requires binary deltas, while memory and key-value
//! backends accept either form.

pub mod apply;
mod binary;
pub mod codec;
pub mod compute;
mod memory;
pub mod store;
pub mod tree_delta;

pub use binary::{BinaryDelta, DeltaOp};
pub use memory::MemoryDeltaStore;
pub use store::{
    DeltaChainInfo, DeltaLink, DeltaStore, DeltaUpdate, PackedObjectSource, StoredDelta,
};
pub use tree_delta::{TreeDelta, TreeDeltaOp};

/// Default cap on delta chain length.
pub const DEFAULT_MAX_CHAIN_DEPTH: u32 = 50;

/// Errors produced by delta operations.
#[derive(Debug, thiserror::Error)]
pub enum DeltaError {
    #[error("invalid delta at offset {offset}: {reason}")]
    InvalidDelta { offset: usize, reason: String },

    #[error("delta base size mismatch: delta says {declared}, base is {actual}")]
    BaseSizeMismatch { declared: u64, actual: u64 },

    #[error("delta target size mismatch: delta says {declared}, produced {actual}")]
    TargetSizeMismatch { declared: u64, actual: u64 },

    #[error("object not found: {key}")]
    NotFound { key: String },

    #[error("delta chain for {key} exceeds depth {max}")]
    ChainTooDeep { key: String, depth: u32, max: u32 },

    #[error("invalid argument for {field}: {reason}")]
    InvalidArgument { field: &'static str, reason: String },

    #[error("update already closed")]
    UpdateClosed,

    #[error("backend error: {0}")]
    Backend(String),

    #[error(transparent)]
    Object(#[from] vcs_object::ObjectError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A delta in either representation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delta {
    /// Instruction stream against the base's serialized bytes.
    Binary(BinaryDelta),
    /// Per-entry edits against a base tree.
    Tree(TreeDelta),
}

impl Delta {
    /// Size of the encoded delta in bytes, the numerator of the
    /// compression ratio.
    pub fn encoded_size(&self) -> u64 {
        match self {
            Self::Binary(d) => d.encode().len() as u64,
            Self::Tree(d) => d.encode().len() as u64,
        }
    }

    /// Whether this is a structural tree delta.
    pub fn is_structural(&self) -> bool {
        matches!(self, Self::Tree(_))
    }
}
