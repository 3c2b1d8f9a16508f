//! Pack file format support: reading, writing, indexing, and the
//! pack-backed delta store.
//!
//! A pack concatenates many objects, some stored whole and some as deltas
//! against earlier objects, with a sidecar index for random access. Packs
//! are immutable once published; updates always produce a new pack.

pub mod entry;
pub mod index;
pub mod pack;
pub mod store;
pub mod verify;
pub mod write;

use vcs_hash::ObjectId;
use vcs_object::ObjectType;

/// Errors produced by pack operations.
#[derive(Debug, thiserror::Error)]
pub enum PackError {
    #[error("invalid pack header: {0}")]
    InvalidHeader(String),

    #[error("invalid pack index: {0}")]
    InvalidIndex(String),

    #[error("unsupported pack version {0}")]
    UnsupportedVersion(u32),

    #[error("corrupt pack entry at offset {0}")]
    CorruptEntry(u64),

    #[error("delta base not found: {0}")]
    MissingBase(ObjectId),

    #[error("delta chain too deep (>{max_depth}) at offset {offset}")]
    ChainTooDeep { offset: u64, max_depth: usize },

    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("object count mismatch: declared {declared}, wrote {written}")]
    CountMismatch { declared: u32, written: u32 },

    #[error("invalid argument for {field}: {reason}")]
    InvalidArgument { field: &'static str, reason: String },

    #[error(transparent)]
    Delta(#[from] vcs_delta::DeltaError),

    #[error(transparent)]
    Object(#[from] vcs_object::ObjectError),

    #[error(transparent)]
    Hash(#[from] vcs_hash::HashError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Entry kind as stored in a pack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackEntryKind {
    Commit,
    Tree,
    Blob,
    Tag,
    /// Delta whose base lives earlier in the same pack.
    OfsDelta { base_offset: u64 },
    /// Delta whose base is named by id, possibly in another pack.
    RefDelta { base_id: ObjectId },
}

impl PackEntryKind {
    /// The object type of a non-delta entry.
    pub fn to_object_type(self) -> Option<ObjectType> {
        match self {
            Self::Commit => Some(ObjectType::Commit),
            Self::Tree => Some(ObjectType::Tree),
            Self::Blob => Some(ObjectType::Blob),
            Self::Tag => Some(ObjectType::Tag),
            Self::OfsDelta { .. } | Self::RefDelta { .. } => None,
        }
    }

    /// Whether this entry is a delta.
    pub fn is_delta(&self) -> bool {
        matches!(self, Self::OfsDelta { .. } | Self::RefDelta { .. })
    }

    /// The wire type number.
    pub fn type_number(&self) -> u8 {
        match self {
            Self::Commit => 1,
            Self::Tree => 2,
            Self::Blob => 3,
            Self::Tag => 4,
            Self::OfsDelta { .. } => 6,
            Self::RefDelta { .. } => 7,
        }
    }

    /// The wire type number of a non-delta object.
    pub fn from_object_type(obj_type: ObjectType) -> u8 {
        match obj_type {
            ObjectType::Commit => 1,
            ObjectType::Tree => 2,
            ObjectType::Blob => 3,
            ObjectType::Tag => 4,
        }
    }
}

/// A fully resolved object read out of a pack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedObject {
    pub obj_type: ObjectType,
    pub data: Vec<u8>,
}

/// Pack wire constants.
pub const PACK_SIGNATURE: &[u8; 4] = b"PACK";
pub const PACK_VERSION: u32 = 2;
pub const PACK_HEADER_SIZE: usize = 12;

/// Index v2 constants.
pub const IDX_SIGNATURE: [u8; 4] = [0xff, 0x74, 0x4f, 0x63]; // "\377tOc"
pub const IDX_VERSION: u32 = 2;

/// Hard cap on chain length during resolution. A defect guard, far above
/// anything the packing policy will produce.
pub const MAX_DELTA_CHAIN_DEPTH: usize = 512;
