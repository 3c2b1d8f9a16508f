//! The mutable reference namespace.
//!
//! A ref is a named pointer at an object id, or a symbolic ref pointing
//! at another ref name (`HEAD → refs/heads/main`). Individual writes are
//! atomic; [`RefStore::compare_and_swap`] is the primitive for safe
//! concurrent updates. Backends: an in-memory map and the files backend
//! (loose ref files plus the consolidated `packed-refs`).

pub mod files;
mod memory;
mod name;

pub use files::FilesRefStore;
pub use memory::MemoryRefStore;
pub use name::RefName;

use std::path::PathBuf;

use vcs_hash::ObjectId;

/// Symbolic chains are followed at most this many links deep; a longer
/// chain (including any cycle) fails resolution.
pub const MAX_SYMREF_DEPTH: usize = 5;

/// Errors produced by ref operations.
#[derive(Debug, thiserror::Error)]
pub enum RefError {
    #[error("invalid ref name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    #[error("compare-and-swap on '{name}' failed: expected {expected:?}, found {actual:?}")]
    Conflict {
        name: String,
        expected: Option<ObjectId>,
        actual: Option<ObjectId>,
    },

    #[error("symbolic ref chain from '{name}' exceeds depth {MAX_SYMREF_DEPTH}")]
    SymrefTooDeep { name: String },

    #[error("ref '{name}' conflicts with existing ref '{existing}'")]
    DirectoryConflict { name: String, existing: String },

    #[error("parse error: {0}")]
    Parse(String),

    #[error(transparent)]
    Hash(#[from] vcs_hash::HashError),

    #[error(transparent)]
    Util(#[from] vcs_utils::UtilError),

    #[error("i/o error on {path}: {source}")]
    IoPath {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A reference: direct (with an optional cached peel for annotated tags)
/// or symbolic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
    Direct {
        name: RefName,
        target: ObjectId,
        /// Cached fully-peeled id for annotated tags (from packed-refs).
        peeled: Option<ObjectId>,
    },
    Symbolic {
        name: RefName,
        target: RefName,
    },
}

impl Reference {
    pub fn name(&self) -> &RefName {
        match self {
            Self::Direct { name, .. } | Self::Symbolic { name, .. } => name,
        }
    }

    pub fn is_symbolic(&self) -> bool {
        matches!(self, Self::Symbolic { .. })
    }

    /// The direct target, if this is a direct ref.
    pub fn direct_target(&self) -> Option<ObjectId> {
        match self {
            Self::Direct { target, .. } => Some(*target),
            Self::Symbolic { .. } => None,
        }
    }
}

/// A reference store.
///
/// Writes are individually atomic and durable on return. A `set` followed
/// by a `resolve` of the same name observes the write.
pub trait RefStore: Send + Sync {
    /// Read a ref without following symbolic links.
    fn get(&self, name: &RefName) -> Result<Option<Reference>, RefError>;

    /// Store a direct ref, replacing any previous value.
    fn set(&self, name: &RefName, target: ObjectId) -> Result<(), RefError>;

    /// Store a symbolic ref pointing at `target`.
    fn set_symbolic(&self, name: &RefName, target: RefName) -> Result<(), RefError>;

    /// Delete a ref. Returns false if it did not exist.
    fn delete(&self, name: &RefName) -> Result<bool, RefError>;

    /// Atomically replace the ref's value iff it currently resolves to
    /// `expected` (`None` = the ref must not exist). On mismatch, fails
    /// with [`RefError::Conflict`] carrying the observed value.
    fn compare_and_swap(
        &self,
        name: &RefName,
        expected: Option<ObjectId>,
        new: ObjectId,
    ) -> Result<(), RefError>;

    /// All refs under `refs/`, sorted by name.
    fn list(&self) -> Result<Vec<Reference>, RefError>;

    /// Resolve a name to an object id, following symbolic refs up to
    /// [`MAX_SYMREF_DEPTH`] links.
    fn resolve(&self, name: &RefName) -> Result<Option<ObjectId>, RefError> {
        let mut current = name.clone();
        for _ in 0..=MAX_SYMREF_DEPTH {
            match self.get(&current)? {
                None => return Ok(None),
                Some(Reference::Direct { target, .. }) => return Ok(Some(target)),
                Some(Reference::Symbolic { target, .. }) => current = target,
            }
        }
        Err(RefError::SymrefTooDeep {
            name: name.to_string(),
        })
    }
}
