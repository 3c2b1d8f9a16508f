//! The delta-aware store contract.
//!
//! A [`DeltaStore`] persists full objects and deltas in atomic batches: a
//! batch opened with [`start_update`](DeltaStore::start_update) becomes
//! visible all at once on [`close`](DeltaUpdate::close), or not at all.
//! Stores that can resolve packed objects on their own additionally
//! implement [`PackedObjectSource`].

use vcs_object::ObjectType;

use crate::{Delta, DeltaError};

/// A base → target delta association.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeltaLink {
    pub base: String,
    pub target: String,
}

impl DeltaLink {
    pub fn new(base: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            target: target.into(),
        }
    }
}

/// A stored delta, as returned by [`DeltaStore::load_delta`].
#[derive(Debug, Clone)]
pub struct StoredDelta {
    /// Key of the base object.
    pub base: String,
    /// The delta itself.
    pub delta: Delta,
    /// Encoded delta size over resolved target size.
    pub ratio: f64,
}

/// Resolved shape of a delta chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeltaChainInfo {
    /// Key of the immediate base.
    pub base: String,
    /// Key of the chain's target object.
    pub target: String,
    /// Number of delta hops from target to the full object.
    pub depth: u32,
    /// Size of the fully resolved target.
    pub original_size: u64,
    /// Encoded size of the target's delta.
    pub compressed_size: u64,
    /// Keys from the target back to (and including) the full object.
    pub chain: Vec<String>,
}

/// An open batch of writes against a [`DeltaStore`].
pub trait DeltaUpdate {
    /// Add a full object to the batch.
    fn store_object(
        &mut self,
        key: &str,
        obj_type: ObjectType,
        data: &[u8],
    ) -> Result<(), DeltaError>;

    /// Add a delta for `target_key` against `base_key`. The base must be
    /// resolvable in the same store once the batch commits.
    fn store_delta(
        &mut self,
        base_key: &str,
        target_key: &str,
        delta: Delta,
    ) -> Result<(), DeltaError>;

    /// Commit the batch atomically.
    fn close(self) -> Result<(), DeltaError>
    where
        Self: Sized;

    /// Discard the batch. Dropping without `close` has the same effect.
    fn abort(self)
    where
        Self: Sized,
    {
    }
}

/// A store holding full objects and deltas between them.
pub trait DeltaStore {
    type Update: DeltaUpdate;

    /// Open a new write batch.
    fn start_update(&self) -> Result<Self::Update, DeltaError>;

    /// The delta stored for `target_key`, if that key is deltified.
    fn load_delta(&self, target_key: &str) -> Result<Option<StoredDelta>, DeltaError>;

    /// Whether `key` is stored as a delta.
    fn is_delta(&self, key: &str) -> Result<bool, DeltaError>;

    /// Undo deltification of `key`, materializing it as a full object.
    ///
    /// With `keep_as_base` the materialized object stays available for
    /// chains that use it as a base; without it, removal is refused while
    /// dependents exist. Returns false if `key` was not a delta.
    fn remove_delta(&self, key: &str, keep_as_base: bool) -> Result<bool, DeltaError>;

    /// All stored delta links.
    fn list_deltas(&self) -> Result<Vec<DeltaLink>, DeltaError>;

    /// Chain shape for `key`, or None if `key` is a full object or absent.
    fn chain_info(&self, key: &str) -> Result<Option<DeltaChainInfo>, DeltaError>;
}

/// Capability of resolving packed objects to their full content.
///
/// The counterpart of the optional `loadObject`/`hasObject` surface of the
/// original duck-typed design: a store either implements this or it does
/// not, and consumers require the capability explicitly.
pub trait PackedObjectSource {
    /// Resolve `key` through any delta chain to its full content.
    fn load_object(&self, key: &str) -> Result<Option<(ObjectType, Vec<u8>)>, DeltaError>;

    /// Whether `key` resolves in this store.
    fn has_object(&self, key: &str) -> Result<bool, DeltaError>;

    /// Keys of deltas directly based on `base_key`.
    fn find_dependents(&self, base_key: &str) -> Result<Vec<String>, DeltaError>;
}
