//! The staging area (index).
//!
//! An in-memory sorted map of `(path, stage)` → entry, serialized in the
//! DIRC binary format (versions 2, 3, and 4, with v4 path-prefix
//! compression). Mutation goes through an [`edit::StagingEditor`] (apply a
//! sequence of patches atomically) or an [`edit::StagingBuilder`] (replace
//! everything); trees round-trip through [`tree_io`].

pub mod edit;
mod entry;
pub mod read;
pub mod tree_io;
pub mod write;

pub use edit::{StagingBuilder, StagingEditor};
pub use entry::{EntryFlags, RawExtension, StagingEntry, StatData};

use std::collections::BTreeMap;
use std::io::Write as _;
use std::path::Path;

use bstr::{BStr, BString};
use vcs_raw::RawStore;
use vcs_utils::lockfile::LockFile;

/// Errors produced by staging operations.
#[derive(Debug, thiserror::Error)]
pub enum StagingError {
    #[error("invalid index header: {0}")]
    InvalidHeader(String),

    #[error("unsupported index version {0}")]
    UnsupportedVersion(u32),

    #[error("invalid index entry at offset {offset}: {reason}")]
    InvalidEntry { offset: usize, reason: String },

    #[error("index checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("invalid path '{0}'")]
    InvalidPath(String),

    #[error("unmerged entries present")]
    Conflicts,

    #[error(transparent)]
    Raw(#[from] vcs_raw::RawError),

    #[error(transparent)]
    Odb(#[from] vcs_odb::OdbError),

    #[error(transparent)]
    Hash(#[from] vcs_hash::HashError),

    #[error(transparent)]
    Util(#[from] vcs_utils::UtilError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Merge stage of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Stage {
    /// Normal, merged entry.
    #[default]
    Merged = 0,
    /// Common ancestor during a conflict.
    Base = 1,
    /// "Our" side of a conflict.
    Ours = 2,
    /// "Their" side of a conflict.
    Theirs = 3,
}

impl Stage {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Merged),
            1 => Some(Self::Base),
            2 => Some(Self::Ours),
            3 => Some(Self::Theirs),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Stat identity of the on-disk index file, for outdatedness checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct FileSnapshot {
    dev: u64,
    ino: u64,
    size: u64,
    mtime_secs: i64,
    mtime_nsecs: u32,
}

impl FileSnapshot {
    fn of(path: &Path) -> std::io::Result<Self> {
        let meta = std::fs::metadata(path)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::MetadataExt;
            Ok(Self {
                dev: meta.dev(),
                ino: meta.ino(),
                size: meta.len(),
                mtime_secs: meta.mtime(),
                mtime_nsecs: meta.mtime_nsec() as u32,
            })
        }
        #[cfg(not(unix))]
        {
            use std::time::UNIX_EPOCH;
            let mtime = meta
                .modified()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .unwrap_or_default();
            Ok(Self {
                dev: 0,
                ino: 0,
                size: meta.len(),
                mtime_secs: mtime.as_secs() as i64,
                mtime_nsecs: mtime.subsec_nanos(),
            })
        }
    }
}

/// The staging area: entries uniquely keyed by `(path, stage)`, kept in
/// the canonical serialization order.
#[derive(Debug)]
pub struct Staging {
    version: u32,
    entries: BTreeMap<(BString, u8), StagingEntry>,
    /// Extensions carried over from a parse; dropped on mutation.
    extensions: Vec<RawExtension>,
    /// Snapshot of the index file this state was loaded from.
    snapshot: Option<FileSnapshot>,
}

impl Default for Staging {
    fn default() -> Self {
        Self::new()
    }
}

impl Staging {
    /// An empty staging area, serialized as version 2 by default.
    pub fn new() -> Self {
        Self {
            version: 2,
            entries: BTreeMap::new(),
            extensions: Vec::new(),
            snapshot: None,
        }
    }

    /// The on-disk format version (2, 3, or 4).
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Select the serialization version.
    pub fn set_version(&mut self, version: u32) -> Result<(), StagingError> {
        if !(2..=4).contains(&version) {
            return Err(StagingError::UnsupportedVersion(version));
        }
        self.version = version;
        Ok(())
    }

    /// Entries in canonical `(path, stage)` order.
    pub fn entries(&self) -> impl Iterator<Item = &StagingEntry> {
        self.entries.values()
    }

    /// Look up one entry.
    pub fn get(&self, path: &BStr, stage: Stage) -> Option<&StagingEntry> {
        self.entries.get(&(BString::from(path), stage.as_u8()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether any entry sits at a conflict stage.
    pub fn has_conflicts(&self) -> bool {
        self.entries.values().any(|e| e.stage != Stage::Merged)
    }

    /// Paths that currently carry conflict stages.
    pub fn conflicted_paths(&self) -> Vec<BString> {
        let mut paths: Vec<BString> = self
            .entries
            .values()
            .filter(|e| e.stage != Stage::Merged)
            .map(|e| e.path.clone())
            .collect();
        paths.dedup();
        paths
    }

    /// Open an editor applying a sequence of patches on `finish`.
    pub fn editor(&mut self) -> StagingEditor<'_> {
        StagingEditor::new(self)
    }

    /// Open a builder replacing the whole entry set on `finish`.
    pub fn builder(&mut self) -> StagingBuilder<'_> {
        StagingBuilder::new(self)
    }

    /// Extensions preserved from the last parse.
    pub fn extensions(&self) -> &[RawExtension] {
        &self.extensions
    }

    pub(crate) fn insert_entry(&mut self, entry: StagingEntry) {
        self.extensions.clear();
        let stage = entry.stage.as_u8();
        if stage == 0 {
            // A merged entry resolves any conflict recorded for the path.
            for conflict_stage in 1..=3u8 {
                self.entries.remove(&(entry.path.clone(), conflict_stage));
            }
        } else {
            self.entries.remove(&(entry.path.clone(), 0));
        }
        self.entries.insert((entry.path.clone(), stage), entry);
    }

    pub(crate) fn remove_path(&mut self, path: &BStr) -> bool {
        self.extensions.clear();
        let mut removed = false;
        for stage in 0..=3u8 {
            removed |= self.entries.remove(&(BString::from(path), stage)).is_some();
        }
        removed
    }

    pub(crate) fn remove_stage(&mut self, path: &BStr, stage: Stage) -> bool {
        self.extensions.clear();
        self.entries
            .remove(&(BString::from(path), stage.as_u8()))
            .is_some()
    }

    pub(crate) fn replace_all(&mut self, entries: Vec<StagingEntry>) {
        self.extensions.clear();
        self.entries.clear();
        for entry in entries {
            self.insert_entry(entry);
        }
    }

    /// Serialize to the DIRC binary form.
    pub fn serialize(&self) -> Result<Vec<u8>, StagingError> {
        write::serialize_index(self)
    }

    /// Parse from the DIRC binary form, verifying the trailing checksum.
    pub fn parse(data: &[u8]) -> Result<Self, StagingError> {
        read::parse_index(data)
    }

    /// Persist under `key` in a raw store.
    pub fn write_to(&self, store: &dyn RawStore, key: &str) -> Result<(), StagingError> {
        let bytes = self.serialize()?;
        store.store_bytes(key, &bytes)?;
        Ok(())
    }

    /// Load from a raw store.
    pub fn read_from(store: &dyn RawStore, key: &str) -> Result<Self, StagingError> {
        Self::parse(&store.load_bytes(key)?)
    }

    /// Load from an index file, recording its stat identity.
    pub fn load(path: &Path) -> Result<Self, StagingError> {
        let data = std::fs::read(path)?;
        let mut staging = Self::parse(&data)?;
        staging.snapshot = Some(FileSnapshot::of(path)?);
        Ok(staging)
    }

    /// Write to an index file through the lock-file protocol.
    pub fn save(&mut self, path: &Path) -> Result<(), StagingError> {
        let bytes = self.serialize()?;
        let mut lock = LockFile::acquire(path)?;
        lock.write_all(&bytes)?;
        lock.commit()?;
        self.snapshot = Some(FileSnapshot::of(path)?);
        Ok(())
    }

    /// Whether the on-disk index changed since this state was loaded,
    /// judged by the `(dev, ino, size, mtime)` tuple.
    pub fn is_outdated(&self, path: &Path) -> Result<bool, StagingError> {
        let Some(snapshot) = self.snapshot else {
            return Ok(path.exists());
        };
        match FileSnapshot::of(path) {
            Ok(current) => Ok(current != snapshot),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(true),
            Err(e) => Err(e.into()),
        }
    }

    pub(crate) fn set_parsed(
        version: u32,
        entries: Vec<StagingEntry>,
        extensions: Vec<RawExtension>,
    ) -> Self {
        let mut staging = Self {
            version,
            entries: BTreeMap::new(),
            extensions,
            snapshot: None,
        };
        for entry in entries {
            staging
                .entries
                .insert((entry.path.clone(), entry.stage.as_u8()), entry);
        }
        staging
    }
}
