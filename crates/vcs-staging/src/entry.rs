use bstr::BString;
use vcs_hash::ObjectId;
use vcs_object::FileMode;

use crate::Stage;

/// One staging entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingEntry {
    /// Repository-relative path, `/`-separated.
    pub path: BString,
    /// Id of the staged blob (or gitlink commit).
    pub id: ObjectId,
    pub mode: FileMode,
    pub stage: Stage,
    /// Cached filesystem stat data.
    pub stat: StatData,
    pub flags: EntryFlags,
}

impl StagingEntry {
    /// An entry with zeroed stat data and default flags.
    pub fn new(path: BString, id: ObjectId, mode: FileMode, stage: Stage) -> Self {
        Self {
            path,
            id,
            mode,
            stage,
            stat: StatData::default(),
            flags: EntryFlags::default(),
        }
    }

    /// Validate the path: non-empty, relative, no empty or dot components,
    /// no NUL.
    pub fn validate_path(path: &[u8]) -> bool {
        if path.is_empty() || path.contains(&0) || path.starts_with(b"/") || path.ends_with(b"/") {
            return false;
        }
        path.split(|&b| b == b'/')
            .all(|part| !part.is_empty() && part != b"." && part != b"..")
    }
}

/// Filesystem stat data cached per entry, in the on-disk layout's units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatData {
    pub ctime_secs: u32,
    pub ctime_nsecs: u32,
    pub mtime_secs: u32,
    pub mtime_nsecs: u32,
    pub dev: u32,
    pub ino: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u32,
}

impl StatData {
    /// Capture from filesystem metadata.
    #[cfg(unix)]
    pub fn from_metadata(meta: &std::fs::Metadata) -> Self {
        use std::os::unix::fs::MetadataExt;
        Self {
            ctime_secs: meta.ctime() as u32,
            ctime_nsecs: meta.ctime_nsec() as u32,
            mtime_secs: meta.mtime() as u32,
            mtime_nsecs: meta.mtime_nsec() as u32,
            dev: meta.dev() as u32,
            ino: meta.ino() as u32,
            uid: meta.uid(),
            gid: meta.gid(),
            size: meta.len() as u32,
        }
    }

    /// Capture from filesystem metadata (non-Unix fallback).
    #[cfg(not(unix))]
    pub fn from_metadata(meta: &std::fs::Metadata) -> Self {
        use std::time::UNIX_EPOCH;
        let mtime = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .unwrap_or_default();
        Self {
            mtime_secs: mtime.as_secs() as u32,
            mtime_nsecs: mtime.subsec_nanos(),
            size: meta.len() as u32,
            ..Default::default()
        }
    }
}

/// An index extension preserved verbatim.
///
/// Extensions cache derived state (the TREE cache and friends); they are
/// kept byte-for-byte across a parse/serialize round-trip and discarded
/// as soon as the entry set is mutated, since a stale cache is worse than
/// none.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawExtension {
    pub signature: [u8; 4],
    pub data: Vec<u8>,
}

/// Per-entry flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EntryFlags {
    /// Assume the worktree file is unchanged.
    pub assume_valid: bool,
    /// Placeholder staged without content (`add -N`).
    pub intent_to_add: bool,
    /// Do not materialize in the worktree.
    pub skip_worktree: bool,
}

impl EntryFlags {
    /// Whether any flag needs the extended (v3+) flags word.
    pub fn needs_extended(&self) -> bool {
        self.intent_to_add || self.skip_worktree
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_validation() {
        assert!(StagingEntry::validate_path(b"a.txt"));
        assert!(StagingEntry::validate_path(b"src/deep/nested.rs"));
        assert!(!StagingEntry::validate_path(b""));
        assert!(!StagingEntry::validate_path(b"/abs"));
        assert!(!StagingEntry::validate_path(b"trailing/"));
        assert!(!StagingEntry::validate_path(b"a//b"));
        assert!(!StagingEntry::validate_path(b"a/../b"));
        assert!(!StagingEntry::validate_path(b"./a"));
        assert!(!StagingEntry::validate_path(b"nul\0byte"));
    }

    #[test]
    fn extended_flag_detection() {
        assert!(!EntryFlags::default().needs_extended());
        assert!(EntryFlags {
            intent_to_add: true,
            ..Default::default()
        }
        .needs_extended());
        assert!(EntryFlags {
            skip_worktree: true,
            ..Default::default()
        }
        .needs_extended());
        // assume_valid fits the basic flags word.
        assert!(!EntryFlags {
            assume_valid: true,
            ..Default::default()
        }
        .needs_extended());
    }
}
