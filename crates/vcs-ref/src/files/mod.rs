//! The files-backed ref store: loose ref files plus `packed-refs`.
//!
//! The loose file always wins over the packed entry for the same name.
//! Every write goes to a loose file through the lock-file protocol;
//! [`FilesRefStore::pack_refs`] consolidates direct refs into
//! `packed-refs` afterwards.

mod loose;
pub mod packed;

pub use packed::{PackedEntry, PackedRefs};

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use vcs_hash::ObjectId;
use vcs_utils::lockfile::LockFile;

use crate::{RefError, RefName, RefStore, Reference, MAX_SYMREF_DEPTH};

/// Ref store over a directory (`HEAD`, `refs/`, `packed-refs`).
pub struct FilesRefStore {
    root: PathBuf,
}

impl FilesRefStore {
    /// Open a store rooted at `root`. The directory is created lazily by
    /// the first write.
    pub fn open(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Follow symbolic links to the name a write should land on.
    fn final_name(&self, name: &RefName) -> Result<RefName, RefError> {
        let mut current = name.clone();
        for _ in 0..=MAX_SYMREF_DEPTH {
            match self.get(&current)? {
                Some(Reference::Symbolic { target, .. }) => current = target,
                _ => return Ok(current),
            }
        }
        Err(RefError::SymrefTooDeep {
            name: name.to_string(),
        })
    }

    /// The current direct value of `name` (no symref following).
    fn current_value(&self, name: &RefName) -> Result<Option<ObjectId>, RefError> {
        if let Some(reference) = loose::read_loose(&self.root, name)? {
            return Ok(reference.direct_target());
        }
        Ok(PackedRefs::load(&self.root)?
            .lookup(name)
            .map(|entry| entry.target))
    }

    /// Consolidate all direct refs under `refs/` into `packed-refs` and
    /// remove their loose files. Symbolic refs stay loose.
    pub fn pack_refs(&self) -> Result<usize, RefError> {
        let mut packed = PackedRefs::load(&self.root)?;
        let mut to_delete = Vec::new();

        for name in loose::enumerate_loose(&self.root)? {
            if let Some(Reference::Direct { target, .. }) =
                loose::read_loose(&self.root, &name)?
            {
                packed.upsert(PackedEntry {
                    name: name.clone(),
                    target,
                    peeled: None,
                });
                to_delete.push(name);
            }
        }

        packed.store(&self.root)?;
        for name in &to_delete {
            loose::delete_loose(&self.root, name)?;
        }
        Ok(to_delete.len())
    }
}

impl RefStore for FilesRefStore {
    fn get(&self, name: &RefName) -> Result<Option<Reference>, RefError> {
        if let Some(reference) = loose::read_loose(&self.root, name)? {
            return Ok(Some(reference));
        }
        Ok(PackedRefs::load(&self.root)?
            .lookup(name)
            .map(|entry| Reference::Direct {
                name: name.clone(),
                target: entry.target,
                peeled: entry.peeled,
            }))
    }

    fn set(&self, name: &RefName, target: ObjectId) -> Result<(), RefError> {
        loose::write_loose(&self.root, name, &target)
    }

    fn set_symbolic(&self, name: &RefName, target: RefName) -> Result<(), RefError> {
        loose::write_symbolic(&self.root, name, &target)
    }

    fn delete(&self, name: &RefName) -> Result<bool, RefError> {
        let loose_removed = loose::delete_loose(&self.root, name)?;

        let mut packed = PackedRefs::load(&self.root)?;
        let packed_removed = packed.remove(name);
        if packed_removed {
            packed.store(&self.root)?;
        }

        Ok(loose_removed || packed_removed)
    }

    fn compare_and_swap(
        &self,
        name: &RefName,
        expected: Option<ObjectId>,
        new: ObjectId,
    ) -> Result<(), RefError> {
        let target_name = self.final_name(name)?;
        let path = loose::ref_path(&self.root, &target_name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| RefError::IoPath {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        // The lock file makes read-compare-write atomic: whoever holds
        // <ref>.lock owns the transition. Contenders wait briefly for the
        // holder instead of failing outright, so a losing swap reports the
        // value conflict rather than the transient lock.
        let mut lock = acquire_with_retry(&path)?;
        let actual = self.current_value(&target_name)?;
        if actual != expected {
            lock.rollback()?;
            return Err(RefError::Conflict {
                name: name.to_string(),
                expected,
                actual,
            });
        }

        lock.write_all(format!("{}\n", new.to_hex()).as_bytes())
            .map_err(|e| RefError::IoPath {
                path: path.clone(),
                source: e,
            })?;
        lock.commit()?;
        Ok(())
    }

    fn list(&self) -> Result<Vec<Reference>, RefError> {
        // Loose wins over packed for the same name.
        let mut by_name: BTreeMap<RefName, Reference> = BTreeMap::new();

        for entry in PackedRefs::load(&self.root)?.entries() {
            by_name.insert(
                entry.name.clone(),
                Reference::Direct {
                    name: entry.name.clone(),
                    target: entry.target,
                    peeled: entry.peeled,
                },
            );
        }
        for name in loose::enumerate_loose(&self.root)? {
            if let Some(reference) = loose::read_loose(&self.root, &name)? {
                by_name.insert(name, reference);
            }
        }

        Ok(by_name.into_values().collect())
    }
}

const LOCK_RETRY_LIMIT: u32 = 200;
const LOCK_RETRY_DELAY_MS: u64 = 2;

fn acquire_with_retry(path: &Path) -> Result<LockFile, RefError> {
    for _ in 0..LOCK_RETRY_LIMIT {
        if let Some(lock) = LockFile::try_acquire(path)? {
            return Ok(lock);
        }
        std::thread::sleep(std::time::Duration::from_millis(LOCK_RETRY_DELAY_MS));
    }
    // Give up with the underlying lock error.
    Ok(LockFile::acquire(path)?)
}
