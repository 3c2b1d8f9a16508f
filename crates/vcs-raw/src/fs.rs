use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::{validate_key, ByteRange, RawError, RawStore};

/// Filesystem raw store.
///
/// Keys longer than two characters are sharded into a two-character
/// directory prefix, matching the loose object layout
/// (`<root>/<key[0:2]>/<key[2:]>`); shorter keys live directly under the
/// root. Writes go through a temporary file and an atomic rename, so a
/// crashed write never leaves a partial entry visible.
pub struct FsRawStore {
    root: PathBuf,
}

impl FsRawStore {
    /// Open a store rooted at `root`. The directory is created lazily on
    /// first write.
    pub fn open(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// The root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        if key.len() > 2 {
            self.root.join(&key[..2]).join(&key[2..])
        } else {
            self.root.join(key)
        }
    }
}

impl RawStore for FsRawStore {
    fn store(&self, key: &str, content: &mut dyn Read) -> Result<u64, RawError> {
        validate_key(key)?;
        let path = self.entry_path(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut tmp = tempfile::NamedTempFile::new_in(&self.root)?;
        let written = std::io::copy(content, &mut tmp)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|e| RawError::Io(e.error))?;
        Ok(written)
    }

    fn load(&self, key: &str, range: ByteRange) -> Result<Box<dyn Read + '_>, RawError> {
        let path = self.entry_path(key);
        let mut file = File::open(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                RawError::NotFound {
                    key: key.to_string(),
                }
            } else {
                RawError::Io(e)
            }
        })?;
        if range.offset > 0 {
            file.seek(SeekFrom::Start(range.offset))?;
        }
        Ok(match range.length {
            Some(len) => Box::new(file.take(len)),
            None => Box::new(file),
        })
    }

    fn has(&self, key: &str) -> Result<bool, RawError> {
        Ok(self.entry_path(key).is_file())
    }

    fn delete(&self, key: &str) -> Result<bool, RawError> {
        let path = self.entry_path(key);
        match fs::remove_file(&path) {
            Ok(()) => {
                // Drop the shard directory once it empties out.
                if let Some(parent) = path.parent() {
                    if parent != self.root
                        && parent
                            .read_dir()
                            .map(|mut d| d.next().is_none())
                            .unwrap_or(false)
                    {
                        let _ = fs::remove_dir(parent);
                    }
                }
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(RawError::Io(e)),
        }
    }

    fn keys(&self) -> Result<Box<dyn Iterator<Item = Result<String, RawError>> + '_>, RawError> {
        let mut keys = Vec::new();
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Box::new(std::iter::empty()));
            }
            Err(e) => return Err(RawError::Io(e)),
        };

        for entry in entries {
            let entry = entry?;
            let name = match entry.file_name().into_string() {
                Ok(name) => name,
                Err(_) => continue,
            };
            if name.starts_with('.') {
                continue;
            }
            let file_type = entry.file_type()?;
            if file_type.is_dir() && name.len() == 2 {
                for sub in fs::read_dir(entry.path())? {
                    let sub = sub?;
                    if let Ok(sub_name) = sub.file_name().into_string() {
                        if !sub_name.starts_with('.') && sub.file_type()?.is_file() {
                            keys.push(format!("{name}{sub_name}"));
                        }
                    }
                }
            } else if file_type.is_file() {
                keys.push(name);
            }
        }

        keys.sort();
        Ok(Box::new(keys.into_iter().map(Ok)))
    }

    fn size(&self, key: &str) -> Result<Option<u64>, RawError> {
        match fs::metadata(self.entry_path(key)) {
            Ok(meta) => Ok(Some(meta.len())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(RawError::Io(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_shards_by_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsRawStore::open(dir.path());
        store
            .store_bytes("da39a3ee5e6b4b0d3255bfef95601890afd80709", b"data")
            .unwrap();

        let expected = dir
            .path()
            .join("da")
            .join("39a3ee5e6b4b0d3255bfef95601890afd80709");
        assert!(expected.is_file());
        assert_eq!(
            store
                .load_bytes("da39a3ee5e6b4b0d3255bfef95601890afd80709")
                .unwrap(),
            b"data"
        );
    }

    #[test]
    fn short_keys_are_flat() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsRawStore::open(dir.path());
        store.store_bytes("ab", b"short").unwrap();
        assert!(dir.path().join("ab").is_file());
        assert_eq!(store.load_bytes("ab").unwrap(), b"short");
    }

    #[test]
    fn missing_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsRawStore::open(dir.path());
        assert!(store.load_bytes("cafebabe").unwrap_err().is_not_found());
        assert_eq!(store.size("cafebabe").unwrap(), None);
    }

    #[test]
    fn keys_lists_all_entries() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsRawStore::open(dir.path());
        store.store_bytes("aabbcc", b"1").unwrap();
        store.store_bytes("aadddd", b"2").unwrap();
        store.store_bytes("ffeeee", b"3").unwrap();
        store.store_bytes("up", b"4").unwrap();

        let keys: Vec<String> = store.keys().unwrap().map(|k| k.unwrap()).collect();
        assert_eq!(keys, ["aabbcc", "aadddd", "ffeeee", "up"]);
    }

    #[test]
    fn keys_on_missing_root_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsRawStore::open(dir.path().join("nonexistent"));
        assert_eq!(store.keys().unwrap().count(), 0);
    }

    #[test]
    fn delete_removes_file_and_empty_shard() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsRawStore::open(dir.path());
        store.store_bytes("aabbcc", b"1").unwrap();
        assert!(store.delete("aabbcc").unwrap());
        assert!(!store.delete("aabbcc").unwrap());
        assert!(!dir.path().join("aa").exists());
    }

    #[test]
    fn ranged_read_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsRawStore::open(dir.path());
        store.store_bytes("aabbcc", b"0123456789").unwrap();
        let mut out = Vec::new();
        store
            .load("aabbcc", ByteRange::new(4, Some(2)))
            .unwrap()
            .read_to_end(&mut out)
            .unwrap();
        assert_eq!(out, b"45");
    }

    #[test]
    fn overwrite_is_atomic_replace() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsRawStore::open(dir.path());
        store.store_bytes("aabbcc", b"old").unwrap();
        store.store_bytes("aabbcc", b"new").unwrap();
        assert_eq!(store.load_bytes("aabbcc").unwrap(), b"new");
    }
}
