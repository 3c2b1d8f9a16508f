use std::collections::BTreeMap;
use std::io::{Cursor, Read};
use std::sync::RwLock;

use crate::{validate_key, ByteRange, RawError, RawStore};

/// In-memory raw store backed by a sorted map.
///
/// Primarily for tests and ephemeral repositories; keys enumerate in
/// lexicographic order.
#[derive(Default)]
pub struct MemoryRawStore {
    entries: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryRawStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    /// Whether the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RawStore for MemoryRawStore {
    fn store(&self, key: &str, content: &mut dyn Read) -> Result<u64, RawError> {
        validate_key(key)?;
        let mut data = Vec::new();
        content.read_to_end(&mut data)?;
        let len = data.len() as u64;
        self.entries.write().unwrap().insert(key.to_string(), data);
        Ok(len)
    }

    fn load(&self, key: &str, range: ByteRange) -> Result<Box<dyn Read + '_>, RawError> {
        let entries = self.entries.read().unwrap();
        let data = entries.get(key).ok_or_else(|| RawError::NotFound {
            key: key.to_string(),
        })?;
        Ok(Box::new(Cursor::new(range.slice(data).to_vec())))
    }

    fn has(&self, key: &str) -> Result<bool, RawError> {
        Ok(self.entries.read().unwrap().contains_key(key))
    }

    fn delete(&self, key: &str) -> Result<bool, RawError> {
        Ok(self.entries.write().unwrap().remove(key).is_some())
    }

    fn keys(&self) -> Result<Box<dyn Iterator<Item = Result<String, RawError>> + '_>, RawError> {
        let keys: Vec<String> = self.entries.read().unwrap().keys().cloned().collect();
        Ok(Box::new(keys.into_iter().map(Ok)))
    }

    fn size(&self, key: &str) -> Result<Option<u64>, RawError> {
        Ok(self
            .entries
            .read()
            .unwrap()
            .get(key)
            .map(|d| d.len() as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_load_roundtrip() {
        let store = MemoryRawStore::new();
        let written = store.store_bytes("abc", b"hello").unwrap();
        assert_eq!(written, 5);
        assert_eq!(store.load_bytes("abc").unwrap(), b"hello");
    }

    #[test]
    fn overwrite_replaces() {
        let store = MemoryRawStore::new();
        store.store_bytes("k", b"one").unwrap();
        store.store_bytes("k", b"two").unwrap();
        assert_eq!(store.load_bytes("k").unwrap(), b"two");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn missing_key_is_not_found() {
        let store = MemoryRawStore::new();
        let err = store.load_bytes("missing").unwrap_err();
        assert!(err.is_not_found());
        assert!(!store.has("missing").unwrap());
        assert_eq!(store.size("missing").unwrap(), None);
    }

    #[test]
    fn delete_reports_presence() {
        let store = MemoryRawStore::new();
        store.store_bytes("k", b"x").unwrap();
        assert!(store.delete("k").unwrap());
        assert!(!store.delete("k").unwrap());
    }

    #[test]
    fn ranged_load() {
        let store = MemoryRawStore::new();
        store.store_bytes("k", b"0123456789").unwrap();
        let mut out = Vec::new();
        store
            .load("k", ByteRange::new(2, Some(3)))
            .unwrap()
            .read_to_end(&mut out)
            .unwrap();
        assert_eq!(out, b"234");
    }

    #[test]
    fn keys_are_sorted() {
        let store = MemoryRawStore::new();
        store.store_bytes("b", b"").unwrap();
        store.store_bytes("a", b"").unwrap();
        store.store_bytes("c", b"").unwrap();
        let keys: Vec<String> = store.keys().unwrap().map(|k| k.unwrap()).collect();
        assert_eq!(keys, ["a", "b", "c"]);
    }

    #[test]
    fn empty_value_roundtrip() {
        let store = MemoryRawStore::new();
        store.store_bytes("empty", b"").unwrap();
        assert!(store.has("empty").unwrap());
        assert_eq!(store.load_bytes("empty").unwrap(), b"");
        assert_eq!(store.size("empty").unwrap(), Some(0));
    }

    #[test]
    fn invalid_keys_rejected() {
        let store = MemoryRawStore::new();
        assert!(store.store_bytes("", b"x").is_err());
        assert!(store.store_bytes("a/b", b"x").is_err());
    }
}
