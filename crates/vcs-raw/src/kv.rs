use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::sync::RwLock;

use crate::{validate_key, ByteRange, RawError, RawStore};

/// Minimal key-value engine surface needed to host a raw store.
///
/// Adapters over real engines (SQL tables, embedded KV databases) implement
/// this; [`KvRawStore`] turns any implementation into a [`RawStore`].
pub trait KvBackend: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, RawError>;
    fn put(&self, key: &str, value: &[u8]) -> Result<(), RawError>;
    fn remove(&self, key: &str) -> Result<bool, RawError>;
    /// All keys, in unspecified order.
    fn scan(&self) -> Result<Vec<String>, RawError>;

    /// Value length without fetching the value, where the engine can do
    /// better than a full read.
    fn value_len(&self, key: &str) -> Result<Option<u64>, RawError> {
        Ok(self.get(key)?.map(|v| v.len() as u64))
    }
}

/// Adapter exposing any [`KvBackend`] as a [`RawStore`].
pub struct KvRawStore<B> {
    backend: B,
}

impl<B: KvBackend> KvRawStore<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    /// The wrapped backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }
}

impl<B: KvBackend> RawStore for KvRawStore<B> {
    fn store(&self, key: &str, content: &mut dyn Read) -> Result<u64, RawError> {
        validate_key(key)?;
        let mut data = Vec::new();
        content.read_to_end(&mut data)?;
        let len = data.len() as u64;
        self.backend.put(key, &data)?;
        Ok(len)
    }

    fn load(&self, key: &str, range: ByteRange) -> Result<Box<dyn Read + '_>, RawError> {
        let data = self.backend.get(key)?.ok_or_else(|| RawError::NotFound {
            key: key.to_string(),
        })?;
        Ok(Box::new(Cursor::new(range.slice(&data).to_vec())))
    }

    fn has(&self, key: &str) -> Result<bool, RawError> {
        Ok(self.backend.get(key)?.is_some())
    }

    fn delete(&self, key: &str) -> Result<bool, RawError> {
        self.backend.remove(key)
    }

    fn keys(&self) -> Result<Box<dyn Iterator<Item = Result<String, RawError>> + '_>, RawError> {
        let mut keys = self.backend.scan()?;
        keys.sort();
        Ok(Box::new(keys.into_iter().map(Ok)))
    }

    fn size(&self, key: &str) -> Result<Option<u64>, RawError> {
        self.backend.value_len(key)
    }
}

/// In-memory [`KvBackend`], mainly for tests.
#[derive(Default)]
pub struct MemoryKv {
    rows: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvBackend for MemoryKv {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, RawError> {
        Ok(self.rows.read().unwrap().get(key).cloned())
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<(), RawError> {
        self.rows
            .write()
            .unwrap()
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool, RawError> {
        Ok(self.rows.write().unwrap().remove(key).is_some())
    }

    fn scan(&self) -> Result<Vec<String>, RawError> {
        Ok(self.rows.read().unwrap().keys().cloned().collect())
    }
}
