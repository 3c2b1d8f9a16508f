//! Content-keyed raw byte storage.
//!
//! [`RawStore`] is the bottom layer of the object store: an opaque map from
//! string keys to byte sequences with a streaming contract. Backends ship
//! for memory, the filesystem (sharded like a loose object directory), and
//! key-value engines; [`CompressedRawStore`] wraps any backend with a
//! pluggable compression codec, and [`volatile`] provides the spill buffers
//! used to stage content of unknown size.

pub mod compress;
mod fs;
mod kv;
mod memory;
pub mod volatile;

pub use compress::{Codec, CompressedRawStore, ZlibCodec};
pub use fs::FsRawStore;
pub use kv::{KvBackend, KvRawStore, MemoryKv};
pub use memory::MemoryRawStore;

use std::io::Read;
use std::sync::Arc;

/// Errors produced by raw store operations.
#[derive(Debug, thiserror::Error)]
pub enum RawError {
    #[error("key not found: {key}")]
    NotFound { key: String },

    #[error("invalid key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },

    #[error("corrupt entry {key}: {reason}")]
    Corrupt { key: String, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl RawError {
    /// Whether this error is a plain missing-key miss.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// A byte range for partial reads. The default covers the whole entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ByteRange {
    /// Offset of the first byte to read.
    pub offset: u64,
    /// Number of bytes to read; None reads to the end.
    pub length: Option<u64>,
}

impl ByteRange {
    /// The full entry.
    pub const ALL: Self = Self {
        offset: 0,
        length: None,
    };

    pub fn new(offset: u64, length: Option<u64>) -> Self {
        Self { offset, length }
    }

    /// Apply the range to an in-memory buffer.
    pub fn slice<'a>(&self, data: &'a [u8]) -> &'a [u8] {
        let start = (self.offset as usize).min(data.len());
        let end = match self.length {
            Some(len) => (start + len as usize).min(data.len()),
            None => data.len(),
        };
        &data[start..end]
    }
}

/// A content-keyed byte map with a streaming contract.
///
/// All operations are safe for concurrent use; a `store` followed by a
/// `load` of the same key (sequenced by the caller) observes the write.
/// Storing under an existing key overwrites.
pub trait RawStore: Send + Sync {
    /// Persist all bytes of `content` under `key`, returning the number of
    /// bytes written.
    fn store(&self, key: &str, content: &mut dyn Read) -> Result<u64, RawError>;

    /// Read the entry, restricted to `range`. Fails with
    /// [`RawError::NotFound`] if the key is absent.
    fn load(&self, key: &str, range: ByteRange) -> Result<Box<dyn Read + '_>, RawError>;

    /// Whether the key exists.
    fn has(&self, key: &str) -> Result<bool, RawError>;

    /// Remove the entry. Returns false if the key was absent.
    fn delete(&self, key: &str) -> Result<bool, RawError>;

    /// Enumerate all keys, in unspecified order.
    fn keys(&self) -> Result<Box<dyn Iterator<Item = Result<String, RawError>> + '_>, RawError>;

    /// Logical size of the entry in bytes, or None if absent.
    fn size(&self, key: &str) -> Result<Option<u64>, RawError>;

    /// Convenience: store a byte slice.
    fn store_bytes(&self, key: &str, data: &[u8]) -> Result<u64, RawError> {
        let mut reader = data;
        self.store(key, &mut reader)
    }

    /// Convenience: load the whole entry into a buffer.
    fn load_bytes(&self, key: &str) -> Result<Vec<u8>, RawError> {
        let mut out = Vec::new();
        self.load(key, ByteRange::ALL)?.read_to_end(&mut out)?;
        Ok(out)
    }
}

impl<T: RawStore + ?Sized> RawStore for Arc<T> {
    fn store(&self, key: &str, content: &mut dyn Read) -> Result<u64, RawError> {
        (**self).store(key, content)
    }

    fn load(&self, key: &str, range: ByteRange) -> Result<Box<dyn Read + '_>, RawError> {
        (**self).load(key, range)
    }

    fn has(&self, key: &str) -> Result<bool, RawError> {
        (**self).has(key)
    }

    fn delete(&self, key: &str) -> Result<bool, RawError> {
        (**self).delete(key)
    }

    fn keys(&self) -> Result<Box<dyn Iterator<Item = Result<String, RawError>> + '_>, RawError> {
        (**self).keys()
    }

    fn size(&self, key: &str) -> Result<Option<u64>, RawError> {
        (**self).size(key)
    }
}

/// Validate a store key: non-empty, no path separators, no NUL, no leading
/// dot (reserved for housekeeping files in the filesystem backend).
pub(crate) fn validate_key(key: &str) -> Result<(), RawError> {
    let reject = |reason: &str| {
        Err(RawError::InvalidKey {
            key: key.to_string(),
            reason: reason.to_string(),
        })
    };
    if key.is_empty() {
        return reject("empty key");
    }
    if key.starts_with('.') {
        return reject("leading dot");
    }
    if key.bytes().any(|b| b == b'/' || b == b'\\' || b == 0) {
        return reject("path separator or NUL");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_range_slicing() {
        let data = b"0123456789";
        assert_eq!(ByteRange::ALL.slice(data), data);
        assert_eq!(ByteRange::new(3, None).slice(data), b"3456789");
        assert_eq!(ByteRange::new(3, Some(4)).slice(data), b"3456");
        assert_eq!(ByteRange::new(8, Some(10)).slice(data), b"89");
        assert_eq!(ByteRange::new(20, None).slice(data), b"");
    }

    #[test]
    fn key_validation() {
        assert!(validate_key("da39a3ee").is_ok());
        assert!(validate_key("index").is_ok());
        assert!(validate_key("").is_err());
        assert!(validate_key(".hidden").is_err());
        assert!(validate_key("a/b").is_err());
        assert!(validate_key("a\0b").is_err());
    }
}
