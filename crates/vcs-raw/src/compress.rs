//! Compressed wrapper around any raw store.
//!
//! Entries are compressed on write and decompressed on read; the codec is
//! injected so alternatives to zlib can be plugged in. Callers see logical
//! (decompressed) bytes, including for ranged reads and `size`.

use std::io::{Cursor, Read, Write};
use std::sync::Arc;

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::{ByteRange, RawError, RawStore};

/// A byte-stream compression codec.
pub trait Codec: Send + Sync {
    fn compress(&self, data: &[u8]) -> std::io::Result<Vec<u8>>;
    fn decompress(&self, data: &[u8]) -> std::io::Result<Vec<u8>>;
}

/// zlib deflate codec.
pub struct ZlibCodec {
    level: Compression,
}

impl ZlibCodec {
    /// Codec with an explicit compression level (0–9).
    pub fn new(level: u32) -> Self {
        Self {
            level: Compression::new(level),
        }
    }
}

impl Default for ZlibCodec {
    fn default() -> Self {
        Self {
            level: Compression::default(),
        }
    }
}

impl Codec for ZlibCodec {
    fn compress(&self, data: &[u8]) -> std::io::Result<Vec<u8>> {
        let mut encoder = ZlibEncoder::new(Vec::new(), self.level);
        encoder.write_all(data)?;
        encoder.finish()
    }

    fn decompress(&self, data: &[u8]) -> std::io::Result<Vec<u8>> {
        let mut out = Vec::new();
        ZlibDecoder::new(data).read_to_end(&mut out)?;
        Ok(out)
    }
}

/// Raw store wrapper applying a codec on every entry.
pub struct CompressedRawStore<S> {
    inner: S,
    codec: Arc<dyn Codec>,
}

impl<S: RawStore> CompressedRawStore<S> {
    /// Wrap `inner` with the default zlib codec.
    pub fn new(inner: S) -> Self {
        Self::with_codec(inner, Arc::new(ZlibCodec::default()))
    }

    /// Wrap `inner` with an injected codec.
    pub fn with_codec(inner: S, codec: Arc<dyn Codec>) -> Self {
        Self { inner, codec }
    }

    /// The wrapped store.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn decompress(&self, key: &str, data: &[u8]) -> Result<Vec<u8>, RawError> {
        self.codec
            .decompress(data)
            .map_err(|e| RawError::Corrupt {
                key: key.to_string(),
                reason: format!("decompression failed: {e}"),
            })
    }
}

impl<S: RawStore> RawStore for CompressedRawStore<S> {
    fn store(&self, key: &str, content: &mut dyn Read) -> Result<u64, RawError> {
        let mut data = Vec::new();
        content.read_to_end(&mut data)?;
        let logical_len = data.len() as u64;
        let compressed = self.codec.compress(&data)?;
        self.inner.store_bytes(key, &compressed)?;
        Ok(logical_len)
    }

    fn load(&self, key: &str, range: ByteRange) -> Result<Box<dyn Read + '_>, RawError> {
        let compressed = self.inner.load_bytes(key)?;
        let data = self.decompress(key, &compressed)?;
        Ok(Box::new(Cursor::new(range.slice(&data).to_vec())))
    }

    fn has(&self, key: &str) -> Result<bool, RawError> {
        self.inner.has(key)
    }

    fn delete(&self, key: &str) -> Result<bool, RawError> {
        self.inner.delete(key)
    }

    fn keys(&self) -> Result<Box<dyn Iterator<Item = Result<String, RawError>> + '_>, RawError> {
        self.inner.keys()
    }

    fn size(&self, key: &str) -> Result<Option<u64>, RawError> {
        // Logical size requires decompression; entries are small enough that
        // this beats tracking a side table.
        match self.inner.load_bytes(key) {
            Ok(compressed) => Ok(Some(self.decompress(key, &compressed)?.len() as u64)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}
