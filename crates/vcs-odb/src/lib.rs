//! Typed object storage.
//!
//! [`ObjectStore`] provides object-level I/O over any [`RawStore`]: it
//! frames content with the `"<type> <size>\0"` header, computes ids, and
//! caches reads. [`CombinedRawStore`] merges a pack-backed store with a
//! loose store under the raw contract, and the domain stores
//! ([`Blobs`], [`Trees`], [`Commits`], [`Tags`]) add per-kind canonical
//! serialization and traversal.

mod blobs;
mod combined;
mod commits;
mod tags;
mod trees;

pub use blobs::Blobs;
pub use combined::CombinedRawStore;
pub use commits::{AncestryWalk, Commits, WalkOptions};
pub use tags::Tags;
pub use trees::Trees;

use std::io::{Cursor, Read};
use std::sync::{Arc, Mutex};

use vcs_hash::hasher::Hasher;
use vcs_hash::{HashAlgorithm, ObjectId};
use vcs_object::cache::ObjectCache;
use vcs_object::header;
use vcs_object::{ObjectError, ObjectType};
use vcs_raw::volatile::{HybridVolatileStore, VolatileStore};
use vcs_raw::{ByteRange, RawError, RawStore};

/// Errors produced by the object store layer.
#[derive(Debug, thiserror::Error)]
pub enum OdbError {
    #[error("object not found: {0}")]
    NotFound(ObjectId),

    #[error("corrupt object {id}: {reason}")]
    CorruptObject { id: ObjectId, reason: String },

    #[error("type mismatch for {id}: expected {expected}, found {actual}")]
    TypeMismatch {
        id: ObjectId,
        expected: ObjectType,
        actual: ObjectType,
    },

    #[error("ambiguous prefix '{prefix}': {count} matches")]
    AmbiguousPrefix { prefix: String, count: usize },

    #[error("invalid argument for {field}: {reason}")]
    InvalidArgument { field: &'static str, reason: String },

    #[error(transparent)]
    Raw(#[from] RawError),

    #[error(transparent)]
    Object(#[from] ObjectError),

    #[error(transparent)]
    Hash(#[from] vcs_hash::HashError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Parsed object header: kind and content size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectHeader {
    pub obj_type: ObjectType,
    pub size: u64,
}

/// Typed object I/O over a raw byte store.
pub struct ObjectStore {
    raw: Arc<dyn RawStore>,
    algo: HashAlgorithm,
    volatile: Arc<dyn VolatileStore>,
    cache: Mutex<ObjectCache>,
}

/// Default read-cache capacity, in objects.
const CACHE_CAPACITY: usize = 1024;

impl ObjectStore {
    /// Create a store over `raw` with SHA-1 ids and a hybrid spill buffer.
    pub fn new(raw: Arc<dyn RawStore>) -> Self {
        Self::with_volatile(raw, Arc::new(HybridVolatileStore::default()))
    }

    /// Create a store with an explicit spill-buffer strategy.
    pub fn with_volatile(raw: Arc<dyn RawStore>, volatile: Arc<dyn VolatileStore>) -> Self {
        Self {
            raw,
            algo: HashAlgorithm::Sha1,
            volatile,
            cache: Mutex::new(ObjectCache::new(CACHE_CAPACITY)),
        }
    }

    /// The hash algorithm in use.
    pub fn algorithm(&self) -> HashAlgorithm {
        self.algo
    }

    /// The underlying raw store.
    pub fn raw(&self) -> &Arc<dyn RawStore> {
        &self.raw
    }

    /// Store streamed content of unknown size.
    ///
    /// The stream is captured into a volatile buffer to learn its size
    /// (the size is part of the hash preimage), hashed, and written as
    /// `"<type> <size>\0<content>"` under the resulting id. Storing the
    /// same bytes twice writes once and returns the same id.
    pub fn store(
        &self,
        obj_type: ObjectType,
        content: &mut dyn Read,
    ) -> Result<ObjectId, OdbError> {
        let buffered = self.volatile.buffer(content)?;
        let size = buffered.size();

        let mut hasher = Hasher::new(self.algo);
        hasher.update(obj_type.as_str().as_bytes());
        hasher.update(format!(" {size}\0").as_bytes());
        std::io::copy(&mut buffered.read(0)?, &mut hasher)?;
        let id = hasher.finalize()?;

        let key = id.store_key();
        if !self.raw.has(&key)? {
            let head = header::write_header(obj_type, size as usize);
            let mut framed = Cursor::new(head).chain(buffered.read(0)?);
            self.raw.store(&key, &mut framed)?;
        }
        Ok(id)
    }

    /// Store an in-memory buffer (single-pass hash-while-write).
    pub fn store_bytes(&self, obj_type: ObjectType, data: &[u8]) -> Result<ObjectId, OdbError> {
        let id = Hasher::hash_object(self.algo, obj_type.as_str(), data)?;
        let key = id.store_key();
        if !self.raw.has(&key)? {
            let mut framed = header::write_header(obj_type, data.len());
            framed.extend_from_slice(data);
            self.raw.store_bytes(&key, &framed)?;
        }
        Ok(id)
    }

    /// Load an object's content (header stripped).
    pub fn load(&self, id: &ObjectId) -> Result<Vec<u8>, OdbError> {
        Ok(self.load_with_header(id)?.1)
    }

    /// Load content, requiring a specific kind.
    pub fn load_typed(
        &self,
        id: &ObjectId,
        expected: ObjectType,
    ) -> Result<Vec<u8>, OdbError> {
        let (header, content) = self.load_with_header(id)?;
        if header.obj_type != expected {
            return Err(OdbError::TypeMismatch {
                id: *id,
                expected,
                actual: header.obj_type,
            });
        }
        Ok(content)
    }

    /// Load the parsed header together with the content.
    pub fn load_with_header(&self, id: &ObjectId) -> Result<(ObjectHeader, Vec<u8>), OdbError> {
        if let Some((obj_type, data)) = self.cache.lock().unwrap().get(id) {
            let header = ObjectHeader {
                obj_type: *obj_type,
                size: data.len() as u64,
            };
            return Ok((header, data.clone()));
        }

        let raw = self.load_raw(id)?;
        let (obj_type, size, header_len) =
            header::parse_header(&raw).map_err(|e| OdbError::CorruptObject {
                id: *id,
                reason: e.to_string(),
            })?;
        let content = &raw[header_len..];
        if content.len() != size {
            return Err(OdbError::CorruptObject {
                id: *id,
                reason: format!("declared {size} bytes, found {}", content.len()),
            });
        }

        let content = content.to_vec();
        self.cache
            .lock()
            .unwrap()
            .insert(*id, (obj_type, content.clone()));

        Ok((
            ObjectHeader {
                obj_type,
                size: size as u64,
            },
            content,
        ))
    }

    /// Load the raw stored form, header included; the exact hash preimage.
    pub fn load_raw(&self, id: &ObjectId) -> Result<Vec<u8>, OdbError> {
        match self.raw.load_bytes(&id.store_key()) {
            Ok(data) => Ok(data),
            Err(e) if e.is_not_found() => Err(OdbError::NotFound(*id)),
            Err(e) => Err(e.into()),
        }
    }

    /// Read just the header.
    pub fn header(&self, id: &ObjectId) -> Result<ObjectHeader, OdbError> {
        if let Some((obj_type, data)) = self.cache.lock().unwrap().get(id) {
            return Ok(ObjectHeader {
                obj_type: *obj_type,
                size: data.len() as u64,
            });
        }

        // The header fits well within the first 64 bytes.
        let mut head = Vec::with_capacity(64);
        match self.raw.load(&id.store_key(), ByteRange::new(0, Some(64))) {
            Ok(mut reader) => {
                reader.read_to_end(&mut head)?;
            }
            Err(e) if e.is_not_found() => return Err(OdbError::NotFound(*id)),
            Err(e) => return Err(e.into()),
        }

        let (obj_type, size, _) =
            header::parse_header(&head).map_err(|e| OdbError::CorruptObject {
                id: *id,
                reason: e.to_string(),
            })?;
        Ok(ObjectHeader {
            obj_type,
            size: size as u64,
        })
    }

    /// Whether the object exists.
    pub fn has(&self, id: &ObjectId) -> Result<bool, OdbError> {
        if self.cache.lock().unwrap().contains(id) {
            return Ok(true);
        }
        Ok(self.raw.has(&id.store_key())?)
    }

    /// Remove an object. Only legal for unreachable objects; reachability
    /// is the collector's concern, not enforced here.
    pub fn remove(&self, id: &ObjectId) -> Result<bool, OdbError> {
        self.cache.lock().unwrap().clear();
        Ok(self.raw.delete(&id.store_key())?)
    }

    /// All object ids in the store, sorted. Keys that are not object ids
    /// (housekeeping entries) are skipped.
    pub fn list(&self) -> Result<Vec<ObjectId>, OdbError> {
        let mut ids = Vec::new();
        for key in self.raw.keys()? {
            if let Ok(id) = ObjectId::from_hex(&key?) {
                ids.push(id);
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Resolve an abbreviated hex prefix to the single matching id.
    pub fn resolve_prefix(&self, prefix: &str) -> Result<ObjectId, OdbError> {
        if prefix.len() < 4 || !vcs_hash::hex::is_hex_digits(prefix) {
            return Err(OdbError::InvalidArgument {
                field: "prefix",
                reason: "need at least 4 hex digits".into(),
            });
        }

        let mut matches = Vec::new();
        for key in self.raw.keys()? {
            let key = key?;
            if key.starts_with(&prefix.to_ascii_lowercase()) {
                if let Ok(id) = ObjectId::from_hex(&key) {
                    matches.push(id);
                }
            }
        }

        match matches.len() {
            0 => Err(OdbError::NotFound(ObjectId::NULL_SHA1)),
            1 => Ok(matches[0]),
            count => Err(OdbError::AmbiguousPrefix {
                prefix: prefix.to_string(),
                count,
            }),
        }
    }

    /// Blob view.
    pub fn blobs(&self) -> Blobs<'_> {
        Blobs::new(self)
    }

    /// Tree view.
    pub fn trees(&self) -> Trees<'_> {
        Trees::new(self)
    }

    /// Commit view.
    pub fn commits(&self) -> Commits<'_> {
        Commits::new(self)
    }

    /// Tag view.
    pub fn tags(&self) -> Tags<'_> {
        Tags::new(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vcs_raw::MemoryRawStore;

    fn store() -> ObjectStore {
        ObjectStore::new(Arc::new(MemoryRawStore::new()))
    }

    #[test]
    fn store_load_roundtrip() {
        let odb = store();
        let id = odb.store_bytes(ObjectType::Blob, b"hello world").unwrap();
        assert_eq!(odb.load(&id).unwrap(), b"hello world");
        assert_eq!(
            odb.load_raw(&id).unwrap(),
            b"blob 11\0hello world".to_vec()
        );
    }

    #[test]
    fn streamed_store_matches_buffered() {
        let odb = store();
        let data = b"streamed content of initially unknown size";
        let via_stream = odb.store(ObjectType::Blob, &mut &data[..]).unwrap();
        let via_bytes = odb.store_bytes(ObjectType::Blob, data).unwrap();
        assert_eq!(via_stream, via_bytes);
    }

    #[test]
    fn hash_roundtrip_property() {
        let odb = store();
        let id = odb.store_bytes(ObjectType::Blob, b"identity check").unwrap();
        let raw = odb.load_raw(&id).unwrap();
        let recomputed = Hasher::digest(HashAlgorithm::Sha1, &raw).unwrap();
        assert_eq!(recomputed, id);
    }

    #[test]
    fn empty_blob_has_well_known_id() {
        let odb = store();
        let id = odb.store_bytes(ObjectType::Blob, b"").unwrap();
        assert_eq!(id, vcs_object::EMPTY_BLOB_ID);
    }

    #[test]
    fn header_without_full_load() {
        let odb = store();
        let id = odb.store_bytes(ObjectType::Commit, b"fake commit body").unwrap();
        let header = odb.header(&id).unwrap();
        assert_eq!(header.obj_type, ObjectType::Commit);
        assert_eq!(header.size, 16);
    }

    #[test]
    fn type_mismatch_is_reported() {
        let odb = store();
        let id = odb.store_bytes(ObjectType::Blob, b"not a tree").unwrap();
        assert!(matches!(
            odb.load_typed(&id, ObjectType::Tree),
            Err(OdbError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn missing_object_is_not_found() {
        let odb = store();
        let missing = ObjectId::from_hex("1111111111111111111111111111111111111111").unwrap();
        assert!(matches!(odb.load(&missing), Err(OdbError::NotFound(_))));
        assert!(!odb.has(&missing).unwrap());
    }

    #[test]
    fn corrupt_header_is_reported() {
        let raw = Arc::new(MemoryRawStore::new());
        let id = ObjectId::from_hex("2222222222222222222222222222222222222222").unwrap();
        raw.store_bytes(&id.store_key(), b"garbage without header").unwrap();
        let odb = ObjectStore::new(raw);
        assert!(matches!(
            odb.load(&id),
            Err(OdbError::CorruptObject { .. })
        ));
    }

    #[test]
    fn remove_and_list() {
        let odb = store();
        let id1 = odb.store_bytes(ObjectType::Blob, b"one").unwrap();
        let id2 = odb.store_bytes(ObjectType::Blob, b"two").unwrap();

        let mut expected = vec![id1, id2];
        expected.sort();
        assert_eq!(odb.list().unwrap(), expected);

        assert!(odb.remove(&id1).unwrap());
        assert_eq!(odb.list().unwrap(), vec![id2]);
        assert!(!odb.remove(&id1).unwrap());
    }

    #[test]
    fn prefix_resolution() {
        let odb = store();
        let id = odb.store_bytes(ObjectType::Blob, b"prefix target").unwrap();
        let prefix = &id.to_hex()[..8];
        assert_eq!(odb.resolve_prefix(prefix).unwrap(), id);
        assert!(odb.resolve_prefix("abc").is_err()); // too short
    }

    #[test]
    fn deduplication_stores_once() {
        let odb = store();
        let content = b"Hello, World! This is some content.";
        let a = odb.store_bytes(ObjectType::Blob, content).unwrap();
        let b = odb.store_bytes(ObjectType::Blob, content).unwrap();
        let c = odb.store(ObjectType::Blob, &mut &content[..]).unwrap();
        assert_eq!(a, b);
        assert_eq!(b, c);
        assert_eq!(odb.list().unwrap().len(), 1);
    }
}
