use std::io::Read;

use vcs_hash::ObjectId;
use vcs_object::ObjectType;

use crate::{ObjectStore, OdbError};

/// Blob access: a thin typed passthrough.
pub struct Blobs<'a> {
    objects: &'a ObjectStore,
}

impl<'a> Blobs<'a> {
    pub(crate) fn new(objects: &'a ObjectStore) -> Self {
        Self { objects }
    }

    /// Store blob content from a stream.
    pub fn store(&self, content: &mut dyn Read) -> Result<ObjectId, OdbError> {
        self.objects.store(ObjectType::Blob, content)
    }

    /// Store blob content from a buffer.
    pub fn store_bytes(&self, data: &[u8]) -> Result<ObjectId, OdbError> {
        self.objects.store_bytes(ObjectType::Blob, data)
    }

    /// Load blob content; fails with a type mismatch for non-blobs.
    pub fn load(&self, id: &ObjectId) -> Result<Vec<u8>, OdbError> {
        self.objects.load_typed(id, ObjectType::Blob)
    }

    pub fn has(&self, id: &ObjectId) -> Result<bool, OdbError> {
        self.objects.has(id)
    }
}
