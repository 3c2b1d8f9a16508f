use vcs_hash::ObjectId;
use vcs_object::{ObjectType, Tag};

use crate::{ObjectStore, OdbError};

/// How many tag→tag links a peel will follow before giving up.
const MAX_PEEL_DEPTH: usize = 16;

/// Annotated tag access.
pub struct Tags<'a> {
    objects: &'a ObjectStore,
}

impl<'a> Tags<'a> {
    pub(crate) fn new(objects: &'a ObjectStore) -> Self {
        Self { objects }
    }

    /// Store an annotated tag in canonical form.
    pub fn store(&self, tag: &Tag) -> Result<ObjectId, OdbError> {
        self.objects
            .store_bytes(ObjectType::Tag, &tag.serialize_content())
    }

    /// Load and parse an annotated tag.
    pub fn load(&self, id: &ObjectId) -> Result<Tag, OdbError> {
        let content = self.objects.load_typed(id, ObjectType::Tag)?;
        Tag::parse(&content).map_err(|e| OdbError::CorruptObject {
            id: *id,
            reason: e.to_string(),
        })
    }

    /// The object a tag points at.
    ///
    /// With `peel`, tag→tag chains are followed until a non-tag object is
    /// reached; without it, the immediate target is returned.
    pub fn target(
        &self,
        id: &ObjectId,
        peel: bool,
    ) -> Result<(ObjectId, ObjectType), OdbError> {
        let mut tag = self.load(id)?;
        if !peel {
            return Ok((tag.target, tag.target_type));
        }

        for _ in 0..MAX_PEEL_DEPTH {
            if tag.target_type != ObjectType::Tag {
                return Ok((tag.target, tag.target_type));
            }
            tag = self.load(&tag.target)?;
        }
        Err(OdbError::CorruptObject {
            id: *id,
            reason: format!("tag chain longer than {MAX_PEEL_DEPTH}"),
        })
    }

    pub fn has(&self, id: &ObjectId) -> Result<bool, OdbError> {
        self.objects.has(id)
    }
}
