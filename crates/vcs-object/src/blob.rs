use vcs_hash::ObjectId;

use crate::ObjectError;

/// The id of the empty blob, fixed by the object format.
pub const EMPTY_BLOB_ID: ObjectId = ObjectId::Sha1([
    0xe6, 0x9d, 0xe2, 0x9b, 0xb2, 0xd1, 0xd6, 0x43, 0x4b, 0x8b, 0x29, 0xae, 0x77, 0x5a, 0xd8,
    0xc2, 0xe4, 0x8c, 0x53, 0x91,
]);

/// A blob: an opaque byte sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    pub data: Vec<u8>,
}

impl Blob {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    /// A blob has no structure; parsing never fails.
    pub fn parse(content: &[u8]) -> Result<Self, ObjectError> {
        Ok(Self {
            data: content.to_vec(),
        })
    }

    pub fn serialize_content(&self) -> &[u8] {
        &self.data
    }
}
