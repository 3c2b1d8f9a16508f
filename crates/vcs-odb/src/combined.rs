//! Unified raw reads across packed and loose storage.

use std::collections::BTreeSet;
use std::io::{Cursor, Read};
use std::sync::Arc;

use vcs_delta::store::PackedObjectSource;
use vcs_delta::DeltaError;
use vcs_object::header;
use vcs_pack::store::PackDeltaStore;
use vcs_raw::{ByteRange, RawError, RawStore};

/// Raw store merging a pack store and a loose store.
///
/// Reads consult the packs first (after a collection most objects are
/// packed), then fall back to loose storage; only when both miss is
/// `NotFound` surfaced. Writes and deletes always go to the loose side.
/// Packed objects are presented in the raw framing
/// (`"<type> <size>\0<content>"`), so callers cannot tell the sides apart.
pub struct CombinedRawStore {
    packs: PackDeltaStore,
    loose: Arc<dyn RawStore>,
}

fn delta_to_raw(key: &str, err: DeltaError) -> RawError {
    match err {
        DeltaError::NotFound { key } => RawError::NotFound { key },
        DeltaError::Io(e) => RawError::Io(e),
        other => RawError::Corrupt {
            key: key.to_string(),
            reason: other.to_string(),
        },
    }
}

impl CombinedRawStore {
    pub fn new(packs: PackDeltaStore, loose: Arc<dyn RawStore>) -> Self {
        Self { packs, loose }
    }

    /// The pack side.
    pub fn packs(&self) -> &PackDeltaStore {
        &self.packs
    }

    /// The loose side.
    pub fn loose(&self) -> &Arc<dyn RawStore> {
        &self.loose
    }

    fn packed_raw(&self, key: &str) -> Result<Option<Vec<u8>>, RawError> {
        match self.packs.load_object(key) {
            Ok(Some((obj_type, data))) => {
                let mut framed = header::write_header(obj_type, data.len());
                framed.extend_from_slice(&data);
                Ok(Some(framed))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(delta_to_raw(key, e)),
        }
    }
}

impl RawStore for CombinedRawStore {
    fn store(&self, key: &str, content: &mut dyn Read) -> Result<u64, RawError> {
        self.loose.store(key, content)
    }

    fn load(&self, key: &str, range: ByteRange) -> Result<Box<dyn Read + '_>, RawError> {
        if let Some(framed) = self.packed_raw(key)? {
            return Ok(Box::new(Cursor::new(range.slice(&framed).to_vec())));
        }
        self.loose.load(key, range)
    }

    fn has(&self, key: &str) -> Result<bool, RawError> {
        if self
            .packs
            .has_object(key)
            .map_err(|e| delta_to_raw(key, e))?
        {
            return Ok(true);
        }
        self.loose.has(key)
    }

    fn delete(&self, key: &str) -> Result<bool, RawError> {
        // Packs are immutable; only the loose entry can be removed.
        self.loose.delete(key)
    }

    fn keys(&self) -> Result<Box<dyn Iterator<Item = Result<String, RawError>> + '_>, RawError> {
        let mut keys: BTreeSet<String> = BTreeSet::new();
        for id in self.packs.object_ids() {
            keys.insert(id.to_hex());
        }
        for key in self.loose.keys()? {
            keys.insert(key?);
        }
        Ok(Box::new(keys.into_iter().map(Ok)))
    }

    fn size(&self, key: &str) -> Result<Option<u64>, RawError> {
        if let Some(framed) = self.packed_raw(key)? {
            return Ok(Some(framed.len() as u64));
        }
        self.loose.size(key)
    }
}
