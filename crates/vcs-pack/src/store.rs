//! The pack-backed delta store.
//!
//! Objects and deltas live in immutable `pack-<checksum>.{pack,idx}` pairs
//! under one directory. A write batch accumulates in memory and publishes
//! as one new pack via temp-file renames; readers either see the whole
//! pack or none of it. Newer packs shadow older ones on lookup.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use vcs_delta::store::{
    DeltaChainInfo, DeltaLink, DeltaStore, DeltaUpdate, PackedObjectSource, StoredDelta,
};
use vcs_delta::{BinaryDelta, Delta, DeltaError};
use vcs_hash::ObjectId;
use vcs_object::ObjectType;

use crate::pack::PackFile;
use crate::write::PackWriter;
use crate::{index, PackEntryKind, PackError, MAX_DELTA_CHAIN_DEPTH};

impl From<PackError> for DeltaError {
    fn from(err: PackError) -> Self {
        match err {
            PackError::MissingBase(id) => DeltaError::NotFound { key: id.to_hex() },
            PackError::ChainTooDeep { offset, max_depth } => DeltaError::ChainTooDeep {
                key: format!("offset {offset}"),
                depth: max_depth as u32,
                max: max_depth as u32,
            },
            PackError::Delta(e) => e,
            PackError::Io(e) => DeltaError::Io(e),
            other => DeltaError::Backend(other.to_string()),
        }
    }
}

struct StoreInner {
    pack_dir: PathBuf,
    packs: RwLock<Vec<PackFile>>,
}

/// Delta store over a directory of pack files.
#[derive(Clone)]
pub struct PackDeltaStore {
    inner: Arc<StoreInner>,
}

impl PackDeltaStore {
    /// Open the store, scanning `pack_dir` for existing packs.
    pub fn open(pack_dir: impl AsRef<Path>) -> Result<Self, PackError> {
        let pack_dir = pack_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&pack_dir)?;
        let packs = discover_packs(&pack_dir)?;
        Ok(Self {
            inner: Arc::new(StoreInner {
                pack_dir,
                packs: RwLock::new(packs),
            }),
        })
    }

    /// Re-scan the pack directory (after GC or an external writer).
    pub fn refresh(&self) -> Result<(), PackError> {
        let packs = discover_packs(&self.inner.pack_dir)?;
        *self.inner.packs.write().unwrap() = packs;
        Ok(())
    }

    /// Release all open pack maps. Lookups miss until the next
    /// [`refresh`](Self::refresh); closing twice is a no-op.
    pub fn close(&self) {
        self.inner.packs.write().unwrap().clear();
    }

    /// Number of packs currently known.
    pub fn pack_count(&self) -> usize {
        self.inner.packs.read().unwrap().len()
    }

    /// The pack directory.
    pub fn pack_dir(&self) -> &Path {
        &self.inner.pack_dir
    }

    /// All object ids across packs, newest pack winning, sorted.
    pub fn object_ids(&self) -> Vec<ObjectId> {
        let packs = self.inner.packs.read().unwrap();
        let mut seen = HashSet::new();
        for pack in packs.iter() {
            for (id, _) in pack.index().iter() {
                seen.insert(id);
            }
        }
        let mut ids: Vec<ObjectId> = seen.into_iter().collect();
        ids.sort();
        ids
    }

    /// The entry kind and delta payload for `id` in the newest pack that
    /// holds it.
    fn entry_for(
        &self,
        id: &ObjectId,
    ) -> Result<Option<(usize, u64, PackEntryKind)>, PackError> {
        let packs = self.inner.packs.read().unwrap();
        for (pack_pos, pack) in packs.iter().enumerate() {
            if let Some(offset) = pack.index().find_offset(id) {
                let entry = pack.entry_header_at(offset)?;
                return Ok(Some((pack_pos, offset, entry.kind)));
            }
        }
        Ok(None)
    }

    fn parse_key(key: &str) -> Option<ObjectId> {
        ObjectId::from_hex(key).ok()
    }
}

fn discover_packs(pack_dir: &Path) -> Result<Vec<PackFile>, PackError> {
    if !pack_dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut entries: Vec<_> = std::fs::read_dir(pack_dir)?
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "pack"))
        .collect();

    // Newest first, so fresh packs shadow the ones they supersede.
    entries.sort_by(|a, b| {
        let a_time = a.metadata().and_then(|m| m.modified()).ok();
        let b_time = b.metadata().and_then(|m| m.modified()).ok();
        b_time.cmp(&a_time)
    });

    let mut packs = Vec::new();
    for entry in entries {
        match PackFile::open(entry.path()) {
            Ok(pack) => packs.push(pack),
            // A pack without a readable index is unusable; skip it rather
            // than failing every lookup.
            Err(_) => continue,
        }
    }
    Ok(packs)
}

/// Resolve `id` to full content across `packs`, following cross-pack
/// REF_DELTA bases.
fn load_across_packs(
    packs: &[PackFile],
    id: &ObjectId,
    depth: usize,
) -> Result<Option<(ObjectType, Vec<u8>)>, PackError> {
    if depth > MAX_DELTA_CHAIN_DEPTH {
        return Err(PackError::ChainTooDeep {
            offset: 0,
            max_depth: MAX_DELTA_CHAIN_DEPTH,
        });
    }
    for pack in packs {
        if pack.contains(id) {
            let resolved = pack.read_object_with_resolver(id, |base_id| {
                load_across_packs(packs, base_id, depth + 1)
                    .ok()
                    .flatten()
            })?;
            return Ok(resolved.map(|obj| (obj.obj_type, obj.data)));
        }
    }
    Ok(None)
}

impl DeltaStore for PackDeltaStore {
    type Update = PackUpdate;

    fn start_update(&self) -> Result<Self::Update, DeltaError> {
        Ok(PackUpdate {
            inner: Arc::clone(&self.inner),
            store: self.clone(),
            objects: Vec::new(),
            deltas: Vec::new(),
        })
    }

    fn load_delta(&self, target_key: &str) -> Result<Option<StoredDelta>, DeltaError> {
        let Some(id) = Self::parse_key(target_key) else {
            return Ok(None);
        };

        let packs = self.inner.packs.read().unwrap();
        let Some((pack, offset)) = packs
            .iter()
            .find_map(|p| p.index().find_offset(&id).map(|off| (p, off)))
        else {
            return Ok(None);
        };
        let entry = pack.entry_header_at(offset).map_err(DeltaError::from)?;
        let kind = entry.kind;
        if !kind.is_delta() {
            return Ok(None);
        }

        let (_, payload) = pack.entry_at(offset).map_err(DeltaError::from)?;

        let base_key = match kind {
            PackEntryKind::RefDelta { base_id } => base_id.to_hex(),
            PackEntryKind::OfsDelta { base_offset } => pack
                .id_at_offset(base_offset)
                .ok_or_else(|| DeltaError::Backend("offset delta base not indexed".into()))?
                .to_hex(),
            _ => unreachable!("checked is_delta above"),
        };

        let decoded = BinaryDelta::decode(&payload)?;
        let ratio = if decoded.target_size > 0 {
            payload.len() as f64 / decoded.target_size as f64
        } else {
            1.0
        };
        Ok(Some(StoredDelta {
            base: base_key,
            delta: Delta::Binary(decoded),
            ratio,
        }))
    }

    fn is_delta(&self, key: &str) -> Result<bool, DeltaError> {
        let Some(id) = Self::parse_key(key) else {
            return Ok(false);
        };
        Ok(self
            .entry_for(&id)?
            .is_some_and(|(_, _, kind)| kind.is_delta()))
    }

    fn remove_delta(&self, key: &str, _keep_as_base: bool) -> Result<bool, DeltaError> {
        // Packs are immutable: materialize the full object into a fresh
        // pack that shadows the delta entry. The old pack keeps serving
        // any chains that used this key as a base.
        if !self.is_delta(key)? {
            return Ok(false);
        }
        let (obj_type, data) = self
            .load_object(key)?
            .ok_or_else(|| DeltaError::NotFound {
                key: key.to_string(),
            })?;

        let mut update = self.start_update()?;
        update.store_object(key, obj_type, &data)?;
        update.close()?;
        Ok(true)
    }

    fn list_deltas(&self) -> Result<Vec<DeltaLink>, DeltaError> {
        let packs = self.inner.packs.read().unwrap();
        let mut seen: HashSet<ObjectId> = HashSet::new();
        let mut links = Vec::new();

        for pack in packs.iter() {
            for (id, offset) in pack.index().iter() {
                if !seen.insert(id) {
                    continue; // shadowed by a newer pack
                }
                let entry = pack.entry_header_at(offset).map_err(DeltaError::from)?;
                let base_key = match entry.kind {
                    PackEntryKind::RefDelta { base_id } => base_id.to_hex(),
                    PackEntryKind::OfsDelta { base_offset } => match pack.id_at_offset(base_offset)
                    {
                        Some(base) => base.to_hex(),
                        None => continue,
                    },
                    _ => continue,
                };
                links.push(DeltaLink::new(base_key, id.to_hex()));
            }
        }

        links.sort_by(|a, b| a.target.cmp(&b.target));
        Ok(links)
    }

    fn chain_info(&self, key: &str) -> Result<Option<DeltaChainInfo>, DeltaError> {
        let Some(first) = self.load_delta(key)? else {
            return Ok(None);
        };

        let compressed_size = first.delta.encoded_size();
        let mut chain = vec![key.to_string()];
        let mut current = first.base.clone();
        let mut depth: u32 = 1;

        while let Some(stored) = self.load_delta(&current)? {
            chain.push(current.clone());
            current = stored.base;
            depth += 1;
            if depth as usize > MAX_DELTA_CHAIN_DEPTH {
                return Err(DeltaError::ChainTooDeep {
                    key: key.to_string(),
                    depth,
                    max: MAX_DELTA_CHAIN_DEPTH as u32,
                });
            }
        }
        chain.push(current.clone());

        let original_size = match self.load_object(key)? {
            Some((_, data)) => data.len() as u64,
            None => {
                return Err(DeltaError::NotFound {
                    key: key.to_string(),
                })
            }
        };

        Ok(Some(DeltaChainInfo {
            base: first.base,
            target: key.to_string(),
            depth,
            original_size,
            compressed_size,
            chain,
        }))
    }
}

impl PackedObjectSource for PackDeltaStore {
    fn load_object(&self, key: &str) -> Result<Option<(ObjectType, Vec<u8>)>, DeltaError> {
        let Some(id) = Self::parse_key(key) else {
            return Ok(None);
        };
        let packs = self.inner.packs.read().unwrap();
        load_across_packs(&packs, &id, 0).map_err(DeltaError::from)
    }

    fn has_object(&self, key: &str) -> Result<bool, DeltaError> {
        let Some(id) = Self::parse_key(key) else {
            return Ok(false);
        };
        let packs = self.inner.packs.read().unwrap();
        Ok(packs.iter().any(|pack| pack.contains(&id)))
    }

    fn find_dependents(&self, base_key: &str) -> Result<Vec<String>, DeltaError> {
        let Some(base_id) = Self::parse_key(base_key) else {
            return Ok(Vec::new());
        };

        let packs = self.inner.packs.read().unwrap();
        let mut seen: HashSet<ObjectId> = HashSet::new();
        let mut dependents = Vec::new();

        for pack in packs.iter() {
            for (id, offset) in pack.index().iter() {
                if !seen.insert(id) {
                    continue;
                }
                let entry = pack.entry_header_at(offset).map_err(DeltaError::from)?;
                let is_dependent = match entry.kind {
                    PackEntryKind::RefDelta { base_id: b } => b == base_id,
                    PackEntryKind::OfsDelta { base_offset } => {
                        pack.id_at_offset(base_offset) == Some(base_id)
                    }
                    _ => false,
                };
                if is_dependent {
                    dependents.push(id.to_hex());
                }
            }
        }

        dependents.sort();
        Ok(dependents)
    }
}

/// An open batch against a [`PackDeltaStore`].
///
/// `close` publishes one new pack containing every staged entry; dropping
/// without closing discards the batch.
pub struct PackUpdate {
    inner: Arc<StoreInner>,
    store: PackDeltaStore,
    objects: Vec<(ObjectId, ObjectType, Vec<u8>)>,
    deltas: Vec<(ObjectId, ObjectId, Vec<u8>)>,
}

impl DeltaUpdate for PackUpdate {
    fn store_object(
        &mut self,
        key: &str,
        obj_type: ObjectType,
        data: &[u8],
    ) -> Result<(), DeltaError> {
        let id = PackDeltaStore::parse_key(key).ok_or(DeltaError::InvalidArgument {
            field: "key",
            reason: format!("'{key}' is not a hex object id"),
        })?;
        self.objects.push((id, obj_type, data.to_vec()));
        Ok(())
    }

    fn store_delta(
        &mut self,
        base_key: &str,
        target_key: &str,
        delta: Delta,
    ) -> Result<(), DeltaError> {
        let base = PackDeltaStore::parse_key(base_key).ok_or(DeltaError::InvalidArgument {
            field: "base_key",
            reason: format!("'{base_key}' is not a hex object id"),
        })?;
        let target = PackDeltaStore::parse_key(target_key).ok_or(DeltaError::InvalidArgument {
            field: "target_key",
            reason: format!("'{target_key}' is not a hex object id"),
        })?;
        let Delta::Binary(binary) = delta else {
            return Err(DeltaError::InvalidArgument {
                field: "delta",
                reason: "pack format stores binary deltas only".into(),
            });
        };
        self.deltas.push((base, target, binary.encode()));
        Ok(())
    }

    fn close(self) -> Result<(), DeltaError> {
        if self.objects.is_empty() && self.deltas.is_empty() {
            return Ok(());
        }

        let count = (self.objects.len() + self.deltas.len()) as u32;
        let temp = tempfile::NamedTempFile::new_in(&self.inner.pack_dir)
            .map_err(DeltaError::Io)?;
        let temp_path = temp.into_temp_path();

        let mut writer =
            PackWriter::create(&temp_path, count).map_err(DeltaError::from)?;

        // Full objects first so in-batch delta bases precede their deltas.
        for (id, obj_type, data) in &self.objects {
            let written = writer.add_object(*obj_type, data).map_err(DeltaError::from)?;
            if written != *id {
                return Err(DeltaError::InvalidArgument {
                    field: "key",
                    reason: format!("content hashes to {written}, not {id}"),
                });
            }
        }
        for (base, target, delta_bytes) in &self.deltas {
            writer
                .add_ref_delta(*base, *target, delta_bytes)
                .map_err(DeltaError::from)?;
        }

        let mut entries = writer.entries();
        let (_, checksum) = writer.finish().map_err(DeltaError::from)?;

        let final_pack = self
            .inner
            .pack_dir
            .join(format!("pack-{}.pack", checksum.to_hex()));
        let final_idx = final_pack.with_extension("idx");

        // Index first: readers only discover a pack through its .pack
        // name, so the pair becomes visible atomically with that rename.
        let idx_bytes = index::write_index(&mut entries, &checksum).map_err(DeltaError::from)?;
        let temp_idx = self
            .inner
            .pack_dir
            .join(format!(".tmp-idx-{}", checksum.to_hex()));
        std::fs::write(&temp_idx, idx_bytes).map_err(DeltaError::Io)?;
        std::fs::rename(&temp_idx, &final_idx).map_err(DeltaError::Io)?;

        temp_path.persist(&final_pack).map_err(|e| DeltaError::Io(e.error))?;

        self.store.refresh().map_err(DeltaError::from)?;
        Ok(())
    }
}
