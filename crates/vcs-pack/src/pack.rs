//! Reading pack files: entry access and delta-chain resolution.

use std::io::Read;
use std::path::{Path, PathBuf};

use flate2::bufread::ZlibDecoder;
use memmap2::Mmap;
use vcs_hash::hasher::Hasher;
use vcs_hash::{HashAlgorithm, ObjectId};
use vcs_object::ObjectType;

use crate::entry::{parse_entry_header, PackEntry};
use crate::index::PackIndex;
use crate::{
    PackEntryKind, PackError, PackedObject, MAX_DELTA_CHAIN_DEPTH, PACK_HEADER_SIZE,
    PACK_SIGNATURE, PACK_VERSION,
};

/// A memory-mapped pack file with its index.
pub struct PackFile {
    data: Mmap,
    index: PackIndex,
    pack_path: PathBuf,
    num_objects: u32,
}

impl PackFile {
    /// Open a `.pack` file and its sibling `.idx`.
    pub fn open(pack_path: impl AsRef<Path>) -> Result<Self, PackError> {
        let pack_path = pack_path.as_ref().to_path_buf();
        let idx_path = pack_path.with_extension("idx");

        let file = std::fs::File::open(&pack_path)?;
        let data = unsafe { Mmap::map(&file)? };

        if data.len() < PACK_HEADER_SIZE {
            return Err(PackError::InvalidHeader("file too small".into()));
        }
        if &data[0..4] != PACK_SIGNATURE {
            return Err(PackError::InvalidHeader("bad PACK signature".into()));
        }
        let version = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
        if version != PACK_VERSION {
            return Err(PackError::UnsupportedVersion(version));
        }
        let num_objects = u32::from_be_bytes([data[8], data[9], data[10], data[11]]);

        let index = PackIndex::open(&idx_path)?;
        if index.num_objects() != num_objects {
            return Err(PackError::InvalidHeader(format!(
                "pack has {num_objects} objects but index has {}",
                index.num_objects()
            )));
        }

        Ok(Self {
            data,
            index,
            pack_path,
            num_objects,
        })
    }

    /// Read an object by id. Returns None if the id is not in this pack.
    pub fn read_object(&self, id: &ObjectId) -> Result<Option<PackedObject>, PackError> {
        self.read_object_with_resolver(id, |_| None)
    }

    /// Read an object by id, consulting `resolver` for REF_DELTA bases that
    /// live outside this pack.
    pub fn read_object_with_resolver(
        &self,
        id: &ObjectId,
        resolver: impl Fn(&ObjectId) -> Option<(ObjectType, Vec<u8>)>,
    ) -> Result<Option<PackedObject>, PackError> {
        match self.index.find_offset(id) {
            Some(offset) => self.read_at_offset_with_resolver(offset, resolver).map(Some),
            None => Ok(None),
        }
    }

    /// Read the object at a known offset.
    pub fn read_at_offset(&self, offset: u64) -> Result<PackedObject, PackError> {
        self.read_at_offset_with_resolver(offset, |_| None)
    }

    /// Read the object at a known offset, resolving the delta chain
    /// iteratively. The chain is collected innermost-delta-first and applied
    /// in reverse once the full base is reached.
    pub fn read_at_offset_with_resolver(
        &self,
        offset: u64,
        resolver: impl Fn(&ObjectId) -> Option<(ObjectType, Vec<u8>)>,
    ) -> Result<PackedObject, PackError> {
        let mut chain: Vec<Vec<u8>> = Vec::new();
        let mut current_offset = offset;

        while chain.len() < MAX_DELTA_CHAIN_DEPTH {
            let (entry, payload) = self.entry_at(current_offset)?;

            match entry.kind {
                PackEntryKind::Commit
                | PackEntryKind::Tree
                | PackEntryKind::Blob
                | PackEntryKind::Tag => {
                    let obj_type = entry.kind.to_object_type().expect("non-delta kind");
                    let mut data = payload;
                    for delta in chain.iter().rev() {
                        data = vcs_delta::apply::apply_delta(&data, delta)?;
                    }
                    return Ok(PackedObject { obj_type, data });
                }
                PackEntryKind::OfsDelta { base_offset } => {
                    chain.push(payload);
                    current_offset = base_offset;
                }
                PackEntryKind::RefDelta { base_id } => {
                    chain.push(payload);
                    if let Some(base_offset) = self.index.find_offset(&base_id) {
                        current_offset = base_offset;
                    } else if let Some((obj_type, base_data)) = resolver(&base_id) {
                        let mut data = base_data;
                        for delta in chain.iter().rev() {
                            data = vcs_delta::apply::apply_delta(&data, delta)?;
                        }
                        return Ok(PackedObject { obj_type, data });
                    } else {
                        return Err(PackError::MissingBase(base_id));
                    }
                }
            }
        }

        Err(PackError::ChainTooDeep {
            offset,
            max_depth: MAX_DELTA_CHAIN_DEPTH,
        })
    }

    /// Parse the entry header at `offset` and decompress its payload
    /// without resolving deltas.
    pub fn entry_at(&self, offset: u64) -> Result<(PackEntry, Vec<u8>), PackError> {
        let entry = self.entry_header_at(offset)?;
        let compressed = &self.data[entry.data_offset as usize..];
        let mut payload = Vec::with_capacity(entry.payload_size);
        ZlibDecoder::new(compressed)
            .read_to_end(&mut payload)
            .map_err(|_| PackError::CorruptEntry(offset))?;
        if payload.len() != entry.payload_size {
            return Err(PackError::CorruptEntry(offset));
        }
        Ok((entry, payload))
    }

    /// Parse just the entry header at `offset`.
    pub fn entry_header_at(&self, offset: u64) -> Result<PackEntry, PackError> {
        let start = offset as usize;
        if start >= self.data.len() {
            return Err(PackError::CorruptEntry(offset));
        }
        parse_entry_header(&self.data[start..], offset)
    }

    /// The id stored at `offset`, via reverse index lookup.
    pub fn id_at_offset(&self, offset: u64) -> Option<ObjectId> {
        self.index
            .iter()
            .find(|(_, entry_offset)| *entry_offset == offset)
            .map(|(id, _)| id)
    }

    /// Whether this pack contains `id`.
    pub fn contains(&self, id: &ObjectId) -> bool {
        self.index.find_offset(id).is_some()
    }

    pub fn num_objects(&self) -> u32 {
        self.num_objects
    }

    pub fn index(&self) -> &PackIndex {
        &self.index
    }

    pub fn path(&self) -> &Path {
        &self.pack_path
    }

    /// The raw mapped bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// The checksum stored in the pack trailer.
    pub fn trailer_checksum(&self) -> Result<ObjectId, PackError> {
        if self.data.len() < 20 {
            return Err(PackError::InvalidHeader("missing trailer".into()));
        }
        Ok(ObjectId::from_bytes(&self.data[self.data.len() - 20..])?)
    }

    /// Recompute the pack checksum and compare it with the trailer.
    pub fn verify_trailer(&self) -> Result<(), PackError> {
        let body_end = self.data.len() - 20;
        let mut hasher = Hasher::new(HashAlgorithm::Sha1);
        hasher.update(&self.data[..body_end]);
        let actual = hasher.finalize()?;
        let expected = self.trailer_checksum()?;
        if actual != expected {
            return Err(PackError::ChecksumMismatch {
                expected: expected.to_hex(),
                actual: actual.to_hex(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::write_index;
    use crate::write::PackWriter;
    use vcs_delta::compute::compute_delta;

    /// Write a pack + idx of full objects, returning the pack path and ids.
    fn build_pack(
        dir: &Path,
        objects: &[(ObjectType, &[u8])],
    ) -> (PathBuf, Vec<ObjectId>) {
        let pack_path = dir.join("test.pack");
        let mut writer = PackWriter::create(&pack_path, objects.len() as u32).unwrap();
        let mut ids = Vec::new();
        for (obj_type, content) in objects {
            ids.push(writer.add_object(*obj_type, content).unwrap());
        }
        let mut entries = writer.entries();
        let (_, checksum) = writer.finish().unwrap();
        let idx_bytes = write_index(&mut entries, &checksum).unwrap();
        std::fs::write(dir.join("test.idx"), idx_bytes).unwrap();
        (pack_path, ids)
    }

    #[test]
    fn read_single_blob() {
        let dir = tempfile::tempdir().unwrap();
        let content = b"Hello, pack file!";
        let (pack_path, ids) = build_pack(dir.path(), &[(ObjectType::Blob, content)]);

        let pack = PackFile::open(&pack_path).unwrap();
        assert_eq!(pack.num_objects(), 1);
        pack.verify_trailer().unwrap();

        let obj = pack.read_object(&ids[0]).unwrap().unwrap();
        assert_eq!(obj.obj_type, ObjectType::Blob);
        assert_eq!(obj.data, content);
    }

    #[test]
    fn read_multiple_object_kinds() {
        let dir = tempfile::tempdir().unwrap();
        let commit_content = b"tree 4b825dc642cb6eb9a060e54bf8d69288fbee4904\nauthor T <t@t> 0 +0000\ncommitter T <t@t> 0 +0000\n\nx\n";
        let objects: Vec<(ObjectType, &[u8])> = vec![
            (ObjectType::Blob, b"blob one"),
            (ObjectType::Blob, b"blob two"),
            (ObjectType::Commit, commit_content),
        ];
        let (pack_path, ids) = build_pack(dir.path(), &objects);

        let pack = PackFile::open(&pack_path).unwrap();
        for (i, (obj_type, content)) in objects.iter().enumerate() {
            let obj = pack.read_object(&ids[i]).unwrap().unwrap();
            assert_eq!(obj.obj_type, *obj_type);
            assert_eq!(obj.data, *content);
        }
    }

    #[test]
    fn missing_object_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let (pack_path, _) = build_pack(dir.path(), &[(ObjectType::Blob, b"x")]);
        let pack = PackFile::open(&pack_path).unwrap();
        let missing =
            ObjectId::from_hex("0000000000000000000000000000000000000001").unwrap();
        assert!(!pack.contains(&missing));
        assert!(pack.read_object(&missing).unwrap().is_none());
    }

    #[test]
    fn ofs_delta_chain_of_three_resolves() {
        let dir = tempfile::tempdir().unwrap();
        let pack_path = dir.path().join("chain.pack");

        let v1 = b"The base version of the content, long enough to match blocks.".to_vec();
        let mut v2 = v1.clone();
        v2.extend_from_slice(b" Second edition.");
        let mut v3 = v2.clone();
        v3.extend_from_slice(b" Third edition.");

        let id = |data: &[u8]| {
            Hasher::hash_object(HashAlgorithm::Sha1, "blob", data).unwrap()
        };

        let mut writer = PackWriter::create(&pack_path, 3).unwrap();
        let base_offset = writer.position();
        writer.add_object(ObjectType::Blob, &v1).unwrap();

        let v2_offset = writer.position();
        let d12 = compute_delta(&v1, &v2).encode();
        writer.add_ofs_delta(base_offset, id(&v2), &d12).unwrap();

        let d23 = compute_delta(&v2, &v3).encode();
        writer.add_ofs_delta(v2_offset, id(&v3), &d23).unwrap();

        let mut entries = writer.entries();
        let (_, checksum) = writer.finish().unwrap();
        let idx_bytes = write_index(&mut entries, &checksum).unwrap();
        std::fs::write(pack_path.with_extension("idx"), idx_bytes).unwrap();

        let pack = PackFile::open(&pack_path).unwrap();
        assert_eq!(pack.read_object(&id(&v1)).unwrap().unwrap().data, v1);
        assert_eq!(pack.read_object(&id(&v2)).unwrap().unwrap().data, v2);
        assert_eq!(pack.read_object(&id(&v3)).unwrap().unwrap().data, v3);
    }

    #[test]
    fn ref_delta_resolves_within_pack() {
        let dir = tempfile::tempdir().unwrap();
        let pack_path = dir.path().join("refdelta.pack");

        let base = b"Content with enough bytes for the block index to bite.".to_vec();
        let mut target = base.clone();
        target.extend_from_slice(b" Plus a suffix.");

        let base_id = Hasher::hash_object(HashAlgorithm::Sha1, "blob", &base).unwrap();
        let target_id = Hasher::hash_object(HashAlgorithm::Sha1, "blob", &target).unwrap();

        let mut writer = PackWriter::create(&pack_path, 2).unwrap();
        writer.add_object(ObjectType::Blob, &base).unwrap();
        let delta = compute_delta(&base, &target).encode();
        writer.add_ref_delta(base_id, target_id, &delta).unwrap();

        let mut entries = writer.entries();
        let (_, checksum) = writer.finish().unwrap();
        std::fs::write(
            pack_path.with_extension("idx"),
            write_index(&mut entries, &checksum).unwrap(),
        )
        .unwrap();

        let pack = PackFile::open(&pack_path).unwrap();
        assert_eq!(pack.read_object(&target_id).unwrap().unwrap().data, target);
    }

    #[test]
    fn ref_delta_with_external_base_uses_resolver() {
        let dir = tempfile::tempdir().unwrap();
        let pack_path = dir.path().join("thin.pack");

        let base = b"External base content that never enters this pack......".to_vec();
        let mut target = base.clone();
        target.extend_from_slice(b" local tail");

        let base_id = Hasher::hash_object(HashAlgorithm::Sha1, "blob", &base).unwrap();
        let target_id = Hasher::hash_object(HashAlgorithm::Sha1, "blob", &target).unwrap();

        let mut writer = PackWriter::create(&pack_path, 1).unwrap();
        let delta = compute_delta(&base, &target).encode();
        writer.add_ref_delta(base_id, target_id, &delta).unwrap();

        let mut entries = writer.entries();
        let (_, checksum) = writer.finish().unwrap();
        std::fs::write(
            pack_path.with_extension("idx"),
            write_index(&mut entries, &checksum).unwrap(),
        )
        .unwrap();

        let pack = PackFile::open(&pack_path).unwrap();

        // Without the resolver the base is missing.
        assert!(matches!(
            pack.read_object(&target_id),
            Err(PackError::MissingBase(_))
        ));

        let resolved = pack
            .read_object_with_resolver(&target_id, |id| {
                (*id == base_id).then(|| (ObjectType::Blob, base.clone()))
            })
            .unwrap()
            .unwrap();
        assert_eq!(resolved.data, target);
    }

    #[test]
    fn id_at_offset_reverse_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let (pack_path, ids) = build_pack(dir.path(), &[(ObjectType::Blob, b"lookup me")]);
        let pack = PackFile::open(&pack_path).unwrap();
        let offset = pack.index().find_offset(&ids[0]).unwrap();
        assert_eq!(pack.id_at_offset(offset), Some(ids[0]));
        assert_eq!(pack.id_at_offset(offset + 1), None);
    }
}
