//! Writing pack files.
//!
//! `PackWriter` streams entries to disk while hashing everything written,
//! so `finish` can emit the trailer without re-reading the file. The object
//! count is part of the hashed header and must be declared up front.

use std::io::Write;
use std::path::{Path, PathBuf};

use flate2::write::ZlibEncoder;
use flate2::Compression;
use vcs_hash::hasher::Hasher;
use vcs_hash::{HashAlgorithm, ObjectId};
use vcs_object::ObjectType;

use crate::entry::{encode_entry_header, encode_ofs_delta_offset};
use crate::{PackEntryKind, PackError, PACK_HEADER_SIZE, PACK_SIGNATURE, PACK_VERSION};

struct WrittenEntry {
    id: ObjectId,
    offset: u64,
    crc32: u32,
}

/// Builder for a new pack file.
pub struct PackWriter {
    file: std::fs::File,
    hasher: Hasher,
    entries: Vec<WrittenEntry>,
    path: PathBuf,
    declared_count: u32,
    position: u64,
    compression: Compression,
}

impl PackWriter {
    /// Create a pack at `path` that will hold exactly `object_count`
    /// entries. The header is written (and hashed) immediately.
    pub fn create(path: impl AsRef<Path>, object_count: u32) -> Result<Self, PackError> {
        let path = path.as_ref().to_path_buf();
        let mut file = std::fs::File::create(&path)?;
        let mut hasher = Hasher::new(HashAlgorithm::Sha1);

        let mut header = [0u8; PACK_HEADER_SIZE];
        header[0..4].copy_from_slice(PACK_SIGNATURE);
        header[4..8].copy_from_slice(&PACK_VERSION.to_be_bytes());
        header[8..12].copy_from_slice(&object_count.to_be_bytes());

        file.write_all(&header)?;
        hasher.update(&header);

        Ok(Self {
            file,
            hasher,
            entries: Vec::new(),
            path,
            declared_count: object_count,
            position: PACK_HEADER_SIZE as u64,
            compression: Compression::default(),
        })
    }

    /// Set the zlib level for subsequent entries.
    pub fn set_compression_level(&mut self, level: u32) {
        self.compression = Compression::new(level);
    }

    /// The offset the next entry will land at.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Append a full object. Returns its computed id.
    pub fn add_object(
        &mut self,
        obj_type: ObjectType,
        data: &[u8],
    ) -> Result<ObjectId, PackError> {
        let id = Hasher::hash_object(HashAlgorithm::Sha1, obj_type.as_str(), data)?;
        let header = encode_entry_header(PackEntryKind::from_object_type(obj_type), data.len() as u64);
        self.append_entry(id, &header, &[], data)?;
        Ok(id)
    }

    /// Append a REF_DELTA entry for `target_id` against `base_id`.
    pub fn add_ref_delta(
        &mut self,
        base_id: ObjectId,
        target_id: ObjectId,
        delta: &[u8],
    ) -> Result<(), PackError> {
        let header = encode_entry_header(7, delta.len() as u64);
        let base_ref = base_id.as_bytes().to_vec();
        self.append_entry(target_id, &header, &base_ref, delta)
    }

    /// Append an OFS_DELTA entry for `target_id` whose base was written at
    /// the absolute pack offset `base_offset`.
    pub fn add_ofs_delta(
        &mut self,
        base_offset: u64,
        target_id: ObjectId,
        delta: &[u8],
    ) -> Result<(), PackError> {
        if base_offset >= self.position {
            return Err(PackError::InvalidArgument {
                field: "base_offset",
                reason: "delta base must precede the delta".into(),
            });
        }
        let header = encode_entry_header(6, delta.len() as u64);
        let base_ref = encode_ofs_delta_offset(self.position - base_offset);
        self.append_entry(target_id, &header, &base_ref, delta)
    }

    fn append_entry(
        &mut self,
        id: ObjectId,
        header: &[u8],
        base_ref: &[u8],
        payload: &[u8],
    ) -> Result<(), PackError> {
        if self.entries.len() as u32 >= self.declared_count {
            return Err(PackError::CountMismatch {
                declared: self.declared_count,
                written: self.entries.len() as u32 + 1,
            });
        }

        let offset = self.position;

        let mut compressed = Vec::new();
        {
            let mut encoder = ZlibEncoder::new(&mut compressed, self.compression);
            encoder.write_all(payload)?;
            encoder.finish()?;
        }

        let mut crc = crc32fast::Hasher::new();
        crc.update(header);
        crc.update(base_ref);
        crc.update(&compressed);

        self.write_bytes(header)?;
        self.write_bytes(base_ref)?;
        self.write_bytes(&compressed)?;

        self.entries.push(WrittenEntry {
            id,
            offset,
            crc32: crc.finalize(),
        });
        Ok(())
    }

    /// The entries written so far, for index construction.
    pub fn entries(&self) -> Vec<(ObjectId, u64, u32)> {
        self.entries
            .iter()
            .map(|e| (e.id, e.offset, e.crc32))
            .collect()
    }

    /// Write the checksum trailer and close the file.
    ///
    /// Fails if fewer entries were written than declared.
    pub fn finish(mut self) -> Result<(PathBuf, ObjectId), PackError> {
        if self.entries.len() as u32 != self.declared_count {
            return Err(PackError::CountMismatch {
                declared: self.declared_count,
                written: self.entries.len() as u32,
            });
        }

        let checksum = self.hasher.finalize()?;
        self.file.write_all(checksum.as_bytes())?;
        self.file.sync_all()?;
        Ok((self.path, checksum))
    }

    fn write_bytes(&mut self, data: &[u8]) -> Result<(), PackError> {
        self.file.write_all(data)?;
        self.hasher.update(data);
        self.position += data.len() as u64;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::write_index;
    use crate::pack::PackFile;

    #[test]
    fn written_pack_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let pack_path = dir.path().join("w.pack");

        let mut writer = PackWriter::create(&pack_path, 2).unwrap();
        let id1 = writer.add_object(ObjectType::Blob, b"first").unwrap();
        let id2 = writer.add_object(ObjectType::Blob, b"second").unwrap();

        let mut entries = writer.entries();
        let (_, checksum) = writer.finish().unwrap();
        std::fs::write(
            pack_path.with_extension("idx"),
            write_index(&mut entries, &checksum).unwrap(),
        )
        .unwrap();

        let pack = PackFile::open(&pack_path).unwrap();
        pack.verify_trailer().unwrap();
        assert_eq!(pack.read_object(&id1).unwrap().unwrap().data, b"first");
        assert_eq!(pack.read_object(&id2).unwrap().unwrap().data, b"second");
        assert_eq!(pack.trailer_checksum().unwrap(), checksum);
    }

    #[test]
    fn count_is_enforced() {
        let dir = tempfile::tempdir().unwrap();
        let pack_path = dir.path().join("count.pack");

        // Too few entries.
        let writer = PackWriter::create(&pack_path, 2).unwrap();
        assert!(matches!(
            writer.finish(),
            Err(PackError::CountMismatch { declared: 2, written: 0 })
        ));

        // Too many entries.
        let mut writer = PackWriter::create(&pack_path, 1).unwrap();
        writer.add_object(ObjectType::Blob, b"one").unwrap();
        assert!(writer.add_object(ObjectType::Blob, b"two").is_err());
    }

    #[test]
    fn ofs_delta_base_must_precede() {
        let dir = tempfile::tempdir().unwrap();
        let pack_path = dir.path().join("ofs.pack");
        let mut writer = PackWriter::create(&pack_path, 1).unwrap();
        let id = ObjectId::NULL_SHA1;
        assert!(writer.add_ofs_delta(writer.position(), id, b"x").is_err());
    }

    #[test]
    fn deterministic_for_same_input() {
        let dir = tempfile::tempdir().unwrap();

        let write = |name: &str| {
            let path = dir.path().join(name);
            let mut writer = PackWriter::create(&path, 1).unwrap();
            writer.add_object(ObjectType::Blob, b"same bytes").unwrap();
            writer.finish().unwrap().1
        };

        assert_eq!(write("a.pack"), write("b.pack"));
    }
}
