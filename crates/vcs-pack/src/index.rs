//! Pack index v2: reading, lookup, and writing.
//!
//! Layout:
//!
//! ```text
//! Header:  \377tOc | version (u32 = 2)
//! Fanout:  256 × u32 cumulative counts (big-endian)
//! Ids:     N × 20-byte sorted ids
//! CRC32:   N × u32
//! Offsets: N × u32 (MSB set → index into the 64-bit table)
//! 64-bit:  M × u64 offsets (packs over 2 GiB)
//! Trailer: 20-byte pack checksum | 20-byte index checksum
//! ```

use std::path::{Path, PathBuf};

use memmap2::Mmap;
use vcs_hash::fanout::FanoutTable;
use vcs_hash::hasher::Hasher;
use vcs_hash::{HashAlgorithm, ObjectId};

use crate::{PackError, IDX_SIGNATURE, IDX_VERSION};

const HASH_LEN: usize = 20;

fn read_u32(data: &[u8], pos: usize) -> u32 {
    u32::from_be_bytes([data[pos], data[pos + 1], data[pos + 2], data[pos + 3]])
}

fn read_u64(data: &[u8], pos: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&data[pos..pos + 8]);
    u64::from_be_bytes(bytes)
}

/// A memory-mapped pack index.
pub struct PackIndex {
    data: Mmap,
    num_objects: u32,
    fanout: FanoutTable,
    id_offset: usize,
    crc_offset: usize,
    offset32_offset: usize,
    offset64_offset: usize,
    idx_path: PathBuf,
}

impl PackIndex {
    /// Open and validate an index file.
    pub fn open(idx_path: impl AsRef<Path>) -> Result<Self, PackError> {
        let idx_path = idx_path.as_ref().to_path_buf();
        let file = std::fs::File::open(&idx_path)?;
        let data = unsafe { Mmap::map(&file)? };

        // header(8) + fanout(1024) + trailer(2 × 20)
        if data.len() < 8 + 1024 + 2 * HASH_LEN {
            return Err(PackError::InvalidIndex("file too small".into()));
        }
        if data[0..4] != IDX_SIGNATURE {
            return Err(PackError::InvalidIndex("bad signature".into()));
        }
        let version = read_u32(&data, 4);
        if version != IDX_VERSION {
            return Err(PackError::UnsupportedVersion(version));
        }

        let fanout = FanoutTable::from_bytes(&data[8..8 + 1024])
            .ok_or_else(|| PackError::InvalidIndex("truncated fanout".into()))?;
        let num_objects = fanout.total();

        let n = num_objects as usize;
        let id_offset = 8 + 1024;
        let crc_offset = id_offset + n * HASH_LEN;
        let offset32_offset = crc_offset + n * 4;
        let offset64_offset = offset32_offset + n * 4;

        if data.len() < offset64_offset + 2 * HASH_LEN {
            return Err(PackError::InvalidIndex(format!(
                "file too small for {n} objects"
            )));
        }

        Ok(Self {
            data,
            num_objects,
            fanout,
            id_offset,
            crc_offset,
            offset32_offset,
            offset64_offset,
            idx_path,
        })
    }

    /// Find the pack offset of `id`.
    pub fn find_offset(&self, id: &ObjectId) -> Option<u64> {
        let range = self.fanout.range(id.first_byte());
        let target = id.as_bytes();

        let (mut low, mut high) = (range.start, range.end);
        while low < high {
            let mid = low + (high - low) / 2;
            match self.id_bytes_at(mid).cmp(target) {
                std::cmp::Ordering::Less => low = mid + 1,
                std::cmp::Ordering::Greater => high = mid,
                std::cmp::Ordering::Equal => return Some(self.offset_at(mid as u32)),
            }
        }
        None
    }

    /// All `(id, offset)` pairs whose id starts with the given byte prefix.
    pub fn find_prefix(&self, prefix: &[u8]) -> Vec<(ObjectId, u64)> {
        if prefix.is_empty() {
            return Vec::new();
        }
        let range = self.fanout.range(prefix[0]);
        let mut results = Vec::new();
        for i in range {
            let id_bytes = self.id_bytes_at(i);
            if id_bytes.len() >= prefix.len() && &id_bytes[..prefix.len()] == prefix {
                if let Ok(id) = ObjectId::from_bytes(id_bytes) {
                    results.push((id, self.offset_at(i as u32)));
                }
            }
        }
        results
    }

    /// The id at the given sorted position.
    pub fn id_at(&self, index: u32) -> ObjectId {
        ObjectId::from_bytes(self.id_bytes_at(index as usize)).expect("valid id in index")
    }

    /// The pack offset at the given sorted position, resolving the large
    /// offset indirection.
    pub fn offset_at(&self, index: u32) -> u64 {
        let raw = read_u32(&self.data, self.offset32_offset + index as usize * 4);
        if raw & 0x8000_0000 != 0 {
            let large_index = (raw & 0x7fff_ffff) as usize;
            read_u64(&self.data, self.offset64_offset + large_index * 8)
        } else {
            u64::from(raw)
        }
    }

    /// The CRC32 at the given sorted position.
    pub fn crc32_at(&self, index: u32) -> u32 {
        read_u32(&self.data, self.crc_offset + index as usize * 4)
    }

    pub fn num_objects(&self) -> u32 {
        self.num_objects
    }

    pub fn path(&self) -> &Path {
        &self.idx_path
    }

    /// The pack checksum recorded in the trailer.
    pub fn pack_checksum(&self) -> ObjectId {
        let start = self.data.len() - 2 * HASH_LEN;
        ObjectId::from_bytes(&self.data[start..start + HASH_LEN]).expect("trailer checksum")
    }

    /// The index's own trailing checksum.
    pub fn index_checksum(&self) -> ObjectId {
        let start = self.data.len() - HASH_LEN;
        ObjectId::from_bytes(&self.data[start..]).expect("trailer checksum")
    }

    /// Verify the index's own checksum.
    pub fn verify_checksum(&self) -> Result<(), PackError> {
        let body_end = self.data.len() - HASH_LEN;
        let mut hasher = Hasher::new(HashAlgorithm::Sha1);
        hasher.update(&self.data[..body_end]);
        let actual = hasher.finalize()?;
        let expected = self.index_checksum();
        if actual != expected {
            return Err(PackError::ChecksumMismatch {
                expected: expected.to_hex(),
                actual: actual.to_hex(),
            });
        }
        Ok(())
    }

    /// Iterate `(id, offset)` pairs in id order.
    pub fn iter(&self) -> PackIndexIter<'_> {
        PackIndexIter {
            index: self,
            pos: 0,
        }
    }

    fn id_bytes_at(&self, index: usize) -> &[u8] {
        let start = self.id_offset + index * HASH_LEN;
        &self.data[start..start + HASH_LEN]
    }
}

/// Iterator over `(id, offset)` pairs of an index.
pub struct PackIndexIter<'a> {
    index: &'a PackIndex,
    pos: u32,
}

impl Iterator for PackIndexIter<'_> {
    type Item = (ObjectId, u64);

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.index.num_objects {
            return None;
        }
        let item = (self.index.id_at(self.pos), self.index.offset_at(self.pos));
        self.pos += 1;
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.index.num_objects - self.pos) as usize;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for PackIndexIter<'_> {}

/// Serialize a v2 index for the given entries (`(id, offset, crc32)`) and
/// pack checksum. Entries are sorted in place by id.
pub fn write_index(
    entries: &mut [(ObjectId, u64, u32)],
    pack_checksum: &ObjectId,
) -> Result<Vec<u8>, PackError> {
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    let mut out = Vec::with_capacity(8 + 1024 + entries.len() * (HASH_LEN + 8) + 2 * HASH_LEN);
    out.extend_from_slice(&IDX_SIGNATURE);
    out.extend_from_slice(&IDX_VERSION.to_be_bytes());

    let ids: Vec<ObjectId> = entries.iter().map(|(id, _, _)| *id).collect();
    out.extend_from_slice(&FanoutTable::build(&ids).to_bytes());

    for (id, _, _) in entries.iter() {
        out.extend_from_slice(id.as_bytes());
    }
    for (_, _, crc) in entries.iter() {
        out.extend_from_slice(&crc.to_be_bytes());
    }

    let mut large_offsets: Vec<u64> = Vec::new();
    for (_, offset, _) in entries.iter() {
        if *offset >= 0x8000_0000 {
            out.extend_from_slice(&(0x8000_0000u32 | large_offsets.len() as u32).to_be_bytes());
            large_offsets.push(*offset);
        } else {
            out.extend_from_slice(&(*offset as u32).to_be_bytes());
        }
    }
    for offset in &large_offsets {
        out.extend_from_slice(&offset.to_be_bytes());
    }

    out.extend_from_slice(pack_checksum.as_bytes());

    let mut hasher = Hasher::new(HashAlgorithm::Sha1);
    hasher.update(&out);
    let index_checksum = hasher.finalize()?;
    out.extend_from_slice(index_checksum.as_bytes());

    Ok(out)
}
