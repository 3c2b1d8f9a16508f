//! Pack verification: trailer, index checksum, and per-entry CRCs.

use crate::pack::PackFile;
use crate::PackError;

/// Outcome of a successful verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifyReport {
    /// Total entries checked.
    pub objects: u32,
    /// How many of them are deltas.
    pub deltas: u32,
}

/// Verify a pack against its index.
///
/// Checks the pack trailer hash, the index's own checksum, the recorded
/// pack checksum, and the CRC32 of every entry's raw bytes.
pub fn verify_pack(pack: &PackFile) -> Result<VerifyReport, PackError> {
    pack.verify_trailer()?;
    pack.index().verify_checksum()?;

    let recorded = pack.index().pack_checksum();
    let actual = pack.trailer_checksum()?;
    if recorded != actual {
        return Err(PackError::ChecksumMismatch {
            expected: recorded.to_hex(),
            actual: actual.to_hex(),
        });
    }

    // Entry boundaries: each entry runs to the next offset, the last to
    // the trailer.
    let mut positions: Vec<(u64, u32)> = (0..pack.num_objects())
        .map(|i| (pack.index().offset_at(i), pack.index().crc32_at(i)))
        .collect();
    positions.sort_by_key(|(offset, _)| *offset);

    let data = pack.data();
    let body_end = (data.len() - 20) as u64;
    let mut deltas = 0;

    for (i, (offset, expected_crc)) in positions.iter().enumerate() {
        let end = positions
            .get(i + 1)
            .map(|(next, _)| *next)
            .unwrap_or(body_end);
        if end <= *offset || end > body_end {
            return Err(PackError::CorruptEntry(*offset));
        }

        let mut crc = crc32fast::Hasher::new();
        crc.update(&data[*offset as usize..end as usize]);
        let actual_crc = crc.finalize();
        if actual_crc != *expected_crc {
            return Err(PackError::ChecksumMismatch {
                expected: format!("{expected_crc:08x}"),
                actual: format!("{actual_crc:08x}"),
            });
        }

        if pack.entry_header_at(*offset)?.kind.is_delta() {
            deltas += 1;
        }
    }

    Ok(VerifyReport {
        objects: pack.num_objects(),
        deltas,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::write_index;
    use crate::write::PackWriter;
    use vcs_delta::compute::compute_delta;
    use vcs_hash::hasher::Hasher;
    use vcs_hash::HashAlgorithm;
    use vcs_object::ObjectType;

    fn build_verified_pack(dir: &std::path::Path) -> std::path::PathBuf {
        let pack_path = dir.join("v.pack");
        let base = b"Verification base content, reasonably long for deltas.".to_vec();
        let mut target = base.clone();
        target.extend_from_slice(b" ... and more");

        let base_id = Hasher::hash_object(HashAlgorithm::Sha1, "blob", &base).unwrap();
        let target_id = Hasher::hash_object(HashAlgorithm::Sha1, "blob", &target).unwrap();

        let mut writer = PackWriter::create(&pack_path, 2).unwrap();
        writer.add_object(ObjectType::Blob, &base).unwrap();
        writer
            .add_ref_delta(base_id, target_id, &compute_delta(&base, &target).encode())
            .unwrap();

        let mut entries = writer.entries();
        let (_, checksum) = writer.finish().unwrap();
        std::fs::write(
            pack_path.with_extension("idx"),
            write_index(&mut entries, &checksum).unwrap(),
        )
        .unwrap();
        pack_path
    }

    #[test]
    fn clean_pack_verifies() {
        let dir = tempfile::tempdir().unwrap();
        let pack = PackFile::open(build_verified_pack(dir.path())).unwrap();
        let report = verify_pack(&pack).unwrap();
        assert_eq!(report.objects, 2);
        assert_eq!(report.deltas, 1);
    }

    #[test]
    fn bit_flip_is_detected() {
        let dir = tempfile::tempdir().unwrap();
        let pack_path = build_verified_pack(dir.path());

        let mut bytes = std::fs::read(&pack_path).unwrap();
        let mid = bytes.len() / 2;
        bytes[mid] ^= 0x01;
        std::fs::write(&pack_path, bytes).unwrap();

        let pack = PackFile::open(&pack_path).unwrap();
        assert!(verify_pack(&pack).is_err());
    }
}
