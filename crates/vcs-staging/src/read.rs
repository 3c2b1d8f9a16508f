//! Index parsing (DIRC versions 2, 3, and 4).

use bstr::BString;
use vcs_hash::hasher::Hasher;
use vcs_hash::{HashAlgorithm, ObjectId};
use vcs_object::FileMode;

use crate::entry::RawExtension;
use crate::write::{decode_prefix_varint, padded_entry_size, ENTRY_FIXED, INDEX_SIGNATURE};
use crate::{EntryFlags, Stage, Staging, StagingEntry, StagingError, StatData};

fn read_u32(data: &[u8], pos: usize) -> u32 {
    u32::from_be_bytes([data[pos], data[pos + 1], data[pos + 2], data[pos + 3]])
}

fn read_u16(data: &[u8], pos: usize) -> u16 {
    u16::from_be_bytes([data[pos], data[pos + 1]])
}

/// Parse DIRC bytes into a staging area.
///
/// The trailing checksum is verified first; a truncated or bit-flipped
/// index is rejected before any entry is interpreted.
pub fn parse_index(data: &[u8]) -> Result<Staging, StagingError> {
    if data.len() < 12 + 20 {
        return Err(StagingError::InvalidHeader("index too short".into()));
    }

    let content_end = data.len() - 20;
    let expected = ObjectId::from_bytes(&data[content_end..])
        .map_err(|_| StagingError::InvalidHeader("bad checksum field".into()))?;
    let mut hasher = Hasher::new(HashAlgorithm::Sha1);
    hasher.update(&data[..content_end]);
    let actual = hasher.finalize()?;
    if actual != expected {
        return Err(StagingError::ChecksumMismatch {
            expected: expected.to_hex(),
            actual: actual.to_hex(),
        });
    }

    if &data[0..4] != INDEX_SIGNATURE {
        return Err(StagingError::InvalidHeader("bad signature".into()));
    }
    let version = read_u32(data, 4);
    if !(2..=4).contains(&version) {
        return Err(StagingError::UnsupportedVersion(version));
    }
    let entry_count = read_u32(data, 8) as usize;

    let mut cursor = 12;
    let mut entries = Vec::with_capacity(entry_count);
    let mut prev_path = BString::default();

    for _ in 0..entry_count {
        let (entry, next) = parse_entry(data, cursor, version, &prev_path, content_end)?;
        prev_path = entry.path.clone();
        entries.push(entry);
        cursor = next;
    }

    let mut extensions = Vec::new();
    while cursor + 8 <= content_end {
        let mut signature = [0u8; 4];
        signature.copy_from_slice(&data[cursor..cursor + 4]);
        let size = read_u32(data, cursor + 4) as usize;
        cursor += 8;
        if cursor + size > content_end {
            return Err(StagingError::InvalidEntry {
                offset: cursor,
                reason: "extension exceeds index bounds".into(),
            });
        }
        extensions.push(RawExtension {
            signature,
            data: data[cursor..cursor + size].to_vec(),
        });
        cursor += size;
    }
    if cursor != content_end {
        return Err(StagingError::InvalidEntry {
            offset: cursor,
            reason: "trailing garbage before checksum".into(),
        });
    }

    Ok(Staging::set_parsed(version, entries, extensions))
}

fn parse_entry(
    data: &[u8],
    start: usize,
    version: u32,
    prev_path: &BString,
    content_end: usize,
) -> Result<(StagingEntry, usize), StagingError> {
    let invalid = |offset: usize, reason: &str| StagingError::InvalidEntry {
        offset,
        reason: reason.to_string(),
    };

    if start + ENTRY_FIXED > content_end {
        return Err(invalid(start, "entry truncated"));
    }

    let stat = StatData {
        ctime_secs: read_u32(data, start),
        ctime_nsecs: read_u32(data, start + 4),
        mtime_secs: read_u32(data, start + 8),
        mtime_nsecs: read_u32(data, start + 12),
        dev: read_u32(data, start + 16),
        ino: read_u32(data, start + 20),
        uid: read_u32(data, start + 28),
        gid: read_u32(data, start + 32),
        size: read_u32(data, start + 36),
    };
    let mode_raw = read_u32(data, start + 24);
    let mode = FileMode::from_raw(mode_raw)
        .ok_or_else(|| invalid(start + 24, &format!("invalid mode {mode_raw:o}")))?;

    let id = ObjectId::from_bytes(&data[start + 40..start + 60])
        .map_err(|_| invalid(start + 40, "bad object id"))?;

    let flags_raw = read_u16(data, start + 60);
    let assume_valid = flags_raw & (1 << 15) != 0;
    let extended = flags_raw & (1 << 14) != 0;
    let stage_bits = ((flags_raw >> 12) & 0x3) as u8;
    let name_len_field = (flags_raw & 0xfff) as usize;

    let stage = Stage::from_u8(stage_bits).expect("two bits cover all stages");

    let mut cursor = start + ENTRY_FIXED;
    let mut flags = EntryFlags {
        assume_valid,
        ..Default::default()
    };
    if extended {
        if version < 3 {
            return Err(invalid(start + 60, "extended flags in a v2 index"));
        }
        if cursor + 2 > content_end {
            return Err(invalid(cursor, "truncated extended flags"));
        }
        let ext = read_u16(data, cursor);
        flags.intent_to_add = ext & (1 << 13) != 0;
        flags.skip_worktree = ext & (1 << 14) != 0;
        cursor += 2;
    }
    let fixed = cursor - start;

    let (path, next) = if version < 4 {
        let nul = data[cursor..content_end]
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| invalid(cursor, "unterminated path"))?;
        let path = BString::from(&data[cursor..cursor + nul]);
        if name_len_field < 0xfff && path.len() != name_len_field {
            return Err(invalid(
                cursor,
                &format!(
                    "path length {} does not match flags field {name_len_field}",
                    path.len()
                ),
            ));
        }
        let total = padded_entry_size(fixed, path.len());
        if start + total > content_end {
            return Err(invalid(start, "entry padding exceeds index"));
        }
        (path, start + total)
    } else {
        let (strip, consumed) = decode_prefix_varint(&data[cursor..content_end])
            .ok_or_else(|| invalid(cursor, "truncated path varint"))?;
        cursor += consumed;
        let strip = strip as usize;
        if strip > prev_path.len() {
            return Err(invalid(cursor, "path strip longer than previous path"));
        }
        let nul = data[cursor..content_end]
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| invalid(cursor, "unterminated path suffix"))?;

        let mut path = BString::from(&prev_path[..prev_path.len() - strip]);
        path.extend_from_slice(&data[cursor..cursor + nul]);
        (path, cursor + nul + 1)
    };

    if !StagingEntry::validate_path(&path) {
        return Err(StagingError::InvalidPath(path.to_string()));
    }

    Ok((
        StagingEntry {
            path,
            id,
            mode,
            stage,
            stat,
            flags,
        },
        next,
    ))
}
