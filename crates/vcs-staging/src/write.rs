//! Index serialization (DIRC versions 2, 3, and 4).

use vcs_hash::hasher::Hasher;
use vcs_hash::HashAlgorithm;

use crate::{Staging, StagingError};

pub(crate) const INDEX_SIGNATURE: &[u8; 4] = b"DIRC";

/// Fixed on-disk stat block: ctime(8) + mtime(8) + dev + ino + mode +
/// uid + gid + size.
pub(crate) const STAT_BLOCK: usize = 40;

/// Stat block + 20-byte id + 16-bit flags.
pub(crate) const ENTRY_FIXED: usize = STAT_BLOCK + 20 + 2;

/// On-disk size of a v2/v3 entry: fixed part plus path, NUL-padded to the
/// next 8-byte boundary (at least one NUL).
pub(crate) fn padded_entry_size(fixed: usize, name_len: usize) -> usize {
    (fixed + name_len + 8) & !7
}

/// Encode the big-endian prefix varint used by v4 path compression
/// (continuation bytes add one per shift, like pack offset deltas).
pub(crate) fn encode_prefix_varint(value: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(10);
    let mut v = value;
    out.push((v & 0x7f) as u8);
    v >>= 7;
    while v > 0 {
        v -= 1;
        out.push(0x80 | (v & 0x7f) as u8);
        v >>= 7;
    }
    out.reverse();
    out
}

/// Decode the v4 prefix varint. Returns `(value, bytes_consumed)`.
pub(crate) fn decode_prefix_varint(data: &[u8]) -> Option<(u64, usize)> {
    let mut pos = 0;
    let mut byte = *data.get(pos)?;
    pos += 1;
    let mut value = u64::from(byte & 0x7f);
    while byte & 0x80 != 0 {
        byte = *data.get(pos)?;
        pos += 1;
        value = ((value + 1) << 7) + u64::from(byte & 0x7f);
    }
    Some((value, pos))
}

fn common_prefix_len(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count()
}

/// Serialize a staging area to DIRC bytes.
///
/// Entries carrying extended flags force version 3 when version 2 was
/// selected; version 4 additionally prefix-compresses paths.
pub fn serialize_index(staging: &Staging) -> Result<Vec<u8>, StagingError> {
    let needs_extended = staging.entries().any(|e| e.flags.needs_extended());
    let version = match (staging.version(), needs_extended) {
        (2, true) => 3,
        (v, _) => v,
    };

    let mut out = Vec::new();
    out.extend_from_slice(INDEX_SIGNATURE);
    out.extend_from_slice(&version.to_be_bytes());
    out.extend_from_slice(&(staging.len() as u32).to_be_bytes());

    let mut prev_path: &[u8] = b"";
    for entry in staging.entries() {
        let stat = &entry.stat;
        for value in [
            stat.ctime_secs,
            stat.ctime_nsecs,
            stat.mtime_secs,
            stat.mtime_nsecs,
            stat.dev,
            stat.ino,
            entry.mode.raw(),
            stat.uid,
            stat.gid,
            stat.size,
        ] {
            out.extend_from_slice(&value.to_be_bytes());
        }

        out.extend_from_slice(entry.id.as_bytes());

        let extended = entry.flags.needs_extended();
        let name_len_field = entry.path.len().min(0xfff) as u16;
        let mut flags: u16 = name_len_field;
        flags |= (entry.stage.as_u8() as u16) << 12;
        if extended {
            flags |= 1 << 14;
        }
        if entry.flags.assume_valid {
            flags |= 1 << 15;
        }
        out.extend_from_slice(&flags.to_be_bytes());

        if extended {
            let mut ext: u16 = 0;
            if entry.flags.intent_to_add {
                ext |= 1 << 13;
            }
            if entry.flags.skip_worktree {
                ext |= 1 << 14;
            }
            out.extend_from_slice(&ext.to_be_bytes());
        }

        let fixed = ENTRY_FIXED + if extended { 2 } else { 0 };
        if version < 4 {
            out.extend_from_slice(&entry.path);
            let total = padded_entry_size(fixed, entry.path.len());
            let padding = total - fixed - entry.path.len();
            out.extend_from_slice(&vec![0u8; padding]);
        } else {
            let common = common_prefix_len(prev_path, &entry.path);
            let strip = (prev_path.len() - common) as u64;
            out.extend_from_slice(&encode_prefix_varint(strip));
            out.extend_from_slice(&entry.path[common..]);
            out.push(0);
            prev_path = &entry.path;
        }
    }

    for ext in staging.extensions() {
        out.extend_from_slice(&ext.signature);
        out.extend_from_slice(&(ext.data.len() as u32).to_be_bytes());
        out.extend_from_slice(&ext.data);
    }

    let mut hasher = Hasher::new(HashAlgorithm::Sha1);
    hasher.update(&out);
    let checksum = hasher.finalize()?;
    out.extend_from_slice(checksum.as_bytes());

    Ok(out)
}
