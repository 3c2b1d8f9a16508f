//! Delta application: reconstruct a target from a base and a delta.

use crate::binary::{BinaryDelta, DeltaOp};
use crate::codec::read_varint;
use crate::DeltaError;

/// Apply a raw delta instruction stream to `base`, producing the target.
///
/// Validates the declared base size, bounds-checks every copy, and checks
/// the declared target size against the produced output.
pub fn apply_delta(base: &[u8], delta: &[u8]) -> Result<Vec<u8>, DeltaError> {
    let (base_size, consumed) = read_varint(delta).ok_or(DeltaError::InvalidDelta {
        offset: 0,
        reason: "truncated base size".into(),
    })?;
    let mut pos = consumed;

    let (target_size, consumed) = read_varint(&delta[pos..]).ok_or(DeltaError::InvalidDelta {
        offset: pos,
        reason: "truncated target size".into(),
    })?;
    pos += consumed;

    if base_size != base.len() as u64 {
        return Err(DeltaError::BaseSizeMismatch {
            declared: base_size,
            actual: base.len() as u64,
        });
    }

    let mut output = Vec::with_capacity(target_size as usize);

    while pos < delta.len() {
        let cmd = delta[pos];
        pos += 1;

        if cmd & 0x80 != 0 {
            let mut offset: usize = 0;
            let mut size: usize = 0;

            for i in 0..4 {
                if cmd & (1 << i) != 0 {
                    let byte = *delta.get(pos).ok_or(DeltaError::InvalidDelta {
                        offset: pos,
                        reason: "truncated copy offset".into(),
                    })?;
                    offset |= (byte as usize) << (i * 8);
                    pos += 1;
                }
            }
            for i in 0..3 {
                if cmd & (0x10 << i) != 0 {
                    let byte = *delta.get(pos).ok_or(DeltaError::InvalidDelta {
                        offset: pos,
                        reason: "truncated copy size".into(),
                    })?;
                    size |= (byte as usize) << (i * 8);
                    pos += 1;
                }
            }
            if size == 0 {
                size = 0x10000;
            }

            let end = offset.checked_add(size).ok_or(DeltaError::InvalidDelta {
                offset: pos,
                reason: "copy range overflow".into(),
            })?;
            if end > base.len() {
                return Err(DeltaError::InvalidDelta {
                    offset: pos,
                    reason: format!(
                        "copy out of bounds: offset={offset}, size={size}, base_len={}",
                        base.len()
                    ),
                });
            }
            output.extend_from_slice(&base[offset..end]);
        } else if cmd != 0 {
            let len = cmd as usize;
            if pos + len > delta.len() {
                return Err(DeltaError::InvalidDelta {
                    offset: pos,
                    reason: "truncated insert data".into(),
                });
            }
            output.extend_from_slice(&delta[pos..pos + len]);
            pos += len;
        } else {
            return Err(DeltaError::InvalidDelta {
                offset: pos - 1,
                reason: "reserved opcode 0".into(),
            });
        }
    }

    if output.len() as u64 != target_size {
        return Err(DeltaError::TargetSizeMismatch {
            declared: target_size,
            actual: output.len() as u64,
        });
    }

    Ok(output)
}

/// Apply a decoded delta. Equivalent to encoding and applying, without the
/// intermediate buffer.
pub fn apply_ops(base: &[u8], delta: &BinaryDelta) -> Result<Vec<u8>, DeltaError> {
    if delta.base_size != base.len() as u64 {
        return Err(DeltaError::BaseSizeMismatch {
            declared: delta.base_size,
            actual: base.len() as u64,
        });
    }

    let mut output = Vec::with_capacity(delta.target_size as usize);
    for op in &delta.ops {
        match op {
            DeltaOp::Copy { offset, len } => {
                let start = *offset as usize;
                let end = start + *len as usize;
                if end > base.len() {
                    return Err(DeltaError::InvalidDelta {
                        offset: 0,
                        reason: format!(
                            "copy out of bounds: offset={start}, size={len}, base_len={}",
                            base.len()
                        ),
                    });
                }
                output.extend_from_slice(&base[start..end]);
            }
            DeltaOp::Insert(data) => output.extend_from_slice(data),
        }
    }

    if output.len() as u64 != delta.target_size {
        return Err(DeltaError::TargetSizeMismatch {
            declared: delta.target_size,
            actual: output.len() as u64,
        });
    }
    Ok(output)
}
