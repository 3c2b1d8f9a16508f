//! Delta computation.
//!
//! Builds an index of fixed-size blocks over the base, then scans the
//! target: block matches are extended as far as possible and become copy
//! instructions, everything else accumulates into insert runs.

use std::collections::HashMap;

use crate::binary::{BinaryDelta, DeltaOp};
use crate::codec::MAX_INSERT;

/// Match window: block size for the base index, and the minimum match
/// length worth emitting as a copy.
pub const BLOCK_SIZE: usize = 16;

/// Compute a delta transforming `base` into `target`.
pub fn compute_delta(base: &[u8], target: &[u8]) -> BinaryDelta {
    let mut ops: Vec<DeltaOp> = Vec::new();
    let index = build_block_index(base);

    let mut pos = 0;
    let mut pending: Vec<u8> = Vec::new();

    while pos < target.len() {
        let remaining = target.len() - pos;

        if remaining >= BLOCK_SIZE {
            let block = &target[pos..pos + BLOCK_SIZE];
            if let Some(&base_offset) = index.get(block) {
                let len = extend_match(base, base_offset, target, pos);
                flush_insert(&mut ops, &mut pending);
                ops.push(DeltaOp::Copy {
                    offset: base_offset as u64,
                    len: len as u32,
                });
                pos += len;
                continue;
            }
        }

        pending.push(target[pos]);
        pos += 1;
        if pending.len() == MAX_INSERT {
            flush_insert(&mut ops, &mut pending);
        }
    }

    flush_insert(&mut ops, &mut pending);

    BinaryDelta {
        base_size: base.len() as u64,
        target_size: target.len() as u64,
        ops,
    }
}

/// Index non-overlapping base blocks by content. First occurrence wins so
/// copies prefer low offsets.
fn build_block_index(base: &[u8]) -> HashMap<&[u8], usize> {
    let mut index = HashMap::new();
    if base.len() < BLOCK_SIZE {
        return index;
    }
    for offset in (0..=base.len() - BLOCK_SIZE).step_by(BLOCK_SIZE) {
        index.entry(&base[offset..offset + BLOCK_SIZE]).or_insert(offset);
    }
    index
}

/// Extend a block match forward as far as the bytes agree.
fn extend_match(base: &[u8], base_off: usize, target: &[u8], target_off: usize) -> usize {
    let max_len = (base.len() - base_off).min(target.len() - target_off);
    let mut len = BLOCK_SIZE;
    while len < max_len && base[base_off + len] == target[target_off + len] {
        len += 1;
    }
    len
}

fn flush_insert(ops: &mut Vec<DeltaOp>, pending: &mut Vec<u8>) {
    if !pending.is_empty() {
        ops.push(DeltaOp::Insert(std::mem::take(pending)));
    }
}
