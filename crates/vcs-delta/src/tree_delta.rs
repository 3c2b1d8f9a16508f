use std::collections::BTreeMap;

use bstr::{BString, ByteSlice};
use vcs_hash::ObjectId;
use vcs_object::{FileMode, TreeEntry};

use crate::DeltaError;

/// One structural tree edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeDeltaOp {
    /// Add an entry absent from the base.
    Add(TreeEntry),
    /// Replace the mode and/or id of an existing entry.
    Modify(TreeEntry),
    /// Remove the named entry.
    Remove(BString),
}

/// A structural delta between two trees: per-entry edits keyed by name.
///
/// Used for tree objects on backends that are not bound to the pack wire
/// format; the pack backend always uses binary deltas.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TreeDelta {
    pub ops: Vec<TreeDeltaOp>,
}

impl TreeDelta {
    /// Whether there are no edits.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Encode to bytes: one record per op, tag byte `A`/`M`/`R`, then
    /// `<mode> <name>\0<id>` for add/modify or `<name>\0` for remove.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for op in &self.ops {
            match op {
                TreeDeltaOp::Add(entry) | TreeDeltaOp::Modify(entry) => {
                    out.push(if matches!(op, TreeDeltaOp::Add(_)) {
                        b'A'
                    } else {
                        b'M'
                    });
                    out.extend_from_slice(&entry.mode.as_bytes());
                    out.push(b' ');
                    out.extend_from_slice(&entry.name);
                    out.push(0);
                    out.extend_from_slice(entry.id.as_bytes());
                }
                TreeDeltaOp::Remove(name) => {
                    out.push(b'R');
                    out.extend_from_slice(name);
                    out.push(0);
                }
            }
        }
        out
    }

    /// Decode from the byte form produced by [`encode`](Self::encode).
    pub fn decode(data: &[u8]) -> Result<Self, DeltaError> {
        let mut ops = Vec::new();
        let mut pos = 0;

        while pos < data.len() {
            let tag = data[pos];
            pos += 1;
            match tag {
                b'A' | b'M' => {
                    let space = data[pos..]
                        .iter()
                        .position(|&b| b == b' ')
                        .ok_or(DeltaError::InvalidDelta {
                            offset: pos,
                            reason: "missing space after mode".into(),
                        })?
                        + pos;
                    let mode = FileMode::from_bytes(&data[pos..space])
                        .map_err(|e| DeltaError::InvalidDelta {
                            offset: pos,
                            reason: e.to_string(),
                        })?;
                    let name_start = space + 1;
                    let nul = data[name_start..]
                        .iter()
                        .position(|&b| b == 0)
                        .ok_or(DeltaError::InvalidDelta {
                            offset: name_start,
                            reason: "missing NUL after name".into(),
                        })?
                        + name_start;
                    let name = BString::from(&data[name_start..nul]);
                    let id_end = nul + 1 + 20;
                    if id_end > data.len() {
                        return Err(DeltaError::InvalidDelta {
                            offset: nul + 1,
                            reason: "truncated id".into(),
                        });
                    }
                    let id = ObjectId::from_bytes(&data[nul + 1..id_end]).map_err(|e| {
                        DeltaError::InvalidDelta {
                            offset: nul + 1,
                            reason: e.to_string(),
                        }
                    })?;
                    let entry = TreeEntry { mode, name, id };
                    ops.push(if tag == b'A' {
                        TreeDeltaOp::Add(entry)
                    } else {
                        TreeDeltaOp::Modify(entry)
                    });
                    pos = id_end;
                }
                b'R' => {
                    let nul = data[pos..]
                        .iter()
                        .position(|&b| b == 0)
                        .ok_or(DeltaError::InvalidDelta {
                            offset: pos,
                            reason: "missing NUL after name".into(),
                        })?
                        + pos;
                    ops.push(TreeDeltaOp::Remove(BString::from(&data[pos..nul])));
                    pos = nul + 1;
                }
                other => {
                    return Err(DeltaError::InvalidDelta {
                        offset: pos - 1,
                        reason: format!("unknown op tag {other:#04x}"),
                    });
                }
            }
        }

        Ok(Self { ops })
    }
}

/// Compute the structural delta turning `base` into `target`.
///
/// Entries are keyed by name; ops come out sorted by name, removes first.
pub fn compute_tree_delta(base: &[TreeEntry], target: &[TreeEntry]) -> TreeDelta {
    let base_map: BTreeMap<&[u8], &TreeEntry> =
        base.iter().map(|e| (e.name.as_bytes(), e)).collect();
    let target_map: BTreeMap<&[u8], &TreeEntry> =
        target.iter().map(|e| (e.name.as_bytes(), e)).collect();

    let mut ops = Vec::new();

    for (name, _) in base_map.iter() {
        if !target_map.contains_key(name) {
            ops.push(TreeDeltaOp::Remove(BString::from(*name)));
        }
    }

    for (name, entry) in target_map.iter() {
        match base_map.get(name) {
            None => ops.push(TreeDeltaOp::Add((*entry).clone())),
            Some(old) if old.mode != entry.mode || old.id != entry.id => {
                ops.push(TreeDeltaOp::Modify((*entry).clone()));
            }
            Some(_) => {}
        }
    }

    TreeDelta { ops }
}

/// Apply a structural delta to `base`, returning the target entries in
/// canonical order.
pub fn apply_tree_delta(
    base: &[TreeEntry],
    delta: &TreeDelta,
) -> Result<Vec<TreeEntry>, DeltaError> {
    let mut entries: BTreeMap<BString, TreeEntry> = base
        .iter()
        .map(|e| (e.name.clone(), e.clone()))
        .collect();

    for op in &delta.ops {
        match op {
            TreeDeltaOp::Add(entry) => {
                if entries.contains_key(&entry.name) {
                    return Err(DeltaError::InvalidDelta {
                        offset: 0,
                        reason: format!("add of existing entry '{}'", entry.name),
                    });
                }
                entries.insert(entry.name.clone(), entry.clone());
            }
            TreeDeltaOp::Modify(entry) => {
                if !entries.contains_key(&entry.name) {
                    return Err(DeltaError::InvalidDelta {
                        offset: 0,
                        reason: format!("modify of missing entry '{}'", entry.name),
                    });
                }
                entries.insert(entry.name.clone(), entry.clone());
            }
            TreeDeltaOp::Remove(name) => {
                if entries.remove(name).is_none() {
                    return Err(DeltaError::InvalidDelta {
                        offset: 0,
                        reason: format!("remove of missing entry '{}'", name),
                    });
                }
            }
        }
    }

    let mut result: Vec<TreeEntry> = entries.into_values().collect();
    result.sort();
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oid(n: u8) -> ObjectId {
        let mut bytes = [0u8; 20];
        bytes[19] = n;
        ObjectId::from_bytes(&bytes).unwrap()
    }

    fn entry(name: &str, n: u8) -> TreeEntry {
        TreeEntry::new(FileMode::Regular, name, oid(n))
    }

    #[test]
    fn compute_and_apply() {
        let base = vec![entry("a.txt", 1), entry("b.txt", 2), entry("c.txt", 3)];
        let target = vec![entry("a.txt", 1), entry("b.txt", 9), entry("d.txt", 4)];

        let delta = compute_tree_delta(&base, &target);
        let applied = apply_tree_delta(&base, &delta).unwrap();

        let mut expected = target.clone();
        expected.sort();
        assert_eq!(applied, expected);
    }

    #[test]
    fn identical_trees_have_empty_delta() {
        let base = vec![entry("a.txt", 1)];
        assert!(compute_tree_delta(&base, &base).is_empty());
    }

    #[test]
    fn mode_change_is_modify() {
        let base = vec![entry("run.sh", 1)];
        let target = vec![TreeEntry::new(FileMode::Executable, "run.sh", oid(1))];
        let delta = compute_tree_delta(&base, &target);
        assert_eq!(delta.ops.len(), 1);
        assert!(matches!(delta.ops[0], TreeDeltaOp::Modify(_)));
    }

    #[test]
    fn encode_decode_roundtrip() {
        let delta = TreeDelta {
            ops: vec![
                TreeDeltaOp::Remove(BString::from("gone.txt")),
                TreeDeltaOp::Add(entry("new.txt", 7)),
                TreeDeltaOp::Modify(TreeEntry::new(FileMode::Tree, "src", oid(8))),
            ],
        };
        let decoded = TreeDelta::decode(&delta.encode()).unwrap();
        assert_eq!(decoded, delta);
    }

    #[test]
    fn apply_rejects_inconsistent_ops() {
        let base = vec![entry("a.txt", 1)];
        let add_existing = TreeDelta {
            ops: vec![TreeDeltaOp::Add(entry("a.txt", 2))],
        };
        assert!(apply_tree_delta(&base, &add_existing).is_err());

        let modify_missing = TreeDelta {
            ops: vec![TreeDeltaOp::Modify(entry("nope.txt", 2))],
        };
        assert!(apply_tree_delta(&base, &modify_missing).is_err());

        let remove_missing = TreeDelta {
            ops: vec![TreeDeltaOp::Remove(BString::from("nope.txt"))],
        };
        assert!(apply_tree_delta(&base, &remove_missing).is_err());
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(TreeDelta::decode(b"Zjunk").is_err());
        assert!(TreeDelta::decode(b"A100644 name").is_err()); // no NUL
    }

    #[test]
    fn structural_delta_is_small_for_large_trees() {
        let base: Vec<TreeEntry> = (0..200)
            .map(|i| entry(&format!("file{i:04}.txt"), (i % 250) as u8))
            .collect();
        let mut target = base.clone();
        target[100] = entry("file0100.txt", 251);

        let delta = compute_tree_delta(&base, &target);
        assert_eq!(delta.ops.len(), 1);
    }
}
