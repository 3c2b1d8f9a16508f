//! The `packed-refs` file: many refs consolidated into one text file.
//!
//! Format: an optional `# pack-refs with: ...` header, then one
//! `<hex-id> <name>` line per ref; a following `^<hex-id>` line records
//! the peeled id of an annotated tag.

use std::fs;
use std::io::Write;
use std::path::Path;

use vcs_hash::ObjectId;
use vcs_utils::lockfile::LockFile;

use crate::{RefError, RefName};

pub(crate) const PACKED_REFS_FILE: &str = "packed-refs";
const HEADER: &str = "# pack-refs with: peeled fully-peeled sorted";

/// One packed ref.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedEntry {
    pub name: RefName,
    pub target: ObjectId,
    pub peeled: Option<ObjectId>,
}

/// Parsed contents of `packed-refs`.
#[derive(Debug, Clone, Default)]
pub struct PackedRefs {
    entries: Vec<PackedEntry>,
}

impl PackedRefs {
    /// Load from the store root; a missing file is an empty set.
    pub fn load(root: &Path) -> Result<Self, RefError> {
        let path = root.join(PACKED_REFS_FILE);
        match fs::read_to_string(&path) {
            Ok(contents) => Self::parse(&contents),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(RefError::IoPath { path, source: e }),
        }
    }

    /// Parse the text form.
    pub fn parse(contents: &str) -> Result<Self, RefError> {
        let mut entries: Vec<PackedEntry> = Vec::new();

        for line in contents.lines() {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some(peeled_hex) = line.strip_prefix('^') {
                let last = entries.last_mut().ok_or_else(|| {
                    RefError::Parse("peeled line without a preceding ref".into())
                })?;
                last.peeled = Some(ObjectId::from_hex(peeled_hex.trim())?);
                continue;
            }

            let (hex, name) = line
                .split_once(' ')
                .ok_or_else(|| RefError::Parse(format!("malformed packed ref line: {line}")))?;
            entries.push(PackedEntry {
                name: RefName::new(name.trim())?,
                target: ObjectId::from_hex(hex.trim())?,
                peeled: None,
            });
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(Self { entries })
    }

    /// Serialize to the text form, sorted by name.
    pub fn serialize(&self) -> String {
        let mut out = String::new();
        out.push_str(HEADER);
        out.push('\n');
        for entry in &self.entries {
            out.push_str(&entry.target.to_hex());
            out.push(' ');
            out.push_str(entry.name.as_str());
            out.push('\n');
            if let Some(peeled) = &entry.peeled {
                out.push('^');
                out.push_str(&peeled.to_hex());
                out.push('\n');
            }
        }
        out
    }

    /// Persist through the lock-file protocol.
    pub fn store(&self, root: &Path) -> Result<(), RefError> {
        let path = root.join(PACKED_REFS_FILE);
        let mut lock = LockFile::acquire(&path)?;
        lock.write_all(self.serialize().as_bytes())
            .map_err(|e| RefError::IoPath {
                path: path.clone(),
                source: e,
            })?;
        lock.commit()?;
        Ok(())
    }

    /// Look up one entry.
    pub fn lookup(&self, name: &RefName) -> Option<&PackedEntry> {
        self.entries
            .binary_search_by(|entry| entry.name.cmp(name))
            .ok()
            .map(|pos| &self.entries[pos])
    }

    /// Insert or replace an entry, keeping name order.
    pub fn upsert(&mut self, entry: PackedEntry) {
        match self
            .entries
            .binary_search_by(|existing| existing.name.cmp(&entry.name))
        {
            Ok(pos) => self.entries[pos] = entry,
            Err(pos) => self.entries.insert(pos, entry),
        }
    }

    /// Remove an entry. Returns true if it existed.
    pub fn remove(&mut self, name: &RefName) -> bool {
        match self
            .entries
            .binary_search_by(|existing| existing.name.cmp(name))
        {
            Ok(pos) => {
                self.entries.remove(pos);
                true
            }
            Err(_) => false,
        }
    }

    pub fn entries(&self) -> &[PackedEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oid(n: u8) -> ObjectId {
        let mut bytes = [0u8; 20];
        bytes[19] = n;
        ObjectId::from_bytes(&bytes).unwrap()
    }

    #[test]
    fn parse_with_header_and_peeled() {
        let text = "\
# pack-refs with: peeled fully-peeled sorted
0000000000000000000000000000000000000001 refs/heads/main
0000000000000000000000000000000000000002 refs/tags/v1.0
^0000000000000000000000000000000000000003
";
        let packed = PackedRefs::parse(text).unwrap();
        assert_eq!(packed.entries().len(), 2);

        let tag = packed
            .lookup(&RefName::new("refs/tags/v1.0").unwrap())
            .unwrap();
        assert_eq!(tag.target, oid(2));
        assert_eq!(tag.peeled, Some(oid(3)));

        let main = packed
            .lookup(&RefName::new("refs/heads/main").unwrap())
            .unwrap();
        assert_eq!(main.peeled, None);
    }

    #[test]
    fn serialize_parse_roundtrip() {
        let mut packed = PackedRefs::default();
        packed.upsert(PackedEntry {
            name: RefName::new("refs/tags/v1").unwrap(),
            target: oid(1),
            peeled: Some(oid(2)),
        });
        packed.upsert(PackedEntry {
            name: RefName::new("refs/heads/main").unwrap(),
            target: oid(3),
            peeled: None,
        });

        let reparsed = PackedRefs::parse(&packed.serialize()).unwrap();
        assert_eq!(reparsed.entries(), packed.entries());
    }

    #[test]
    fn load_missing_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(PackedRefs::load(dir.path()).unwrap().is_empty());
    }

    #[test]
    fn store_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let mut packed = PackedRefs::default();
        packed.upsert(PackedEntry {
            name: RefName::new("refs/heads/main").unwrap(),
            target: oid(7),
            peeled: None,
        });
        packed.store(dir.path()).unwrap();

        let loaded = PackedRefs::load(dir.path()).unwrap();
        assert_eq!(loaded.entries(), packed.entries());
    }

    #[test]
    fn stray_peeled_line_rejected() {
        assert!(PackedRefs::parse("^0000000000000000000000000000000000000001\n").is_err());
    }

    #[test]
    fn upsert_replaces_and_remove_reports() {
        let mut packed = PackedRefs::default();
        let name = RefName::new("refs/heads/main").unwrap();
        packed.upsert(PackedEntry {
            name: name.clone(),
            target: oid(1),
            peeled: None,
        });
        packed.upsert(PackedEntry {
            name: name.clone(),
            target: oid(2),
            peeled: None,
        });
        assert_eq!(packed.entries().len(), 1);
        assert_eq!(packed.lookup(&name).unwrap().target, oid(2));

        assert!(packed.remove(&name));
        assert!(!packed.remove(&name));
    }
}
