use std::cmp::Ordering;

use bstr::{BStr, BString, ByteSlice};
use vcs_hash::ObjectId;

use crate::ObjectError;

/// The id of the empty tree, fixed by the object format.
pub const EMPTY_TREE_ID: ObjectId = ObjectId::Sha1([
    0x4b, 0x82, 0x5d, 0xc6, 0x42, 0xcb, 0x6e, 0xb9, 0xa0, 0x60, 0xe5, 0x4b, 0xf8, 0xd6, 0x92,
    0x88, 0xfb, 0xee, 0x49, 0x04,
]);

/// File mode of a tree entry. The set is closed; any other on-disk value is
/// rejected as corrupt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileMode {
    /// Regular file (100644).
    Regular,
    /// Executable file (100755).
    Executable,
    /// Symbolic link (120000).
    Symlink,
    /// Submodule link (160000).
    Gitlink,
    /// Subdirectory (040000).
    Tree,
}

impl FileMode {
    /// Parse from octal ASCII (e.g. `b"100644"`; trees serialize without a
    /// leading zero, as `40000`).
    pub fn from_bytes(s: &[u8]) -> Result<Self, ObjectError> {
        let raw = parse_octal(s)
            .ok_or_else(|| ObjectError::InvalidFileMode(String::from_utf8_lossy(s).into()))?;
        Self::from_raw(raw)
            .ok_or_else(|| ObjectError::InvalidFileMode(format!("{raw:o}")))
    }

    /// Look up by raw numeric value.
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0o100644 => Some(Self::Regular),
            0o100755 => Some(Self::Executable),
            0o120000 => Some(Self::Symlink),
            0o160000 => Some(Self::Gitlink),
            0o040000 => Some(Self::Tree),
            _ => None,
        }
    }

    /// The raw numeric value.
    pub fn raw(&self) -> u32 {
        match self {
            Self::Regular => 0o100644,
            Self::Executable => 0o100755,
            Self::Symlink => 0o120000,
            Self::Gitlink => 0o160000,
            Self::Tree => 0o40000,
        }
    }

    /// Canonical octal serialization (no leading zero).
    pub fn as_bytes(&self) -> Vec<u8> {
        format!("{:o}", self.raw()).into_bytes()
    }

    pub fn is_tree(&self) -> bool {
        matches!(self, Self::Tree)
    }

    pub fn is_blob(&self) -> bool {
        matches!(self, Self::Regular | Self::Executable)
    }
}

fn parse_octal(s: &[u8]) -> Option<u32> {
    if s.is_empty() || s.len() > 7 {
        return None;
    }
    let mut val: u32 = 0;
    for &b in s {
        if !(b'0'..=b'7').contains(&b) {
            return None;
        }
        val = val * 8 + u32::from(b - b'0');
    }
    Some(val)
}

/// A single tree entry: `(mode, name, id)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub mode: FileMode,
    pub name: BString,
    pub id: ObjectId,
}

impl TreeEntry {
    pub fn new(mode: FileMode, name: impl Into<BString>, id: ObjectId) -> Self {
        Self {
            mode,
            name: name.into(),
            id,
        }
    }

    /// Validate the entry name: non-empty, no `/`, no NUL.
    pub fn validate_name(name: &BStr) -> Result<(), ObjectError> {
        if name.is_empty() {
            return Err(ObjectError::InvalidEntryName("empty name".into()));
        }
        if name.contains(&b'/') {
            return Err(ObjectError::InvalidEntryName(format!(
                "'{}' contains '/'",
                name
            )));
        }
        if name.contains(&0) {
            return Err(ObjectError::InvalidEntryName("name contains NUL".into()));
        }
        Ok(())
    }

    /// Canonical entry ordering: byte-wise by name, with directories
    /// compared as if their name had a trailing `/`. So `src` (dir) sorts
    /// after `src.txt` and before `src0`.
    pub fn cmp_entries(a: &TreeEntry, b: &TreeEntry) -> Ordering {
        ordered_name_compare(
            a.name.as_ref(),
            a.mode.is_tree(),
            b.name.as_ref(),
            b.mode.is_tree(),
        )
    }
}

impl PartialOrd for TreeEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TreeEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        Self::cmp_entries(self, other)
    }
}

/// Name comparison with the implicit trailing `/` for directories.
fn ordered_name_compare(name1: &[u8], is_dir1: bool, name2: &[u8], is_dir2: bool) -> Ordering {
    let min_len = name1.len().min(name2.len());
    match name1[..min_len].cmp(&name2[..min_len]) {
        Ordering::Equal => {}
        other => return other,
    }
    // One name is a prefix of the other (or both ended). The virtual next
    // character is NUL at the end of a file name, '/' at the end of a
    // directory name.
    let next = |name: &[u8], is_dir: bool| -> u8 {
        if name.len() > min_len {
            name[min_len]
        } else if is_dir {
            b'/'
        } else {
            0
        }
    };
    next(name1, is_dir1).cmp(&next(name2, is_dir2))
}

/// A tree object: a canonically ordered sequence of entries.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Tree {
    pub entries: Vec<TreeEntry>,
}

impl Tree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse tree content from the binary form.
    ///
    /// Each entry is `<mode-octal> <name>\0<digest-bytes>`. Rejects invalid
    /// modes, invalid names, and entries out of canonical order.
    pub fn parse(content: &[u8]) -> Result<Self, ObjectError> {
        let mut entries: Vec<TreeEntry> = Vec::new();
        let mut pos = 0;

        while pos < content.len() {
            let space = content[pos..]
                .iter()
                .position(|&b| b == b' ')
                .ok_or_else(|| ObjectError::InvalidTreeEntry {
                    offset: pos,
                    reason: "missing space after mode".into(),
                })?
                + pos;

            let mode = FileMode::from_bytes(&content[pos..space]).map_err(|e| {
                ObjectError::InvalidTreeEntry {
                    offset: pos,
                    reason: e.to_string(),
                }
            })?;

            let name_start = space + 1;
            let nul = content[name_start..]
                .iter()
                .position(|&b| b == 0)
                .ok_or_else(|| ObjectError::InvalidTreeEntry {
                    offset: name_start,
                    reason: "missing NUL after name".into(),
                })?
                + name_start;

            let name = BString::from(&content[name_start..nul]);
            TreeEntry::validate_name(name.as_bstr()).map_err(|e| {
                ObjectError::InvalidTreeEntry {
                    offset: name_start,
                    reason: e.to_string(),
                }
            })?;

            let id_start = nul + 1;
            let id_end = id_start + 20;
            if id_end > content.len() {
                return Err(ObjectError::InvalidTreeEntry {
                    offset: id_start,
                    reason: "truncated id".into(),
                });
            }
            let id = ObjectId::from_bytes(&content[id_start..id_end])?;

            let entry = TreeEntry { mode, name, id };
            if let Some(prev) = entries.last() {
                if TreeEntry::cmp_entries(prev, &entry) != Ordering::Less {
                    return Err(ObjectError::UnsortedTree { offset: pos });
                }
            }
            entries.push(entry);
            pos = id_end;
        }

        Ok(Self { entries })
    }

    /// Serialize to the binary form, in canonical order.
    pub fn serialize_content(&self) -> Vec<u8> {
        let mut sorted = self.entries.clone();
        sorted.sort();

        let mut out = Vec::new();
        for entry in &sorted {
            out.extend_from_slice(&entry.mode.as_bytes());
            out.push(b' ');
            out.extend_from_slice(&entry.name);
            out.push(0);
            out.extend_from_slice(entry.id.as_bytes());
        }
        out
    }

    /// Sort entries in place into canonical order.
    pub fn sort(&mut self) {
        self.entries.sort();
    }

    /// Find an entry by exact name.
    pub fn find(&self, name: &BStr) -> Option<&TreeEntry> {
        self.entries.iter().find(|e| e.name.as_bstr() == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TreeEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vcs_hash::hasher::Hasher;
    use vcs_hash::HashAlgorithm;

    fn oid(n: u8) -> ObjectId {
        let mut bytes = [0u8; 20];
        bytes[19] = n;
        ObjectId::from_bytes(&bytes).unwrap()
    }

    #[test]
    fn mode_roundtrip() {
        for mode in [
            FileMode::Regular,
            FileMode::Executable,
            FileMode::Symlink,
            FileMode::Gitlink,
            FileMode::Tree,
        ] {
            assert_eq!(FileMode::from_bytes(&mode.as_bytes()).unwrap(), mode);
        }
    }

    #[test]
    fn tree_mode_has_no_leading_zero() {
        assert_eq!(FileMode::Tree.as_bytes(), b"40000");
        // But the padded form still parses.
        assert_eq!(FileMode::from_bytes(b"040000").unwrap(), FileMode::Tree);
    }

    #[test]
    fn unknown_mode_rejected() {
        assert!(FileMode::from_bytes(b"100600").is_err());
        assert!(FileMode::from_bytes(b"abc").is_err());
        assert!(FileMode::from_bytes(b"").is_err());
    }

    #[test]
    fn directory_sorts_with_virtual_slash() {
        let dir = TreeEntry::new(FileMode::Tree, "src", oid(1));
        let dotted = TreeEntry::new(FileMode::Regular, "src.txt", oid(2));
        let digit = TreeEntry::new(FileMode::Regular, "src0", oid(3));

        // '.' (0x2e) < '/' (0x2f) < '0' (0x30)
        assert_eq!(TreeEntry::cmp_entries(&dotted, &dir), Ordering::Less);
        assert_eq!(TreeEntry::cmp_entries(&dir, &digit), Ordering::Less);
    }

    #[test]
    fn file_with_same_name_sorts_before_directory() {
        let file = TreeEntry::new(FileMode::Regular, "x", oid(1));
        let dir = TreeEntry::new(FileMode::Tree, "x", oid(2));
        assert_eq!(TreeEntry::cmp_entries(&file, &dir), Ordering::Less);
    }

    #[test]
    fn serialize_sorts_entries() {
        let tree = Tree {
            entries: vec![
                TreeEntry::new(FileMode::Regular, "b.txt", oid(1)),
                TreeEntry::new(FileMode::Regular, "a.txt", oid(2)),
            ],
        };
        let parsed = Tree::parse(&tree.serialize_content()).unwrap();
        assert_eq!(parsed.entries[0].name, "a.txt");
        assert_eq!(parsed.entries[1].name, "b.txt");
    }

    #[test]
    fn parse_rejects_unsorted() {
        let tree = Tree {
            entries: vec![
                TreeEntry::new(FileMode::Regular, "z.txt", oid(1)),
                TreeEntry::new(FileMode::Regular, "a.txt", oid(2)),
            ],
        };
        // Serialize manually without sorting.
        let mut bytes = Vec::new();
        for entry in &tree.entries {
            bytes.extend_from_slice(&entry.mode.as_bytes());
            bytes.push(b' ');
            bytes.extend_from_slice(&entry.name);
            bytes.push(0);
            bytes.extend_from_slice(entry.id.as_bytes());
        }
        assert!(matches!(
            Tree::parse(&bytes),
            Err(ObjectError::UnsortedTree { .. })
        ));
    }

    #[test]
    fn parse_rejects_duplicate_names() {
        let mut bytes = Vec::new();
        for _ in 0..2 {
            bytes.extend_from_slice(b"100644 same\0");
            bytes.extend_from_slice(oid(1).as_bytes());
        }
        assert!(Tree::parse(&bytes).is_err());
    }

    #[test]
    fn parse_rejects_bad_names() {
        assert!(TreeEntry::validate_name(BStr::new(b"")).is_err());
        assert!(TreeEntry::validate_name(BStr::new(b"a/b")).is_err());
        assert!(TreeEntry::validate_name(BStr::new(b"a\0b")).is_err());
        assert!(TreeEntry::validate_name(BStr::new(b"ok.txt")).is_ok());
    }

    #[test]
    fn parse_truncated_id() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"100644 f\0");
        bytes.extend_from_slice(&[0u8; 10]); // half an id
        assert!(Tree::parse(&bytes).is_err());
    }

    #[test]
    fn empty_tree_roundtrip_and_id() {
        let tree = Tree::new();
        let content = tree.serialize_content();
        assert!(content.is_empty());
        let id = Hasher::hash_object(HashAlgorithm::Sha1, "tree", &content).unwrap();
        assert_eq!(id, EMPTY_TREE_ID);
    }

    #[test]
    fn find_entry() {
        let tree = Tree {
            entries: vec![
                TreeEntry::new(FileMode::Regular, "README.md", oid(1)),
                TreeEntry::new(FileMode::Tree, "src", oid(2)),
            ],
        };
        assert_eq!(tree.find(BStr::new("src")).unwrap().id, oid(2));
        assert!(tree.find(BStr::new("missing")).is_none());
    }
}
