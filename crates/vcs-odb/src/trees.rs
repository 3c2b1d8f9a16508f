use bstr::{BStr, ByteSlice};
use vcs_hash::ObjectId;
use vcs_object::{ObjectType, Tree, TreeEntry, EMPTY_TREE_ID};

use crate::{ObjectStore, OdbError};

/// Tree access with canonical serialization.
pub struct Trees<'a> {
    objects: &'a ObjectStore,
}

impl<'a> Trees<'a> {
    pub(crate) fn new(objects: &'a ObjectStore) -> Self {
        Self { objects }
    }

    /// Store a tree. Entries are validated and sorted canonically; the
    /// same entry set always yields the same id.
    pub fn store(&self, entries: Vec<TreeEntry>) -> Result<ObjectId, OdbError> {
        for entry in &entries {
            TreeEntry::validate_name(entry.name.as_bstr())?;
        }
        let tree = Tree { entries };
        self.objects
            .store_bytes(ObjectType::Tree, &tree.serialize_content())
    }

    /// Load a tree's entries, in canonical order. Rejects malformed or
    /// unsorted content.
    pub fn load(&self, id: &ObjectId) -> Result<Vec<TreeEntry>, OdbError> {
        let content = self.objects.load_typed(id, ObjectType::Tree)?;
        let tree = Tree::parse(&content).map_err(|e| OdbError::CorruptObject {
            id: *id,
            reason: e.to_string(),
        })?;
        Ok(tree.entries)
    }

    /// Look up one entry by name.
    pub fn entry(&self, tree_id: &ObjectId, name: &BStr) -> Result<Option<TreeEntry>, OdbError> {
        let entries = self.load(tree_id)?;
        Ok(entries.into_iter().find(|e| e.name.as_bstr() == name))
    }

    /// The id of the empty tree.
    pub fn empty_id(&self) -> ObjectId {
        EMPTY_TREE_ID
    }

    pub fn has(&self, id: &ObjectId) -> Result<bool, OdbError> {
        self.objects.has(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use vcs_object::FileMode;
    use vcs_raw::MemoryRawStore;

    fn odb() -> ObjectStore {
        ObjectStore::new(Arc::new(MemoryRawStore::new()))
    }

    #[test]
    fn empty_tree_gets_well_known_id() {
        let odb = odb();
        let id = odb.trees().store(Vec::new()).unwrap();
        assert_eq!(id, EMPTY_TREE_ID);
        assert!(odb.trees().load(&id).unwrap().is_empty());
    }

    #[test]
    fn entries_come_back_sorted() {
        let odb = odb();
        let trees = odb.trees();
        let blob = odb.blobs().store_bytes(b"x").unwrap();

        let id = trees
            .store(vec![
                TreeEntry::new(FileMode::Regular, "zeta.txt", blob),
                TreeEntry::new(FileMode::Regular, "alpha.txt", blob),
                TreeEntry::new(FileMode::Tree, "dir", EMPTY_TREE_ID),
            ])
            .unwrap();

        let names: Vec<_> = trees
            .load(&id)
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, ["alpha.txt", "dir", "zeta.txt"]);
    }

    #[test]
    fn same_entries_same_id() {
        let odb = odb();
        let trees = odb.trees();
        let blob = odb.blobs().store_bytes(b"content").unwrap();

        let entries = vec![TreeEntry::new(FileMode::Regular, "f.txt", blob)];
        let id1 = trees.store(entries.clone()).unwrap();
        let id2 = trees.store(entries).unwrap();
        assert_eq!(id1, id2);
    }

    #[test]
    fn entry_lookup() {
        let odb = odb();
        let trees = odb.trees();
        let blob = odb
            .blobs()
            .store_bytes(b"# My Project\n\nA sample project.")
            .unwrap();
        let tree_id = trees
            .store(vec![TreeEntry::new(FileMode::Regular, "README.md", blob)])
            .unwrap();

        let entry = trees
            .entry(&tree_id, BStr::new("README.md"))
            .unwrap()
            .unwrap();
        assert_eq!(entry.mode, FileMode::Regular);
        assert_eq!(entry.id, blob);
        assert!(trees.entry(&tree_id, BStr::new("absent")).unwrap().is_none());
    }

    #[test]
    fn invalid_names_rejected_on_store() {
        let odb = odb();
        let blob = odb.blobs().store_bytes(b"x").unwrap();
        assert!(odb
            .trees()
            .store(vec![TreeEntry::new(FileMode::Regular, "a/b", blob)])
            .is_err());
    }
}
