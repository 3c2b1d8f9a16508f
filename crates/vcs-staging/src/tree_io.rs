//! Tree round-trips: fill the staging area from a stored tree, or build
//! trees from the staged entries.

use std::collections::BTreeMap;

use bstr::BString;
use vcs_hash::ObjectId;
use vcs_object::{FileMode, TreeEntry};
use vcs_odb::Trees;

use crate::{Stage, Staging, StagingEntry, StagingError};

/// Replace the staging contents with the flattened entries of `tree_id`,
/// all at stage 0 with zeroed stat data.
pub fn read_tree(
    staging: &mut Staging,
    trees: &Trees<'_>,
    tree_id: ObjectId,
) -> Result<(), StagingError> {
    let mut flattened = Vec::new();
    flatten(trees, tree_id, &mut BString::default(), &mut flattened)?;

    let mut builder = staging.builder();
    for (path, mode, id) in flattened {
        builder.add(StagingEntry::new(path, id, mode, Stage::Merged))?;
    }
    builder.finish()
}

fn flatten(
    trees: &Trees<'_>,
    tree_id: ObjectId,
    prefix: &mut BString,
    out: &mut Vec<(BString, FileMode, ObjectId)>,
) -> Result<(), StagingError> {
    for entry in trees.load(&tree_id)? {
        let saved_len = prefix.len();
        if !prefix.is_empty() {
            prefix.push(b'/');
        }
        prefix.extend_from_slice(&entry.name);

        if entry.mode.is_tree() {
            flatten(trees, entry.id, prefix, out)?;
        } else {
            out.push((prefix.clone(), entry.mode, entry.id));
        }
        prefix.truncate(saved_len);
    }
    Ok(())
}

/// Build trees from the staged entries and return the root tree id.
///
/// Fails with [`StagingError::Conflicts`] while unmerged entries exist.
pub fn write_tree(staging: &Staging, trees: &Trees<'_>) -> Result<ObjectId, StagingError> {
    if staging.has_conflicts() {
        return Err(StagingError::Conflicts);
    }

    // Nested directory structure keyed by component name.
    #[derive(Default)]
    struct Dir {
        files: Vec<(BString, FileMode, ObjectId)>,
        dirs: BTreeMap<BString, Dir>,
    }

    let mut root = Dir::default();
    for entry in staging.entries() {
        let components: Vec<&[u8]> = entry.path.split(|&b| b == b'/').collect();
        let mut dir = &mut root;
        for component in &components[..components.len() - 1] {
            dir = dir.dirs.entry(BString::from(*component)).or_default();
        }
        dir.files.push((
            BString::from(*components.last().expect("validated non-empty path")),
            entry.mode,
            entry.id,
        ));
    }

    fn store_dir(trees: &Trees<'_>, dir: Dir) -> Result<ObjectId, StagingError> {
        let mut entries = Vec::with_capacity(dir.files.len() + dir.dirs.len());
        for (name, subdir) in dir.dirs {
            let sub_id = store_dir(trees, subdir)?;
            entries.push(TreeEntry::new(FileMode::Tree, name, sub_id));
        }
        for (name, mode, id) in dir.files {
            entries.push(TreeEntry::new(mode, name, id));
        }
        Ok(trees.store(entries)?)
    }

    store_dir(trees, root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use vcs_object::EMPTY_TREE_ID;
    use vcs_odb::ObjectStore;
    use vcs_raw::MemoryRawStore;

    fn odb() -> ObjectStore {
        ObjectStore::new(Arc::new(MemoryRawStore::new()))
    }

    fn stage(staging: &mut Staging, path: &str, id: ObjectId) {
        let mut editor = staging.editor();
        editor
            .add(StagingEntry::new(
                BString::from(path),
                id,
                FileMode::Regular,
                Stage::Merged,
            ))
            .unwrap();
        editor.finish().unwrap();
    }

    #[test]
    fn write_tree_builds_hierarchy() {
        let odb = odb();
        let trees = odb.trees();
        let blob = odb.blobs().store_bytes(b"body").unwrap();

        let mut staging = Staging::new();
        stage(&mut staging, "a.txt", blob);
        stage(&mut staging, "src/b.txt", blob);
        stage(&mut staging, "src/c.txt", blob);

        let root = write_tree(&staging, &trees).unwrap();
        let root_entries = trees.load(&root).unwrap();
        let names: Vec<&BString> = root_entries.iter().map(|e| &e.name).collect();
        assert_eq!(names, [&BString::from("a.txt"), &BString::from("src")]);
        assert_eq!(root_entries[1].mode, FileMode::Tree);

        let src_entries = trees.load(&root_entries[1].id).unwrap();
        let src_names: Vec<&BString> = src_entries.iter().map(|e| &e.name).collect();
        assert_eq!(src_names, [&BString::from("b.txt"), &BString::from("c.txt")]);
    }

    #[test]
    fn empty_staging_writes_empty_tree() {
        let odb = odb();
        let staging = Staging::new();
        assert_eq!(write_tree(&staging, &odb.trees()).unwrap(), EMPTY_TREE_ID);
    }

    #[test]
    fn conflicts_block_write_tree() {
        let odb = odb();
        let blob = odb.blobs().store_bytes(b"x").unwrap();
        let mut staging = Staging::new();
        let mut editor = staging.editor();
        editor
            .add(StagingEntry::new(
                BString::from("f.txt"),
                blob,
                FileMode::Regular,
                Stage::Ours,
            ))
            .unwrap();
        editor.finish().unwrap();

        assert!(matches!(
            write_tree(&staging, &odb.trees()),
            Err(StagingError::Conflicts)
        ));
    }

    #[test]
    fn read_tree_flattens_to_stage_zero() {
        let odb = odb();
        let trees = odb.trees();
        let blob = odb.blobs().store_bytes(b"deep").unwrap();

        let inner = trees
            .store(vec![TreeEntry::new(FileMode::Regular, "leaf.txt", blob)])
            .unwrap();
        let root = trees
            .store(vec![
                TreeEntry::new(FileMode::Tree, "nested", inner),
                TreeEntry::new(FileMode::Regular, "top.txt", blob),
            ])
            .unwrap();

        let mut staging = Staging::new();
        read_tree(&mut staging, &trees, root).unwrap();

        assert_eq!(staging.len(), 2);
        let paths: Vec<BString> = staging.entries().map(|e| e.path.clone()).collect();
        assert_eq!(
            paths,
            [BString::from("nested/leaf.txt"), BString::from("top.txt")]
        );
        assert!(staging.entries().all(|e| e.stage == Stage::Merged));
    }

    #[test]
    fn tree_roundtrip_preserves_root_id() {
        let odb = odb();
        let trees = odb.trees();
        let blob = odb.blobs().store_bytes(b"same").unwrap();

        let mut staging = Staging::new();
        stage(&mut staging, "x/y/z.txt", blob);
        stage(&mut staging, "x/top.txt", blob);
        stage(&mut staging, "root.txt", blob);

        let written = write_tree(&staging, &trees).unwrap();

        let mut refilled = Staging::new();
        read_tree(&mut refilled, &trees, written).unwrap();
        let rewritten = write_tree(&refilled, &trees).unwrap();
        assert_eq!(written, rewritten);
    }
}
