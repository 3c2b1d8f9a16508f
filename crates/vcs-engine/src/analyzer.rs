//! Reachability analysis, storage statistics, and garbage collection.

use std::collections::HashSet;

use vcs_delta::store::PackedObjectSource;
use vcs_hash::ObjectId;
use vcs_object::{ObjectType, Tree};
use vcs_odb::{ObjectStore, WalkOptions};
use vcs_pack::store::PackDeltaStore;
use vcs_raw::RawStore;
use vcs_utils::abort::AbortSignal;
use vcs_utils::lock::{LockGuard, LockManager};

use crate::orchestrator::Packer;
use crate::EngineError;

/// Lock-manager resource name serializing collection runs.
pub const GC_LOCK: &str = "gc.lock";

/// Every object reachable from `roots`, in discovery order: commits pull
/// in their ancestry and tree closures, tags follow their targets, trees
/// pull in subtrees and blobs.
pub fn reachable_objects(
    objects: &ObjectStore,
    roots: &[ObjectId],
    abort: &AbortSignal,
) -> Result<Vec<ObjectId>, EngineError> {
    let mut seen: HashSet<ObjectId> = HashSet::new();
    let mut ordered: Vec<ObjectId> = Vec::new();
    let mut pending: Vec<ObjectId> = roots.to_vec();

    while let Some(id) = pending.pop() {
        abort.check()?;
        if seen.contains(&id) {
            continue;
        }

        let header = objects.header(&id)?;
        match header.obj_type {
            ObjectType::Commit => {
                for commit_id in objects.commits().walk_ancestry(id, WalkOptions::default()) {
                    abort.check()?;
                    let commit_id = commit_id?;
                    if !seen.insert(commit_id) {
                        continue;
                    }
                    ordered.push(commit_id);
                    let commit = objects.commits().load(&commit_id)?;
                    pending.push(commit.tree);
                }
            }
            ObjectType::Tree => {
                collect_tree(objects, id, &mut seen, &mut ordered, abort)?;
            }
            ObjectType::Tag => {
                seen.insert(id);
                ordered.push(id);
                let (target, _) = objects.tags().target(&id, false)?;
                pending.push(target);
            }
            ObjectType::Blob => {
                if seen.insert(id) {
                    ordered.push(id);
                }
            }
        }
    }

    Ok(ordered)
}

fn collect_tree(
    objects: &ObjectStore,
    root: ObjectId,
    seen: &mut HashSet<ObjectId>,
    ordered: &mut Vec<ObjectId>,
    abort: &AbortSignal,
) -> Result<(), EngineError> {
    let mut stack = vec![root];
    while let Some(tree_id) = stack.pop() {
        abort.check()?;
        if !seen.insert(tree_id) {
            continue;
        }
        ordered.push(tree_id);

        let content = objects.load_typed(&tree_id, ObjectType::Tree)?;
        let tree = Tree::parse(&content).map_err(vcs_odb::OdbError::from)?;
        for entry in tree.entries {
            if entry.mode.is_tree() {
                stack.push(entry.id);
            } else if entry.mode.is_blob() || entry.mode == vcs_object::FileMode::Symlink {
                if seen.insert(entry.id) {
                    ordered.push(entry.id);
                }
            }
            // Gitlinks point outside this store.
        }
    }
    Ok(())
}

/// Aggregate numbers about a store's contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StorageStats {
    pub total_objects: usize,
    pub loose_objects: usize,
    pub packed_objects: usize,
    pub reachable_objects: usize,
    pub unreachable_objects: usize,
}

/// Read-only analysis over a store and its roots.
pub struct StorageAnalyzer<'a> {
    objects: &'a ObjectStore,
    abort: AbortSignal,
}

impl<'a> StorageAnalyzer<'a> {
    pub fn new(objects: &'a ObjectStore) -> Self {
        Self {
            objects,
            abort: AbortSignal::new(),
        }
    }

    /// Share the analyzer's abort signal.
    pub fn abort_signal(&self) -> AbortSignal {
        self.abort.clone()
    }

    /// Count objects and classify them by reachability from `roots` and
    /// by which side (loose or packed) serves them.
    pub fn analyze(
        &self,
        roots: &[ObjectId],
        packs: &PackDeltaStore,
        loose: &dyn RawStore,
    ) -> Result<StorageStats, EngineError> {
        let all = self.objects.list()?;
        let reachable: HashSet<ObjectId> =
            reachable_objects(self.objects, roots, &self.abort)?
                .into_iter()
                .collect();

        let mut stats = StorageStats {
            total_objects: all.len(),
            ..Default::default()
        };
        for id in &all {
            self.abort.check()?;
            if packs.has_object(&id.store_key())? {
                stats.packed_objects += 1;
            }
            if loose.has(&id.store_key())? {
                stats.loose_objects += 1;
            }
            if reachable.contains(id) {
                stats.reachable_objects += 1;
            } else {
                stats.unreachable_objects += 1;
            }
        }
        Ok(stats)
    }
}

/// Garbage collection switches.
#[derive(Debug, Clone, Copy, Default)]
pub struct GcOptions {
    /// Also delete unreachable loose objects.
    pub prune_unreachable: bool,
}

/// Outcome of a collection run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GcReport {
    /// Objects written into the new pack.
    pub packed: usize,
    /// Loose entries deleted because the pack now serves them.
    pub collected_loose: usize,
    /// Unreachable loose entries pruned.
    pub pruned: usize,
}

/// Repack everything reachable from `roots` and delete the loose copies.
///
/// Serialized through the lock manager's `gc.lock` resource; a held lock
/// fails fast rather than queueing. The new pack is published before any
/// loose object is deleted, so readers never observe a gap.
pub fn collect_garbage(
    objects: &ObjectStore,
    packs: &PackDeltaStore,
    loose: &dyn RawStore,
    roots: &[ObjectId],
    options: GcOptions,
    locks: &dyn LockManager,
    abort: &AbortSignal,
) -> Result<GcReport, EngineError> {
    let _guard =
        LockGuard::acquire(locks, GC_LOCK, "collect_garbage").ok_or(EngineError::LockUnavailable {
            resource: GC_LOCK.to_string(),
        })?;

    let reachable = reachable_objects(objects, roots, abort)?;

    let mut report = GcReport::default();
    if !reachable.is_empty() {
        let mut packer = Packer::new(objects);
        packer.set_abort_signal(abort.clone());
        let packing = packer.pack_incremental(packs, &reachable)?;
        report.packed = packing.objects_analyzed;
    }

    // The pack is live; loose copies of reachable objects are redundant.
    for id in &reachable {
        abort.check()?;
        if loose.delete(&id.store_key())? {
            report.collected_loose += 1;
        }
    }

    if options.prune_unreachable {
        let reachable_set: HashSet<ObjectId> = reachable.into_iter().collect();
        let keys: Vec<String> = loose
            .keys()?
            .collect::<Result<Vec<_>, _>>()?;
        for key in keys {
            abort.check()?;
            let Ok(id) = ObjectId::from_hex(&key) else {
                continue;
            };
            if !reachable_set.contains(&id) && loose.delete(&key)? {
                report.pruned += 1;
            }
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bstr::BString;
    use std::sync::Arc;
    use vcs_object::{Commit, FileMode, TreeEntry};
    use vcs_raw::MemoryRawStore;
    use vcs_utils::date::{GitDate, Signature};

    fn odb() -> ObjectStore {
        ObjectStore::new(Arc::new(MemoryRawStore::new()))
    }

    fn sig() -> Signature {
        Signature::new("T", "t@e.c", GitDate::new(1700000000, 0))
    }

    fn commit(tree: ObjectId, parents: Vec<ObjectId>, msg: &str) -> Commit {
        Commit {
            tree,
            parents,
            author: sig(),
            committer: sig(),
            encoding: None,
            gpgsig: None,
            extra_headers: Vec::new(),
            message: BString::from(msg),
        }
    }

    #[test]
    fn reachability_covers_commits_trees_blobs() {
        let odb = odb();
        let abort = AbortSignal::new();

        let blob = odb.blobs().store_bytes(b"file body").unwrap();
        let subtree = odb
            .trees()
            .store(vec![TreeEntry::new(FileMode::Regular, "inner.txt", blob)])
            .unwrap();
        let root_tree = odb
            .trees()
            .store(vec![TreeEntry::new(FileMode::Tree, "dir", subtree)])
            .unwrap();
        let c1 = odb.commits().store(&commit(root_tree, vec![], "c1\n")).unwrap();
        let c2 = odb.commits().store(&commit(root_tree, vec![c1], "c2\n")).unwrap();

        // An unreachable stray.
        let stray = odb.blobs().store_bytes(b"stray").unwrap();

        let reached = reachable_objects(&odb, &[c2], &abort).unwrap();
        let set: HashSet<ObjectId> = reached.iter().copied().collect();
        for id in [c1, c2, root_tree, subtree, blob] {
            assert!(set.contains(&id));
        }
        assert!(!set.contains(&stray));
        assert_eq!(reached.len(), 5);
    }

    #[test]
    fn reachability_follows_tags() {
        let odb = odb();
        let abort = AbortSignal::new();

        let blob = odb.blobs().store_bytes(b"tagged content").unwrap();
        let tag = odb
            .tags()
            .store(&vcs_object::Tag {
                target: blob,
                target_type: ObjectType::Blob,
                name: BString::from("v1"),
                tagger: Some(sig()),
                message: BString::from("msg\n"),
            })
            .unwrap();

        let reached = reachable_objects(&odb, &[tag], &abort).unwrap();
        assert!(reached.contains(&tag));
        assert!(reached.contains(&blob));
    }

    #[test]
    fn abort_stops_reachability() {
        let odb = odb();
        let blob = odb.blobs().store_bytes(b"x").unwrap();
        let abort = AbortSignal::new();
        abort.raise();
        assert!(matches!(
            reachable_objects(&odb, &[blob], &abort),
            Err(EngineError::Aborted(_))
        ));
    }
}
