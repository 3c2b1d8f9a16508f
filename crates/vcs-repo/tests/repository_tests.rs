//! End-to-end repository flows.

use bstr::{BStr, BString};
use vcs_engine::GcOptions;
use vcs_hash::ObjectId;
use vcs_object::{Commit, FileMode, TreeEntry};
use vcs_ref::{RefName, RefStore};
use vcs_repo::{Repository, RepositoryOptions};
use vcs_staging::tree_io;
use vcs_utils::date::{GitDate, Signature};

fn sig(ts: i64) -> Signature {
    Signature::new("Dev", "dev@example.com", GitDate::new(ts, 0))
}

fn commit_files(
    repo: &Repository,
    parents: Vec<ObjectId>,
    files: &[(&str, &[u8])],
    message: &str,
) -> ObjectId {
    let mut staging = repo.staging().unwrap();
    {
        let mut builder = staging.builder();
        for (path, content) in files {
            let blob = repo.blobs().store_bytes(content).unwrap();
            builder
                .add(vcs_staging::StagingEntry::new(
                    BString::from(*path),
                    blob,
                    FileMode::Regular,
                    vcs_staging::Stage::Merged,
                ))
                .unwrap();
        }
        builder.finish().unwrap();
    }

    let tree = tree_io::write_tree(&staging, &repo.trees()).unwrap();
    let commit = repo
        .commits()
        .store(&Commit {
            tree,
            parents,
            author: sig(1700000000),
            committer: sig(1700000000),
            encoding: None,
            gpgsig: None,
            extra_headers: Vec::new(),
            message: BString::from(message),
        })
        .unwrap();

    let main = RefName::new("refs/heads/main").unwrap();
    repo.refs().set(&main, commit).unwrap();
    commit
}

#[test]
fn init_commit_and_read_back() {
    let dir = tempfile::tempdir().unwrap();
    let repo = Repository::init(dir.path(), &RepositoryOptions::default()).unwrap();

    let c1 = commit_files(
        &repo,
        vec![],
        &[("README.md", b"# Project\n"), ("src/lib.rs", b"fn lib() {}\n")],
        "initial\n",
    );

    assert_eq!(repo.head().unwrap(), Some(c1));

    let commit = repo.commits().load(&c1).unwrap();
    let readme = repo
        .trees()
        .entry(&commit.tree, BStr::new("README.md"))
        .unwrap()
        .unwrap();
    assert_eq!(repo.blobs().load(&readme.id).unwrap(), b"# Project\n");

    let src = repo
        .trees()
        .entry(&commit.tree, BStr::new("src"))
        .unwrap()
        .unwrap();
    assert_eq!(src.mode, FileMode::Tree);
}

#[test]
fn reopen_preserves_everything() {
    let dir = tempfile::tempdir().unwrap();
    let c2;
    {
        let repo = Repository::init(dir.path(), &RepositoryOptions::default()).unwrap();
        let c1 = commit_files(&repo, vec![], &[("a.txt", b"one")], "c1\n");
        c2 = commit_files(&repo, vec![c1], &[("a.txt", b"two")], "c2\n");
    }

    let repo = Repository::open(dir.path()).unwrap();
    assert_eq!(repo.head().unwrap(), Some(c2));
    let history: Vec<ObjectId> = repo
        .commits()
        .walk_ancestry(c2, Default::default())
        .map(|r| r.unwrap())
        .collect();
    assert_eq!(history.len(), 2);
}

#[test]
fn create_option_initializes_on_open() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("fresh");

    assert!(Repository::open(&missing).is_err());

    let repo = Repository::open_with(
        &missing,
        &RepositoryOptions {
            create: true,
            ..Default::default()
        },
    )
    .unwrap();
    assert!(!repo.layout().bare);
    assert!(missing.join(".git/objects").is_dir());
}

#[test]
fn bare_repository_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let repo = Repository::init(
        dir.path(),
        &RepositoryOptions {
            bare: true,
            ..Default::default()
        },
    )
    .unwrap();
    assert!(repo.layout().bare);
    assert!(repo.layout().work_dir.is_none());

    let c1 = commit_files(&repo, vec![], &[("f.txt", b"bare")], "c1\n");
    drop(repo);

    let reopened = Repository::open(dir.path()).unwrap();
    assert!(reopened.layout().bare);
    assert_eq!(reopened.head().unwrap(), Some(c1));
}

#[test]
fn staging_persists_between_loads() {
    let dir = tempfile::tempdir().unwrap();
    let repo = Repository::init(dir.path(), &RepositoryOptions::default()).unwrap();

    let blob = repo.blobs().store_bytes(b"staged").unwrap();
    let mut staging = repo.staging().unwrap();
    let mut editor = staging.editor();
    editor
        .add(vcs_staging::StagingEntry::new(
            BString::from("staged.txt"),
            blob,
            FileMode::Regular,
            vcs_staging::Stage::Merged,
        ))
        .unwrap();
    editor.finish().unwrap();
    repo.save_staging(&mut staging).unwrap();

    let reloaded = repo.staging().unwrap();
    assert_eq!(reloaded.len(), 1);
    assert!(!reloaded.is_outdated(&repo.staging_path()).unwrap());
}

#[test]
fn gc_moves_history_into_a_pack() {
    let dir = tempfile::tempdir().unwrap();
    let repo = Repository::init(dir.path(), &RepositoryOptions::default()).unwrap();

    let c1 = commit_files(&repo, vec![], &[("f.txt", b"first revision, with some padding to make deltas worthwhile")], "c1\n");
    let c2 = commit_files(&repo, vec![c1], &[("f.txt", b"second revision, with some padding to make deltas worthwhile")], "c2\n");

    let report = repo.gc(GcOptions::default()).unwrap();
    assert!(report.packed >= 6); // 2 commits, 2 trees, 2 blobs
    assert_eq!(repo.packs().pack_count(), 1);

    // History still fully readable after the loose copies vanished.
    assert_eq!(repo.head().unwrap(), Some(c2));
    let walked: Vec<ObjectId> = repo
        .commits()
        .walk_ancestry(c2, Default::default())
        .map(|r| r.unwrap())
        .collect();
    assert_eq!(walked, vec![c2, c1]);

    let commit = repo.commits().load(&c1).unwrap();
    let entry = repo
        .trees()
        .entry(&commit.tree, BStr::new("f.txt"))
        .unwrap()
        .unwrap();
    assert!(repo
        .blobs()
        .load(&entry.id)
        .unwrap()
        .starts_with(b"first revision"));
}

#[test]
fn tag_and_peel_through_repository() {
    let dir = tempfile::tempdir().unwrap();
    let repo = Repository::init(dir.path(), &RepositoryOptions::default()).unwrap();
    let c1 = commit_files(&repo, vec![], &[("f.txt", b"x")], "c1\n");

    let tag_id = repo
        .tags()
        .store(&vcs_object::Tag {
            target: c1,
            target_type: vcs_object::ObjectType::Commit,
            name: BString::from("v1.0"),
            tagger: Some(sig(1700000500)),
            message: BString::from("release\n"),
        })
        .unwrap();
    let tag_ref = RefName::new("refs/tags/v1.0").unwrap();
    repo.refs().set(&tag_ref, tag_id).unwrap();

    let (peeled, kind) = repo.tags().target(&tag_id, true).unwrap();
    assert_eq!(peeled, c1);
    assert_eq!(kind, vcs_object::ObjectType::Commit);
}

#[test]
fn close_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let mut repo = Repository::init(dir.path(), &RepositoryOptions::default()).unwrap();
    assert!(!repo.is_closed());
    repo.close();
    assert!(repo.is_closed());
    repo.close(); // no-op
    assert!(repo.is_closed());
    assert!(matches!(
        repo.gc(GcOptions::default()),
        Err(vcs_repo::RepoError::Closed)
    ));
}
