//! Repository composition.
//!
//! A [`Repository`] wires the storage stack together: a filesystem raw
//! store behind zlib compression for loose objects, a pack store, the
//! combined read path, the typed object store with its domain views, the
//! files-backed ref store, and the staging area. Backing resources open at
//! construction and release at [`close`](Repository::close).

mod init;

pub use init::{discover_layout, init_layout};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use vcs_engine::{collect_garbage, GcOptions, GcReport};
use vcs_hash::ObjectId;
use vcs_odb::{Blobs, CombinedRawStore, Commits, ObjectStore, Tags, Trees};
use vcs_pack::store::PackDeltaStore;
use vcs_raw::volatile::HybridVolatileStore;
use vcs_raw::{CompressedRawStore, FsRawStore, RawStore};
use vcs_ref::{FilesRefStore, RefName, RefStore};
use vcs_staging::Staging;
use vcs_utils::abort::AbortSignal;
use vcs_utils::lock::InProcessLockManager;

/// Errors produced at the repository level.
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error("not a repository: {0}")]
    NotARepository(PathBuf),

    #[error("repository is closed")]
    Closed,

    #[error(transparent)]
    Odb(#[from] vcs_odb::OdbError),

    #[error(transparent)]
    Ref(#[from] vcs_ref::RefError),

    #[error(transparent)]
    Staging(#[from] vcs_staging::StagingError),

    #[error(transparent)]
    Engine(#[from] vcs_engine::EngineError),

    #[error(transparent)]
    Pack(#[from] vcs_pack::PackError),

    #[error(transparent)]
    Raw(#[from] vcs_raw::RawError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Construction options. The explicit counterpart of the original's
/// factory-closure arguments.
#[derive(Debug, Clone)]
pub struct RepositoryOptions {
    /// Create the repository if it does not exist.
    pub create: bool,
    /// Lay out a bare repository (no work tree, storage at the root).
    pub bare: bool,
    /// Branch HEAD points at after initialization.
    pub default_branch: String,
}

impl Default for RepositoryOptions {
    fn default() -> Self {
        Self {
            create: false,
            bare: false,
            default_branch: "main".into(),
        }
    }
}

/// Where the repository lives on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoLayout {
    /// Directory holding objects, refs, HEAD (the root for bare
    /// repositories, `.git/` otherwise).
    pub git_dir: PathBuf,
    /// The work tree, absent for bare repositories.
    pub work_dir: Option<PathBuf>,
    pub bare: bool,
}

/// An open repository.
pub struct Repository {
    layout: RepoLayout,
    objects: ObjectStore,
    packs: PackDeltaStore,
    loose: Arc<dyn RawStore>,
    refs: FilesRefStore,
    locks: InProcessLockManager,
    closed: bool,
}

impl Repository {
    /// Open an existing repository, or create one when `options.create`
    /// is set.
    pub fn open_with(path: impl AsRef<Path>, options: &RepositoryOptions) -> Result<Self, RepoError> {
        let layout = if options.create {
            init_layout(path.as_ref(), options)?
        } else {
            discover_layout(path.as_ref())?
        };
        Self::assemble(layout)
    }

    /// Open an existing repository.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RepoError> {
        Self::open_with(path, &RepositoryOptions::default())
    }

    /// Initialize (or re-open) a repository with the given options.
    pub fn init(path: impl AsRef<Path>, options: &RepositoryOptions) -> Result<Self, RepoError> {
        let layout = init_layout(path.as_ref(), options)?;
        Self::assemble(layout)
    }

    fn assemble(layout: RepoLayout) -> Result<Self, RepoError> {
        let objects_dir = layout.git_dir.join("objects");
        let loose: Arc<dyn RawStore> = Arc::new(CompressedRawStore::new(FsRawStore::open(
            &objects_dir,
        )));
        let packs = PackDeltaStore::open(objects_dir.join("pack"))?;
        let combined = CombinedRawStore::new(packs.clone(), Arc::clone(&loose));

        // Spill buffers sit next to the object store so publishing a
        // buffered object stays a same-filesystem rename.
        let volatile = Arc::new(HybridVolatileStore::default());
        let objects = ObjectStore::with_volatile(Arc::new(combined), volatile);

        let refs = FilesRefStore::open(&layout.git_dir);

        Ok(Self {
            layout,
            objects,
            packs,
            loose,
            refs,
            locks: InProcessLockManager::new(),
            closed: false,
        })
    }

    pub fn layout(&self) -> &RepoLayout {
        &self.layout
    }

    /// The typed object store.
    pub fn objects(&self) -> &ObjectStore {
        &self.objects
    }

    pub fn blobs(&self) -> Blobs<'_> {
        self.objects.blobs()
    }

    pub fn trees(&self) -> Trees<'_> {
        self.objects.trees()
    }

    pub fn commits(&self) -> Commits<'_> {
        self.objects.commits()
    }

    pub fn tags(&self) -> Tags<'_> {
        self.objects.tags()
    }

    /// The ref store.
    pub fn refs(&self) -> &FilesRefStore {
        &self.refs
    }

    /// The pack store.
    pub fn packs(&self) -> &PackDeltaStore {
        &self.packs
    }

    /// Resolve HEAD to a commit id (None on an unborn branch).
    pub fn head(&self) -> Result<Option<ObjectId>, RepoError> {
        let head = RefName::new("HEAD")?;
        Ok(self.refs.resolve(&head)?)
    }

    /// Path of the staging index file.
    pub fn staging_path(&self) -> PathBuf {
        self.layout.git_dir.join("index")
    }

    /// Load the staging area (empty if no index file exists yet).
    pub fn staging(&self) -> Result<Staging, RepoError> {
        let path = self.staging_path();
        if path.is_file() {
            Ok(Staging::load(&path)?)
        } else {
            Ok(Staging::new())
        }
    }

    /// Persist the staging area.
    pub fn save_staging(&self, staging: &mut Staging) -> Result<(), RepoError> {
        Ok(staging.save(&self.staging_path())?)
    }

    /// Ids every ref (and HEAD) currently points at, used as the GC roots.
    pub fn ref_roots(&self) -> Result<Vec<ObjectId>, RepoError> {
        let mut roots = Vec::new();
        for reference in self.refs.list()? {
            if let Some(id) = self.refs.resolve(reference.name())? {
                roots.push(id);
            }
        }
        if let Some(head) = self.head()? {
            roots.push(head);
        }
        roots.sort();
        roots.dedup();
        Ok(roots)
    }

    /// Collect garbage: repack everything reachable from the refs, then
    /// delete redundant (and optionally unreachable) loose objects.
    pub fn gc(&self, options: GcOptions) -> Result<GcReport, RepoError> {
        if self.closed {
            return Err(RepoError::Closed);
        }
        let roots = self.ref_roots()?;
        let report = collect_garbage(
            &self.objects,
            &self.packs,
            self.loose.as_ref(),
            &roots,
            options,
            &self.locks,
            &AbortSignal::new(),
        )?;
        Ok(report)
    }

    /// Release backing resources (open pack maps). Maintenance
    /// operations fail afterwards; closing twice is a no-op.
    pub fn close(&mut self) {
        if !self.closed {
            self.packs.close();
            self.closed = true;
        }
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}
