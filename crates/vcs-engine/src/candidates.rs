//! Delta-base candidate search.
//!
//! Finders propose likely bases for a target object; the orchestrator
//! computes actual deltas only for proposed pairs. Strategies are
//! pluggable behind [`CandidateFinder`].

use std::collections::{HashMap, VecDeque};

use bstr::BString;
use vcs_hash::ObjectId;
use vcs_object::ObjectType;

/// What the engine knows about an object before reading its content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMeta {
    pub id: ObjectId,
    pub obj_type: ObjectType,
    pub size: u64,
    /// Worktree path, when tree walking provided one.
    pub path: Option<BString>,
}

/// Why a candidate was proposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateReason {
    SimilarSize,
    SamePath,
    CommitWindow,
}

/// A proposed delta base.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub id: ObjectId,
    pub obj_type: ObjectType,
    pub size: u64,
    /// Rough likeness estimate in `[0, 1]`, for ordering only.
    pub similarity: f64,
    pub reason: CandidateReason,
}

/// A strategy producing ordered base candidates for a target.
pub trait CandidateFinder {
    fn candidates(&self, target: &ObjectMeta) -> Vec<Candidate>;
}

/// Proposes objects of the same type whose size is within a tolerance
/// band of the target's (default ±25%), best size match first.
pub struct SimilarSizeFinder {
    tolerance: f64,
    /// Sorted by size for range scans.
    by_size: Vec<ObjectMeta>,
}

impl SimilarSizeFinder {
    pub const DEFAULT_TOLERANCE: f64 = 0.25;

    pub fn new(mut objects: Vec<ObjectMeta>) -> Self {
        objects.sort_by_key(|m| m.size);
        Self {
            tolerance: Self::DEFAULT_TOLERANCE,
            by_size: objects,
        }
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }
}

impl CandidateFinder for SimilarSizeFinder {
    fn candidates(&self, target: &ObjectMeta) -> Vec<Candidate> {
        let lower = (target.size as f64 * (1.0 - self.tolerance)).floor() as u64;
        let upper = (target.size as f64 * (1.0 + self.tolerance)).ceil() as u64;

        let start = self.by_size.partition_point(|m| m.size < lower);
        let mut found: Vec<Candidate> = self.by_size[start..]
            .iter()
            .take_while(|m| m.size <= upper)
            .filter(|m| m.obj_type == target.obj_type && m.id != target.id)
            .map(|m| Candidate {
                id: m.id,
                obj_type: m.obj_type,
                size: m.size,
                similarity: 1.0
                    - (m.size.abs_diff(target.size)) as f64 / target.size.max(1) as f64,
                reason: CandidateReason::SimilarSize,
            })
            .collect();

        found.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        found
    }
}

/// Proposes earlier versions recorded at the same worktree path.
#[derive(Default)]
pub struct SamePathFinder {
    by_path: HashMap<BString, Vec<ObjectMeta>>,
}

impl SamePathFinder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a version observed at its path.
    pub fn record(&mut self, meta: ObjectMeta) {
        if let Some(path) = meta.path.clone() {
            self.by_path.entry(path).or_default().push(meta);
        }
    }
}

impl CandidateFinder for SamePathFinder {
    fn candidates(&self, target: &ObjectMeta) -> Vec<Candidate> {
        let Some(path) = &target.path else {
            return Vec::new();
        };
        let Some(versions) = self.by_path.get(path) else {
            return Vec::new();
        };
        // Most recently recorded version first.
        versions
            .iter()
            .rev()
            .filter(|m| m.obj_type == target.obj_type && m.id != target.id)
            .map(|m| Candidate {
                id: m.id,
                obj_type: m.obj_type,
                size: m.size,
                similarity: 0.9,
                reason: CandidateReason::SamePath,
            })
            .collect()
    }
}

/// A sliding window of the most recent commits, for incremental packing.
pub struct CommitWindowFinder {
    capacity: usize,
    window: VecDeque<ObjectMeta>,
}

impl CommitWindowFinder {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            window: VecDeque::with_capacity(capacity),
        }
    }

    /// Push a commit into the window, evicting the oldest past capacity.
    pub fn push(&mut self, meta: ObjectMeta) {
        if meta.obj_type != ObjectType::Commit {
            return;
        }
        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(meta);
    }
}

impl CandidateFinder for CommitWindowFinder {
    fn candidates(&self, target: &ObjectMeta) -> Vec<Candidate> {
        if target.obj_type != ObjectType::Commit {
            return Vec::new();
        }
        self.window
            .iter()
            .rev()
            .filter(|m| m.id != target.id)
            .map(|m| Candidate {
                id: m.id,
                obj_type: m.obj_type,
                size: m.size,
                similarity: 0.8,
                reason: CandidateReason::CommitWindow,
            })
            .collect()
    }
}
