use std::collections::{HashMap, HashSet, VecDeque};

use vcs_hash::ObjectId;
use vcs_object::{Commit, ObjectType};

use crate::{ObjectStore, OdbError};

/// Commit access: canonical serialization plus history traversal.
pub struct Commits<'a> {
    objects: &'a ObjectStore,
}

/// Options for an ancestry walk.
#[derive(Debug, Clone, Default)]
pub struct WalkOptions {
    /// Cap on the number of commits yielded.
    pub limit: Option<usize>,
    /// Commits where descent halts; they are not yielded themselves.
    pub stop_at: Vec<ObjectId>,
    /// Follow only each commit's first parent.
    pub first_parent_only: bool,
}

impl<'a> Commits<'a> {
    pub(crate) fn new(objects: &'a ObjectStore) -> Self {
        Self { objects }
    }

    /// Store a commit in canonical form.
    pub fn store(&self, commit: &Commit) -> Result<ObjectId, OdbError> {
        self.objects
            .store_bytes(ObjectType::Commit, &commit.serialize_content())
    }

    /// Load and parse a commit.
    pub fn load(&self, id: &ObjectId) -> Result<Commit, OdbError> {
        let content = self.objects.load_typed(id, ObjectType::Commit)?;
        Commit::parse(&content).map_err(|e| OdbError::CorruptObject {
            id: *id,
            reason: e.to_string(),
        })
    }

    pub fn has(&self, id: &ObjectId) -> Result<bool, OdbError> {
        self.objects.has(id)
    }

    /// Walk the ancestry of `root`: depth-first, parent-first, each commit
    /// yielded once, the root first.
    pub fn walk_ancestry(&self, root: ObjectId, options: WalkOptions) -> AncestryWalk<'a, '_> {
        let stop: HashSet<ObjectId> = options.stop_at.iter().copied().collect();
        let mut stack = Vec::new();
        if !stop.contains(&root) {
            stack.push(root);
        }
        AncestryWalk {
            commits: self,
            stack,
            visited: HashSet::new(),
            stop,
            limit: options.limit,
            yielded: 0,
            first_parent_only: options.first_parent_only,
        }
    }

    /// All merge bases of `a` and `b`: the common ancestors that are not
    /// themselves ancestors of another common ancestor. Criss-cross
    /// histories can yield more than one.
    pub fn find_merge_base(
        &self,
        a: &ObjectId,
        b: &ObjectId,
    ) -> Result<Vec<ObjectId>, OdbError> {
        if a == b {
            return Ok(vec![*a]);
        }

        const FLAG_A: u8 = 1;
        const FLAG_B: u8 = 2;
        const BOTH: u8 = FLAG_A | FLAG_B;

        let mut flags: HashMap<ObjectId, u8> = HashMap::new();
        let mut parents: HashMap<ObjectId, Vec<ObjectId>> = HashMap::new();
        self.paint(*a, FLAG_A, &mut flags, &mut parents)?;
        self.paint(*b, FLAG_B, &mut flags, &mut parents)?;

        // Common ancestors are closed under parenthood, so the bases are
        // exactly the common commits no common commit points at.
        let mut covered: HashSet<ObjectId> = HashSet::new();
        for (id, flag) in flags.iter() {
            if *flag == BOTH {
                for parent in &parents[id] {
                    covered.insert(*parent);
                }
            }
        }

        let mut bases: Vec<ObjectId> = flags
            .iter()
            .filter(|(id, flag)| **flag == BOTH && !covered.contains(*id))
            .map(|(id, _)| *id)
            .collect();
        bases.sort();
        Ok(bases)
    }

    /// Whether `ancestor` is reachable from `descendant` (inclusive).
    pub fn is_ancestor(
        &self,
        ancestor: &ObjectId,
        descendant: &ObjectId,
    ) -> Result<bool, OdbError> {
        if ancestor == descendant {
            return Ok(true);
        }
        for id in self.walk_ancestry(*descendant, WalkOptions::default()) {
            if id? == *ancestor {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Breadth-first flag propagation over the ancestry of `start`,
    /// memoizing parent lists for the minima scan.
    fn paint(
        &self,
        start: ObjectId,
        flag: u8,
        flags: &mut HashMap<ObjectId, u8>,
        parents: &mut HashMap<ObjectId, Vec<ObjectId>>,
    ) -> Result<(), OdbError> {
        let mut queue = VecDeque::from([start]);
        while let Some(id) = queue.pop_front() {
            let entry = flags.entry(id).or_insert(0);
            if *entry & flag != 0 {
                continue;
            }
            *entry |= flag;

            if !parents.contains_key(&id) {
                let commit = self.load(&id)?;
                parents.insert(id, commit.parents);
            }
            for parent in &parents[&id] {
                queue.push_back(*parent);
            }
        }
        Ok(())
    }
}

/// Iterator over a commit's ancestry. See [`Commits::walk_ancestry`].
pub struct AncestryWalk<'a, 'b> {
    commits: &'b Commits<'a>,
    stack: Vec<ObjectId>,
    visited: HashSet<ObjectId>,
    stop: HashSet<ObjectId>,
    limit: Option<usize>,
    yielded: usize,
    first_parent_only: bool,
}

impl Iterator for AncestryWalk<'_, '_> {
    type Item = Result<ObjectId, OdbError>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(limit) = self.limit {
            if self.yielded >= limit {
                return None;
            }
        }

        loop {
            let id = self.stack.pop()?;
            if !self.visited.insert(id) {
                continue;
            }

            let commit = match self.commits.load(&id) {
                Ok(commit) => commit,
                Err(e) => return Some(Err(e)),
            };

            let parents: &[ObjectId] = if self.first_parent_only {
                commit.parents.first().map(std::slice::from_ref).unwrap_or(&[])
            } else {
                &commit.parents
            };

            // Reverse push order so the first parent is explored first.
            for parent in parents.iter().rev() {
                if !self.visited.contains(parent) && !self.stop.contains(parent) {
                    self.stack.push(*parent);
                }
            }

            self.yielded += 1;
            return Some(Ok(id));
        }
    }
}
