//! The packing orchestrator.
//!
//! A sliding-window pass over the objects to pack, modeled on pack-objects:
//! sort by size descending, then try to deltify each object against the
//! window of recently processed objects, keeping the smallest delta the
//! policy accepts. Results are committed as one atomic batch.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use vcs_delta::store::{DeltaStore, DeltaUpdate};
use vcs_delta::tree_delta::compute_tree_delta;
use vcs_delta::{compute::compute_delta, Delta};
use vcs_hash::ObjectId;
use vcs_object::{ObjectType, Tree};
use vcs_odb::ObjectStore;
use vcs_utils::abort::AbortSignal;

use crate::analyzer::reachable_objects;
use crate::candidates::{CandidateFinder, ObjectMeta, SimilarSizeFinder};
use crate::policy::{DeltaPolicy, Verdict};
use crate::EngineError;

/// Orchestration phases, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackPhase {
    Analyzing,
    Selecting,
    Deltifying,
    Optimizing,
    Consolidating,
    Complete,
}

/// A progress event.
#[derive(Debug, Clone, Copy)]
pub struct PackProgress {
    pub phase: PackPhase,
    pub processed: usize,
    pub total: usize,
}

/// Orchestrator tuning.
#[derive(Debug, Clone, Copy)]
pub struct PackerOptions {
    /// How many recently processed objects to try as bases.
    pub window_size: usize,
    /// How many finder-proposed bases outside the window to try per
    /// object (0 disables candidate search).
    pub candidate_limit: usize,
    /// Delta acceptance thresholds.
    pub policy: DeltaPolicy,
    /// Deltify trees structurally (per-entry edits) instead of binary.
    /// Only valid against stores that accept structural deltas; the pack
    /// backend does not.
    pub structural_tree_deltas: bool,
}

impl Default for PackerOptions {
    fn default() -> Self {
        Self {
            window_size: 10,
            candidate_limit: 4,
            policy: DeltaPolicy::default(),
            structural_tree_deltas: false,
        }
    }
}

/// Outcome of a packing run.
#[derive(Debug, Clone, Default)]
pub struct PackingReport {
    pub objects_analyzed: usize,
    pub objects_deltified: usize,
    pub bytes_saved: u64,
    /// Mean encoded-delta to original-size ratio over accepted deltas.
    pub average_compression_ratio: f64,
    /// Final chain depth → object count (depth 0 = stored whole).
    pub chain_depth_distribution: BTreeMap<u32, usize>,
    pub duration: Duration,
}

enum Decision {
    Full {
        id: ObjectId,
        obj_type: ObjectType,
        data: Vec<u8>,
    },
    Deltified {
        id: ObjectId,
        base: ObjectId,
        delta: Delta,
        depth: u32,
        target_size: u64,
        delta_size: u64,
    },
}

struct WindowEntry {
    id: ObjectId,
    obj_type: ObjectType,
    data: Vec<u8>,
    depth: u32,
}

/// Sliding-window delta scheduler. See the module docs.
pub struct Packer<'a> {
    objects: &'a ObjectStore,
    options: PackerOptions,
    abort: AbortSignal,
    progress: Option<Box<dyn FnMut(&PackProgress) + 'a>>,
}

impl<'a> Packer<'a> {
    pub fn new(objects: &'a ObjectStore) -> Self {
        Self::with_options(objects, PackerOptions::default())
    }

    pub fn with_options(objects: &'a ObjectStore, options: PackerOptions) -> Self {
        Self {
            objects,
            options,
            abort: AbortSignal::new(),
            progress: None,
        }
    }

    /// Install a progress callback.
    pub fn on_progress(&mut self, callback: impl FnMut(&PackProgress) + 'a) {
        self.progress = Some(Box::new(callback));
    }

    /// Share the packer's abort signal with a controller.
    pub fn abort_signal(&self) -> AbortSignal {
        self.abort.clone()
    }

    /// Adopt an external abort signal.
    pub fn set_abort_signal(&mut self, abort: AbortSignal) {
        self.abort = abort;
    }

    /// Pack every object in the store.
    pub fn pack_all<D: DeltaStore>(&mut self, store: &D) -> Result<PackingReport, EngineError> {
        let ids = self.objects.list()?;
        self.run(store, ids)
    }

    /// Pack everything reachable from `roots`.
    pub fn pack_from_roots<D: DeltaStore>(
        &mut self,
        store: &D,
        roots: &[ObjectId],
    ) -> Result<PackingReport, EngineError> {
        let ids = reachable_objects(self.objects, roots, &self.abort)?;
        self.run(store, ids)
    }

    /// Pack exactly the given objects (incremental update).
    pub fn pack_incremental<D: DeltaStore>(
        &mut self,
        store: &D,
        ids: &[ObjectId],
    ) -> Result<PackingReport, EngineError> {
        self.run(store, ids.to_vec())
    }

    fn report(&mut self, phase: PackPhase, processed: usize, total: usize) {
        if let Some(callback) = &mut self.progress {
            callback(&PackProgress {
                phase,
                processed,
                total,
            });
        }
    }

    fn run<D: DeltaStore>(
        &mut self,
        store: &D,
        ids: Vec<ObjectId>,
    ) -> Result<PackingReport, EngineError> {
        let started = Instant::now();
        let total = ids.len();

        // Analyze: gather type and size for every object.
        self.report(PackPhase::Analyzing, 0, total);
        let mut metas = Vec::with_capacity(total);
        for (i, id) in ids.iter().enumerate() {
            self.abort.check()?;
            let header = self.objects.header(id)?;
            metas.push(ObjectMeta {
                id: *id,
                obj_type: header.obj_type,
                size: header.size,
                path: None,
            });
            self.report(PackPhase::Analyzing, i + 1, total);
        }

        // Select: larger objects first; they make the better bases.
        self.abort.check()?;
        self.report(PackPhase::Selecting, 0, total);
        metas.sort_by(|a, b| b.size.cmp(&a.size).then(a.id.cmp(&b.id)));
        self.report(PackPhase::Selecting, total, total);

        // Deltify through the window, with the similar-size finder
        // proposing bases the window has already dropped.
        let finder = SimilarSizeFinder::new(metas.clone());
        let mut processed: std::collections::HashMap<ObjectId, u32> =
            std::collections::HashMap::with_capacity(total);
        let mut window: std::collections::VecDeque<WindowEntry> =
            std::collections::VecDeque::with_capacity(self.options.window_size + 1);
        let mut decisions = Vec::with_capacity(total);

        for (i, meta) in metas.iter().enumerate() {
            self.abort.check()?;
            let data = self.objects.load(&meta.id)?;

            let mut best: Option<(ObjectId, Delta, u64, u32)> = None;
            if self.options.policy.eligible(meta.size) {
                for entry in window.iter().filter(|e| e.obj_type == meta.obj_type) {
                    self.consider(meta, &data, entry.id, &entry.data, entry.depth, &mut best);
                }

                for candidate in finder
                    .candidates(meta)
                    .into_iter()
                    .take(self.options.candidate_limit)
                {
                    if window.iter().any(|e| e.id == candidate.id) {
                        continue; // already tried above
                    }
                    // Only objects placed earlier in this run can serve
                    // as bases; later ones are not in the batch yet.
                    let Some(&base_depth) = processed.get(&candidate.id) else {
                        continue;
                    };
                    let base_data = self.objects.load(&candidate.id)?;
                    self.consider(meta, &data, candidate.id, &base_data, base_depth, &mut best);
                }
            }

            let depth = match &best {
                Some((_, _, _, depth)) => *depth,
                None => 0,
            };
            processed.insert(meta.id, depth);
            window.push_back(WindowEntry {
                id: meta.id,
                obj_type: meta.obj_type,
                data: data.clone(),
                depth,
            });
            if window.len() > self.options.window_size {
                window.pop_front();
            }

            decisions.push(match best {
                Some((base, delta, delta_size, depth)) => Decision::Deltified {
                    id: meta.id,
                    base,
                    delta,
                    depth,
                    target_size: meta.size,
                    delta_size,
                },
                None => Decision::Full {
                    id: meta.id,
                    obj_type: meta.obj_type,
                    data,
                },
            });
            self.report(PackPhase::Deltifying, i + 1, total);
        }

        // Optimize: fold the decisions into the run statistics.
        self.abort.check()?;
        self.report(PackPhase::Optimizing, 0, total);
        let mut report = PackingReport {
            objects_analyzed: total,
            ..Default::default()
        };
        let mut ratio_sum = 0.0;
        for decision in &decisions {
            match decision {
                Decision::Full { .. } => {
                    *report.chain_depth_distribution.entry(0).or_default() += 1;
                }
                Decision::Deltified {
                    depth,
                    target_size,
                    delta_size,
                    ..
                } => {
                    report.objects_deltified += 1;
                    report.bytes_saved += target_size.saturating_sub(*delta_size);
                    ratio_sum += *delta_size as f64 / (*target_size).max(1) as f64;
                    *report.chain_depth_distribution.entry(*depth).or_default() += 1;
                }
            }
        }
        if report.objects_deltified > 0 {
            report.average_compression_ratio = ratio_sum / report.objects_deltified as f64;
        }
        self.report(PackPhase::Optimizing, total, total);

        // Consolidate: one atomic batch. An abort mid-batch drops the
        // update handle, discarding everything staged.
        self.report(PackPhase::Consolidating, 0, total);
        let mut update = store.start_update()?;
        for (i, decision) in decisions.into_iter().enumerate() {
            if self.abort.is_raised() {
                drop(update);
                return Err(EngineError::Aborted(vcs_utils::abort::Aborted));
            }
            match decision {
                Decision::Full { id, obj_type, data } => {
                    update.store_object(&id.store_key(), obj_type, &data)?;
                }
                Decision::Deltified {
                    id, base, delta, ..
                } => {
                    update.store_delta(&base.store_key(), &id.store_key(), delta)?;
                }
            }
            self.report(PackPhase::Consolidating, i + 1, total);
        }
        update.close()?;

        report.duration = started.elapsed();
        self.report(PackPhase::Complete, total, total);
        Ok(report)
    }

    /// Try one base for `meta`, keeping the smallest accepted delta.
    fn consider(
        &self,
        meta: &ObjectMeta,
        target: &[u8],
        base_id: ObjectId,
        base_data: &[u8],
        base_depth: u32,
        best: &mut Option<(ObjectId, Delta, u64, u32)>,
    ) {
        if base_depth + 1 > self.options.policy.max_chain_depth {
            return;
        }
        let Some(delta) = self.try_delta(meta.obj_type, base_data, target) else {
            return;
        };
        let delta_size = delta.encoded_size();
        if self.options.policy.evaluate(meta.size, delta_size, base_depth) == Verdict::Accept {
            let better = best
                .as_ref()
                .map(|(_, _, size, _)| delta_size < *size)
                .unwrap_or(true);
            if better {
                *best = Some((base_id, delta, delta_size, base_depth + 1));
            }
        }
    }

    /// Compute a delta in the representation configured for this type.
    fn try_delta(&self, obj_type: ObjectType, base: &[u8], target: &[u8]) -> Option<Delta> {
        if self.options.structural_tree_deltas && obj_type == ObjectType::Tree {
            let base_tree = Tree::parse(base).ok()?;
            let target_tree = Tree::parse(target).ok()?;
            return Some(Delta::Tree(compute_tree_delta(
                &base_tree.entries,
                &target_tree.entries,
            )));
        }
        Some(Delta::Binary(compute_delta(base, target)))
    }
}
