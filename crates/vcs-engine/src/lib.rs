//! The delta-compression engine.
//!
//! Decides which objects become deltas and against which bases: candidate
//! finders propose bases, the [`DeltaPolicy`] accepts or rejects computed
//! deltas, and the [`Packer`] orchestrates a sliding window over all
//! objects, emitting the result as one atomic batch into any
//! [`DeltaStore`](vcs_delta::DeltaStore). The [`analyzer`] module adds
//! reachability analysis and garbage collection on top.

pub mod analyzer;
pub mod candidates;
pub mod orchestrator;
pub mod policy;

pub use analyzer::{collect_garbage, GcOptions, GcReport, StorageAnalyzer, StorageStats};
pub use candidates::{Candidate, CandidateFinder, CandidateReason, ObjectMeta};
pub use orchestrator::{PackPhase, PackProgress, Packer, PackerOptions, PackingReport};
pub use policy::{DeltaPolicy, Verdict};

use vcs_utils::abort::Aborted;

/// Errors produced by the engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Aborted(#[from] Aborted),

    #[error("lock unavailable: {resource}")]
    LockUnavailable { resource: String },

    #[error(transparent)]
    Odb(#[from] vcs_odb::OdbError),

    #[error(transparent)]
    Delta(#[from] vcs_delta::DeltaError),

    #[error(transparent)]
    Raw(#[from] vcs_raw::RawError),
}
