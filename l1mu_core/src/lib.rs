//! L1 Muon Core - Per-Event Aggregation and Cross-Collection Matching
//!
//! This library turns the regional and merged muon trigger collections of one
//! event into a single merged record set and correlates them with the legacy
//! readout:
//! 1. **Flattening**: BX-bucketed regional streams become one contiguous
//!    array per subsystem with per-BX offsets ([`FlatArena`])
//! 2. **Back-links**: every merged candidate points at the regional candidate
//!    that produced it, by origin key or by exact attribute match
//!    ([`LinkResolver`])
//! 3. **Matching**: best ΔR / Δη / Δφ correlation against the reference
//!    readout under ambiguity and acceptance guards
//!    ([`CrossCollectionMatcher`])
//!
//! Events are processed one at a time; nothing survives from one event to the
//! next.

pub mod aggregator;
pub mod candidates;
pub mod comparison;
pub mod config;
pub mod error;
pub mod flatten;
pub mod kinematics;
pub mod link;
pub mod matching;
pub mod metrics;
pub mod processor;
pub mod scales;

// Re-export key types for convenience
pub use aggregator::{EventAggregator, MergedRecordSet};
pub use candidates::{GlobalCandidate, RegionalCandidate, Subsystem, TfLink};
pub use comparison::{EmulatorComparison, PackedDiff};
pub use config::{AnalyzerConfig, BxShiftConfig, InputTags};
pub use error::AnalysisError;
pub use flatten::{BxFlattener, FlatArena, SubsystemArray};
pub use kinematics::{delta_phi, delta_r, match_within_dr, normalize_phi, Deltas, Kinematics};
pub use link::{
    AttributeMatchResolver, ChainedResolver, LinkContext, LinkResolver, LinkStrategy, OriginKeyResolver,
};
pub use matching::{
    BxShiftEntry, BxShiftTable, ComparisonOutcome, ComparisonStatus, CrossCollectionMatcher, EtaRegion,
    MatchMetric, MatchRecord, SingleCandidateComparator, SkipReason,
};
pub use metrics::{MergedSummary, ReadoutSummary, RegionSummary, RunSummary};
pub use processor::{AbortedComputation, EventOutput, EventProcessor};
pub use scales::{GlobalPhiCalculator, MicroGmtPhi, ScaleConfig, GLOBAL_PHI_BINS};
