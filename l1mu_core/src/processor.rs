//! Full per-event processing.
//!
//! Every computation (aggregation, occupancy summaries, readout summary,
//! cross-collection matching, single-candidate comparison, emulator vs.
//! unpacker comparison) fetches its own inputs. A missing input aborts that
//! computation only; the others still run and their results are kept.

use crate::aggregator::{EventAggregator, MergedRecordSet};
use crate::candidates::{GlobalCandidate, Subsystem, TfLink};
use crate::comparison::EmulatorComparison;
use crate::config::AnalyzerConfig;
use crate::error::AnalysisError;
use crate::matching::{ComparisonOutcome, CrossCollectionMatcher, SingleCandidateComparator};
use crate::metrics::{MergedSummary, ReadoutSummary, RegionSummary};
use crate::scales::{GlobalPhiCalculator, MicroGmtPhi};
use l1mu_env::{EventId, EventSource, GmtReadoutCollection, InputTag};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

/// Label of the merged vs. reference comparison.
pub const SINGLE_COMPARISON_LABEL: &str = "ugmt";

/// A computation that did not run to completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbortedComputation {
    pub computation: String,
    pub reason: String,
}

/// Everything produced for one event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventOutput {
    pub id: EventId,

    /// Merged record set with back-links
    pub merged: Option<MergedRecordSet>,

    pub regional_summaries: Vec<RegionSummary>,
    pub merged_summaries: Vec<MergedSummary>,
    pub readout: Option<ReadoutSummary>,

    /// Cross-collection outcomes per subsystem, then the single-candidate one
    pub comparisons: Vec<ComparisonOutcome>,

    pub emulator_comparison: Option<EmulatorComparison>,

    pub aborted: Vec<AbortedComputation>,
}

impl EventOutput {
    /// Outcome of one labelled comparison.
    pub fn comparison(&self, label: &str) -> Option<&ComparisonOutcome> {
        self.comparisons.iter().find(|c| c.label == label)
    }

    pub fn match_records(&self) -> usize {
        self.comparisons.iter().map(|c| c.records.len()).sum()
    }

    pub fn is_aborted(&self, computation: &str) -> bool {
        self.aborted.iter().any(|a| a.computation == computation)
    }
}

/// Runs every configured computation on one event at a time.
///
/// Aggregation, occupancy and matching share one phi calculator.
pub struct EventProcessor<P = MicroGmtPhi> {
    config: AnalyzerConfig,
    aggregator: EventAggregator<P>,
    phi_calc: P,
}

impl EventProcessor<MicroGmtPhi> {
    pub fn new(config: AnalyzerConfig) -> Self {
        Self::with_phi_calculator(config, MicroGmtPhi)
    }
}

impl<P: GlobalPhiCalculator + Clone> EventProcessor<P> {
    pub fn with_phi_calculator(config: AnalyzerConfig, phi_calc: P) -> Self {
        let aggregator = EventAggregator::with_phi_calculator(&config, phi_calc.clone());
        Self {
            config,
            aggregator,
            phi_calc,
        }
    }

    /// Replaces the aggregator, e.g. to install a custom link resolver.
    pub fn with_aggregator(mut self, aggregator: EventAggregator<P>) -> Self {
        self.aggregator = aggregator;
        self
    }
}

impl<P: GlobalPhiCalculator> EventProcessor<P> {
    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    pub fn aggregator(&self) -> &EventAggregator<P> {
        &self.aggregator
    }

    pub fn phi_calculator(&self) -> &P {
        &self.phi_calc
    }

    pub fn process(&self, source: &dyn EventSource) -> EventOutput {
        let mut out = EventOutput {
            id: source.id(),
            ..Default::default()
        };
        let tags = &self.config.tags;

        // Merged record set
        if !tags.ugmt.is_none() {
            match self.aggregator.aggregate(source) {
                Ok(set) => out.merged = Some(set),
                Err(e) => abort(&mut out, "aggregation", &e),
            }
        }

        // Occupancy
        for (subsystem, tag) in tags.enabled_regional() {
            match source.regional_muons(tag) {
                Ok(coll) => out.regional_summaries.push(RegionSummary::from_collection(
                    subsystem,
                    coll,
                    &self.phi_calc,
                    self.config.comma_suppression,
                    self.config.debug,
                )),
                Err(e) => abort(&mut out, &format!("{}_summary", subsystem), &e.into()),
            }
        }
        for (label, tag) in [("emulator", &tags.ugmt), ("unpacker", &tags.ugmt_unpacker)] {
            if tag.is_none() {
                continue;
            }
            match source.muons(tag) {
                Ok(coll) => out
                    .merged_summaries
                    .push(MergedSummary::from_collection(label, coll, self.config.debug)),
                Err(e) => abort(&mut out, &format!("{}_summary", label), &e.into()),
            }
        }

        // Legacy readout and the comparisons against it
        if !tags.gmt.is_none() {
            match source.gmt_readout(&tags.gmt) {
                Ok(reference) => {
                    out.readout = Some(ReadoutSummary::from_collection(reference));
                    self.compare_to_reference(source, reference, &mut out);
                }
                Err(e) => abort(&mut out, "gmt_readout", &e.into()),
            }
        }

        // Emulator vs. unpacker
        if !tags.ugmt.is_none() && !tags.ugmt_unpacker.is_none() {
            let pair = source
                .muons(&tags.ugmt)
                .and_then(|emu| Ok((emu, source.muons(&tags.ugmt_unpacker)?)));
            match pair {
                Ok((emu, unp)) => {
                    out.emulator_comparison = Some(EmulatorComparison::compare(emu, unp))
                }
                Err(e) => abort(&mut out, "emulator_comparison", &e.into()),
            }
        }

        debug!(
            "Event {}: {} comparisons, {} match records, {} aborted",
            out.id,
            out.comparisons.len(),
            out.match_records(),
            out.aborted.len()
        );
        out
    }

    fn compare_to_reference(
        &self,
        source: &dyn EventSource,
        reference: &GmtReadoutCollection,
        out: &mut EventOutput,
    ) {
        let tags = &self.config.tags;
        let matcher = CrossCollectionMatcher::new(&self.config.scales, &self.phi_calc);

        for (subsystem, tag) in tags.enabled_regional() {
            match source.regional_muons(tag) {
                Ok(coll) => out.comparisons.push(matcher.compare(
                    subsystem,
                    reference,
                    coll,
                    self.config.bx_shift.table(subsystem),
                )),
                Err(e) => abort(out, &format!("{}_matching", subsystem), &e.into()),
            }
        }

        if !tags.ugmt.is_none() {
            match self.central_candidates(source, &tags.ugmt) {
                Ok(central) => out.comparisons.push(SingleCandidateComparator.compare(
                    SINGLE_COMPARISON_LABEL,
                    reference,
                    &central,
                )),
                Err(e) => abort(out, "single_comparison", &e),
            }
        }
    }

    /// BX-0 merged candidates without back-links.
    fn central_candidates(
        &self,
        source: &dyn EventSource,
        tag: &InputTag,
    ) -> Result<Vec<GlobalCandidate>, AnalysisError> {
        let muons = source.muons(tag)?;
        Ok(muons
            .bx(0)
            .iter()
            .map(|mu| GlobalCandidate::from_muon(mu, 0, &self.config.scales, TfLink::unresolved()))
            .collect())
    }

    /// Regional subsystems switched on in the configuration.
    pub fn enabled_subsystems(&self) -> Vec<Subsystem> {
        self.config.tags.enabled_regional().map(|(s, _)| s).collect()
    }
}

fn abort(out: &mut EventOutput, computation: &str, e: &AnalysisError) {
    if e.is_missing_input() {
        error!(target: "MissingProduct", "{}: {} ({})", out.id, computation, e);
    } else {
        error!("{}: {} aborted: {}", out.id, computation, e);
    }
    out.aborted.push(AbortedComputation {
        computation: computation.to_string(),
        reason: e.to_string(),
    });
}
