//! Scenario runner - generates events, processes them and checks the outcome.

use crate::invariants;
use crate::oracle::{labels, EventSpec, MergedMode, MuonSpec, Oracle};
use crate::scenarios::ScenarioId;

use l1mu_core::{
    AnalysisError, AnalyzerConfig, BxShiftConfig, BxShiftEntry, BxShiftTable, ComparisonStatus, EventOutput,
    EventProcessor, LinkStrategy, MatchMetric, MicroGmtPhi, RunSummary, SkipReason, Subsystem,
};
use l1mu_env::{Event, InputTag};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// |η| sampling ranges kept clear of the region edges.
const ETA_RANGES: [(f64, f64); 3] = [(0.1, 0.7), (0.9, 1.15), (1.35, 2.3)];

/// Largest ΔR accepted for a true muon's best match.
const MAX_MATCH_DR: f64 = 0.1;

/// Results from running a scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,

    /// Seed used
    pub seed: u64,

    /// Whether scenario passed all assertions
    pub passed: bool,

    /// Events processed
    pub events: usize,

    /// Failure message if any
    pub failure_reason: Option<String>,

    /// Metrics collected during run
    pub metrics: ScenarioMetrics,
}

/// Metrics collected during scenario execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScenarioMetrics {
    /// Merged candidates in all record sets
    pub merged_candidates: usize,

    pub resolved_links: usize,
    pub unresolved_links: usize,

    /// Match records over all comparisons
    pub match_records: usize,

    pub skipped_comparisons: usize,

    pub aborted_computations: usize,

    /// Broken invariants over all events
    pub invariant_violations: usize,
}

impl ScenarioMetrics {
    fn from_summary(summary: &RunSummary) -> Self {
        Self {
            merged_candidates: summary.resolved_links + summary.unresolved_links,
            resolved_links: summary.resolved_links,
            unresolved_links: summary.unresolved_links,
            match_records: summary.total_records(),
            skipped_comparisons: summary.comparisons.values().map(|t| t.skipped).sum(),
            aborted_computations: summary.aborted.values().sum(),
            invariant_violations: 0,
        }
    }
}

/// Everything one scenario run produced.
#[derive(Debug, Clone)]
pub struct ScenarioRun {
    pub result: ScenarioResult,
    pub outputs: Vec<EventOutput>,
    pub summary: RunSummary,
}

/// Runs event scenarios.
pub struct ScenarioRunner {
    /// Configuration seed
    seed: u64,

    /// Events generated per scenario
    num_events: usize,

    /// Base configuration scenarios start from
    base_config: AnalyzerConfig,
}

impl ScenarioRunner {
    /// Creates a new scenario runner.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            num_events: 20,
            base_config: AnalyzerConfig::default(),
        }
    }

    /// Sets the number of events per scenario.
    pub fn with_events(mut self, num_events: usize) -> Self {
        self.num_events = num_events.max(1);
        self
    }

    /// Sets the configuration scenarios start from.
    pub fn with_config(mut self, config: AnalyzerConfig) -> Self {
        self.base_config = config;
        self
    }

    /// Runs a scenario and returns the result.
    pub fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        self.run_detailed(scenario).result
    }

    /// Runs a scenario and keeps every event output.
    pub fn run_detailed(&self, scenario: ScenarioId) -> ScenarioRun {
        info!("Starting scenario: {} (seed={})", scenario.name(), self.seed);

        let (config, events) = self.events_for(scenario);
        let processor = EventProcessor::new(config);

        let mut summary = RunSummary::new();
        let mut outputs = Vec::with_capacity(events.len());
        let mut violations = Vec::new();

        for event in &events {
            let output = processor.process(event);
            for v in invariants::check_all(&processor, event, &output) {
                warn!("Event {}: invariant broken: {}", event.id, v);
                violations.push(v);
            }
            summary.record(&output);
            outputs.push(output);
        }

        let mut metrics = ScenarioMetrics::from_summary(&summary);
        metrics.invariant_violations = violations.len();

        let failure_reason = match violations.first() {
            Some(v) => Some(format!("{} invariant violation(s), first: {}", violations.len(), v)),
            None => self.verify(scenario, &processor, &events, &outputs).err(),
        };

        debug!(
            "{}: {} merged, {} linked, {} records, {} skipped",
            scenario.name(),
            metrics.merged_candidates,
            metrics.resolved_links,
            metrics.match_records,
            metrics.skipped_comparisons
        );

        ScenarioRun {
            result: ScenarioResult {
                scenario,
                seed: self.seed,
                passed: failure_reason.is_none(),
                events: events.len(),
                failure_reason,
                metrics,
            },
            outputs,
            summary,
        }
    }

    /// Configuration and events of one scenario. Same seed, same events.
    pub fn events_for(&self, scenario: ScenarioId) -> (AnalyzerConfig, Vec<Event>) {
        let physics_seed = self.seed.wrapping_mul(0x9e3779b97f4a7c15);
        let mut oracle = Oracle::new(physics_seed).with_scales(self.base_config.scales);
        let mut layout_rng = ChaCha8Rng::seed_from_u64(self.seed);
        let mut config = self.base_config.clone();

        if scenario == ScenarioId::MultiBx {
            config.only_central_bx = false;
        }
        if scenario == ScenarioId::RpcDuplicates {
            config.tags.barrel_rpc = InputTag::new(labels::BARREL_RPC);
        }

        let events = (0..self.num_events)
            .map(|i| {
                let (lo, hi) = ETA_RANGES[i % ETA_RANGES.len()];
                let spec = match scenario {
                    ScenarioId::SingleMuon => EventSpec::new(vec![MuonSpec::new(oracle.sample_muon(lo, hi))]),
                    ScenarioId::Dimuon => EventSpec::new(vec![
                        MuonSpec::new(oracle.sample_muon(lo, hi)),
                        MuonSpec::new(oracle.sample_any()),
                    ]),
                    ScenarioId::MultiBx => {
                        let muons = (0..3)
                            .map(|_| MuonSpec::new(oracle.sample_any()).at_bx(layout_rng.gen_range(-2..=2)))
                            .collect();
                        EventSpec::new(muons)
                    }
                    ScenarioId::PunchThrough => EventSpec::new(vec![
                        MuonSpec::new(oracle.sample_muon(lo, hi)),
                        MuonSpec::new(oracle.sample_muon(lo, hi)).without_reference(),
                    ]),
                    ScenarioId::Unmatched => EventSpec::new(vec![
                        MuonSpec::new(oracle.sample_muon(lo, hi)).merged(MergedMode::Corrupted)
                    ]),
                    ScenarioId::BxShifted => {
                        EventSpec::new(vec![MuonSpec::new(oracle.sample_muon(lo, hi)).at_bx(1)])
                    }
                    ScenarioId::MissingProduct => {
                        let mut spec = EventSpec::new(vec![MuonSpec::new(oracle.sample_muon(lo, hi))]);
                        if i % 2 == 1 {
                            spec.drop.push(InputTag::new(labels::OMTF));
                        }
                        spec
                    }
                    ScenarioId::OverlapGating => {
                        let (lo, hi) = ETA_RANGES[1];
                        EventSpec::new(vec![MuonSpec::new(oracle.sample_muon(lo, hi))])
                    }
                    ScenarioId::AttributeFallback => EventSpec::new(vec![
                        MuonSpec::new(oracle.sample_muon(lo, hi)).merged(MergedMode::Unkeyed)
                    ]),
                    ScenarioId::RpcDuplicates => {
                        let (lo, hi) = ETA_RANGES[0];
                        let muon = MuonSpec::new(oracle.sample_muon(lo, hi))
                            .merged(MergedMode::Unkeyed)
                            .with_rpc_duplicate();
                        let mut spec = EventSpec::new(vec![muon]);
                        spec.with_rpc = true;
                        spec
                    }
                };
                oracle.build_event(&spec, &MicroGmtPhi)
            })
            .collect();

        (config, events)
    }

    /// Scenario-specific assertions on top of the invariants.
    fn verify(
        &self,
        scenario: ScenarioId,
        processor: &EventProcessor,
        events: &[Event],
        outputs: &[EventOutput],
    ) -> Result<(), String> {
        for (event, out) in events.iter().zip(outputs) {
            match scenario {
                ScenarioId::SingleMuon => {
                    let set = merged(out)?;
                    if set.global().len() != 1 || set.resolved_links() != 1 {
                        return Err(format!("{}: single muon not linked", out.id));
                    }
                    let subsystem = set.global()[0]
                        .link
                        .subsystem()
                        .ok_or_else(|| format!("{}: no link subsystem", out.id))?;
                    expect_close_match(out, subsystem.name())?;
                    expect_direct(out)?;
                }
                ScenarioId::Dimuon => {
                    if merged(out)?.resolved_links() != 2 {
                        return Err(format!("{}: dimuon links not resolved", out.id));
                    }
                    if out
                        .comparisons
                        .iter()
                        .any(|c| c.status != ComparisonStatus::Skipped(SkipReason::AmbiguousReference(2)))
                    {
                        return Err(format!("{}: comparison ran against two references", out.id));
                    }
                }
                ScenarioId::MultiBx => {
                    let set = merged(out)?;
                    if set.global().len() != 3 || set.resolved_links() != 3 {
                        return Err(format!(
                            "{}: {} of {} out-of-time muons linked",
                            out.id,
                            set.resolved_links(),
                            set.global().len()
                        ));
                    }
                }
                ScenarioId::PunchThrough => {
                    let set = merged(out)?;
                    let subsystem = set.global()[0]
                        .link
                        .subsystem()
                        .ok_or_else(|| format!("{}: no link subsystem", out.id))?;
                    let outcome = comparison(out, subsystem.name())?;
                    let guarded = matches!(
                        outcome.status,
                        ComparisonStatus::Compared { considered: 0, ambiguous_bxs: 1 }
                    );
                    if !guarded || !outcome.records.is_empty() {
                        return Err(format!("{}: crowded BX was not skipped", out.id));
                    }
                    let single = comparison(out, l1mu_core::processor::SINGLE_COMPARISON_LABEL)?;
                    if single.status != ComparisonStatus::Skipped(SkipReason::CandidateMultiplicity(2)) {
                        return Err(format!("{}: single comparison ran on two candidates", out.id));
                    }
                }
                ScenarioId::Unmatched => {
                    let set = merged(out)?;
                    if set.global().len() != 1 || set.resolved_links() != 0 {
                        return Err(format!("{}: corrupted candidate was linked", out.id));
                    }
                    expect_direct(out)?;
                }
                ScenarioId::BxShifted => {
                    if out.comparisons.iter().any(|c| !c.records.is_empty()) {
                        return Err(format!("{}: late candidate matched under nominal timing", out.id));
                    }
                    let late = late_processor(processor.config())
                        .map_err(|e| format!("late BX table: {}", e))?
                        .process(event);
                    if late.comparisons.iter().all(|c| c.records.is_empty()) {
                        return Err(format!("{}: late candidate missed with shifted timing", out.id));
                    }
                }
                ScenarioId::MissingProduct => {
                    let dropped = event.regional.get(&InputTag::new(labels::OMTF)).is_none();
                    let aborted = out.is_aborted("aggregation")
                        && out.is_aborted("omtf_summary")
                        && out.is_aborted("omtf_matching");
                    if dropped != aborted {
                        return Err(format!("{}: aborts do not follow the missing input", out.id));
                    }
                    if out.is_aborted("bmtf_summary") || out.comparison("bmtf").is_none() {
                        return Err(format!("{}: missing OMTF took BMTF down", out.id));
                    }
                }
                ScenarioId::OverlapGating => {
                    expect_close_match(out, Subsystem::Omtf.name())?;
                    for subsystem in [Subsystem::Bmtf, Subsystem::Emtf] {
                        let outcome = comparison(out, subsystem.name())?;
                        if outcome.status != ComparisonStatus::Skipped(SkipReason::OutsideAcceptance) {
                            return Err(format!("{}: {} compared an overlap muon", out.id, subsystem));
                        }
                    }
                }
                ScenarioId::AttributeFallback => {
                    if merged(out)?.resolved_links() != 1 {
                        return Err(format!("{}: unkeyed candidate not linked by attributes", out.id));
                    }
                    let keyed_only = AnalyzerConfig {
                        link_strategy: LinkStrategy::OriginKey,
                        ..processor.config().clone()
                    };
                    let linked = EventProcessor::new(keyed_only)
                        .process(event)
                        .merged
                        .map(|s| s.resolved_links())
                        .unwrap_or(0);
                    if linked != 0 {
                        return Err(format!("{}: origin-key resolver linked an unkeyed candidate", out.id));
                    }
                }
                ScenarioId::RpcDuplicates => {
                    let set = merged(out)?;
                    if set.count(Subsystem::BarrelRpc) != set.count(Subsystem::Bmtf) {
                        return Err(format!("{}: RPC stream does not mirror BMTF", out.id));
                    }
                    if set
                        .global()
                        .iter()
                        .any(|c| c.link.subsystem() != Some(Subsystem::Bmtf))
                    {
                        return Err(format!("{}: duplicate linked away from BMTF", out.id));
                    }
                }
            }
        }
        Ok(())
    }
}

fn merged(out: &EventOutput) -> Result<&l1mu_core::MergedRecordSet, String> {
    out.merged
        .as_ref()
        .ok_or_else(|| format!("{}: no merged record set", out.id))
}

fn comparison<'a>(out: &'a EventOutput, label: &str) -> Result<&'a l1mu_core::ComparisonOutcome, String> {
    out.comparison(label)
        .ok_or_else(|| format!("{}: no {} comparison", out.id, label))
}

/// The subsystem comparison found the true muon within [`MAX_MATCH_DR`].
fn expect_close_match(out: &EventOutput, label: &str) -> Result<(), String> {
    let outcome = comparison(out, label)?;
    let record = outcome
        .record(MatchMetric::DeltaR)
        .ok_or_else(|| format!("{}: {} produced no ΔR match ({:?})", out.id, label, outcome.status))?;
    if record.distance >= MAX_MATCH_DR {
        return Err(format!("{}: {} best ΔR {:.3}", out.id, label, record.distance));
    }
    Ok(())
}

fn expect_direct(out: &EventOutput) -> Result<(), String> {
    let single = comparison(out, l1mu_core::processor::SINGLE_COMPARISON_LABEL)?;
    if single.record(MatchMetric::Direct).is_none() {
        return Err(format!("{}: no direct comparison ({:?})", out.id, single.status));
    }
    Ok(())
}

/// Same analysis with every processor expected one BX late.
fn late_processor(config: &AnalyzerConfig) -> Result<EventProcessor, AnalysisError> {
    let mut shifts = BxShiftConfig::default();
    for subsystem in Subsystem::ALL {
        let entries: Vec<BxShiftEntry> = config.bx_shift.table(subsystem).clone().into();
        let late: Vec<BxShiftEntry> = entries
            .into_iter()
            .map(|e| BxShiftEntry { bx: e.bx + 1, ..e })
            .collect();
        *shifts.table_mut(subsystem) = BxShiftTable::try_from(late)?;
    }
    Ok(EventProcessor::new(AnalyzerConfig {
        bx_shift: shifts,
        ..config.clone()
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_scenarios_pass() {
        let runner = ScenarioRunner::new(42).with_events(9);
        for scenario in ScenarioId::all() {
            let result = runner.run(scenario);
            assert!(
                result.passed,
                "{} failed: {:?}",
                scenario,
                result.failure_reason
            );
            assert_eq!(result.metrics.invariant_violations, 0);
        }
    }

    #[test]
    fn test_single_muon_metrics() {
        let result = ScenarioRunner::new(7).with_events(6).run(ScenarioId::SingleMuon);
        assert!(result.passed);
        assert_eq!(result.events, 6);
        assert_eq!(result.metrics.merged_candidates, 6);
        assert_eq!(result.metrics.resolved_links, 6);
        // Three subsystem records plus one direct record per event
        assert_eq!(result.metrics.match_records, 6 * 4);
    }

    #[test]
    fn test_missing_product_aborts() {
        let run = ScenarioRunner::new(3).with_events(4).run_detailed(ScenarioId::MissingProduct);
        assert!(run.result.passed);
        assert_eq!(run.summary.aborted.get("aggregation"), Some(&2));
        assert_eq!(run.summary.aborted.get("omtf_matching"), Some(&2));
    }

    #[test]
    fn test_scenario_deterministic() {
        let runner1 = ScenarioRunner::new(12345);
        let runner2 = ScenarioRunner::new(12345);

        // Same seed = same events
        let (_, events1) = runner1.events_for(ScenarioId::MultiBx);
        let (_, events2) = runner2.events_for(ScenarioId::MultiBx);
        assert_eq!(events1, events2);

        let (_, other) = ScenarioRunner::new(54321).events_for(ScenarioId::MultiBx);
        assert_ne!(events1, other);
    }
}
