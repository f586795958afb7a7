//! Cross-checks every processed event must pass, whatever the scenario.

use l1mu_core::{
    AnalyzerConfig, AttributeMatchResolver, BxFlattener, ComparisonStatus, EventOutput, EventProcessor,
    GlobalPhiCalculator, LinkContext, LinkResolver, MergedRecordSet, RegionalCandidate, SkipReason,
};
use l1mu_env::EventSource;
use serde::Serialize;

/// A broken invariant, with enough detail to reproduce it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvariantViolation {
    pub invariant: &'static str,
    pub detail: String,
}

impl InvariantViolation {
    fn new(invariant: &'static str, detail: impl Into<String>) -> Self {
        Self {
            invariant,
            detail: detail.into(),
        }
    }
}

impl std::fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.invariant, self.detail)
    }
}

/// Per-BX offsets of every flattened array are prefix sums of the bucket
/// sizes, and every bucket agrees with the raw collection it came from.
pub fn check_offsets(
    set: &MergedRecordSet,
    source: &dyn EventSource,
    config: &AnalyzerConfig,
) -> Result<(), InvariantViolation> {
    for (subsystem, tag) in config.tags.enabled_regional() {
        let array = set.arena().array(subsystem);
        let mut running = 0;
        for (&bx, &count) in array.bx_counts() {
            if array.offset(bx) != running {
                return Err(InvariantViolation::new(
                    "offsets",
                    format!("{} BX {}: offset {} != {}", subsystem, bx, array.offset(bx), running),
                ));
            }
            let slice = array.bx_slice(bx);
            if slice.len() != count || slice.iter().any(|c| c.bx != bx) {
                return Err(InvariantViolation::new(
                    "offsets",
                    format!("{} BX {}: bucket does not hold its {} candidates", subsystem, bx, count),
                ));
            }
            if let Ok(raw) = source.regional_muons(tag) {
                if raw.size(bx) != count {
                    return Err(InvariantViolation::new(
                        "offsets",
                        format!("{} BX {}: {} flattened, {} raw", subsystem, bx, count, raw.size(bx)),
                    ));
                }
            }
            running += count;
        }
        if running != array.len() {
            return Err(InvariantViolation::new(
                "offsets",
                format!("{}: counts sum to {}, array holds {}", subsystem, running, array.len()),
            ));
        }
    }
    Ok(())
}

fn same_attributes(a: &RegionalCandidate, b: &RegionalCandidate) -> bool {
    a.packed_eta == b.packed_eta
        && a.packed_global_phi == b.packed_global_phi
        && a.packed_pt == b.packed_pt
        && a.quality == b.quality
}

/// Every resolved link addresses an existing candidate at the merged
/// candidate's BX. Wherever attribute matching finds a contributor too, it
/// names the same subsystem, and any other index it picks holds identical
/// packed attributes.
pub fn check_links<P: GlobalPhiCalculator>(
    set: &MergedRecordSet,
    source: &dyn EventSource,
    config: &AnalyzerConfig,
    phi_calc: &P,
) -> Result<(), InvariantViolation> {
    let muons = source
        .muons(&config.tags.ugmt)
        .map_err(|e| InvariantViolation::new("links", e.to_string()))?;

    let flattener = BxFlattener::new(&config.scales, phi_calc, config.only_central_bx);
    let raw = muons
        .bx_range()
        .filter(|&bx| flattener.processes(bx))
        .flat_map(|bx| muons.bx(bx).iter().map(move |mu| (bx, mu)));

    let mut linked = 0;
    for (i, ((bx, mu), candidate)) in raw.zip(set.global()).enumerate() {
        linked += 1;
        if candidate.bx != bx || candidate.packed_pt != mu.hw_pt {
            return Err(InvariantViolation::new(
                "links",
                format!("merged candidate {} out of order", i),
            ));
        }
        if !candidate.link.is_resolved() {
            continue;
        }
        let Some(target) = set.arena().resolve(&candidate.link) else {
            return Err(InvariantViolation::new(
                "links",
                format!("candidate {} links to missing {}", i, candidate.link),
            ));
        };
        if target.bx != bx {
            return Err(InvariantViolation::new(
                "links",
                format!("candidate {} at BX {} links to BX {}", i, bx, target.bx),
            ));
        }

        let ctx = LinkContext::new(set.arena(), bx);
        let by_attributes = AttributeMatchResolver.resolve(mu, &ctx);
        if let Some(other) = set.arena().resolve(&by_attributes) {
            let same_subsystem = by_attributes.subsystem() == candidate.link.subsystem();
            if !same_subsystem || (by_attributes != candidate.link && !same_attributes(target, other)) {
                return Err(InvariantViolation::new(
                    "links",
                    format!("candidate {}: {} disagrees with {}", i, candidate.link, by_attributes),
                ));
            }
        }
    }

    if linked != set.global().len() {
        return Err(InvariantViolation::new(
            "links",
            format!("{} merged candidates for {} raw", set.global().len(), linked),
        ));
    }
    Ok(())
}

/// Two or more non-empty central reference candidates skip every comparison.
pub fn check_ambiguity_guard(
    output: &EventOutput,
    source: &dyn EventSource,
    config: &AnalyzerConfig,
) -> Result<(), InvariantViolation> {
    let Ok(reference) = source.gmt_readout(&config.tags.gmt) else {
        return Ok(());
    };
    let n = reference.central().iter().filter(|c| !c.empty).count();
    if n < 2 {
        return Ok(());
    }
    for outcome in &output.comparisons {
        let expected = ComparisonStatus::Skipped(SkipReason::AmbiguousReference(n));
        if outcome.status != expected || !outcome.records.is_empty() {
            return Err(InvariantViolation::new(
                "ambiguity",
                format!("{} compared against {} reference candidates", outcome.label, n),
            ));
        }
    }
    Ok(())
}

/// Processing the same event again gives the same output.
pub fn check_idempotent<P: GlobalPhiCalculator>(
    processor: &EventProcessor<P>,
    source: &dyn EventSource,
    output: &EventOutput,
) -> Result<(), InvariantViolation> {
    if &processor.process(source) != output {
        return Err(InvariantViolation::new(
            "idempotence",
            format!("event {} gave different output on reprocessing", output.id),
        ));
    }
    Ok(())
}

/// Runs every check; an aborted aggregation skips the record-set checks.
pub fn check_all<P: GlobalPhiCalculator>(
    processor: &EventProcessor<P>,
    source: &dyn EventSource,
    output: &EventOutput,
) -> Vec<InvariantViolation> {
    let config = processor.config();
    let mut violations = Vec::new();

    if let Some(set) = &output.merged {
        violations.extend(check_offsets(set, source, config).err());
        violations.extend(check_links(set, source, config, processor.phi_calculator()).err());
    }
    violations.extend(check_ambiguity_guard(output, source, config).err());
    violations.extend(check_idempotent(processor, source, output).err());
    violations
}
