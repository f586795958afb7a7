//! Cross-collection matching against the legacy reference readout.
//!
//! # Guards
//!
//! - Only the central (BX 0) reference record is used. Two or more non-empty
//!   reference candidates skip the whole comparison.
//! - A reference candidate outside the compared subsystem's |η| region is
//!   skipped for that comparison only.
//! - A candidate-under-test BX holding more than one candidate is skipped.
//! - A candidate whose BX differs from the expected BX of its
//!   (processor, region) in the [`BxShiftTable`] is skipped. A pair missing
//!   from the table excludes the candidate.
//!
//! # Best match
//!
//! Three running bests (ΔR, |Δη|, |Δφ|) start at +∞ and are replaced only on
//! a strictly smaller value, so ties keep the earlier candidate in
//! (BX, native order).

use crate::candidates::{GlobalCandidate, RegionalCandidate, Subsystem};
use crate::error::AnalysisError;
use crate::kinematics::{Deltas, Kinematics};
use crate::scales::{GlobalPhiCalculator, ScaleConfig};
use l1mu_env::{Bx, BxCollection, GmtReadoutCollection, ReferenceMuon, RegionalMuon, TfRegion};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

// ============================================================================
// ACCEPTANCE REGIONS
// ============================================================================

/// Upper |η| edge of the barrel region.
pub const BARREL_ETA_MAX: f64 = 0.83;

/// Upper |η| edge of the overlap region.
pub const OVERLAP_ETA_MAX: f64 = 1.24;

/// |η| acceptance region assigned to a compared subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EtaRegion {
    /// [0, 0.83)
    Barrel,
    /// [0.83, 1.24)
    Overlap,
    /// [1.24, ∞)
    Endcap,
    /// No gating
    Full,
}

impl EtaRegion {
    pub fn for_subsystem(subsystem: Subsystem) -> Self {
        match subsystem {
            Subsystem::Bmtf | Subsystem::BarrelRpc => EtaRegion::Barrel,
            Subsystem::Omtf => EtaRegion::Overlap,
            Subsystem::Emtf => EtaRegion::Endcap,
        }
    }

    /// Half-open |η| interval `[low, high)`.
    pub fn bounds(&self) -> (f64, f64) {
        match self {
            EtaRegion::Barrel => (0.0, BARREL_ETA_MAX),
            EtaRegion::Overlap => (BARREL_ETA_MAX, OVERLAP_ETA_MAX),
            EtaRegion::Endcap => (OVERLAP_ETA_MAX, f64::INFINITY),
            EtaRegion::Full => (0.0, f64::INFINITY),
        }
    }

    pub fn contains(&self, eta: f64) -> bool {
        let (low, high) = self.bounds();
        let abs_eta = eta.abs();
        abs_eta >= low && abs_eta < high
    }
}

// ============================================================================
// BX SHIFT TABLE
// ============================================================================

/// One (processor, region) → expected BX assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BxShiftEntry {
    pub processor: i32,
    pub region: TfRegion,
    pub bx: Bx,
}

/// Expected BX per (processor, region) for one subsystem.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<BxShiftEntry>", into = "Vec<BxShiftEntry>")]
pub struct BxShiftTable {
    entries: BTreeMap<(i32, TfRegion), Bx>,
}

impl BxShiftTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an entry; a second entry for the same key is rejected.
    pub fn insert(&mut self, processor: i32, region: TfRegion, bx: Bx) -> Result<(), AnalysisError> {
        if self.entries.insert((processor, region), bx).is_some() {
            return Err(AnalysisError::config(format!(
                "duplicate BX shift for processor {} region {}",
                processor, region
            )));
        }
        Ok(())
    }

    /// Table with every processor of a subsystem aligned to BX 0.
    pub fn nominal(subsystem: Subsystem) -> Self {
        let layout: &[(TfRegion, i32)] = match subsystem {
            Subsystem::Bmtf | Subsystem::BarrelRpc => &[(TfRegion::Barrel, 12)],
            Subsystem::Omtf => &[(TfRegion::OverlapNeg, 6), (TfRegion::OverlapPos, 6)],
            Subsystem::Emtf => &[(TfRegion::EndcapNeg, 6), (TfRegion::EndcapPos, 6)],
        };

        let mut entries = BTreeMap::new();
        for &(region, processors) in layout {
            for processor in 0..processors {
                entries.insert((processor, region), 0);
            }
        }
        Self { entries }
    }

    pub fn expected_bx(&self, processor: i32, region: TfRegion) -> Option<Bx> {
        self.entries.get(&(processor, region)).copied()
    }

    /// True if a candidate seen at `bx` is nominally time-aligned.
    pub fn accepts(&self, processor: i32, region: TfRegion, bx: Bx) -> bool {
        self.expected_bx(processor, region) == Some(bx)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl TryFrom<Vec<BxShiftEntry>> for BxShiftTable {
    type Error = AnalysisError;

    fn try_from(entries: Vec<BxShiftEntry>) -> Result<Self, Self::Error> {
        let mut table = BxShiftTable::new();
        for e in entries {
            table.insert(e.processor, e.region, e.bx)?;
        }
        Ok(table)
    }
}

impl From<BxShiftTable> for Vec<BxShiftEntry> {
    fn from(table: BxShiftTable) -> Self {
        table
            .entries
            .into_iter()
            .map(|((processor, region), bx)| BxShiftEntry { processor, region, bx })
            .collect()
    }
}

// ============================================================================
// MATCH RECORDS
// ============================================================================

/// Selection criterion a record was produced by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMetric {
    DeltaR,
    DeltaEta,
    DeltaPhi,
    /// 1:1 pairing without a distance
    Direct,
}

impl MatchMetric {
    pub fn name(&self) -> &'static str {
        match self {
            MatchMetric::DeltaR => "dr",
            MatchMetric::DeltaEta => "deta",
            MatchMetric::DeltaPhi => "dphi",
            MatchMetric::Direct => "direct",
        }
    }
}

impl std::fmt::Display for MatchMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// One matched reference candidate for one metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub metric: MatchMetric,

    /// Hardware link of the winning candidate, `None` when the candidate
    /// carries no link (merged candidates)
    pub matched_link_id: Option<i32>,

    pub reference: Kinematics,
    pub candidate: Kinematics,

    /// candidate - reference
    pub deltas: Deltas,

    /// Winning value of the metric (0 for direct pairing)
    pub distance: f64,

    pub candidate_bx: Bx,
}

/// Why a comparison produced nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "reason", content = "count")]
pub enum SkipReason {
    /// 2+ non-empty reference candidates at the central BX
    AmbiguousReference(usize),
    /// No non-empty reference candidate at the central BX
    NoReference,
    /// Reference |η| outside the compared region
    OutsideAcceptance,
    /// Candidate-under-test central BX does not hold exactly one candidate
    CandidateMultiplicity(usize),
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::AmbiguousReference(n) => write!(f, "{} reference candidates", n),
            SkipReason::NoReference => write!(f, "no reference candidate"),
            SkipReason::OutsideAcceptance => write!(f, "reference outside acceptance"),
            SkipReason::CandidateMultiplicity(n) => write!(f, "{} candidates at central BX", n),
        }
    }
}

/// How a comparison ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonStatus {
    Compared {
        /// Candidates that passed every guard
        considered: usize,
        /// BXs dropped for holding more than one candidate
        ambiguous_bxs: usize,
    },
    Skipped(SkipReason),
}

/// Result of one comparison in one event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonOutcome {
    /// Compared collection (subsystem name or merged tag)
    pub label: String,
    pub status: ComparisonStatus,
    pub records: Vec<MatchRecord>,
}

impl ComparisonOutcome {
    fn skipped(label: impl Into<String>, reason: SkipReason) -> Self {
        Self {
            label: label.into(),
            status: ComparisonStatus::Skipped(reason),
            records: Vec::new(),
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self.status, ComparisonStatus::Skipped(_))
    }

    /// The record of one metric, if any.
    pub fn record(&self, metric: MatchMetric) -> Option<&MatchRecord> {
        self.records.iter().find(|r| r.metric == metric)
    }
}

/// The single unambiguous reference candidate, or why there is none.
fn central_reference(reference: &GmtReadoutCollection) -> Result<&ReferenceMuon, SkipReason> {
    let mut non_empty = reference.central().iter().filter(|c| !c.empty);
    match (non_empty.next(), non_empty.count()) {
        (None, _) => Err(SkipReason::NoReference),
        (Some(only), 0) => Ok(only),
        (Some(_), rest) => Err(SkipReason::AmbiguousReference(rest + 1)),
    }
}

fn reference_kinematics(r: &ReferenceMuon) -> Kinematics {
    Kinematics::new(r.pt, r.eta, r.phi)
}

// ============================================================================
// CROSS-COLLECTION MATCHER
// ============================================================================

/// Running best of one metric.
#[derive(Debug, Clone, Copy)]
struct Best {
    value: f64,
    index: Option<usize>,
}

impl Best {
    fn new() -> Self {
        Self {
            value: f64::INFINITY,
            index: None,
        }
    }

    #[inline]
    fn offer(&mut self, value: f64, index: usize) {
        if value < self.value {
            self.value = value;
            self.index = Some(index);
        }
    }
}

/// Finds the best regional candidate for the reference under ΔR, |Δη| and
/// |Δφ| independently.
pub struct CrossCollectionMatcher<'a, P> {
    scales: &'a ScaleConfig,
    phi_calc: &'a P,
}

impl<'a, P: GlobalPhiCalculator> CrossCollectionMatcher<'a, P> {
    pub fn new(scales: &'a ScaleConfig, phi_calc: &'a P) -> Self {
        Self { scales, phi_calc }
    }

    /// Compares one subsystem's collection, over its full BX range, against
    /// the central reference.
    pub fn compare(
        &self,
        subsystem: Subsystem,
        reference: &GmtReadoutCollection,
        candidates: &BxCollection<RegionalMuon>,
        shifts: &BxShiftTable,
    ) -> ComparisonOutcome {
        self.compare_in(
            subsystem.name(),
            EtaRegion::for_subsystem(subsystem),
            reference,
            candidates,
            shifts,
        )
    }

    /// Like [`compare`](Self::compare) with an explicit acceptance region.
    pub fn compare_in(
        &self,
        label: &str,
        acceptance: EtaRegion,
        reference: &GmtReadoutCollection,
        candidates: &BxCollection<RegionalMuon>,
        shifts: &BxShiftTable,
    ) -> ComparisonOutcome {
        let reference = match central_reference(reference) {
            Ok(r) => r,
            Err(reason) => {
                debug!("{}: comparison skipped ({})", label, reason);
                return ComparisonOutcome::skipped(label, reason);
            }
        };
        if !acceptance.contains(reference.eta) {
            return ComparisonOutcome::skipped(label, SkipReason::OutsideAcceptance);
        }
        let ref_kin = reference_kinematics(reference);

        // Guarded candidates in (BX, native order)
        let mut eligible: Vec<RegionalCandidate> = Vec::new();
        let mut ambiguous_bxs = 0;
        for bx in candidates.bx_range() {
            let bucket = candidates.bx(bx);
            if bucket.len() > 1 {
                ambiguous_bxs += 1;
                continue;
            }
            eligible.extend(
                bucket
                    .iter()
                    .filter(|mu| shifts.accepts(mu.processor, mu.region, bx))
                    .map(|mu| RegionalCandidate::from_raw(mu, bx, self.scales, self.phi_calc)),
            );
        }

        let mut best_dr = Best::new();
        let mut best_deta = Best::new();
        let mut best_dphi = Best::new();

        for (i, c) in eligible.iter().enumerate() {
            let kin = Kinematics::new(c.pt, c.eta, c.phi);
            let d = kin.deltas_to(&ref_kin);
            best_dr.offer(kin.delta_r(&ref_kin), i);
            best_deta.offer(d.eta.abs(), i);
            best_dphi.offer(d.phi.abs(), i);
        }

        let records = [
            (MatchMetric::DeltaR, best_dr),
            (MatchMetric::DeltaEta, best_deta),
            (MatchMetric::DeltaPhi, best_dphi),
        ]
        .into_iter()
        .filter(|(_, best)| best.value.is_finite())
        .filter_map(|(metric, best)| {
            let c = &eligible[best.index?];
            let kin = Kinematics::new(c.pt, c.eta, c.phi);
            Some(MatchRecord {
                metric,
                matched_link_id: Some(c.link),
                reference: ref_kin,
                candidate: kin,
                deltas: kin.deltas_to(&ref_kin),
                distance: best.value,
                candidate_bx: c.bx,
            })
        })
        .collect();

        ComparisonOutcome {
            label: label.to_string(),
            status: ComparisonStatus::Compared {
                considered: eligible.len(),
                ambiguous_bxs,
            },
            records,
        }
    }
}

// ============================================================================
// SINGLE-CANDIDATE COMPARATOR
// ============================================================================

/// Pairs the only central merged candidate with the only reference
/// candidate, with no distance selection.
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleCandidateComparator;

impl SingleCandidateComparator {
    /// `central` are the merged candidates of BX 0.
    pub fn compare(
        &self,
        label: &str,
        reference: &GmtReadoutCollection,
        central: &[GlobalCandidate],
    ) -> ComparisonOutcome {
        let reference = match central_reference(reference) {
            Ok(r) => r,
            Err(reason) => return ComparisonOutcome::skipped(label, reason),
        };
        let candidate = match central {
            [only] => only,
            _ => {
                return ComparisonOutcome::skipped(
                    label,
                    SkipReason::CandidateMultiplicity(central.len()),
                )
            }
        };

        let ref_kin = reference_kinematics(reference);
        let kin = Kinematics::new(candidate.pt, candidate.eta, candidate.phi);

        ComparisonOutcome {
            label: label.to_string(),
            status: ComparisonStatus::Compared {
                considered: 1,
                ambiguous_bxs: 0,
            },
            records: vec![MatchRecord {
                metric: MatchMetric::Direct,
                matched_link_id: None,
                reference: ref_kin,
                candidate: kin,
                deltas: kin.deltas_to(&ref_kin),
                distance: 0.0,
                candidate_bx: candidate.bx,
            }],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidates::TfLink;
    use crate::scales::MicroGmtPhi;
    use approx::assert_abs_diff_eq;
    use l1mu_env::GmtReadoutRecord;

    fn reference(cands: &[(f64, f64, f64)]) -> GmtReadoutCollection {
        let mut candidates: Vec<ReferenceMuon> = cands
            .iter()
            .map(|&(pt, eta, phi)| ReferenceMuon {
                pt,
                eta,
                phi,
                quality: 6,
                empty: false,
            })
            .collect();
        // Readout always carries padded empty slots
        candidates.push(ReferenceMuon {
            pt: 0.0,
            eta: 0.0,
            phi: 0.0,
            quality: 0,
            empty: true,
        });
        GmtReadoutCollection {
            records: vec![GmtReadoutRecord {
                bx_in_event: 0,
                bx_number: 1234,
                candidates,
            }],
        }
    }

    /// Barrel candidate whose global phi equals `hw_phi` (processor 0 adds -24)
    fn barrel(hw_pt: i32, hw_eta: i32, global_phi: i32, link: i32) -> RegionalMuon {
        RegionalMuon {
            hw_pt,
            hw_eta,
            hw_phi: global_phi + 24,
            hw_qual: 12,
            hw_sign: 0,
            hw_sign_valid: true,
            processor: 0,
            link,
            track_address: 0,
            region: TfRegion::Barrel,
            data_word: 0,
        }
    }

    fn matcher_fixture() -> (ScaleConfig, MicroGmtPhi) {
        (ScaleConfig::default(), MicroGmtPhi)
    }

    #[test]
    fn test_eta_regions() {
        assert!(EtaRegion::Barrel.contains(0.0));
        assert!(EtaRegion::Barrel.contains(-0.82));
        assert!(!EtaRegion::Barrel.contains(0.83));
        assert!(EtaRegion::Overlap.contains(0.83));
        assert!(EtaRegion::Overlap.contains(-1.0));
        assert!(!EtaRegion::Overlap.contains(1.24));
        assert!(EtaRegion::Endcap.contains(2.4));
        assert!(EtaRegion::Full.contains(-3.0));
    }

    #[test]
    fn test_shift_table_rejects_duplicates() {
        let mut table = BxShiftTable::new();
        table.insert(3, TfRegion::Barrel, 0).unwrap();
        assert!(table.insert(3, TfRegion::Barrel, 1).is_err());

        let json = r#"[{"processor":1,"region":"endcap_pos","bx":0},{"processor":1,"region":"endcap_pos","bx":-1}]"#;
        assert!(serde_json::from_str::<BxShiftTable>(json).is_err());
    }

    #[test]
    fn test_shift_table_serde_and_lookup() {
        let json = r#"[{"processor":1,"region":"endcap_pos","bx":-1},{"processor":2,"region":"endcap_neg","bx":0}]"#;
        let table: BxShiftTable = serde_json::from_str(json).unwrap();
        assert_eq!(table.len(), 2);
        assert!(table.accepts(1, TfRegion::EndcapPos, -1));
        assert!(!table.accepts(1, TfRegion::EndcapPos, 0));
        // Absent pair excludes
        assert!(!table.accepts(5, TfRegion::EndcapPos, 0));

        let back: BxShiftTable = serde_json::from_str(&serde_json::to_string(&table).unwrap()).unwrap();
        assert_eq!(back, table);
    }

    #[test]
    fn test_nominal_tables() {
        assert_eq!(BxShiftTable::nominal(Subsystem::Bmtf).len(), 12);
        assert_eq!(BxShiftTable::nominal(Subsystem::Omtf).len(), 12);
        assert!(BxShiftTable::nominal(Subsystem::Emtf).accepts(5, TfRegion::EndcapNeg, 0));
        assert!(!BxShiftTable::nominal(Subsystem::Emtf).accepts(6, TfRegion::EndcapNeg, 0));
    }

    #[test]
    fn test_best_match_per_metric() {
        let (scales, phi) = matcher_fixture();
        let matcher = CrossCollectionMatcher::new(&scales, &phi);
        let reference = reference(&[(10.0, 0.5, 1.0)]);

        // Close in eta but far in phi at BX -1, close in phi at BX 0
        let coll = BxCollection::new(-1, 0)
            .with_bx(-1, vec![barrel(20, 46, 120, 7)])
            .unwrap()
            .with_bx(0, vec![barrel(20, 60, 92, 9)])
            .unwrap();
        let mut shifts = BxShiftTable::new();
        shifts.insert(0, TfRegion::Barrel, -1).unwrap();

        // Only the BX -1 candidate is time-aligned
        let out = matcher.compare(Subsystem::Bmtf, &reference, &coll, &shifts);
        assert_eq!(out.status, ComparisonStatus::Compared { considered: 1, ambiguous_bxs: 0 });
        assert_eq!(out.records.len(), 3);
        assert!(out.records.iter().all(|r| r.matched_link_id == Some(7)));

        let mut shifts = BxShiftTable::new();
        shifts.insert(0, TfRegion::Barrel, 0).unwrap();
        let out = matcher.compare_in("bmtf", EtaRegion::Full, &reference, &coll, &shifts);
        assert_eq!(out.records.len(), 3);
        let dr = out.record(MatchMetric::DeltaR).unwrap();
        assert_eq!(dr.matched_link_id, Some(9));
        assert_eq!(dr.candidate_bx, 0);
        assert_abs_diff_eq!(dr.deltas.pt, 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(dr.deltas.eta, 60.0 * 0.010875 - 0.5, epsilon = 1e-9);
        assert_abs_diff_eq!(dr.deltas.phi, 92.0 * 0.010908 - 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_metrics_pick_independently() {
        let (scales, phi) = matcher_fixture();
        let matcher = CrossCollectionMatcher::new(&scales, &phi);
        let reference = reference(&[(10.0, 0.5, 1.0)]);

        // a: exact eta, phi off by ~0.2; b: phi within one bin, eta off by ~0.1
        let a = barrel(20, 46, 110, 1);
        let mut b = barrel(20, 55, 92 - 48, 2);
        b.processor = 1;
        let coll = BxCollection::new(-1, 0)
            .with_bx(-1, vec![a])
            .unwrap()
            .with_bx(0, vec![b])
            .unwrap();
        let mut shifts = BxShiftTable::new();
        shifts.insert(0, TfRegion::Barrel, -1).unwrap();
        shifts.insert(1, TfRegion::Barrel, 0).unwrap();

        let out = matcher.compare(Subsystem::Bmtf, &reference, &coll, &shifts);
        assert_eq!(out.record(MatchMetric::DeltaEta).unwrap().matched_link_id, Some(1));
        assert_eq!(out.record(MatchMetric::DeltaPhi).unwrap().matched_link_id, Some(2));
        assert_eq!(out.record(MatchMetric::DeltaR).unwrap().matched_link_id, Some(2));
    }

    #[test]
    fn test_ambiguous_reference_skips() {
        let (scales, phi) = matcher_fixture();
        let matcher = CrossCollectionMatcher::new(&scales, &phi);
        let reference = reference(&[(10.0, 0.5, 1.0), (8.0, -0.3, 2.0)]);
        let coll = BxCollection::central().with_bx(0, vec![barrel(20, 46, 92, 1)]).unwrap();

        let out = matcher.compare(Subsystem::Bmtf, &reference, &coll, &BxShiftTable::nominal(Subsystem::Bmtf));
        assert_eq!(out.status, ComparisonStatus::Skipped(SkipReason::AmbiguousReference(2)));
        assert!(out.records.is_empty());
    }

    #[test]
    fn test_ambiguous_candidate_bx_skipped() {
        let (scales, phi) = matcher_fixture();
        let matcher = CrossCollectionMatcher::new(&scales, &phi);
        let reference = reference(&[(10.0, 0.5, 1.0)]);
        let coll = BxCollection::central()
            .with_bx(0, vec![barrel(20, 46, 92, 1), barrel(21, 46, 92, 2)])
            .unwrap();

        let out = matcher.compare(Subsystem::Bmtf, &reference, &coll, &BxShiftTable::nominal(Subsystem::Bmtf));
        assert_eq!(out.status, ComparisonStatus::Compared { considered: 0, ambiguous_bxs: 1 });
        assert!(out.records.is_empty());
    }

    #[test]
    fn test_region_gating() {
        let (scales, phi) = matcher_fixture();
        let matcher = CrossCollectionMatcher::new(&scales, &phi);
        let reference = reference(&[(10.0, 1.0, 1.0)]);

        let mut omtf_mu = barrel(20, 92, 0, 3);
        omtf_mu.region = TfRegion::OverlapPos;
        let omtf = BxCollection::central().with_bx(0, vec![omtf_mu]).unwrap();
        let bmtf = BxCollection::central().with_bx(0, vec![barrel(20, 92, 92, 4)]).unwrap();

        let barrel_out = matcher.compare(Subsystem::Bmtf, &reference, &bmtf, &BxShiftTable::nominal(Subsystem::Bmtf));
        assert_eq!(barrel_out.status, ComparisonStatus::Skipped(SkipReason::OutsideAcceptance));

        let overlap_out = matcher.compare(Subsystem::Omtf, &reference, &omtf, &BxShiftTable::nominal(Subsystem::Omtf));
        assert!(!overlap_out.is_skipped());
        assert_eq!(overlap_out.records.len(), 3);
    }

    #[test]
    fn test_tie_keeps_first_seen() {
        // Power-of-two eta bins keep the two distances bit-identical
        let scales = ScaleConfig {
            eta: 0.015625,
            ..ScaleConfig::default()
        };
        let phi = MicroGmtPhi;
        let matcher = CrossCollectionMatcher::new(&scales, &phi);
        // Reference exactly between two candidates in eta
        let reference = reference(&[(10.0, 50.0 * 0.015625, 92.0 * 0.010908)]);

        let mut lower = barrel(20, 40, 92, 1);
        lower.processor = 0;
        let mut upper = barrel(20, 60, 92 - 48, 2);
        upper.processor = 1;

        let mut shifts = BxShiftTable::new();
        shifts.insert(0, TfRegion::Barrel, -1).unwrap();
        shifts.insert(1, TfRegion::Barrel, 0).unwrap();
        let coll = BxCollection::new(-1, 0)
            .with_bx(-1, vec![lower])
            .unwrap()
            .with_bx(0, vec![upper])
            .unwrap();

        let out = matcher.compare_in("bmtf", EtaRegion::Full, &reference, &coll, &shifts);
        assert_eq!(out.record(MatchMetric::DeltaR).unwrap().matched_link_id, Some(1));
        assert_eq!(out.record(MatchMetric::DeltaEta).unwrap().matched_link_id, Some(1));
    }

    #[test]
    fn test_no_eligible_candidate_emits_nothing() {
        let (scales, phi) = matcher_fixture();
        let matcher = CrossCollectionMatcher::new(&scales, &phi);
        let reference = reference(&[(10.0, 0.5, 1.0)]);
        let coll = BxCollection::central().with_bx(0, vec![barrel(20, 46, 92, 1)]).unwrap();

        let out = matcher.compare(Subsystem::Bmtf, &reference, &coll, &BxShiftTable::new());
        assert!(!out.is_skipped());
        assert!(out.records.is_empty());
    }

    fn global(pt: f64, eta: f64, phi: f64) -> GlobalCandidate {
        GlobalCandidate {
            pt,
            eta,
            phi,
            packed_pt: 0,
            packed_eta: 0,
            packed_phi: 0,
            quality: 12,
            charge: 0,
            charge_valid: true,
            abs_iso: 0,
            rel_iso: 0,
            packed_iso: 0,
            iso_energy: 0,
            rank: 0,
            bx: 0,
            link: TfLink::unresolved(),
        }
    }

    #[test]
    fn test_single_candidate_comparison() {
        let reference = reference(&[(10.0, 0.5, 1.0)]);
        let out = SingleCandidateComparator.compare("ugmt", &reference, &[global(10.2, 0.52, 0.98)]);

        assert_eq!(out.records.len(), 1);
        let rec = &out.records[0];
        assert_eq!(rec.metric, MatchMetric::Direct);
        assert_abs_diff_eq!(rec.deltas.pt, 0.2, epsilon = 1e-9);
        assert_abs_diff_eq!(rec.deltas.eta, 0.02, epsilon = 1e-9);
        assert_abs_diff_eq!(rec.deltas.phi, -0.02, epsilon = 1e-9);
    }

    #[test]
    fn test_single_candidate_guards() {
        let one = reference(&[(10.0, 0.5, 1.0)]);
        let two = reference(&[(10.0, 0.5, 1.0), (5.0, 1.5, -1.0)]);
        let c = global(10.2, 0.52, 0.98);

        let out = SingleCandidateComparator.compare("ugmt", &two, &[c.clone()]);
        assert_eq!(out.status, ComparisonStatus::Skipped(SkipReason::AmbiguousReference(2)));

        let out = SingleCandidateComparator.compare("ugmt", &one, &[c.clone(), c.clone()]);
        assert_eq!(out.status, ComparisonStatus::Skipped(SkipReason::CandidateMultiplicity(2)));

        let out = SingleCandidateComparator.compare("ugmt", &one, &[]);
        assert!(out.records.is_empty());

        let out = SingleCandidateComparator.compare("ugmt", &GmtReadoutCollection::default(), &[c]);
        assert_eq!(out.status, ComparisonStatus::Skipped(SkipReason::NoReference));
    }
}
