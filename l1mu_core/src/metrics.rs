//! L1 Muon Occupancy Summaries
//! ===========================
//!
//! Per-event bookkeeping of what each input delivered:
//! - **RegionSummary**: candidates per BX, commas and packed-value extrema of
//!   one regional track-finder collection
//! - **MergedSummary**: the same for a merged (emulator or unpacker) collection
//! - **ReadoutSummary**: central bunch-crossing number and (η, φ) of the legacy
//!   readout
//!
//! [`RunSummary`] accumulates event outputs across a whole run.

use crate::candidates::Subsystem;
use crate::matching::{ComparisonStatus, MatchMetric};
use crate::processor::EventOutput;
use crate::scales::GlobalPhiCalculator;
use l1mu_env::{Bx, BxCollection, GmtReadoutCollection, Muon, RegionalMuon};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Candidate slots of one readout record that are looked at.
pub const MAX_READOUT_CANDIDATES: usize = 12;

/// Min/max of one packed quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackedRange {
    pub min: i32,
    pub max: i32,
}

impl PackedRange {
    fn observe(range: &mut Option<PackedRange>, value: i32) {
        match range {
            Some(r) => {
                r.min = r.min.min(value);
                r.max = r.max.max(value);
            }
            None => *range = Some(PackedRange { min: value, max: value }),
        }
    }
}

// =============================================================================
// REGIONAL
// =============================================================================

/// Occupancy of one regional collection in one event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionSummary {
    pub subsystem: Subsystem,
    pub first_bx: Bx,
    pub last_bx: Bx,

    /// Counted candidates per BX (commas excluded when suppressed)
    pub per_bx: BTreeMap<Bx, usize>,

    /// Link commas seen, counted or not
    pub commas: usize,

    pub pt: Option<PackedRange>,
    pub eta: Option<PackedRange>,
    pub global_phi: Option<PackedRange>,
}

impl RegionSummary {
    /// Summarizes a collection over its full BX range.
    ///
    /// With `debug` every candidate is dumped at DEBUG level.
    pub fn from_collection<P: GlobalPhiCalculator>(
        subsystem: Subsystem,
        coll: &BxCollection<RegionalMuon>,
        phi_calc: &P,
        comma_suppression: bool,
        debug: bool,
    ) -> Self {
        let mut summary = Self {
            subsystem,
            first_bx: coll.first_bx(),
            last_bx: coll.last_bx(),
            per_bx: BTreeMap::new(),
            commas: 0,
            pt: None,
            eta: None,
            global_phi: None,
        };

        if debug {
            debug!("*** {} muon bx range: {} {}", subsystem, coll.first_bx(), coll.last_bx());
        }

        for bx in coll.bx_range() {
            let bucket = coll.bx(bx);
            if debug && !bucket.is_empty() {
                debug!("    BX {}: {} muons", bx, bucket.len());
            }

            for mu in bucket {
                let global_phi = phi_calc.global_phi(mu.hw_phi, mu.region, mu.processor);
                let comma = mu.is_comma();
                if comma {
                    summary.commas += 1;
                }

                if debug {
                    debug!(
                        "      {} hwPt: {}  hwEta: {}  hwPhi: {}  hwGlobalPhi: {}  hwSign: {}  hwSignValid: {}  hwQual: {}  dataword: 0x{:016x}",
                        if comma { "COMMA" } else { "     " },
                        mu.hw_pt,
                        mu.hw_eta,
                        mu.hw_phi,
                        global_phi,
                        mu.hw_sign,
                        mu.hw_sign_valid,
                        mu.hw_qual,
                        mu.data_word
                    );
                }

                if comma && comma_suppression {
                    continue;
                }
                *summary.per_bx.entry(bx).or_insert(0) += 1;
                PackedRange::observe(&mut summary.pt, mu.hw_pt);
                PackedRange::observe(&mut summary.eta, mu.hw_eta);
                PackedRange::observe(&mut summary.global_phi, global_phi);
            }
        }

        summary
    }

    /// Counted candidates over all BXs.
    pub fn total(&self) -> usize {
        self.per_bx.values().sum()
    }
}

// =============================================================================
// MERGED
// =============================================================================

/// Occupancy of one merged collection in one event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedSummary {
    pub label: String,
    pub first_bx: Bx,
    pub last_bx: Bx,
    pub per_bx: BTreeMap<Bx, usize>,
    pub pt: Option<PackedRange>,
    pub eta: Option<PackedRange>,
    pub phi: Option<PackedRange>,
    /// Candidates with the absolute isolation bit set
    pub abs_isolated: usize,
    /// Candidates with the relative isolation bit set
    pub rel_isolated: usize,
}

impl MergedSummary {
    pub fn from_collection(label: &str, coll: &BxCollection<Muon>, debug: bool) -> Self {
        let mut summary = Self {
            label: label.to_string(),
            first_bx: coll.first_bx(),
            last_bx: coll.last_bx(),
            per_bx: BTreeMap::new(),
            pt: None,
            eta: None,
            phi: None,
            abs_isolated: 0,
            rel_isolated: 0,
        };

        if debug {
            debug!("*** {} muon bx range: {} {}", label, coll.first_bx(), coll.last_bx());
        }

        for (bx, mu) in coll.iter() {
            if debug {
                debug!(
                    "      BX {} hwPt: {}  hwEta: {}  hwPhi: {}  hwCharge: {}  hwChargeValid: {}  hwQual: {}  hwIso: {}",
                    bx, mu.hw_pt, mu.hw_eta, mu.hw_phi, mu.hw_charge, mu.hw_charge_valid, mu.hw_qual, mu.hw_iso
                );
            }

            *summary.per_bx.entry(bx).or_insert(0) += 1;
            PackedRange::observe(&mut summary.pt, mu.hw_pt);
            PackedRange::observe(&mut summary.eta, mu.hw_eta);
            PackedRange::observe(&mut summary.phi, mu.hw_phi);
            summary.abs_isolated += (mu.hw_iso & 1) as usize;
            summary.rel_isolated += ((mu.hw_iso >> 1) & 1) as usize;
        }

        summary
    }

    pub fn total(&self) -> usize {
        self.per_bx.values().sum()
    }
}

// =============================================================================
// LEGACY READOUT
// =============================================================================

/// What the legacy readout delivered in one event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReadoutSummary {
    /// Bunch-crossing number of the central record
    pub central_bx_number: Option<u32>,

    /// (η, φ) of up to 12 non-empty candidates per record
    pub eta_phi: Vec<(f64, f64)>,
}

impl ReadoutSummary {
    pub fn from_collection(coll: &GmtReadoutCollection) -> Self {
        let mut summary = Self::default();
        for record in &coll.records {
            if record.bx_in_event == 0 && summary.central_bx_number.is_none() {
                summary.central_bx_number = Some(record.bx_number);
            }
            summary.eta_phi.extend(
                record
                    .non_empty()
                    .take(MAX_READOUT_CANDIDATES)
                    .map(|c| (c.eta, c.phi)),
            );
        }
        summary
    }
}

// =============================================================================
// RUN SUMMARY
// =============================================================================

/// Per-comparison counters over a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComparisonTally {
    pub compared: usize,
    pub skipped: usize,
    pub records: BTreeMap<MatchMetric, usize>,
}

/// Totals accumulated across events.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub events: usize,

    /// Counted regional candidates per subsystem
    pub regional: BTreeMap<Subsystem, usize>,
    pub commas: usize,

    /// Merged candidates per collection label
    pub merged: BTreeMap<String, usize>,

    pub resolved_links: usize,
    pub unresolved_links: usize,

    pub comparisons: BTreeMap<String, ComparisonTally>,

    /// Events with emulator/unpacker disagreement
    pub emulator_mismatch_events: usize,

    /// Aborted computations per name
    pub aborted: BTreeMap<String, usize>,
}

impl RunSummary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one event's output into the totals.
    pub fn record(&mut self, output: &EventOutput) {
        self.events += 1;

        for s in &output.regional_summaries {
            *self.regional.entry(s.subsystem).or_insert(0) += s.total();
            self.commas += s.commas;
        }
        for s in &output.merged_summaries {
            *self.merged.entry(s.label.clone()).or_insert(0) += s.total();
        }

        if let Some(set) = &output.merged {
            let resolved = set.resolved_links();
            self.resolved_links += resolved;
            self.unresolved_links += set.global().len() - resolved;
        }

        for outcome in &output.comparisons {
            let tally = self.comparisons.entry(outcome.label.clone()).or_default();
            match outcome.status {
                ComparisonStatus::Compared { .. } => tally.compared += 1,
                ComparisonStatus::Skipped(_) => tally.skipped += 1,
            }
            for r in &outcome.records {
                *tally.records.entry(r.metric).or_insert(0) += 1;
            }
        }

        if let Some(cmp) = &output.emulator_comparison {
            if !cmp.is_identical() {
                self.emulator_mismatch_events += 1;
            }
        }

        for a in &output.aborted {
            *self.aborted.entry(a.computation.clone()).or_insert(0) += 1;
        }
    }

    /// Sum of match records over all comparisons.
    pub fn total_records(&self) -> usize {
        self.comparisons
            .values()
            .flat_map(|t| t.records.values())
            .sum()
    }
}
