//! Ground truth oracle for simulation.
//!
//! The Oracle knows the true muons of every generated event and produces
//! what the detector would deliver for them:
//! - regional track-finder candidates (packed, processor-local phi)
//! - merged candidates with origin keys
//! - the legacy reference readout, smeared with Gaussian resolution

use l1mu_core::{GlobalPhiCalculator, ScaleConfig, Subsystem, GLOBAL_PHI_BINS};
use l1mu_env::{
    Bx, BxCollection, Event, EventId, GmtReadoutCollection, GmtReadoutRecord, InputTag, Muon, OriginKey,
    ReferenceMuon, RegionalMuon, TfRegion,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::f64::consts::PI;
use tracing::warn;

/// Fixed number of candidate slots in a legacy readout record.
pub const READOUT_SLOTS: usize = 4;

/// A true muon in physical units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrueMuon {
    /// GeV
    pub pt: f64,
    pub eta: f64,
    /// rad, [0, 2π)
    pub phi: f64,
    /// -1 or +1
    pub charge: i32,
}

/// How the merged candidate of a true muon is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergedMode {
    /// Same packed attributes as the regional candidate, with origin key
    Keyed,
    /// Same packed attributes, no origin key
    Unkeyed,
    /// Altered attributes and no origin key: matches nothing
    Corrupted,
    /// No merged candidate at all
    Absent,
}

/// Everything the oracle needs to place one muon in an event.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MuonSpec {
    pub truth: TrueMuon,
    /// BX the hardware reports the candidate at
    pub bx: Bx,
    pub merged: MergedMode,
    /// Also report the candidate in the barrel RPC stream
    pub rpc_duplicate: bool,
    /// Seen by the legacy readout
    pub in_reference: bool,
}

impl MuonSpec {
    pub fn new(truth: TrueMuon) -> Self {
        Self {
            truth,
            bx: 0,
            merged: MergedMode::Keyed,
            rpc_duplicate: false,
            in_reference: true,
        }
    }

    pub fn at_bx(mut self, bx: Bx) -> Self {
        self.bx = bx;
        self
    }

    pub fn merged(mut self, mode: MergedMode) -> Self {
        self.merged = mode;
        self
    }

    pub fn with_rpc_duplicate(mut self) -> Self {
        self.rpc_duplicate = true;
        self
    }

    pub fn without_reference(mut self) -> Self {
        self.in_reference = false;
        self
    }
}

/// Layout of one generated event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventSpec {
    pub muons: Vec<MuonSpec>,
    pub first_bx: Bx,
    pub last_bx: Bx,
    /// Fill the barrel RPC stream
    pub with_rpc: bool,
    /// Labels left out of the event entirely
    pub drop: Vec<InputTag>,
}

impl EventSpec {
    pub fn new(muons: Vec<MuonSpec>) -> Self {
        Self {
            muons,
            first_bx: -2,
            last_bx: 2,
            with_rpc: false,
            drop: Vec::new(),
        }
    }
}

/// Labels the oracle files its collections under.
pub mod labels {
    pub const BMTF: &str = "bmtf";
    pub const OMTF: &str = "omtf";
    pub const EMTF: &str = "emtf";
    pub const BARREL_RPC: &str = "barrel_rpc";
    pub const UGMT: &str = "ugmt";
    pub const GMT: &str = "gmt";

    pub fn regional(subsystem: l1mu_core::Subsystem) -> &'static str {
        match subsystem {
            l1mu_core::Subsystem::Bmtf => BMTF,
            l1mu_core::Subsystem::Omtf => OMTF,
            l1mu_core::Subsystem::Emtf => EMTF,
            l1mu_core::Subsystem::BarrelRpc => BARREL_RPC,
        }
    }
}

// ============================================================================
// PACKING
// ============================================================================

/// Region of a packed |η| value.
pub fn region_for(hw_eta: i32, scales: &ScaleConfig) -> TfRegion {
    let eta = scales.eta(hw_eta);
    let abs_eta = eta.abs();
    if abs_eta < l1mu_core::matching::BARREL_ETA_MAX {
        TfRegion::Barrel
    } else if abs_eta < l1mu_core::matching::OVERLAP_ETA_MAX {
        if eta < 0.0 {
            TfRegion::OverlapNeg
        } else {
            TfRegion::OverlapPos
        }
    } else if eta < 0.0 {
        TfRegion::EndcapNeg
    } else {
        TfRegion::EndcapPos
    }
}

/// Inverse of the global phi mapping: `(processor, local phi)` whose global
/// phi is `global`.
pub fn local_phi(global: i32, region: TfRegion) -> (i32, i32) {
    match region {
        TfRegion::Barrel => {
            let shifted = (global + 24).rem_euclid(GLOBAL_PHI_BINS);
            let processor = shifted / 48;
            (processor, shifted - processor * 48)
        }
        _ => {
            let shifted = (global - 24).rem_euclid(GLOBAL_PHI_BINS);
            let processor = shifted / 96;
            (processor, shifted - processor * 96)
        }
    }
}

/// Packed values of a true muon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Packed {
    pub hw_pt: i32,
    pub hw_eta: i32,
    pub global_phi: i32,
}

impl Packed {
    pub fn from_truth(truth: &TrueMuon, scales: &ScaleConfig) -> Self {
        Self {
            hw_pt: (truth.pt / scales.pt).round() as i32,
            hw_eta: (truth.eta / scales.eta).round() as i32,
            global_phi: ((truth.phi / scales.phi).round() as i32).rem_euclid(GLOBAL_PHI_BINS),
        }
    }
}

// ============================================================================
// ORACLE
// ============================================================================

/// Gaussian resolution of the legacy readout.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    /// Relative pt resolution
    pub pt_rel: f64,
    pub eta: f64,
    /// rad
    pub phi: f64,
}

impl Default for Resolution {
    fn default() -> Self {
        Self {
            pt_rel: 0.02,
            eta: 0.004,
            phi: 0.004,
        }
    }
}

/// The Oracle - samples true muons and builds detector events from them.
pub struct Oracle {
    /// Master seed
    physics_seed: u64,

    /// RNG for sampling and smearing
    physics_rng: ChaCha8Rng,

    scales: ScaleConfig,
    resolution: Resolution,

    run: u32,
    next_event: u64,
}

impl Oracle {
    /// Creates a new Oracle with the given physics seed.
    pub fn new(physics_seed: u64) -> Self {
        Self {
            physics_seed,
            physics_rng: ChaCha8Rng::seed_from_u64(physics_seed),
            scales: ScaleConfig::default(),
            resolution: Resolution::default(),
            run: 1,
            next_event: 1,
        }
    }

    pub fn seed(&self) -> u64 {
        self.physics_seed
    }

    pub fn with_scales(mut self, scales: ScaleConfig) -> Self {
        self.scales = scales;
        self
    }

    pub fn set_resolution(&mut self, resolution: Resolution) {
        self.resolution = resolution;
    }

    pub fn scales(&self) -> &ScaleConfig {
        &self.scales
    }

    /// Samples a true muon with |η| in `[abs_eta_min, abs_eta_max)`.
    pub fn sample_muon(&mut self, abs_eta_min: f64, abs_eta_max: f64) -> TrueMuon {
        let abs_eta = self.physics_rng.gen_range(abs_eta_min..abs_eta_max);
        let sign = if self.physics_rng.gen_bool(0.5) { 1.0 } else { -1.0 };
        TrueMuon {
            pt: self.physics_rng.gen_range(3.0..80.0),
            eta: sign * abs_eta,
            phi: self.physics_rng.gen_range(0.0..2.0 * PI),
            charge: if self.physics_rng.gen_bool(0.5) { 1 } else { -1 },
        }
    }

    /// Samples a muon anywhere in the trigger acceptance.
    pub fn sample_any(&mut self) -> TrueMuon {
        self.sample_muon(0.0, 2.4)
    }

    fn gaussian(&mut self, std_dev: f64) -> f64 {
        let z: f64 = self.physics_rng.sample(StandardNormal);
        z * std_dev
    }

    /// Smeared reference readout of a true muon.
    fn reference_candidate(&mut self, truth: &TrueMuon) -> ReferenceMuon {
        let pt = truth.pt * (1.0 + self.gaussian(self.resolution.pt_rel));
        let eta = truth.eta + self.gaussian(self.resolution.eta);
        let phi = (truth.phi + self.gaussian(self.resolution.phi)).rem_euclid(2.0 * PI);
        ReferenceMuon {
            pt: pt.max(0.0),
            eta,
            phi,
            quality: 6,
            empty: false,
        }
    }

    /// Regional candidate of a true muon.
    fn regional_candidate(&mut self, truth: &TrueMuon) -> RegionalMuon {
        let packed = Packed::from_truth(truth, &self.scales);
        let region = region_for(packed.hw_eta, &self.scales);
        let (processor, local) = local_phi(packed.global_phi, region);
        let link = match region {
            TfRegion::Barrel => 48 + processor,
            TfRegion::OverlapNeg | TfRegion::OverlapPos => 42 + processor,
            TfRegion::EndcapNeg | TfRegion::EndcapPos => 36 + processor,
        };

        RegionalMuon {
            hw_pt: packed.hw_pt,
            hw_eta: packed.hw_eta,
            hw_phi: local,
            hw_qual: self.physics_rng.gen_range(4..16),
            hw_sign: if truth.charge < 0 { 1 } else { 0 },
            hw_sign_valid: true,
            processor,
            link,
            track_address: self.physics_rng.gen_range(0..4096),
            region,
            data_word: self.physics_rng.gen::<u32>() as u64,
        }
    }

    fn merged_candidate<P: GlobalPhiCalculator>(
        &mut self,
        regional: &RegionalMuon,
        phi_calc: &P,
        mode: MergedMode,
        key: usize,
    ) -> Muon {
        let mut mu = Muon {
            hw_pt: regional.hw_pt,
            hw_eta: regional.hw_eta,
            hw_phi: phi_calc.global_phi(regional.hw_phi, regional.region, regional.processor),
            hw_qual: regional.hw_qual,
            hw_charge: regional.hw_sign,
            hw_charge_valid: regional.hw_sign_valid,
            hw_iso: self.physics_rng.gen_range(0..4),
            hw_iso_sum: self.physics_rng.gen_range(0..32),
            hw_rank: self.physics_rng.gen_range(0..1024),
            origin: None,
        };
        match mode {
            MergedMode::Keyed => {
                mu.origin = Some(OriginKey {
                    region: regional.region,
                    key,
                })
            }
            MergedMode::Corrupted => {
                mu.hw_pt += 1;
                mu.hw_qual = (mu.hw_qual + 1) % 16;
            }
            MergedMode::Unkeyed | MergedMode::Absent => {}
        }
        mu
    }

    /// Builds the next event from a layout.
    pub fn build_event<P: GlobalPhiCalculator>(&mut self, spec: &EventSpec, phi_calc: &P) -> Event {
        let id = EventId::new(self.run, self.next_event);
        self.next_event += 1;

        let mut regional: BTreeMap<Subsystem, BxCollection<RegionalMuon>> = BTreeMap::new();
        for subsystem in [Subsystem::Bmtf, Subsystem::Omtf, Subsystem::Emtf] {
            regional.insert(subsystem, BxCollection::new(spec.first_bx, spec.last_bx));
        }
        if spec.with_rpc {
            regional.insert(Subsystem::BarrelRpc, BxCollection::new(spec.first_bx, spec.last_bx));
        }

        let mut ugmt: BxCollection<Muon> = BxCollection::new(spec.first_bx, spec.last_bx);
        let mut reference = Vec::new();

        for m in &spec.muons {
            let bx = m.bx.max(spec.first_bx).min(spec.last_bx);
            let rm = self.regional_candidate(&m.truth);
            let subsystem = Subsystem::from_region(rm.region);

            if let Some(coll) = regional.get_mut(&subsystem) {
                let key = coll.size(bx);
                if m.merged != MergedMode::Absent {
                    let mu = self.merged_candidate(&rm, phi_calc, m.merged, key);
                    if let Err(e) = ugmt.push(bx, mu) {
                        warn!("Event {}: merged candidate dropped: {}", id, e);
                    }
                }
                if let Err(e) = coll.push(bx, rm.clone()) {
                    warn!("Event {}: {} candidate dropped: {}", id, subsystem, e);
                }
            }

            if m.rpc_duplicate && rm.region == TfRegion::Barrel {
                if let Some(rpc) = regional.get_mut(&Subsystem::BarrelRpc) {
                    if let Err(e) = rpc.push(bx, rm) {
                        warn!("Event {}: RPC duplicate dropped: {}", id, e);
                    }
                }
            }

            if m.in_reference {
                reference.push(self.reference_candidate(&m.truth));
            }
        }

        // Padded central record, plus empty neighbours
        while reference.len() < READOUT_SLOTS {
            reference.push(ReferenceMuon {
                pt: 0.0,
                eta: 0.0,
                phi: 0.0,
                quality: 0,
                empty: true,
            });
        }
        let bx_number = self.physics_rng.gen_range(1..3564);
        let gmt = GmtReadoutCollection {
            records: (-1..=1)
                .map(|bx_in_event| GmtReadoutRecord {
                    bx_in_event,
                    bx_number: (bx_number as i64 + bx_in_event as i64) as u32,
                    candidates: if bx_in_event == 0 {
                        reference.clone()
                    } else {
                        Vec::new()
                    },
                })
                .collect(),
        };

        let mut event = Event::new(id);
        for (subsystem, coll) in regional {
            event = event.with_regional(labels::regional(subsystem), coll);
        }
        event = event.with_muons(labels::UGMT, ugmt).with_gmt(labels::GMT, gmt);

        for tag in &spec.drop {
            event.regional.remove(tag);
            event.muons.remove(tag);
            event.gmt.remove(tag);
        }
        event
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use l1mu_core::MicroGmtPhi;
    use l1mu_env::EventSource;

    #[test]
    fn test_local_phi_inverts_global_phi() {
        for region in TfRegion::all() {
            for global in 0..GLOBAL_PHI_BINS {
                let (processor, local) = local_phi(global, region);
                assert_eq!(MicroGmtPhi.global_phi(local, region, processor), global);
                assert!(processor >= 0);
            }
        }
    }

    #[test]
    fn test_region_for() {
        let scales = ScaleConfig::default();
        assert_eq!(region_for(10, &scales), TfRegion::Barrel);
        assert_eq!(region_for(-92, &scales), TfRegion::OverlapNeg);
        assert_eq!(region_for(92, &scales), TfRegion::OverlapPos);
        assert_eq!(region_for(200, &scales), TfRegion::EndcapPos);
    }

    #[test]
    fn test_oracle_deterministic() {
        let mut oracle1 = Oracle::new(42);
        let mut oracle2 = Oracle::new(42);

        let spec1 = EventSpec::new(vec![MuonSpec::new(oracle1.sample_any())]);
        let spec2 = EventSpec::new(vec![MuonSpec::new(oracle2.sample_any())]);
        assert_eq!(spec1, spec2);

        // Same seed = same event
        let e1 = oracle1.build_event(&spec1, &MicroGmtPhi);
        let e2 = oracle2.build_event(&spec2, &MicroGmtPhi);
        assert_eq!(e1, e2);
    }

    #[test]
    fn test_keyed_event_layout() {
        let mut oracle = Oracle::new(7);
        let truth = oracle.sample_muon(0.1, 0.7);
        let spec = EventSpec::new(vec![MuonSpec::new(truth), MuonSpec::new(truth).at_bx(1)]);
        let event = oracle.build_event(&spec, &MicroGmtPhi);

        let bmtf = event.regional_muons(&labels::BMTF.into()).unwrap();
        assert_eq!(bmtf.size(0), 1);
        assert_eq!(bmtf.size(1), 1);

        let ugmt = event.muons(&labels::UGMT.into()).unwrap();
        let origin = ugmt.bx(1)[0].origin.unwrap();
        assert_eq!(origin.region, TfRegion::Barrel);
        assert_eq!(origin.key, 0);

        let gmt = event.gmt_readout(&labels::GMT.into()).unwrap();
        assert_eq!(gmt.central().len(), READOUT_SLOTS);
        assert_eq!(gmt.central().iter().filter(|c| !c.empty).count(), 2);
    }

    #[test]
    fn test_drop_removes_collection() {
        let mut oracle = Oracle::new(3);
        let mut spec = EventSpec::new(vec![]);
        spec.drop.push(InputTag::new(labels::OMTF));
        let event = oracle.build_event(&spec, &MicroGmtPhi);
        assert!(event.regional_muons(&labels::OMTF.into()).is_err());
        assert!(event.regional_muons(&labels::BMTF.into()).is_ok());
    }

    #[test]
    fn test_zero_resolution_reference() {
        let mut oracle = Oracle::new(9);
        oracle.set_resolution(Resolution {
            pt_rel: 0.0,
            eta: 0.0,
            phi: 0.0,
        });
        let truth = oracle.sample_muon(1.3, 2.0);
        let event = oracle.build_event(&EventSpec::new(vec![MuonSpec::new(truth)]), &MicroGmtPhi);

        let gmt = event.gmt_readout(&labels::GMT.into()).unwrap();
        let slot = &gmt.central()[0];
        assert_eq!(slot.pt, truth.pt);
        assert_eq!(slot.eta, truth.eta);
        assert_eq!(slot.phi, truth.phi);
    }

    #[test]
    fn test_inverted_bx_range_builds_empty_event() {
        let mut oracle = Oracle::new(4);
        let truth = oracle.sample_muon(0.1, 0.7);
        let mut spec = EventSpec::new(vec![MuonSpec::new(truth)]);
        spec.first_bx = 1;
        spec.last_bx = 0;

        let event = oracle.build_event(&spec, &MicroGmtPhi);
        assert!(event.muons(&labels::UGMT.into()).unwrap().is_empty());
        assert!(event.regional_muons(&labels::BMTF.into()).unwrap().is_empty());
    }
}
