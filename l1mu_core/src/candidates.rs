//! Per-event output value types: flattened regional candidates, merged
//! candidates and the back-link between them.

use crate::scales::{GlobalPhiCalculator, ScaleConfig};
use l1mu_env::{Bx, Muon, RegionalMuon, TfRegion};
use serde::{Deserialize, Serialize};

// ============================================================================
// SUBSYSTEMS
// ============================================================================

/// Regional track-finder subsystems feeding the global trigger.
///
/// Declaration order is the attribute-matching priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Subsystem {
    Bmtf,
    Omtf,
    Emtf,
    BarrelRpc,
}

impl Subsystem {
    /// All subsystems in priority order.
    pub const ALL: [Subsystem; 4] = [
        Subsystem::Bmtf,
        Subsystem::Omtf,
        Subsystem::Emtf,
        Subsystem::BarrelRpc,
    ];

    /// Dense index for per-subsystem arrays.
    #[inline]
    pub fn index(self) -> usize {
        match self {
            Subsystem::Bmtf => 0,
            Subsystem::Omtf => 1,
            Subsystem::Emtf => 2,
            Subsystem::BarrelRpc => 3,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Subsystem::Bmtf => "bmtf",
            Subsystem::Omtf => "omtf",
            Subsystem::Emtf => "emtf",
            Subsystem::BarrelRpc => "barrel_rpc",
        }
    }

    /// Track finder responsible for a region.
    ///
    /// The barrel RPC stream shares the barrel region, so a region alone
    /// always resolves to the barrel track finder.
    pub fn from_region(region: TfRegion) -> Subsystem {
        match region {
            TfRegion::Barrel => Subsystem::Bmtf,
            TfRegion::OverlapNeg | TfRegion::OverlapPos => Subsystem::Omtf,
            TfRegion::EndcapNeg | TfRegion::EndcapPos => Subsystem::Emtf,
        }
    }
}

impl std::fmt::Display for Subsystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for Subsystem {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "bmtf" => Ok(Subsystem::Bmtf),
            "omtf" => Ok(Subsystem::Omtf),
            "emtf" => Ok(Subsystem::Emtf),
            "barrel_rpc" | "rpc" => Ok(Subsystem::BarrelRpc),
            _ => Err(format!("Unknown subsystem: {}", s)),
        }
    }
}

// ============================================================================
// BACK-LINK
// ============================================================================

/// Weak reference from a merged candidate to the regional candidate that
/// produced it.
///
/// The index addresses the subsystem's flattened array of the *same* event.
/// An unresolved link has no subsystem and index -1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TfLink {
    subsystem: Option<Subsystem>,
    index: i64,
}

impl TfLink {
    /// Creates a resolved link.
    pub fn new(subsystem: Subsystem, index: usize) -> Self {
        Self {
            subsystem: Some(subsystem),
            index: index as i64,
        }
    }

    /// The "no contributing regional candidate found" sentinel.
    pub fn unresolved() -> Self {
        Self {
            subsystem: None,
            index: -1,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.subsystem.is_some()
    }

    pub fn subsystem(&self) -> Option<Subsystem> {
        self.subsystem
    }

    /// Flat index, -1 when unresolved.
    pub fn index(&self) -> i64 {
        self.index
    }

    /// `(subsystem, flat index)` of a resolved link.
    pub fn target(&self) -> Option<(Subsystem, usize)> {
        self.subsystem.map(|s| (s, self.index as usize))
    }
}

impl Default for TfLink {
    fn default() -> Self {
        Self::unresolved()
    }
}

impl std::fmt::Display for TfLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.subsystem {
            Some(s) => write!(f, "{}[{}]", s, self.index),
            None => write!(f, "none[-1]"),
        }
    }
}

// ============================================================================
// REGIONAL CANDIDATE (flattened)
// ============================================================================

/// A regional candidate after unit conversion, as stored in the per-event
/// flattened array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionalCandidate {
    pub pt: f64,
    pub eta: f64,
    /// Global phi in radians
    pub phi: f64,

    pub packed_pt: i32,
    pub packed_eta: i32,
    /// Local phi as delivered by the processor
    pub packed_phi: i32,
    pub packed_global_phi: i32,

    pub quality: i32,
    pub sign: i32,
    pub sign_valid: bool,
    pub processor: i32,
    pub link: i32,
    pub track_address: i32,
    pub region: TfRegion,
    pub bx: Bx,
}

impl RegionalCandidate {
    /// Converts a raw regional candidate seen at `bx`.
    pub fn from_raw<P: GlobalPhiCalculator>(
        mu: &RegionalMuon,
        bx: Bx,
        scales: &ScaleConfig,
        phi_calc: &P,
    ) -> Self {
        let global_phi = phi_calc.global_phi(mu.hw_phi, mu.region, mu.processor);
        Self {
            pt: scales.pt(mu.hw_pt),
            eta: scales.eta(mu.hw_eta),
            phi: scales.phi(global_phi),
            packed_pt: mu.hw_pt,
            packed_eta: mu.hw_eta,
            packed_phi: mu.hw_phi,
            packed_global_phi: global_phi,
            quality: mu.hw_qual,
            sign: mu.hw_sign,
            sign_valid: mu.hw_sign_valid,
            processor: mu.processor,
            link: mu.link,
            track_address: mu.track_address,
            region: mu.region,
            bx,
        }
    }
}

// ============================================================================
// GLOBAL CANDIDATE
// ============================================================================

/// A merged candidate with its back-link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalCandidate {
    pub pt: f64,
    pub eta: f64,
    pub phi: f64,

    pub packed_pt: i32,
    pub packed_eta: i32,
    pub packed_phi: i32,

    pub quality: i32,
    pub charge: i32,
    pub charge_valid: bool,
    /// Absolute isolation bit (0/1)
    pub abs_iso: i32,
    /// Relative isolation bit (0/1)
    pub rel_iso: i32,
    pub packed_iso: i32,
    pub iso_energy: i32,
    pub rank: i32,
    pub bx: Bx,

    pub link: TfLink,
}

impl GlobalCandidate {
    /// Converts a raw merged candidate seen at `bx`.
    pub fn from_muon(mu: &Muon, bx: Bx, scales: &ScaleConfig, link: TfLink) -> Self {
        Self {
            pt: scales.pt(mu.hw_pt),
            eta: scales.eta(mu.hw_eta),
            phi: scales.phi(mu.hw_phi),
            packed_pt: mu.hw_pt,
            packed_eta: mu.hw_eta,
            packed_phi: mu.hw_phi,
            quality: mu.hw_qual,
            charge: mu.hw_charge,
            charge_valid: mu.hw_charge_valid,
            abs_iso: mu.hw_iso & 1,
            rel_iso: (mu.hw_iso >> 1) & 1,
            packed_iso: mu.hw_iso,
            iso_energy: mu.hw_iso_sum,
            rank: mu.hw_rank,
            bx,
            link,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scales::MicroGmtPhi;
    use approx::assert_relative_eq;

    fn sample_muon(hw_iso: i32) -> Muon {
        Muon {
            hw_pt: 41,
            hw_eta: 92,
            hw_phi: 100,
            hw_qual: 12,
            hw_charge: 0,
            hw_charge_valid: true,
            hw_iso,
            hw_iso_sum: 7,
            hw_rank: 33,
            origin: None,
        }
    }

    #[test]
    fn test_tf_link_sentinel() {
        let link = TfLink::unresolved();
        assert!(!link.is_resolved());
        assert_eq!(link.index(), -1);
        assert_eq!(link.subsystem(), None);
        assert_eq!(link.target(), None);
        assert_eq!(TfLink::default(), link);
    }

    #[test]
    fn test_tf_link_resolved() {
        let link = TfLink::new(Subsystem::Omtf, 4);
        assert!(link.is_resolved());
        assert_eq!(link.target(), Some((Subsystem::Omtf, 4)));
        assert_eq!(link.to_string(), "omtf[4]");
    }

    #[test]
    fn test_region_to_subsystem() {
        assert_eq!(Subsystem::from_region(TfRegion::Barrel), Subsystem::Bmtf);
        assert_eq!(Subsystem::from_region(TfRegion::OverlapNeg), Subsystem::Omtf);
        assert_eq!(Subsystem::from_region(TfRegion::EndcapPos), Subsystem::Emtf);
    }

    #[test]
    fn test_isolation_bits() {
        let scales = ScaleConfig::default();
        let none = GlobalCandidate::from_muon(&sample_muon(0), 0, &scales, TfLink::unresolved());
        assert_eq!((none.abs_iso, none.rel_iso), (0, 0));

        let abs = GlobalCandidate::from_muon(&sample_muon(1), 0, &scales, TfLink::unresolved());
        assert_eq!((abs.abs_iso, abs.rel_iso), (1, 0));

        let both = GlobalCandidate::from_muon(&sample_muon(3), 0, &scales, TfLink::unresolved());
        assert_eq!((both.abs_iso, both.rel_iso), (1, 1));
        assert_eq!(both.packed_iso, 3);
    }

    #[test]
    fn test_global_candidate_units() {
        let scales = ScaleConfig::default();
        let gc = GlobalCandidate::from_muon(&sample_muon(0), -1, &scales, TfLink::new(Subsystem::Bmtf, 0));
        assert_relative_eq!(gc.pt, 20.5);
        assert_relative_eq!(gc.eta, 1.0005);
        assert_relative_eq!(gc.phi, 1.0908);
        assert_eq!(gc.bx, -1);
        assert_eq!(gc.rank, 33);
    }

    #[test]
    fn test_regional_candidate_uses_global_phi() {
        let raw = RegionalMuon {
            hw_pt: 10,
            hw_eta: -40,
            hw_phi: 10,
            hw_qual: 8,
            hw_sign: -1,
            hw_sign_valid: true,
            processor: 3,
            link: 47,
            track_address: 1234,
            region: TfRegion::Barrel,
            data_word: 0,
        };
        let rc = RegionalCandidate::from_raw(&raw, 2, &ScaleConfig::default(), &MicroGmtPhi);
        assert_eq!(rc.packed_phi, 10);
        assert_eq!(rc.packed_global_phi, 130);
        assert_relative_eq!(rc.phi, 130.0 * 0.010908);
        assert_eq!(rc.bx, 2);
    }

    #[test]
    fn test_subsystem_parse() {
        assert_eq!("BMTF".parse::<Subsystem>().unwrap(), Subsystem::Bmtf);
        assert_eq!("rpc".parse::<Subsystem>().unwrap(), Subsystem::BarrelRpc);
        assert!("gmt".parse::<Subsystem>().is_err());
    }
}
