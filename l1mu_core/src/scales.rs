//! Hardware scale conversion and the local-to-global phi mapping.

use l1mu_env::TfRegion;
use serde::{Deserialize, Serialize};

/// Number of global phi bins in one full turn.
pub const GLOBAL_PHI_BINS: i32 = 576;

/// Conversion constants from packed hardware values to physical units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScaleConfig {
    /// GeV per pt bin (default: 0.5)
    pub pt: f64,

    /// Pseudorapidity per eta bin (default: 0.010875)
    pub eta: f64,

    /// Radians per global phi bin (default: 0.010908 ~ 2π/576)
    pub phi: f64,
}

impl Default for ScaleConfig {
    fn default() -> Self {
        Self {
            pt: 0.5,
            eta: 0.010875,
            phi: 0.010908,
        }
    }
}

impl ScaleConfig {
    #[inline]
    pub fn pt(&self, hw_pt: i32) -> f64 {
        hw_pt as f64 * self.pt
    }

    #[inline]
    pub fn eta(&self, hw_eta: i32) -> f64 {
        hw_eta as f64 * self.eta
    }

    /// Converts a *global* packed phi.
    #[inline]
    pub fn phi(&self, hw_global_phi: i32) -> f64 {
        hw_global_phi as f64 * self.phi
    }
}

/// Maps a processor-local phi to the global phi scale shared by all
/// subsystems.
///
/// Implementations must be pure: equal inputs give equal outputs.
pub trait GlobalPhiCalculator {
    fn global_phi(&self, local_phi: i32, region: TfRegion, processor: i32) -> i32;
}

impl<F> GlobalPhiCalculator for F
where
    F: Fn(i32, TfRegion, i32) -> i32,
{
    fn global_phi(&self, local_phi: i32, region: TfRegion, processor: i32) -> i32 {
        self(local_phi, region, processor)
    }
}

/// Sector geometry of the upgraded global muon trigger.
///
/// Barrel processors cover 30° wedges (48 bins) starting at -15°; overlap and
/// endcap processors cover 60° sectors (96 bins) starting at +15°.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MicroGmtPhi;

impl GlobalPhiCalculator for MicroGmtPhi {
    fn global_phi(&self, local_phi: i32, region: TfRegion, processor: i32) -> i32 {
        let (width, origin) = match region {
            TfRegion::Barrel => (48, -24),
            TfRegion::OverlapNeg
            | TfRegion::OverlapPos
            | TfRegion::EndcapNeg
            | TfRegion::EndcapPos => (96, 24),
        };
        // Widened so out-of-range processor ids still land on the circle
        let phi = i64::from(processor) * width + i64::from(local_phi) + origin;
        phi.rem_euclid(i64::from(GLOBAL_PHI_BINS)) as i32
    }
}
