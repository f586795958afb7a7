//! Emulator vs. unpacker comparison of merged candidates at BX 0.

use l1mu_env::{BxCollection, Muon};
use serde::{Deserialize, Serialize};

/// Packed differences (emulator - unpacker) of one candidate pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackedDiff {
    pub pt: i32,
    pub eta: i32,
    pub phi: i32,
    pub charge: i32,
    pub charge_valid: i32,
    pub quality: i32,
    pub iso: i32,
}

impl PackedDiff {
    /// Field-wise differences, wrapping on out-of-range packed words.
    pub fn between(emu: &Muon, unp: &Muon) -> Self {
        Self {
            pt: emu.hw_pt.wrapping_sub(unp.hw_pt),
            eta: emu.hw_eta.wrapping_sub(unp.hw_eta),
            phi: emu.hw_phi.wrapping_sub(unp.hw_phi),
            charge: emu.hw_charge.wrapping_sub(unp.hw_charge),
            charge_valid: emu.hw_charge_valid as i32 - unp.hw_charge_valid as i32,
            quality: emu.hw_qual.wrapping_sub(unp.hw_qual),
            iso: emu.hw_iso.wrapping_sub(unp.hw_iso),
        }
    }

    /// True if every field agrees.
    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }
}

/// Central-BX agreement of two merged collections.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmulatorComparison {
    /// Emulator size - unpacker size at BX 0
    pub size_diff: i64,

    /// Pairwise diffs up to the shorter collection, in native order
    pub diffs: Vec<PackedDiff>,
}

impl EmulatorComparison {
    pub fn compare(emulator: &BxCollection<Muon>, unpacker: &BxCollection<Muon>) -> Self {
        let emu = emulator.bx(0);
        let unp = unpacker.bx(0);

        Self {
            size_diff: emu.len() as i64 - unp.len() as i64,
            diffs: emu
                .iter()
                .zip(unp)
                .map(|(e, u)| PackedDiff::between(e, u))
                .collect(),
        }
    }

    /// Sizes agree and every pair is identical.
    pub fn is_identical(&self) -> bool {
        self.size_diff == 0 && self.diffs.iter().all(PackedDiff::is_zero)
    }

    /// Number of pairs with at least one differing field.
    pub fn mismatches(&self) -> usize {
        self.diffs.iter().filter(|d| !d.is_zero()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn muon(hw_pt: i32, hw_phi: i32, hw_iso: i32) -> Muon {
        Muon {
            hw_pt,
            hw_eta: -30,
            hw_phi,
            hw_qual: 12,
            hw_charge: 1,
            hw_charge_valid: true,
            hw_iso,
            hw_iso_sum: 0,
            hw_rank: 0,
            origin: None,
        }
    }

    #[test]
    fn test_identical_collections() {
        let coll = BxCollection::central()
            .with_bx(0, vec![muon(10, 100, 0), muon(22, 300, 1)])
            .unwrap();
        let cmp = EmulatorComparison::compare(&coll, &coll);
        assert!(cmp.is_identical());
        assert_eq!(cmp.diffs.len(), 2);
    }

    #[test]
    fn test_pairwise_diffs_and_size() {
        let emu = BxCollection::central()
            .with_bx(0, vec![muon(10, 100, 0), muon(22, 300, 3), muon(5, 5, 0)])
            .unwrap();
        let mut unp_second = muon(20, 302, 1);
        unp_second.hw_charge_valid = false;
        let unp = BxCollection::central()
            .with_bx(0, vec![muon(10, 100, 0), unp_second])
            .unwrap();

        let cmp = EmulatorComparison::compare(&emu, &unp);
        assert_eq!(cmp.size_diff, 1);
        assert_eq!(cmp.diffs.len(), 2);
        assert!(cmp.diffs[0].is_zero());
        assert_eq!(
            cmp.diffs[1],
            PackedDiff {
                pt: 2,
                eta: 0,
                phi: -2,
                charge: 0,
                charge_valid: 1,
                quality: 0,
                iso: 2,
            }
        );
        assert_eq!(cmp.mismatches(), 1);
        assert!(!cmp.is_identical());
    }

    #[test]
    fn test_only_central_bx_compared() {
        let emu = BxCollection::new(-1, 1)
            .with_bx(-1, vec![muon(1, 1, 0)])
            .unwrap();
        let unp = BxCollection::new(-1, 1);
        let cmp = EmulatorComparison::compare(&emu, &unp);
        assert!(cmp.is_identical());
    }

    #[test]
    fn test_extreme_packed_values_do_not_overflow() {
        let emu = muon(i32::MAX, i32::MIN, 0);
        let unp = muon(-1, 1, 0);
        let diff = PackedDiff::between(&emu, &unp);
        assert_eq!(diff.pt, i32::MIN);
        assert_eq!(diff.phi, i32::MAX);
        assert!(!diff.is_zero());
    }
}
