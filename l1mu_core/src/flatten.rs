//! BX flattening into the per-event arena.
//!
//! Each subsystem's BX-bucketed collection is concatenated, in increasing BX
//! order, into one contiguous array. Alongside it we keep the candidate count
//! of every processed BX, so the flat index of the n-th candidate of BX k is
//! always
//!
//! ```text
//! index = sum(count[b] for processed b < k) + n
//! ```
//!
//! The arena is built from scratch for every event and is never shared
//! between events.

use crate::candidates::{RegionalCandidate, Subsystem, TfLink};
use crate::scales::{GlobalPhiCalculator, ScaleConfig};
use l1mu_env::{Bx, BxCollection, RegionalMuon};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// SUBSYSTEM ARRAY
// ============================================================================

/// The flattened candidates of one subsystem for one event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubsystemArray {
    subsystem: Subsystem,

    /// Candidates in (BX, native order)
    candidates: Vec<RegionalCandidate>,

    /// Candidate count per processed BX
    bx_counts: BTreeMap<Bx, usize>,
}

impl SubsystemArray {
    /// Creates an empty array (nothing processed).
    pub fn empty(subsystem: Subsystem) -> Self {
        Self {
            subsystem,
            candidates: Vec::new(),
            bx_counts: BTreeMap::new(),
        }
    }

    pub fn subsystem(&self) -> Subsystem {
        self.subsystem
    }

    /// Flat index of the first candidate of `bx`: the number of candidates in
    /// all processed BXs strictly before it.
    pub fn offset(&self, bx: Bx) -> usize {
        self.bx_counts.range(..bx).map(|(_, n)| *n).sum()
    }

    /// Candidate count of one BX (0 if not processed).
    pub fn count(&self, bx: Bx) -> usize {
        self.bx_counts.get(&bx).copied().unwrap_or(0)
    }

    /// True if `bx` was processed (possibly with zero candidates).
    pub fn processed(&self, bx: Bx) -> bool {
        self.bx_counts.contains_key(&bx)
    }

    /// The candidates of one BX, in native order (empty if not processed).
    pub fn bx_slice(&self, bx: Bx) -> &[RegionalCandidate] {
        let start = self.offset(bx);
        let end = start + self.count(bx);
        self.candidates.get(start..end).unwrap_or(&[])
    }

    pub fn bx_counts(&self) -> &BTreeMap<Bx, usize> {
        &self.bx_counts
    }

    pub fn candidates(&self) -> &[RegionalCandidate] {
        &self.candidates
    }

    pub fn get(&self, index: usize) -> Option<&RegionalCandidate> {
        self.candidates.get(index)
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

// ============================================================================
// FLATTENER
// ============================================================================

/// Converts and concatenates one subsystem collection.
pub struct BxFlattener<'a, P> {
    scales: &'a ScaleConfig,
    phi_calc: &'a P,
    only_central_bx: bool,
}

impl<'a, P: GlobalPhiCalculator> BxFlattener<'a, P> {
    pub fn new(scales: &'a ScaleConfig, phi_calc: &'a P, only_central_bx: bool) -> Self {
        Self {
            scales,
            phi_calc,
            only_central_bx,
        }
    }

    /// True if this BX takes part in flattening.
    #[inline]
    pub fn processes(&self, bx: Bx) -> bool {
        !self.only_central_bx || bx == 0
    }

    /// Flattens a collection over its own BX range.
    ///
    /// Skipped BXs are neither appended nor counted.
    pub fn ingest(&self, subsystem: Subsystem, coll: &BxCollection<RegionalMuon>) -> SubsystemArray {
        let mut array = SubsystemArray::empty(subsystem);

        for bx in coll.bx_range() {
            if !self.processes(bx) {
                continue;
            }
            let bucket = coll.bx(bx);
            array.candidates.extend(
                bucket
                    .iter()
                    .map(|mu| RegionalCandidate::from_raw(mu, bx, self.scales, self.phi_calc)),
            );
            array.bx_counts.insert(bx, bucket.len());
        }

        array
    }
}

// ============================================================================
// ARENA
// ============================================================================

/// One flattened array per subsystem for the current event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatArena {
    arrays: [SubsystemArray; 4],
}

impl FlatArena {
    /// Creates an arena with every subsystem empty.
    pub fn new() -> Self {
        Self {
            arrays: Subsystem::ALL.map(SubsystemArray::empty),
        }
    }

    /// Stores the flattened array of its subsystem, replacing any previous one.
    pub fn insert(&mut self, array: SubsystemArray) {
        let idx = array.subsystem.index();
        self.arrays[idx] = array;
    }

    pub fn array(&self, subsystem: Subsystem) -> &SubsystemArray {
        &self.arrays[subsystem.index()]
    }

    /// Running offset of `bx` for `subsystem`.
    pub fn offset(&self, subsystem: Subsystem, bx: Bx) -> usize {
        self.array(subsystem).offset(bx)
    }

    /// Dereferences a back-link into this event's arrays.
    pub fn resolve(&self, link: &TfLink) -> Option<&RegionalCandidate> {
        let (subsystem, index) = link.target()?;
        self.array(subsystem).get(index)
    }

    /// Total flattened candidates of one subsystem.
    pub fn count(&self, subsystem: Subsystem) -> usize {
        self.array(subsystem).len()
    }

    pub fn arrays(&self) -> impl Iterator<Item = &SubsystemArray> {
        self.arrays.iter()
    }
}

impl Default for FlatArena {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scales::MicroGmtPhi;
    use l1mu_env::TfRegion;

    fn mu(hw_pt: i32) -> RegionalMuon {
        RegionalMuon {
            hw_pt,
            hw_eta: 20,
            hw_phi: 5,
            hw_qual: 12,
            hw_sign: 0,
            hw_sign_valid: true,
            processor: 1,
            link: 37,
            track_address: 0,
            region: TfRegion::Barrel,
            data_word: 0,
        }
    }

    fn three_bx_collection() -> BxCollection<RegionalMuon> {
        BxCollection::new(-1, 1)
            .with_bx(-1, vec![mu(1), mu(2)])
            .unwrap()
            .with_bx(0, vec![mu(3)])
            .unwrap()
            .with_bx(1, vec![mu(4), mu(5), mu(6)])
            .unwrap()
    }

    #[test]
    fn test_offsets_follow_bx_counts() {
        let scales = ScaleConfig::default();
        let flattener = BxFlattener::new(&scales, &MicroGmtPhi, false);
        let array = flattener.ingest(Subsystem::Bmtf, &three_bx_collection());

        assert_eq!(array.len(), 6);
        assert_eq!(array.offset(-1), 0);
        assert_eq!(array.offset(0), 2);
        assert_eq!(array.offset(1), 3);
        assert_eq!(array.offset(5), 6);

        // n-th candidate of BX k lives at offset(k) + n
        assert_eq!(array.get(array.offset(1) + 2).unwrap().packed_pt, 6);
        assert_eq!(array.get(array.offset(0)).unwrap().bx, 0);

        let bx1: Vec<i32> = array.bx_slice(1).iter().map(|c| c.packed_pt).collect();
        assert_eq!(bx1, vec![4, 5, 6]);
        assert!(array.bx_slice(7).is_empty());
    }

    #[test]
    fn test_only_central_bx_skips_and_does_not_count() {
        let scales = ScaleConfig::default();
        let flattener = BxFlattener::new(&scales, &MicroGmtPhi, true);
        let array = flattener.ingest(Subsystem::Bmtf, &three_bx_collection());

        assert_eq!(array.len(), 1);
        assert!(!array.processed(-1));
        assert!(array.processed(0));
        assert_eq!(array.offset(0), 0);
        assert_eq!(array.get(0).unwrap().packed_pt, 3);
    }

    #[test]
    fn test_empty_collection() {
        let scales = ScaleConfig::default();
        let flattener = BxFlattener::new(&scales, &MicroGmtPhi, false);
        let array = flattener.ingest(Subsystem::Emtf, &BxCollection::new(-2, 2));

        assert!(array.is_empty());
        assert!(array.bx_counts().values().all(|n| *n == 0));
        assert_eq!(array.bx_counts().len(), 5);
    }

    #[test]
    fn test_flattening_is_idempotent() {
        let scales = ScaleConfig::default();
        let flattener = BxFlattener::new(&scales, &MicroGmtPhi, false);
        let coll = three_bx_collection();

        let first = flattener.ingest(Subsystem::Omtf, &coll);
        let second = flattener.ingest(Subsystem::Omtf, &coll);

        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[test]
    fn test_arena_resolve() {
        let scales = ScaleConfig::default();
        let flattener = BxFlattener::new(&scales, &MicroGmtPhi, false);
        let mut arena = FlatArena::new();
        arena.insert(flattener.ingest(Subsystem::Emtf, &three_bx_collection()));

        assert_eq!(arena.count(Subsystem::Emtf), 6);
        assert_eq!(arena.count(Subsystem::Bmtf), 0);
        assert_eq!(arena.offset(Subsystem::Emtf, 1), 3);

        let target = arena.resolve(&TfLink::new(Subsystem::Emtf, 4)).unwrap();
        assert_eq!(target.packed_pt, 5);
        assert!(arena.resolve(&TfLink::new(Subsystem::Bmtf, 0)).is_none());
        assert!(arena.resolve(&TfLink::unresolved()).is_none());
    }
}
