//! Raw per-event data model as delivered by the hardware readout.
//!
//! Everything here carries packed, hardware-quantized values. Conversion to
//! physical units and any cross-collection bookkeeping happen in `l1mu_core`.

use crate::error::EnvError;
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;

/// Bunch crossing relative to the nominal central crossing (BX 0).
pub type Bx = i32;

/// Idle pattern sent on a link when no candidate is present.
pub const COMMA_WORD: u64 = 0x5050_50bc;

/// Subsystem + detector side of a regional candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TfRegion {
    Barrel,
    OverlapNeg,
    OverlapPos,
    EndcapNeg,
    EndcapPos,
}

impl TfRegion {
    /// Returns all regions in canonical order.
    pub fn all() -> [TfRegion; 5] {
        [
            TfRegion::Barrel,
            TfRegion::OverlapNeg,
            TfRegion::OverlapPos,
            TfRegion::EndcapNeg,
            TfRegion::EndcapPos,
        ]
    }

    /// Returns the region name.
    pub fn name(&self) -> &'static str {
        match self {
            TfRegion::Barrel => "barrel",
            TfRegion::OverlapNeg => "overlap_neg",
            TfRegion::OverlapPos => "overlap_pos",
            TfRegion::EndcapNeg => "endcap_neg",
            TfRegion::EndcapPos => "endcap_pos",
        }
    }
}

impl std::fmt::Display for TfRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// One candidate reported by a regional track finder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionalMuon {
    pub hw_pt: i32,
    pub hw_eta: i32,
    /// Local phi, relative to the processor's sector
    pub hw_phi: i32,
    pub hw_qual: i32,
    /// -1, 0 or 1
    pub hw_sign: i32,
    pub hw_sign_valid: bool,
    pub processor: i32,
    pub link: i32,
    pub track_address: i32,
    pub region: TfRegion,
    /// Raw 64-bit word as read from the link (0 if not recorded)
    #[serde(default)]
    pub data_word: u64,
}

impl RegionalMuon {
    /// True if either 32-bit half of the data word is a link comma.
    pub fn is_comma(&self) -> bool {
        (self.data_word & 0xFFFF_FFFF) == COMMA_WORD || (self.data_word >> 32) == COMMA_WORD
    }
}

/// Where a merged candidate came from: its regional input and its index
/// within that region's candidates of the same BX.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OriginKey {
    pub region: TfRegion,
    pub key: usize,
}

/// One merged candidate produced by the global muon trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Muon {
    pub hw_pt: i32,
    pub hw_eta: i32,
    /// Global phi
    pub hw_phi: i32,
    pub hw_qual: i32,
    pub hw_charge: i32,
    pub hw_charge_valid: bool,
    /// bit 0 = absolute isolation, bit 1 = relative isolation
    #[serde(default)]
    pub hw_iso: i32,
    #[serde(default)]
    pub hw_iso_sum: i32,
    #[serde(default)]
    pub hw_rank: i32,
    #[serde(default)]
    pub origin: Option<OriginKey>,
}

/// One candidate of the legacy GMT readout, already in physical units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceMuon {
    pub pt: f64,
    pub eta: f64,
    pub phi: f64,
    #[serde(default)]
    pub quality: i32,
    #[serde(default)]
    pub empty: bool,
}

/// Legacy readout for one BX of the event window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GmtReadoutRecord {
    pub bx_in_event: Bx,
    /// Absolute bunch-crossing number within the orbit
    pub bx_number: u32,
    pub candidates: Vec<ReferenceMuon>,
}

impl GmtReadoutRecord {
    /// Iterates the non-empty candidate slots.
    pub fn non_empty(&self) -> impl Iterator<Item = &ReferenceMuon> {
        self.candidates.iter().filter(|c| !c.empty)
    }
}

/// All legacy readout records of one event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GmtReadoutCollection {
    pub records: Vec<GmtReadoutRecord>,
}

impl GmtReadoutCollection {
    /// Returns the first record for the requested BX.
    pub fn record(&self, bx: Bx) -> Option<&GmtReadoutRecord> {
        self.records.iter().find(|r| r.bx_in_event == bx)
    }

    /// Returns the candidate slots of the central record (empty if absent).
    pub fn central(&self) -> &[ReferenceMuon] {
        self.record(0).map(|r| r.candidates.as_slice()).unwrap_or(&[])
    }
}

/// Widest BX range a collection may declare: one LHC orbit.
pub const MAX_BX_SPAN: usize = 3564;

/// Number of BXs in `[first_bx, last_bx]`, or `None` past [`MAX_BX_SPAN`].
fn bx_span(first_bx: Bx, last_bx: Bx) -> Option<usize> {
    let span = (i64::from(last_bx) - i64::from(first_bx) + 1).max(0);
    usize::try_from(span).ok().filter(|&n| n <= MAX_BX_SPAN)
}

/// A collection partitioned by bunch crossing.
///
/// Holds one ordered bucket per BX in `[first_bx, last_bx]`. The range comes
/// with the data; requests outside it yield an empty bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BxCollection<T> {
    first_bx: Bx,
    last_bx: Bx,
    buckets: Vec<Vec<T>>,
}

impl<T> BxCollection<T> {
    /// Creates an empty collection covering `[first_bx, last_bx]`.
    ///
    /// A range wider than [`MAX_BX_SPAN`] gets no buckets and fails
    /// [`validate`](Self::validate).
    pub fn new(first_bx: Bx, last_bx: Bx) -> Self {
        let len = bx_span(first_bx, last_bx).unwrap_or(0);
        Self {
            first_bx,
            last_bx,
            buckets: (0..len).map(|_| Vec::new()).collect(),
        }
    }

    /// Creates a collection covering only BX 0.
    pub fn central() -> Self {
        Self::new(0, 0)
    }

    /// Appends a candidate to its BX bucket.
    pub fn push(&mut self, bx: Bx, item: T) -> Result<(), EnvError> {
        let idx = self.index_of(bx).ok_or_else(|| {
            EnvError::invalid(format!(
                "BX {} outside collection range [{}, {}]",
                bx, self.first_bx, self.last_bx
            ))
        })?;
        self.buckets[idx].push(item);
        Ok(())
    }

    /// Replaces the contents of one BX bucket (builder style).
    pub fn with_bx(mut self, bx: Bx, items: Vec<T>) -> Result<Self, EnvError> {
        let idx = self
            .index_of(bx)
            .ok_or_else(|| EnvError::invalid(format!("BX {} outside collection range", bx)))?;
        self.buckets[idx] = items;
        Ok(self)
    }

    pub fn first_bx(&self) -> Bx {
        self.first_bx
    }

    pub fn last_bx(&self) -> Bx {
        self.last_bx
    }

    /// BXs in increasing order.
    pub fn bx_range(&self) -> RangeInclusive<Bx> {
        self.first_bx..=self.last_bx
    }

    /// Candidates of one BX in native order.
    pub fn bx(&self, bx: Bx) -> &[T] {
        match self.index_of(bx) {
            Some(idx) => &self.buckets[idx],
            None => &[],
        }
    }

    /// Number of candidates in one BX.
    pub fn size(&self, bx: Bx) -> usize {
        self.bx(bx).len()
    }

    /// Total number of candidates over all BXs.
    pub fn len(&self) -> usize {
        self.buckets.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterates `(bx, candidate)` in increasing BX, then native order.
    pub fn iter(&self) -> impl Iterator<Item = (Bx, &T)> {
        self.bx_range()
            .zip(self.buckets.iter())
            .flat_map(|(bx, bucket)| bucket.iter().map(move |item| (bx, item)))
    }

    /// Checks that the bucket count agrees with the declared BX range.
    pub fn validate(&self) -> Result<(), EnvError> {
        let Some(expected) = bx_span(self.first_bx, self.last_bx) else {
            return Err(EnvError::invalid(format!(
                "range [{}, {}] spans more than {} BXs",
                self.first_bx, self.last_bx, MAX_BX_SPAN
            )));
        };
        if self.buckets.len() != expected {
            return Err(EnvError::invalid(format!(
                "range [{}, {}] declares {} BXs but {} buckets are present",
                self.first_bx,
                self.last_bx,
                expected,
                self.buckets.len()
            )));
        }
        Ok(())
    }

    fn index_of(&self, bx: Bx) -> Option<usize> {
        if bx < self.first_bx || bx > self.last_bx {
            return None;
        }
        let idx = usize::try_from(i64::from(bx) - i64::from(self.first_bx)).ok()?;
        (idx < self.buckets.len()).then_some(idx)
    }
}

impl<T> Default for BxCollection<T> {
    fn default() -> Self {
        Self::central()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn regional(hw_pt: i32) -> RegionalMuon {
        RegionalMuon {
            hw_pt,
            hw_eta: 10,
            hw_phi: 20,
            hw_qual: 12,
            hw_sign: 1,
            hw_sign_valid: true,
            processor: 3,
            link: 42,
            track_address: 0,
            region: TfRegion::Barrel,
            data_word: 0,
        }
    }

    #[test]
    fn test_bx_collection_buckets() {
        let mut coll = BxCollection::new(-2, 2);
        coll.push(-1, regional(1)).unwrap();
        coll.push(1, regional(2)).unwrap();
        coll.push(1, regional(3)).unwrap();

        assert_eq!(coll.size(-2), 0);
        assert_eq!(coll.size(-1), 1);
        assert_eq!(coll.size(1), 2);
        assert_eq!(coll.len(), 3);
        assert_eq!(coll.bx(1)[1].hw_pt, 3);
    }

    #[test]
    fn test_bx_collection_out_of_range() {
        let mut coll: BxCollection<RegionalMuon> = BxCollection::central();
        assert!(coll.push(3, regional(1)).is_err());
        assert!(coll.bx(7).is_empty());
        assert_eq!(coll.size(-7), 0);
    }

    #[test]
    fn test_bx_collection_iter_order() {
        let coll = BxCollection::new(-1, 1)
            .with_bx(1, vec![regional(30)])
            .unwrap()
            .with_bx(-1, vec![regional(10), regional(11)])
            .unwrap();

        let order: Vec<(Bx, i32)> = coll.iter().map(|(bx, mu)| (bx, mu.hw_pt)).collect();
        assert_eq!(order, vec![(-1, 10), (-1, 11), (1, 30)]);
    }

    #[test]
    fn test_bx_collection_validate() {
        let coll: BxCollection<RegionalMuon> =
            serde_json::from_str(r#"{"first_bx":-1,"last_bx":1,"buckets":[[],[]]}"#).unwrap();
        assert!(coll.validate().is_err());
    }

    #[test]
    fn test_comma_detection() {
        let mut mu = regional(5);
        assert!(!mu.is_comma());

        mu.data_word = 0x1234_5678_5050_50bc;
        assert!(mu.is_comma());

        mu.data_word = 0x5050_50bc_0000_0001;
        assert!(mu.is_comma());
    }

    #[test]
    fn test_gmt_central_record() {
        let coll = GmtReadoutCollection {
            records: vec![
                GmtReadoutRecord { bx_in_event: -1, bx_number: 99, candidates: vec![] },
                GmtReadoutRecord {
                    bx_in_event: 0,
                    bx_number: 100,
                    candidates: vec![
                        ReferenceMuon { pt: 10.0, eta: 0.5, phi: 1.0, quality: 6, empty: false },
                        ReferenceMuon { pt: 0.0, eta: 0.0, phi: 0.0, quality: 0, empty: true },
                    ],
                },
            ],
        };

        assert_eq!(coll.central().len(), 2);
        assert_eq!(coll.record(0).unwrap().non_empty().count(), 1);
        assert!(coll.record(2).is_none());
    }
}
