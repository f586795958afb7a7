//! Back-link resolution from merged candidates to regional candidates.
//!
//! Two strategies implement [`LinkResolver`]:
//!
//! - [`OriginKeyResolver`] trusts the origin key carried by the merged
//!   candidate (region + index within that region's BX bucket).
//! - [`AttributeMatchResolver`] rediscovers the contributor by exact packed
//!   equality of eta, global phi, pt and quality, scanning subsystems in
//!   priority order.
//!
//! [`ChainedResolver`] tries the first and falls back to the second. Which one
//! runs is picked per deployment through [`LinkStrategy`].

use crate::candidates::{RegionalCandidate, Subsystem, TfLink};
use crate::flatten::FlatArena;
use l1mu_env::{Bx, Muon};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Everything a resolver may look at for one merged candidate.
#[derive(Debug, Clone, Copy)]
pub struct LinkContext<'a> {
    /// Flattened regional arrays of the current event
    pub arena: &'a FlatArena,
    /// BX the merged candidate was read from
    pub bx: Bx,
}

impl<'a> LinkContext<'a> {
    pub fn new(arena: &'a FlatArena, bx: Bx) -> Self {
        Self { arena, bx }
    }

    /// Native-order candidates of one subsystem at the current BX.
    pub fn bucket(&self, subsystem: Subsystem) -> &'a [RegionalCandidate] {
        self.arena.array(subsystem).bx_slice(self.bx)
    }

    /// Flat index of the first candidate of the current BX.
    pub fn offset(&self, subsystem: Subsystem) -> usize {
        self.arena.offset(subsystem, self.bx)
    }
}

/// Strategy producing the back-link of a merged candidate.
///
/// Implementations never fail: "not found" is the unresolved sentinel.
pub trait LinkResolver {
    fn name(&self) -> &'static str;

    fn resolve(&self, muon: &Muon, ctx: &LinkContext<'_>) -> TfLink;
}

// ============================================================================
// ORIGIN KEY
// ============================================================================

/// Resolves through the merged candidate's origin key.
#[derive(Debug, Clone, Copy, Default)]
pub struct OriginKeyResolver;

impl LinkResolver for OriginKeyResolver {
    fn name(&self) -> &'static str {
        "origin_key"
    }

    fn resolve(&self, muon: &Muon, ctx: &LinkContext<'_>) -> TfLink {
        let Some(origin) = muon.origin else {
            return TfLink::unresolved();
        };

        let subsystem = Subsystem::from_region(origin.region);
        let count = ctx.arena.array(subsystem).count(ctx.bx);
        if origin.key >= count {
            warn!(
                "Origin key {} beyond {} {} candidates at BX {}",
                origin.key, count, subsystem, ctx.bx
            );
        }

        TfLink::new(subsystem, ctx.offset(subsystem) + origin.key)
    }
}

// ============================================================================
// ATTRIBUTE MATCH
// ============================================================================

/// Resolves by exact packed-attribute equality.
///
/// Subsystems are scanned in [`Subsystem::ALL`] order; the first subsystem
/// with any match wins, and within it the lowest native index.
#[derive(Debug, Clone, Copy, Default)]
pub struct AttributeMatchResolver;

impl AttributeMatchResolver {
    #[inline]
    fn matches(candidate: &RegionalCandidate, muon: &Muon) -> bool {
        candidate.packed_eta == muon.hw_eta
            && candidate.packed_global_phi == muon.hw_phi
            && candidate.packed_pt == muon.hw_pt
            && candidate.quality == muon.hw_qual
    }
}

impl LinkResolver for AttributeMatchResolver {
    fn name(&self) -> &'static str {
        "attribute_match"
    }

    fn resolve(&self, muon: &Muon, ctx: &LinkContext<'_>) -> TfLink {
        for subsystem in Subsystem::ALL {
            let hit = ctx
                .bucket(subsystem)
                .iter()
                .position(|c| Self::matches(c, muon));

            if let Some(i) = hit {
                return TfLink::new(subsystem, ctx.offset(subsystem) + i);
            }
        }
        TfLink::unresolved()
    }
}

// ============================================================================
// CHAINED
// ============================================================================

/// Tries `primary`, then `fallback` when the first yields the sentinel.
pub struct ChainedResolver {
    primary: Box<dyn LinkResolver>,
    fallback: Box<dyn LinkResolver>,
}

impl ChainedResolver {
    pub fn new(primary: Box<dyn LinkResolver>, fallback: Box<dyn LinkResolver>) -> Self {
        Self { primary, fallback }
    }
}

impl LinkResolver for ChainedResolver {
    fn name(&self) -> &'static str {
        "chained"
    }

    fn resolve(&self, muon: &Muon, ctx: &LinkContext<'_>) -> TfLink {
        let link = self.primary.resolve(muon, ctx);
        if link.is_resolved() {
            link
        } else {
            self.fallback.resolve(muon, ctx)
        }
    }
}

// ============================================================================
// STRATEGY SELECTION
// ============================================================================

/// Configured link-resolution strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkStrategy {
    OriginKey,
    AttributeMatch,
    #[default]
    OriginKeyThenAttributes,
}

impl LinkStrategy {
    pub fn build(self) -> Box<dyn LinkResolver> {
        match self {
            LinkStrategy::OriginKey => Box::new(OriginKeyResolver),
            LinkStrategy::AttributeMatch => Box::new(AttributeMatchResolver),
            LinkStrategy::OriginKeyThenAttributes => Box::new(ChainedResolver::new(
                Box::new(OriginKeyResolver),
                Box::new(AttributeMatchResolver),
            )),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            LinkStrategy::OriginKey => "origin_key",
            LinkStrategy::AttributeMatch => "attribute_match",
            LinkStrategy::OriginKeyThenAttributes => "origin_key_then_attributes",
        }
    }
}

impl std::fmt::Display for LinkStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for LinkStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "origin_key" => Ok(LinkStrategy::OriginKey),
            "attribute_match" => Ok(LinkStrategy::AttributeMatch),
            "origin_key_then_attributes" | "chained" => Ok(LinkStrategy::OriginKeyThenAttributes),
            _ => Err(format!("Unknown link strategy: {}", s)),
        }
    }
}
