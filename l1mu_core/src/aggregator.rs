//! Per-event orchestration of flattening and link resolution.

use crate::candidates::{GlobalCandidate, Subsystem};
use crate::config::{AnalyzerConfig, InputTags};
use crate::error::AnalysisError;
use crate::flatten::{BxFlattener, FlatArena};
use crate::link::{LinkContext, LinkResolver};
use crate::scales::{GlobalPhiCalculator, MicroGmtPhi, ScaleConfig};
use l1mu_env::{Bx, EventId, EventSource};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// The merged record set of one event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedRecordSet {
    pub event: EventId,

    /// Merged candidates in (BX, native order)
    global: Vec<GlobalCandidate>,

    /// Flattened regional arrays the links point into
    arena: FlatArena,
}

impl MergedRecordSet {
    pub fn global(&self) -> &[GlobalCandidate] {
        &self.global
    }

    pub fn arena(&self) -> &FlatArena {
        &self.arena
    }

    /// Flattened candidate count of one subsystem.
    pub fn count(&self, subsystem: Subsystem) -> usize {
        self.arena.count(subsystem)
    }

    /// Merged candidates of one BX.
    pub fn at_bx(&self, bx: Bx) -> impl Iterator<Item = &GlobalCandidate> {
        self.global.iter().filter(move |c| c.bx == bx)
    }

    pub fn resolved_links(&self) -> usize {
        self.global.iter().filter(|c| c.link.is_resolved()).count()
    }

    /// True if every resolved link addresses an existing regional candidate.
    pub fn links_valid(&self) -> bool {
        self.global
            .iter()
            .filter(|c| c.link.is_resolved())
            .all(|c| self.arena.resolve(&c.link).is_some())
    }
}

/// Builds the merged record set of one event.
///
/// Owns no per-event state: every call starts from an empty arena.
pub struct EventAggregator<P = MicroGmtPhi> {
    tags: InputTags,
    scales: ScaleConfig,
    only_central_bx: bool,
    resolver: Box<dyn LinkResolver>,
    phi_calc: P,
}

impl EventAggregator<MicroGmtPhi> {
    pub fn new(config: &AnalyzerConfig) -> Self {
        Self::with_phi_calculator(config, MicroGmtPhi)
    }
}

impl<P: GlobalPhiCalculator> EventAggregator<P> {
    pub fn with_phi_calculator(config: &AnalyzerConfig, phi_calc: P) -> Self {
        Self {
            tags: config.tags.clone(),
            scales: config.scales,
            only_central_bx: config.only_central_bx,
            resolver: config.link_strategy.build(),
            phi_calc,
        }
    }

    /// Replaces the configured link resolver.
    pub fn with_resolver(mut self, resolver: Box<dyn LinkResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn resolver_name(&self) -> &'static str {
        self.resolver.name()
    }

    /// Flattens every enabled regional input, then links each merged
    /// candidate of every processed BX.
    ///
    /// # Errors
    ///
    /// - `Disabled` if the merged input is switched off
    /// - `Input` if the merged or an enabled regional collection is missing
    pub fn aggregate(&self, source: &dyn EventSource) -> Result<MergedRecordSet, AnalysisError> {
        if self.tags.ugmt.is_none() {
            return Err(AnalysisError::Disabled("merged candidate input".to_string()));
        }
        let muons = source.muons(&self.tags.ugmt)?;

        let flattener = BxFlattener::new(&self.scales, &self.phi_calc, self.only_central_bx);
        let mut arena = FlatArena::new();
        for (subsystem, tag) in self.tags.enabled_regional() {
            let coll = source.regional_muons(tag)?;
            arena.insert(flattener.ingest(subsystem, coll));
        }

        let mut global = Vec::with_capacity(muons.len());
        for bx in muons.bx_range() {
            if !flattener.processes(bx) {
                continue;
            }
            let ctx = LinkContext::new(&arena, bx);
            for mu in muons.bx(bx) {
                let link = self.resolver.resolve(mu, &ctx);
                global.push(GlobalCandidate::from_muon(mu, bx, &self.scales, link));
            }
        }

        debug!(
            "Event {}: {} merged candidates, {} linked via {}",
            source.id(),
            global.len(),
            global.iter().filter(|c| c.link.is_resolved()).count(),
            self.resolver.name()
        );

        Ok(MergedRecordSet {
            event: source.id(),
            global,
            arena,
        })
    }
}
