//! Event scenarios for deterministic end-to-end runs.

use serde::{Deserialize, Serialize};

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioId {
    /// SIM-001: one keyed muon per event, full back-link and ΔR match
    SingleMuon,

    /// SIM-002: two muons per event, reference ambiguity skips matching
    Dimuon,

    /// SIM-003: muons spread over BX -2..2, all BXs flattened
    MultiBx,

    /// SIM-004: two regional candidates in one BX, multiplicity skip
    PunchThrough,

    /// SIM-005: corrupted merged candidates stay unresolved
    Unmatched,

    /// SIM-006: candidates off their expected BX are excluded
    BxShifted,

    /// SIM-007: a regional input is missing from some events
    MissingProduct,

    /// SIM-008: overlap muons compared by OMTF only
    OverlapGating,

    // ═══════════════════════════════════════════════════
    // LINK RESOLUTION
    // ═══════════════════════════════════════════════════
    /// SIM-009: no origin keys, attribute matching only
    AttributeFallback,

    /// SIM-010: barrel RPC duplicates share attributes with BMTF
    RpcDuplicates,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::SingleMuon,
            ScenarioId::Dimuon,
            ScenarioId::MultiBx,
            ScenarioId::PunchThrough,
            ScenarioId::Unmatched,
            ScenarioId::BxShifted,
            ScenarioId::MissingProduct,
            ScenarioId::OverlapGating,
            // Link resolution
            ScenarioId::AttributeFallback,
            ScenarioId::RpcDuplicates,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::SingleMuon => "single_muon",
            ScenarioId::Dimuon => "dimuon",
            ScenarioId::MultiBx => "multi_bx",
            ScenarioId::PunchThrough => "punch_through",
            ScenarioId::Unmatched => "unmatched",
            ScenarioId::BxShifted => "bx_shifted",
            ScenarioId::MissingProduct => "missing_product",
            ScenarioId::OverlapGating => "overlap_gating",
            ScenarioId::AttributeFallback => "attribute_fallback",
            ScenarioId::RpcDuplicates => "rpc_duplicates",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::SingleMuon => "One keyed muon per event in barrel, overlap or endcap",
            ScenarioId::Dimuon => "Two muons per event, reference ambiguity guard must fire",
            ScenarioId::MultiBx => "Muons at BX -2..2 with all BXs flattened",
            ScenarioId::PunchThrough => "Two candidates in one BX of one subsystem",
            ScenarioId::Unmatched => "Merged candidates with altered attributes and no key",
            ScenarioId::BxShifted => "Central candidates reported one BX late",
            ScenarioId::MissingProduct => "OMTF input dropped from every other event",
            ScenarioId::OverlapGating => "Overlap muons, barrel and endcap comparisons gated out",
            ScenarioId::AttributeFallback => "Merged candidates without origin keys",
            ScenarioId::RpcDuplicates => "Barrel candidates duplicated in the RPC stream",
        }
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "single_muon" | "singlemuon" | "sim-001" => Ok(ScenarioId::SingleMuon),
            "dimuon" | "sim-002" => Ok(ScenarioId::Dimuon),
            "multi_bx" | "multibx" | "sim-003" => Ok(ScenarioId::MultiBx),
            "punch_through" | "punchthrough" | "sim-004" => Ok(ScenarioId::PunchThrough),
            "unmatched" | "sim-005" => Ok(ScenarioId::Unmatched),
            "bx_shifted" | "bxshifted" | "sim-006" => Ok(ScenarioId::BxShifted),
            "missing_product" | "missingproduct" | "sim-007" => Ok(ScenarioId::MissingProduct),
            "overlap_gating" | "overlapgating" | "sim-008" => Ok(ScenarioId::OverlapGating),
            "attribute_fallback" | "attributefallback" | "sim-009" => Ok(ScenarioId::AttributeFallback),
            "rpc_duplicates" | "rpcduplicates" | "sim-010" => Ok(ScenarioId::RpcDuplicates),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}
