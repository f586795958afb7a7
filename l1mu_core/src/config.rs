//! Analyzer configuration.

use crate::candidates::Subsystem;
use crate::error::AnalysisError;
use crate::link::LinkStrategy;
use crate::matching::BxShiftTable;
use crate::scales::ScaleConfig;
use l1mu_env::InputTag;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Labels of every input collection. A `"none"` label disables the input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputTags {
    pub bmtf: InputTag,
    pub omtf: InputTag,
    pub emtf: InputTag,
    pub barrel_rpc: InputTag,

    /// Merged candidates (emulator output)
    pub ugmt: InputTag,
    /// Merged candidates unpacked from hardware
    pub ugmt_unpacker: InputTag,
    /// Legacy reference readout
    pub gmt: InputTag,
}

impl Default for InputTags {
    fn default() -> Self {
        Self {
            bmtf: InputTag::new("bmtf"),
            omtf: InputTag::new("omtf"),
            emtf: InputTag::new("emtf"),
            barrel_rpc: InputTag::none(),
            ugmt: InputTag::new("ugmt"),
            ugmt_unpacker: InputTag::none(),
            gmt: InputTag::new("gmt"),
        }
    }
}

impl InputTags {
    pub fn regional(&self, subsystem: Subsystem) -> &InputTag {
        match subsystem {
            Subsystem::Bmtf => &self.bmtf,
            Subsystem::Omtf => &self.omtf,
            Subsystem::Emtf => &self.emtf,
            Subsystem::BarrelRpc => &self.barrel_rpc,
        }
    }

    /// Enabled regional inputs in priority order.
    pub fn enabled_regional(&self) -> impl Iterator<Item = (Subsystem, &InputTag)> {
        Subsystem::ALL
            .into_iter()
            .map(move |s| (s, self.regional(s)))
            .filter(|(_, tag)| !tag.is_none())
    }
}

/// Expected BX tables, one per subsystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BxShiftConfig {
    pub bmtf: BxShiftTable,
    pub omtf: BxShiftTable,
    pub emtf: BxShiftTable,
    pub barrel_rpc: BxShiftTable,
}

impl Default for BxShiftConfig {
    fn default() -> Self {
        Self {
            bmtf: BxShiftTable::nominal(Subsystem::Bmtf),
            omtf: BxShiftTable::nominal(Subsystem::Omtf),
            emtf: BxShiftTable::nominal(Subsystem::Emtf),
            barrel_rpc: BxShiftTable::nominal(Subsystem::BarrelRpc),
        }
    }
}

impl BxShiftConfig {
    pub fn table(&self, subsystem: Subsystem) -> &BxShiftTable {
        match subsystem {
            Subsystem::Bmtf => &self.bmtf,
            Subsystem::Omtf => &self.omtf,
            Subsystem::Emtf => &self.emtf,
            Subsystem::BarrelRpc => &self.barrel_rpc,
        }
    }

    pub fn table_mut(&mut self, subsystem: Subsystem) -> &mut BxShiftTable {
        match subsystem {
            Subsystem::Bmtf => &mut self.bmtf,
            Subsystem::Omtf => &mut self.omtf,
            Subsystem::Emtf => &mut self.emtf,
            Subsystem::BarrelRpc => &mut self.barrel_rpc,
        }
    }
}

/// Configuration of the whole per-event analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    pub tags: InputTags,

    /// Flatten and link BX 0 only (default: true)
    pub only_central_bx: bool,

    /// Leave link commas out of occupancy summaries (default: false)
    pub comma_suppression: bool,

    /// Dump every candidate at DEBUG level (default: false)
    pub debug: bool,

    pub link_strategy: LinkStrategy,

    pub scales: ScaleConfig,

    pub bx_shift: BxShiftConfig,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            tags: InputTags::default(),
            only_central_bx: true,
            comma_suppression: false,
            debug: false,
            link_strategy: LinkStrategy::default(),
            scales: ScaleConfig::default(),
            bx_shift: BxShiftConfig::default(),
        }
    }
}

impl AnalyzerConfig {
    /// Parses and validates a JSON document. Missing fields take defaults.
    pub fn from_json_str(json: &str) -> Result<Self, AnalysisError> {
        let config: AnalyzerConfig = serde_json::from_str(json)
            .map_err(|e| AnalysisError::config(format!("parse error: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, AnalysisError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| AnalysisError::config(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&json)
    }

    /// Rejects scale constants that are not finite and positive.
    pub fn validate(&self) -> Result<(), AnalysisError> {
        let scales = [
            ("pt", self.scales.pt),
            ("eta", self.scales.eta),
            ("phi", self.scales.phi),
        ];
        for (name, value) in scales {
            if !value.is_finite() || value <= 0.0 {
                return Err(AnalysisError::config(format!(
                    "{} scale must be positive, got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}
