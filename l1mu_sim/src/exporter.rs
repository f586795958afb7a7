//! JSON export of scenario runs and generated events.

use l1mu_core::{AnalyzerConfig, EventOutput, RunSummary};
use l1mu_env::{write_event, EnvError, Event};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};

/// Complete export of one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimExport {
    /// Scenario name (or input file for replays)
    pub scenario: String,

    /// Seed used
    pub seed: u64,

    /// Configuration the events were processed with
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<AnalyzerConfig>,

    /// Per-event outputs
    pub events: Vec<EventOutput>,

    /// Totals over all events
    pub summary: RunSummary,

    /// Final results
    pub passed: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl SimExport {
    /// Creates a new export container.
    pub fn new(scenario: &str, seed: u64) -> Self {
        Self {
            scenario: scenario.to_string(),
            seed,
            config: None,
            events: Vec::new(),
            summary: RunSummary::new(),
            passed: false,
            failure_reason: None,
        }
    }

    pub fn with_config(mut self, config: AnalyzerConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Adds one event output and folds it into the summary.
    pub fn add_event(&mut self, output: EventOutput) {
        self.summary.record(&output);
        self.events.push(output);
    }

    /// Finalizes the export.
    pub fn finalize(&mut self, passed: bool, failure_reason: Option<String>) {
        self.passed = passed;
        self.failure_reason = failure_reason;
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: &str) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}

/// Writes generated events as JSON lines, readable back with
/// `l1mu_env::JsonLinesReader`.
pub fn write_events(path: &str, events: &[Event]) -> Result<(), EnvError> {
    let mut writer = BufWriter::new(File::create(path)?);
    for event in events {
        write_event(&mut writer, event)?;
    }
    writer.flush()?;
    Ok(())
}
