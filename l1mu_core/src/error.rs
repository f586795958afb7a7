//! Errors surfaced by the aggregation engine.
//!
//! Only genuinely unavailable or malformed inputs are errors. Ambiguous
//! multiplicities, out-of-acceptance references and unresolved links are
//! regular outcomes and never show up here.

use l1mu_env::EnvError;
use thiserror::Error;

/// Errors that can occur while processing an event or loading configuration.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// A required input collection could not be retrieved
    #[error("Input error: {0}")]
    Input(#[from] EnvError),

    /// Configuration is malformed or inconsistent
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A computation was requested whose inputs are switched off
    #[error("Input disabled: {0}")]
    Disabled(String),
}

impl AnalysisError {
    /// Creates a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// True if the underlying cause is a missing product.
    pub fn is_missing_input(&self) -> bool {
        matches!(self, Self::Input(e) if e.is_missing())
    }
}
