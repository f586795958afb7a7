//! L1 Muon Deterministic Simulation Harness
//!
//! Generates complete trigger events from a single 64-bit seed, runs them
//! through the aggregation engine and checks the result:
//! - **Oracle**: samples true muons and packs them into regional, merged and
//!   legacy readout collections
//! - **Scenarios**: event layouts that push one guard or resolver at a time
//! - **Invariants**: checks every event must pass regardless of scenario
//!
//! # Usage
//!
//! ```ignore
//! use l1mu_sim::{ScenarioRunner, scenarios::ScenarioId};
//!
//! let result = ScenarioRunner::new(42).with_events(50).run(ScenarioId::Dimuon);
//! assert!(result.passed);
//! ```

mod exporter;
pub mod invariants;
mod oracle;
mod runner;
pub mod scenarios;

pub use exporter::{write_events, SimExport};
pub use invariants::InvariantViolation;
pub use oracle::{labels, EventSpec, MergedMode, MuonSpec, Oracle, Packed, Resolution, TrueMuon};
pub use runner::{ScenarioMetrics, ScenarioResult, ScenarioRun, ScenarioRunner};
