//! L1 Muon Event Input Layer
//!
//! This crate is the boundary between the aggregation engine and wherever
//! events come from: the host framework, a JSON-lines file, or the simulator.
//!
//! # Core Concept
//!
//! The engine never reaches for data on its own. It asks an [`EventSource`]
//! for a collection by [`InputTag`] and gets either the collection or
//! `EnvError::MissingProduct`. All collections are read-only for the lifetime
//! of the event.
//!
//! # Example
//!
//! ```ignore
//! use l1mu_env::{EventSource, JsonLinesReader};
//!
//! for event in JsonLinesReader::open("events.jsonl")? {
//!     let event = event?;
//!     let bmtf = event.regional_muons(&"bmtf".into())?;
//!     println!("{}: {} BMTF candidates", event.id(), bmtf.len());
//! }
//! ```

mod error;
mod reader;
mod source;
mod types;

pub use error::EnvError;
pub use reader::{write_event, JsonLinesReader};
pub use source::{Event, EventId, EventSource, InputTag};
pub use types::{
    Bx, BxCollection, GmtReadoutCollection, GmtReadoutRecord, Muon, OriginKey, ReferenceMuon,
    RegionalMuon, TfRegion, COMMA_WORD,
};
