//! Event retrieval abstraction.

use crate::error::EnvError;
use crate::types::{BxCollection, GmtReadoutCollection, Muon, RegionalMuon};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Label of an input collection. The label `"none"` switches the input off.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InputTag(String);

impl InputTag {
    pub const NONE: &'static str = "none";

    /// Creates a tag from a label.
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    /// Creates a disabled tag.
    pub fn none() -> Self {
        Self(Self::NONE.to_string())
    }

    /// True if this input is switched off.
    pub fn is_none(&self) -> bool {
        self.0 == Self::NONE
    }

    pub fn label(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for InputTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for InputTag {
    fn from(label: &str) -> Self {
        Self::new(label)
    }
}

/// Run/event numbers identifying one event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId {
    pub run: u32,
    pub event: u64,
}

impl EventId {
    pub fn new(run: u32, event: u64) -> Self {
        Self { run, event }
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.run, self.event)
    }
}

/// Read-only access to the collections of the current event.
///
/// # Implementations
///
/// - **In memory**: [`Event`], filled by a file reader or a generator
/// - **Host framework**: an adapter over the framework's event handle
///
/// Each getter either returns the collection or `EnvError::MissingProduct`.
/// Nothing is retried; callers decide which computation to abort.
pub trait EventSource {
    /// Returns the identity of the current event.
    fn id(&self) -> EventId;

    /// Returns a regional track-finder collection.
    fn regional_muons(&self, tag: &InputTag) -> Result<&BxCollection<RegionalMuon>, EnvError>;

    /// Returns a merged (global) candidate collection.
    fn muons(&self, tag: &InputTag) -> Result<&BxCollection<Muon>, EnvError>;

    /// Returns a legacy readout collection.
    fn gmt_readout(&self, tag: &InputTag) -> Result<&GmtReadoutCollection, EnvError>;
}

/// One event held fully in memory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    #[serde(default)]
    pub regional: BTreeMap<InputTag, BxCollection<RegionalMuon>>,
    #[serde(default)]
    pub muons: BTreeMap<InputTag, BxCollection<Muon>>,
    #[serde(default)]
    pub gmt: BTreeMap<InputTag, GmtReadoutCollection>,
}

impl Event {
    /// Creates an empty event.
    pub fn new(id: EventId) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }

    /// Adds a regional collection (builder style).
    pub fn with_regional(mut self, tag: impl Into<InputTag>, coll: BxCollection<RegionalMuon>) -> Self {
        self.regional.insert(tag.into(), coll);
        self
    }

    /// Adds a merged collection (builder style).
    pub fn with_muons(mut self, tag: impl Into<InputTag>, coll: BxCollection<Muon>) -> Self {
        self.muons.insert(tag.into(), coll);
        self
    }

    /// Adds a legacy readout collection (builder style).
    pub fn with_gmt(mut self, tag: impl Into<InputTag>, coll: GmtReadoutCollection) -> Self {
        self.gmt.insert(tag.into(), coll);
        self
    }

    /// Checks every BX collection's shape.
    pub fn validate(&self) -> Result<(), EnvError> {
        for (tag, coll) in &self.regional {
            coll.validate()
                .map_err(|e| EnvError::invalid(format!("{}: {}", tag, e)))?;
        }
        for (tag, coll) in &self.muons {
            coll.validate()
                .map_err(|e| EnvError::invalid(format!("{}: {}", tag, e)))?;
        }
        Ok(())
    }
}

impl EventSource for Event {
    fn id(&self) -> EventId {
        self.id
    }

    fn regional_muons(&self, tag: &InputTag) -> Result<&BxCollection<RegionalMuon>, EnvError> {
        self.regional.get(tag).ok_or_else(|| EnvError::missing(tag))
    }

    fn muons(&self, tag: &InputTag) -> Result<&BxCollection<Muon>, EnvError> {
        self.muons.get(tag).ok_or_else(|| EnvError::missing(tag))
    }

    fn gmt_readout(&self, tag: &InputTag) -> Result<&GmtReadoutCollection, EnvError> {
        self.gmt.get(tag).ok_or_else(|| EnvError::missing(tag))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_tag_none() {
        assert!(InputTag::none().is_none());
        assert!(!InputTag::new("bmtf").is_none());
        assert_eq!(InputTag::from("omtf").label(), "omtf");
    }

    #[test]
    fn test_event_missing_product() {
        let event = Event::new(EventId::new(1, 7))
            .with_regional("bmtf", BxCollection::central());

        assert!(event.regional_muons(&"bmtf".into()).is_ok());

        let err = event.regional_muons(&"emtf".into()).unwrap_err();
        assert!(err.is_missing());
        assert!(event.muons(&"ugmt".into()).is_err());
        assert!(event.gmt_readout(&"gmt".into()).is_err());
    }

    #[test]
    fn test_event_id_display() {
        assert_eq!(EventId::new(3, 1234).to_string(), "3:1234");
    }
}
