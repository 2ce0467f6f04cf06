//! Derived pipeline values.
//!
//! Every output a tool can contribute to a job has its own typed slot.
//! Slots start empty and are filled in as steps complete.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Sector classification produced by the classifier tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    /// Sector label (e.g. "healthcare", "finance")
    pub sector: String,

    /// Classifier confidence in [0, 1]
    #[serde(default)]
    pub confidence: f64,
}

/// Values derived by tools over the course of a job.
///
/// The same struct doubles as the output payload of a tool: a tool fills in
/// only the slots it produces and leaves the rest `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineValues {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classification: Option<Classification>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub events: Option<Vec<Value>>,

    /// Prior events for the same entity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeline: Option<Vec<Value>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risks: Option<Vec<Value>>,

    /// Receipt from the event persistence tool
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stored_events: Option<Value>,

    /// Receipt from the vector indexing tool
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embeddings: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alerts: Option<Vec<Value>>,

    /// Receipt from the alert persistence tool
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stored_alerts: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insights: Option<Value>,
}

impl PipelineValues {
    /// Whether a slot currently holds a usable value.
    ///
    /// Empty strings and empty lists count as absent.
    pub fn has(&self, slot: OutputSlot) -> bool {
        match slot {
            OutputSlot::Text => self.text.as_deref().is_some_and(|t| !t.trim().is_empty()),
            OutputSlot::Metadata => self.metadata.is_some(),
            OutputSlot::Classification => self
                .classification
                .as_ref()
                .is_some_and(|c| !c.sector.is_empty()),
            OutputSlot::Events => non_empty(&self.events),
            OutputSlot::Timeline => self.timeline.is_some(),
            OutputSlot::Risks => self.risks.is_some(),
            OutputSlot::StoredEvents => self.stored_events.is_some(),
            OutputSlot::Embeddings => self.embeddings.is_some(),
            OutputSlot::Alerts => self.alerts.is_some(),
            OutputSlot::StoredAlerts => self.stored_alerts.is_some(),
            OutputSlot::Insights => self.insights.is_some(),
        }
    }

    /// Overwrite the given slots with the incoming values.
    ///
    /// Slots not listed are left untouched. A listed slot the incoming
    /// payload omits is cleared, so a re-run never leaves a stale value
    /// from an earlier attempt behind.
    pub fn merge(&mut self, slots: &[OutputSlot], mut incoming: PipelineValues) {
        for slot in slots {
            match slot {
                OutputSlot::Text => self.text = incoming.text.take(),
                OutputSlot::Metadata => self.metadata = incoming.metadata.take(),
                OutputSlot::Classification => {
                    self.classification = incoming.classification.take()
                }
                OutputSlot::Events => self.events = incoming.events.take(),
                OutputSlot::Timeline => self.timeline = incoming.timeline.take(),
                OutputSlot::Risks => self.risks = incoming.risks.take(),
                OutputSlot::StoredEvents => self.stored_events = incoming.stored_events.take(),
                OutputSlot::Embeddings => self.embeddings = incoming.embeddings.take(),
                OutputSlot::Alerts => self.alerts = incoming.alerts.take(),
                OutputSlot::StoredAlerts => self.stored_alerts = incoming.stored_alerts.take(),
                OutputSlot::Insights => self.insights = incoming.insights.take(),
            }
        }
    }

    /// Short description of which slots are filled, e.g. `text(1532) events(4)`
    pub fn summarize(&self) -> String {
        let mut parts = Vec::new();

        if let Some(text) = &self.text {
            parts.push(format!("text({})", text.len()));
        }
        if self.metadata.is_some() {
            parts.push("metadata".to_string());
        }
        if let Some(c) = &self.classification {
            parts.push(format!("classification({} @ {:.2})", c.sector, c.confidence));
        }
        for (name, list) in [
            ("events", &self.events),
            ("timeline", &self.timeline),
            ("risks", &self.risks),
            ("alerts", &self.alerts),
        ] {
            if let Some(items) = list {
                parts.push(format!("{}({})", name, items.len()));
            }
        }
        for (name, value) in [
            ("stored_events", &self.stored_events),
            ("embeddings", &self.embeddings),
            ("stored_alerts", &self.stored_alerts),
            ("insights", &self.insights),
        ] {
            if value.is_some() {
                parts.push(name.to_string());
            }
        }

        if parts.is_empty() {
            "no outputs".to_string()
        } else {
            parts.join(" ")
        }
    }
}

fn non_empty(list: &Option<Vec<Value>>) -> bool {
    list.as_ref().is_some_and(|items| !items.is_empty())
}

/// Identifies one slot of [`PipelineValues`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputSlot {
    Text,
    Metadata,
    Classification,
    Events,
    Timeline,
    Risks,
    StoredEvents,
    Embeddings,
    Alerts,
    StoredAlerts,
    Insights,
}

impl OutputSlot {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Metadata => "metadata",
            Self::Classification => "classification",
            Self::Events => "events",
            Self::Timeline => "timeline",
            Self::Risks => "risks",
            Self::StoredEvents => "stored_events",
            Self::Embeddings => "embeddings",
            Self::Alerts => "alerts",
            Self::StoredAlerts => "stored_alerts",
            Self::Insights => "insights",
        }
    }
}

impl fmt::Display for OutputSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
