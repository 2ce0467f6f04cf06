//! Argument binding for tools.
//!
//! Every tool's arguments are derived from the job state alone. The match in
//! [`ToolArgs::bind`] is exhaustive over [`ToolName`], so adding a tool
//! without a binding does not compile.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::domain::{ExecutionState, PipelineValues, ToolName};

/// How many prior entity events the timeline tool is asked for
pub const TIMELINE_LIMIT: usize = 50;

/// Arguments for one tool invocation.
///
/// Serializes as the bare argument object (no variant tag), which is what
/// command and HTTP backends receive.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ToolArgs {
    PreprocessDocument(PreprocessArgs),
    ClassifySector(ClassifyArgs),
    ExtractEvents(ExtractEventsArgs),
    GetTimeline(TimelineArgs),
    DetectRisks(DetectRisksArgs),
    StoreEvents(StoreEventsArgs),
    CreateEmbeddings(EmbeddingsArgs),
    GenerateAlerts(GenerateAlertsArgs),
    StoreAlerts(StoreAlertsArgs),
    GenerateInsights(InsightsArgs),
}

#[derive(Debug, Clone, Serialize)]
pub struct PreprocessArgs {
    pub file_id: String,
    pub filename: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    pub stored_path: PathBuf,
    /// In-process tools read the bytes directly; remote ones use `stored_path`
    #[serde(skip)]
    pub payload: Arc<[u8]>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClassifyArgs {
    pub text: String,
    pub metadata: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExtractEventsArgs {
    pub sector: String,
    pub text: String,
    pub metadata: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct TimelineArgs {
    pub entity_id: String,
    pub limit: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct DetectRisksArgs {
    pub sector: String,
    pub events: Vec<Value>,
    pub timeline: Vec<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoreEventsArgs {
    pub events: Vec<Value>,
    pub entity_id: String,
    pub file_id: String,
    pub sector: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbeddingsArgs {
    pub events: Vec<Value>,
    pub file_id: String,
    pub entity_id: String,
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerateAlertsArgs {
    pub risks: Vec<Value>,
    pub events: Vec<Value>,
    pub timeline: Vec<Value>,
    pub sector: String,
    pub file_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoreAlertsArgs {
    pub alerts: Vec<Value>,
    pub entity_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct InsightsArgs {
    pub events: Vec<Value>,
    pub risks: Vec<Value>,
    pub alerts: Vec<Value>,
    pub sector: String,
    pub text: String,
}

impl ToolArgs {
    /// Bind arguments for `tool` from the current job state.
    ///
    /// Slots not yet produced bind as empty values; the tool decides whether
    /// that is an error.
    pub fn bind(tool: ToolName, state: &ExecutionState) -> Self {
        let values = &state.values;
        let file_id = || state.stored.file_id.clone();

        match tool {
            ToolName::PreprocessDocument => Self::PreprocessDocument(PreprocessArgs {
                file_id: file_id(),
                filename: state.input.filename.clone(),
                content_type: state.input.content_type.clone(),
                stored_path: state.stored.stored_path.clone(),
                payload: Arc::clone(&state.payload),
            }),
            ToolName::ClassifySector => Self::ClassifySector(ClassifyArgs {
                text: text(values),
                metadata: metadata(values),
            }),
            ToolName::ExtractEvents => Self::ExtractEvents(ExtractEventsArgs {
                sector: sector(values),
                text: text(values),
                metadata: metadata(values),
            }),
            ToolName::GetTimeline => Self::GetTimeline(TimelineArgs {
                entity_id: state.entity_id.clone(),
                limit: TIMELINE_LIMIT,
            }),
            ToolName::DetectRisks => Self::DetectRisks(DetectRisksArgs {
                sector: sector(values),
                events: list(&values.events),
                timeline: list(&values.timeline),
            }),
            ToolName::StoreEvents => Self::StoreEvents(StoreEventsArgs {
                events: list(&values.events),
                entity_id: state.entity_id.clone(),
                file_id: file_id(),
                sector: sector(values),
            }),
            ToolName::CreateEmbeddings => Self::CreateEmbeddings(EmbeddingsArgs {
                events: list(&values.events),
                file_id: file_id(),
                entity_id: state.entity_id.clone(),
                text: text(values),
            }),
            ToolName::GenerateAlerts => Self::GenerateAlerts(GenerateAlertsArgs {
                risks: list(&values.risks),
                events: list(&values.events),
                timeline: list(&values.timeline),
                sector: sector(values),
                file_id: file_id(),
            }),
            ToolName::StoreAlerts => Self::StoreAlerts(StoreAlertsArgs {
                alerts: list(&values.alerts),
                entity_id: state.entity_id.clone(),
            }),
            ToolName::GenerateInsights => Self::GenerateInsights(InsightsArgs {
                events: list(&values.events),
                risks: list(&values.risks),
                alerts: list(&values.alerts),
                sector: sector(values),
                text: text(values),
            }),
        }
    }

    /// The tool these arguments are for
    pub fn tool(&self) -> ToolName {
        match self {
            Self::PreprocessDocument(_) => ToolName::PreprocessDocument,
            Self::ClassifySector(_) => ToolName::ClassifySector,
            Self::ExtractEvents(_) => ToolName::ExtractEvents,
            Self::GetTimeline(_) => ToolName::GetTimeline,
            Self::DetectRisks(_) => ToolName::DetectRisks,
            Self::StoreEvents(_) => ToolName::StoreEvents,
            Self::CreateEmbeddings(_) => ToolName::CreateEmbeddings,
            Self::GenerateAlerts(_) => ToolName::GenerateAlerts,
            Self::StoreAlerts(_) => ToolName::StoreAlerts,
            Self::GenerateInsights(_) => ToolName::GenerateInsights,
        }
    }
}

fn text(values: &PipelineValues) -> String {
    values.text.clone().unwrap_or_default()
}

fn sector(values: &PipelineValues) -> String {
    values
        .classification
        .as_ref()
        .map(|c| c.sector.clone())
        .unwrap_or_default()
}

fn metadata(values: &PipelineValues) -> Value {
    values
        .metadata
        .clone()
        .unwrap_or_else(|| Value::Object(Default::default()))
}

fn list(slot: &Option<Vec<Value>>) -> Vec<Value> {
    slot.clone().unwrap_or_default()
}
