//! Plan definitions.
//!
//! A plan is an ordered list of steps, each bound to exactly one tool.
//! Plans are built once per job and never mutated afterwards; only the
//! job's cursor into the plan moves.

use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::values::OutputSlot;

/// An immutable, ordered plan of steps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    /// Plan name (job type)
    pub name: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    steps: Vec<Step>,
}

impl Plan {
    /// Build a plan from its parts
    pub fn new(name: impl Into<String>, description: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            steps,
        }
    }

    /// The standard document-processing plan
    pub fn document() -> Self {
        Self::new(
            "document",
            "Convert, classify, extract, assess and report on one document",
            vec![
                Step::new("preprocess", ToolName::PreprocessDocument, "Extract text from document"),
                Step::new("classify", ToolName::ClassifySector, "Classify document sector"),
                Step::new("extract", ToolName::ExtractEvents, "Extract structured events"),
                Step::new("timeline", ToolName::GetTimeline, "Load prior events for the entity"),
                Step::new("detect_risks", ToolName::DetectRisks, "Detect risks and issues"),
                Step::new("store", ToolName::StoreEvents, "Store events in database"),
                Step::new("embeddings", ToolName::CreateEmbeddings, "Create vector embeddings"),
                Step::new("alerts", ToolName::GenerateAlerts, "Generate alerts"),
                Step::new("store_alerts", ToolName::StoreAlerts, "Store alerts"),
                Step::new("insights", ToolName::GenerateInsights, "Generate insights"),
            ],
        )
    }

    /// Load a plan from a YAML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read plan file: {}", path.display()))?;

        Self::from_yaml(&content)
    }

    /// Parse a plan from YAML content
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).context("Failed to parse plan YAML")
    }

    /// Validate the plan definition
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            anyhow::bail!("Plan name cannot be empty");
        }

        if self.steps.is_empty() {
            anyhow::bail!("Plan must have at least one step");
        }

        let mut seen = HashSet::new();
        for (i, step) in self.steps.iter().enumerate() {
            if step.name.is_empty() {
                anyhow::bail!("Step {} has an empty name", i);
            }
            if !seen.insert(step.name.as_str()) {
                anyhow::bail!("Duplicate step name '{}'", step.name);
            }
        }

        Ok(())
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Step> {
        self.steps.get(index)
    }

    /// Get the index of a step by name
    pub fn step_index(&self, name: &str) -> Option<usize> {
        self.steps.iter().position(|s| s.name == name)
    }

    /// Index of the earliest step whose tool produces `slot`
    pub fn first_producer(&self, slot: OutputSlot) -> Option<usize> {
        self.steps
            .iter()
            .position(|s| s.tool.produces().contains(&slot))
    }
}

/// A single step in a plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// Step name (unique within the plan)
    pub name: String,

    /// Tool this step invokes
    pub tool: ToolName,

    /// What the step does
    #[serde(default)]
    pub description: String,
}

impl Step {
    pub fn new(name: impl Into<String>, tool: ToolName, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tool,
            description: description.into(),
        }
    }
}

/// The fixed set of tools a plan can reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolName {
    /// Document to text conversion
    PreprocessDocument,
    ClassifySector,
    ExtractEvents,
    /// Prior events recorded for the job's entity
    GetTimeline,
    DetectRisks,
    StoreEvents,
    /// Vector indexing of text and events
    CreateEmbeddings,
    GenerateAlerts,
    StoreAlerts,
    GenerateInsights,
}

impl ToolName {
    pub const ALL: [ToolName; 10] = [
        Self::PreprocessDocument,
        Self::ClassifySector,
        Self::ExtractEvents,
        Self::GetTimeline,
        Self::DetectRisks,
        Self::StoreEvents,
        Self::CreateEmbeddings,
        Self::GenerateAlerts,
        Self::StoreAlerts,
        Self::GenerateInsights,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PreprocessDocument => "preprocess_document",
            Self::ClassifySector => "classify_sector",
            Self::ExtractEvents => "extract_events",
            Self::GetTimeline => "get_timeline",
            Self::DetectRisks => "detect_risks",
            Self::StoreEvents => "store_events",
            Self::CreateEmbeddings => "create_embeddings",
            Self::GenerateAlerts => "generate_alerts",
            Self::StoreAlerts => "store_alerts",
            Self::GenerateInsights => "generate_insights",
        }
    }

    /// Pipeline slots this tool writes on success
    pub fn produces(&self) -> &'static [OutputSlot] {
        match self {
            Self::PreprocessDocument => &[OutputSlot::Text, OutputSlot::Metadata],
            Self::ClassifySector => &[OutputSlot::Classification],
            Self::ExtractEvents => &[OutputSlot::Events],
            Self::GetTimeline => &[OutputSlot::Timeline],
            Self::DetectRisks => &[OutputSlot::Risks],
            Self::StoreEvents => &[OutputSlot::StoredEvents],
            Self::CreateEmbeddings => &[OutputSlot::Embeddings],
            Self::GenerateAlerts => &[OutputSlot::Alerts],
            Self::StoreAlerts => &[OutputSlot::StoredAlerts],
            Self::GenerateInsights => &[OutputSlot::Insights],
        }
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
