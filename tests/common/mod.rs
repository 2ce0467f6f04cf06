//! Shared harness for integration tests.
//!
//! Registers a scripted tool for every tool name. Each tool pops its next
//! outcome from a script and succeeds with canned values once the script
//! runs out.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use tempfile::TempDir;

use docflow::core::{AuditStore, JobRequest, LocalInputStore, Orchestrator};
use docflow::domain::{Classification, InputDescriptor, PipelineValues, ToolName};
use docflow::tools::{Tool, ToolArgs, ToolOutput, ToolRegistry};

/// What a scripted tool does on one call
#[derive(Debug, Clone, Copy)]
pub enum Outcome {
    /// Succeed with canned values
    Succeed,
    /// Succeed without producing anything
    Empty,
    /// Return `success: false`
    Report(&'static str),
    /// Return an error
    Raise(&'static str),
    /// Panic inside the tool
    Panic(&'static str),
}

/// Every call made to any scripted tool, with its bound arguments
pub type CallLog = Arc<Mutex<Vec<(ToolName, Value)>>>;

pub fn calls(log: &CallLog, tool: ToolName) -> usize {
    log.lock().unwrap().iter().filter(|(t, _)| *t == tool).count()
}

pub fn args_of(log: &CallLog, tool: ToolName) -> Vec<Value> {
    log.lock()
        .unwrap()
        .iter()
        .filter(|(t, _)| *t == tool)
        .map(|(_, args)| args.clone())
        .collect()
}

struct ScriptedTool {
    tool: ToolName,
    script: Mutex<VecDeque<Outcome>>,
    calls: Mutex<usize>,
    log: CallLog,
}

#[async_trait]
impl Tool for ScriptedTool {
    fn name(&self) -> ToolName {
        self.tool
    }

    async fn invoke(&self, args: ToolArgs) -> Result<ToolOutput> {
        let call = {
            let mut calls = self.calls.lock().unwrap();
            *calls += 1;
            *calls - 1
        };
        self.log
            .lock()
            .unwrap()
            .push((self.tool, serde_json::to_value(&args)?));

        let outcome = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Outcome::Succeed);

        match outcome {
            Outcome::Succeed => Ok(ToolOutput::ok(sample_values(self.tool, call))),
            Outcome::Empty => Ok(ToolOutput::ok(PipelineValues::default())),
            Outcome::Report(message) => Ok(ToolOutput::failed(message)),
            Outcome::Raise(message) => Err(anyhow::anyhow!(message)),
            Outcome::Panic(message) => panic!("{}", message),
        }
    }
}

/// Canned output for `tool`; `call` is the tool's zero-based call number
pub fn sample_values(tool: ToolName, call: usize) -> PipelineValues {
    let mut values = PipelineValues::default();
    match tool {
        ToolName::PreprocessDocument => {
            values.text = Some("Supplier reported a two-week delay on turbine parts.".to_string());
            values.metadata = Some(json!({"pages": 1, "call": call}));
        }
        ToolName::ClassifySector => {
            values.classification = Some(Classification {
                sector: "energy".to_string(),
                confidence: 0.82,
            });
        }
        ToolName::ExtractEvents => {
            values.events = Some(vec![json!({"type": "delay", "call": call})]);
        }
        ToolName::GetTimeline => values.timeline = Some(vec![json!({"type": "order"})]),
        ToolName::DetectRisks => values.risks = Some(vec![json!({"level": "medium", "call": call})]),
        ToolName::StoreEvents => values.stored_events = Some(json!({"stored": 1})),
        ToolName::CreateEmbeddings => values.embeddings = Some(json!({"vectors": 2})),
        ToolName::GenerateAlerts => values.alerts = Some(vec![json!({"severity": "warn"})]),
        ToolName::StoreAlerts => values.stored_alerts = Some(json!({"stored": 1})),
        ToolName::GenerateInsights => values.insights = Some(json!({"summary": "supply risk"})),
    }
    values
}

/// Builder for a registry of scripted tools
#[derive(Default)]
pub struct ToolSet {
    scripts: HashMap<ToolName, Vec<Outcome>>,
    missing: Vec<ToolName>,
}

impl ToolSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(mut self, tool: ToolName, outcomes: Vec<Outcome>) -> Self {
        self.scripts.insert(tool, outcomes);
        self
    }

    /// Leave `tool` out of the registry
    pub fn without(mut self, tool: ToolName) -> Self {
        self.missing.push(tool);
        self
    }

    pub fn build(mut self) -> (ToolRegistry, CallLog) {
        let log: CallLog = Arc::new(Mutex::new(Vec::new()));
        let mut registry = ToolRegistry::new();

        for tool in ToolName::ALL {
            if self.missing.contains(&tool) {
                continue;
            }
            let script = self.scripts.remove(&tool).unwrap_or_default();
            registry.register(Arc::new(ScriptedTool {
                tool,
                script: Mutex::new(script.into()),
                calls: Mutex::new(0),
                log: Arc::clone(&log),
            }));
        }

        (registry, log)
    }
}

/// Orchestrator storing inputs and audit records under `temp`
pub fn orchestrator(registry: ToolRegistry, temp: &TempDir) -> Orchestrator {
    Orchestrator::new(
        registry,
        Arc::new(LocalInputStore::new(temp.path().join("files"))),
    )
    .with_audit(audit_store(temp))
}

pub fn audit_store(temp: &TempDir) -> AuditStore {
    AuditStore::new(temp.path().join("audit.jsonl"))
}

pub fn request() -> JobRequest {
    JobRequest::new(
        b"%PDF-1.4 quarterly supplier report".to_vec(),
        InputDescriptor::new("report.pdf").with_content_type("application/pdf"),
    )
    .with_entity_id("entity_0000beef")
}
