//! Audit trail records.
//!
//! Both record types are append-only: once pushed onto a job's state they
//! are never edited or removed, so the trail can be replayed after the fact.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::plan::ToolName;

/// One invocation of a tool by the executor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocationRecord {
    /// Tool that was invoked
    pub tool: ToolName,

    /// Index of the plan step this invocation ran
    pub step_index: usize,

    /// Name of that plan step
    pub step_name: String,

    /// Executor pass the invocation belongs to (equals retry_count at the time)
    pub pass: u32,

    /// When the invocation finished
    pub timestamp: DateTime<Utc>,

    /// Whether the tool reported success
    pub success: bool,

    /// Short description of what the tool produced (NO payloads)
    pub output_summary: String,

    /// Wall time spent inside the tool
    pub duration_ms: u64,

    /// Error reported or raised by the tool
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolInvocationRecord {
    pub fn new(
        tool: ToolName,
        step_index: usize,
        step_name: String,
        pass: u32,
        success: bool,
        output_summary: String,
    ) -> Self {
        Self {
            tool,
            step_index,
            step_name,
            pass,
            timestamp: Utc::now(),
            success,
            output_summary,
            duration_ms: 0,
            error: None,
        }
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub fn with_error(mut self, error: String) -> Self {
        self.error = Some(error);
        self
    }
}

/// One entry in a job's phase-by-phase execution log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionLogEntry {
    pub timestamp: DateTime<Utc>,

    /// Phase that wrote the entry
    pub phase: Phase,

    /// Structured summary of what the phase did
    pub result: Value,

    /// retry_count when the entry was written
    pub retry_count: u32,
}

impl ExecutionLogEntry {
    pub fn new(phase: Phase, result: Value, retry_count: u32) -> Self {
        Self {
            timestamp: Utc::now(),
            phase,
            result,
            retry_count,
        }
    }
}

/// Phases of the job state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Planner,
    Executor,
    Validator,
    Recovery,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Planner => "planner",
            Self::Executor => "executor",
            Self::Validator => "validator",
            Self::Recovery => "recovery",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_invocation_serialization() {
        let record = ToolInvocationRecord::new(
            ToolName::ExtractEvents,
            2,
            "extract".to_string(),
            0,
            true,
            "events(3)".to_string(),
        )
        .with_duration(120);

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["tool"], "extract_events");
        assert_eq!(json["duration_ms"], 120);
        assert!(json.get("error").is_none());

        let parsed: ToolInvocationRecord = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, record);
    }

    #[test]
    fn test_invocation_with_error() {
        let record = ToolInvocationRecord::new(
            ToolName::ClassifySector,
            1,
            "classify".to_string(),
            1,
            false,
            "failed".to_string(),
        )
        .with_error("model unavailable".to_string());

        assert_eq!(record.error.as_deref(), Some("model unavailable"));
    }

    #[test]
    fn test_log_entry_phase_name() {
        let entry = ExecutionLogEntry::new(Phase::Validator, json!({"validation_passed": true}), 2);
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["phase"], "validator");
        assert_eq!(json["retry_count"], 2);
        assert_eq!(Phase::Recovery.to_string(), "recovery");
    }
}
