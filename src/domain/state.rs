//! Per-job execution state.
//!
//! An `ExecutionState` is the single source of truth for one job. Every
//! phase of the job graph reads and mutates the same value; nothing is
//! carried between phases anywhere else.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use super::plan::{Plan, Step};
use super::trace::{ExecutionLogEntry, Phase, ToolInvocationRecord};
use super::values::PipelineValues;

/// What the caller told us about the input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputDescriptor {
    /// Original file name
    pub filename: String,

    /// MIME type, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

impl InputDescriptor {
    pub fn new(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            content_type: None,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

/// Stable reference to an uploaded input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredInput {
    /// Identifier assigned at upload (`file_xxxxxxxx`)
    pub file_id: String,

    /// Where the payload was written
    pub stored_path: PathBuf,

    pub size_bytes: u64,

    /// Hex SHA256 of the payload
    pub sha256: String,

    pub uploaded_at: DateTime<Utc>,
}

/// Lifecycle status of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Processing,
    Success,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Processing)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

/// Mutable record shared by all phases of one job
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionState {
    pub job_id: Uuid,

    /// Logical owner the job's output is attributed to
    pub entity_id: String,

    pub input: InputDescriptor,

    /// Raw input bytes, shared rather than copied into tool arguments
    #[serde(skip)]
    pub payload: Arc<[u8]>,

    pub stored: StoredInput,

    /// Values derived by tools so far
    pub values: PipelineValues,

    /// Set by the planner; `None` until planning ran
    pub plan: Option<Plan>,

    /// Index of the next step to execute
    pub cursor: usize,

    /// Names of `plan[0..cursor]`
    pub completed_steps: Vec<String>,

    pub tool_invocations: Vec<ToolInvocationRecord>,

    pub execution_log: Vec<ExecutionLogEntry>,

    pub validation_passed: bool,

    pub validation_errors: Vec<String>,

    pub retry_count: u32,

    /// Fixed at creation
    pub max_retries: u32,

    pub recovery_actions: Vec<String>,

    pub status: JobStatus,

    pub error: Option<String>,

    pub start_time: DateTime<Utc>,

    pub end_time: Option<DateTime<Utc>>,
}

impl ExecutionState {
    /// Create the initial state for a job
    pub fn new(
        job_id: Uuid,
        entity_id: String,
        input: InputDescriptor,
        payload: Arc<[u8]>,
        stored: StoredInput,
        max_retries: u32,
    ) -> Self {
        Self {
            job_id,
            entity_id,
            input,
            payload,
            stored,
            values: PipelineValues::default(),
            plan: None,
            cursor: 0,
            completed_steps: Vec::new(),
            tool_invocations: Vec::new(),
            execution_log: Vec::new(),
            validation_passed: false,
            validation_errors: Vec::new(),
            retry_count: 0,
            max_retries,
            recovery_actions: Vec::new(),
            status: JobStatus::Processing,
            error: None,
            start_time: Utc::now(),
            end_time: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn plan_len(&self) -> usize {
        self.plan.as_ref().map(Plan::len).unwrap_or(0)
    }

    /// Step under the cursor, if any remain
    pub fn current_step(&self) -> Option<&Step> {
        self.plan.as_ref().and_then(|p| p.get(self.cursor))
    }

    /// Install a freshly built plan and reset the cursor
    pub fn set_plan(&mut self, plan: Plan) {
        self.plan = Some(plan);
        self.cursor = 0;
        self.completed_steps.clear();
    }

    /// Mark the step under the cursor completed and move past it
    pub fn advance(&mut self) {
        if let Some(name) = self.current_step().map(|s| s.name.clone()) {
            self.completed_steps.push(name);
            self.cursor += 1;
        }
    }

    /// Move the cursor back to `index` so that step re-runs.
    ///
    /// Never moves the cursor forward.
    pub fn rewind(&mut self, index: usize) {
        let target = index.min(self.cursor);
        self.cursor = target;
        self.completed_steps.truncate(target);
    }

    pub fn record_invocation(&mut self, record: ToolInvocationRecord) {
        self.tool_invocations.push(record);
    }

    /// Append an execution log entry stamped with the current retry count
    pub fn log(&mut self, phase: Phase, result: Value) {
        debug!(job_id = %self.job_id, %phase, retry_count = self.retry_count, %result, "agent step");
        self.execution_log
            .push(ExecutionLogEntry::new(phase, result, self.retry_count));
    }

    /// Failed invocations from the pass currently being evaluated
    pub fn current_pass_failures(&self) -> impl Iterator<Item = &ToolInvocationRecord> {
        let pass = self.retry_count;
        self.tool_invocations
            .iter()
            .filter(move |r| r.pass == pass && !r.success)
    }

    /// Move to a terminal status.
    ///
    /// Returns `false` and changes nothing if the job already finished.
    pub fn finish(&mut self, status: JobStatus) -> bool {
        if self.is_terminal() || !status.is_terminal() {
            return false;
        }
        self.status = status;
        self.end_time = Some(Utc::now());
        true
    }

    /// Terminate the job as failed with `error`
    pub fn fail(&mut self, error: impl Into<String>) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.error = Some(error.into());
        self.finish(JobStatus::Failed)
    }
}
