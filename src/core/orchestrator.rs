//! Job orchestrator.
//!
//! Entry point for callers: stores the input, builds the initial state,
//! drives it through the state machine and turns the final state into a
//! [`JobResult`].

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::config::{ResolvedConfig, DEFAULT_MAX_RETRIES};
use crate::domain::{
    ExecutionLogEntry, ExecutionState, InputDescriptor, JobStatus, PipelineValues,
    ToolInvocationRecord,
};
use crate::tools::ToolRegistry;

use super::audit::{AuditRecord, AuditStore};
use super::graph::GraphRunner;
use super::planner::{Planner, StaticPlanner};
use super::storage::{generate_entity_id, InputStore, LocalInputStore};
use super::validator::Validator;

/// Raw inputs for one job
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub payload: Vec<u8>,
    pub input: InputDescriptor,
    /// Generated when absent
    pub entity_id: Option<String>,
}

impl JobRequest {
    pub fn new(payload: Vec<u8>, input: InputDescriptor) -> Self {
        Self {
            payload,
            input,
            entity_id: None,
        }
    }

    pub fn with_entity_id(mut self, entity_id: impl Into<String>) -> Self {
        self.entity_id = Some(entity_id.into());
        self
    }
}

/// Execution trace attached to every result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observability {
    pub execution_log: Vec<ExecutionLogEntry>,
    pub tool_invocations: Vec<ToolInvocationRecord>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub validation_passed: bool,
    pub validation_errors: Vec<String>,
    pub recovery_actions: Vec<String>,
    pub completed_steps: Vec<String>,
    pub cursor: usize,
}

impl Observability {
    pub fn from_state(state: &ExecutionState) -> Self {
        Self {
            execution_log: state.execution_log.clone(),
            tool_invocations: state.tool_invocations.clone(),
            retry_count: state.retry_count,
            max_retries: state.max_retries,
            validation_passed: state.validation_passed,
            validation_errors: state.validation_errors.clone(),
            recovery_actions: state.recovery_actions.clone(),
            completed_steps: state.completed_steps.clone(),
            cursor: state.cursor,
        }
    }
}

/// Caller-facing outcome of a job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResult {
    pub status: JobStatus,
    pub entity_id: String,
    pub job_id: Uuid,
    pub file_id: String,
    pub filename: String,

    /// Everything the tools derived
    #[serde(flatten)]
    pub outputs: PipelineValues,

    pub execution_time_seconds: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub observability: Observability,
}

impl JobResult {
    fn from_state(state: ExecutionState, execution_time_seconds: f64) -> Self {
        let observability = Observability::from_state(&state);
        Self {
            status: state.status,
            entity_id: state.entity_id,
            job_id: state.job_id,
            file_id: state.stored.file_id,
            filename: state.input.filename,
            outputs: state.values,
            execution_time_seconds,
            error: state.error,
            observability,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == JobStatus::Success
    }
}

/// Runs document jobs
pub struct Orchestrator {
    registry: ToolRegistry,
    planner: Arc<dyn Planner>,
    validator: Validator,
    store: Arc<dyn InputStore>,
    audit: Option<AuditStore>,
    max_retries: u32,
}

impl Orchestrator {
    /// Standard plan, default validation, no audit trail
    pub fn new(registry: ToolRegistry, store: Arc<dyn InputStore>) -> Self {
        Self {
            registry,
            planner: Arc::new(StaticPlanner),
            validator: Validator::new(),
            store,
            audit: None,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    /// Tools, storage and audit trail as configured
    pub fn from_config(config: &ResolvedConfig) -> Self {
        Self::new(
            ToolRegistry::from_config(&config.tools),
            Arc::new(LocalInputStore::new(config.files_dir())),
        )
        .with_audit(AuditStore::new(config.audit_path()))
        .with_max_retries(config.max_retries)
    }

    pub fn with_planner(mut self, planner: impl Planner + 'static) -> Self {
        self.planner = Arc::new(planner);
        self
    }

    pub fn with_validator(mut self, validator: Validator) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_audit(mut self, audit: AuditStore) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Process one document to a terminal result.
    ///
    /// Only a failure to store the input is returned as an error. Once the
    /// job exists, every outcome is a [`JobResult`].
    #[instrument(skip(self, request), fields(filename = %request.input.filename))]
    pub async fn process_document(&self, request: JobRequest) -> Result<JobResult> {
        let JobRequest {
            payload,
            input,
            entity_id,
        } = request;

        let stored = self
            .store
            .upload(&payload, &input)
            .await
            .with_context(|| format!("Failed to store input '{}'", input.filename))?;

        let entity_id = entity_id.unwrap_or_else(generate_entity_id);
        let job_id = Uuid::new_v4();
        info!(%job_id, %entity_id, file_id = %stored.file_id, "job started");

        let mut state = ExecutionState::new(
            job_id,
            entity_id,
            input,
            Arc::from(payload),
            stored,
            self.max_retries,
        );

        let runner = GraphRunner::new(self.planner.as_ref(), &self.registry, &self.validator);
        let ended_at = match runner.run(&mut state).await {
            Ok(_) => match state.end_time {
                Some(end) => end,
                None => {
                    warn!(%job_id, "job finished without end_time, using current time");
                    Utc::now()
                }
            },
            Err(err) => {
                error!(%job_id, error = %err, "job runner aborted");
                state.fail(err.to_string());
                Utc::now()
            }
        };

        let execution_time_seconds = elapsed_seconds(state.start_time, ended_at);

        if let Some(audit) = &self.audit {
            let record = AuditRecord::from_state(&state, ended_at, execution_time_seconds);
            if let Err(e) = audit.append(&record).await {
                warn!(%job_id, error = %e, "failed to write audit record");
            }
        }

        info!(
            %job_id,
            status = state.status.as_str(),
            retry_count = state.retry_count,
            execution_time_seconds,
            "job completed"
        );

        Ok(JobResult::from_state(state, execution_time_seconds))
    }
}

fn elapsed_seconds(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    (end - start).num_milliseconds().max(0) as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Duration;
    use tempfile::TempDir;

    use crate::domain::StoredInput;

    struct BrokenStore;

    #[async_trait]
    impl InputStore for BrokenStore {
        async fn upload(&self, _payload: &[u8], _input: &InputDescriptor) -> Result<StoredInput> {
            anyhow::bail!("disk full")
        }
    }

    #[tokio::test]
    async fn test_upload_failure_is_error() {
        let orchestrator = Orchestrator::new(ToolRegistry::new(), Arc::new(BrokenStore));

        let err = orchestrator
            .process_document(JobRequest::new(b"x".to_vec(), InputDescriptor::new("a.txt")))
            .await
            .unwrap_err();

        assert!(format!("{:#}", err).contains("disk full"));
    }

    #[tokio::test]
    async fn test_failed_job_still_returns_result() {
        let temp = TempDir::new().unwrap();
        let audit = AuditStore::new(temp.path().join("audit.jsonl"));
        let orchestrator = Orchestrator::new(
            ToolRegistry::new(),
            Arc::new(LocalInputStore::new(temp.path().join("files"))),
        )
        .with_audit(audit.clone());

        let result = orchestrator
            .process_document(
                JobRequest::new(b"%PDF".to_vec(), InputDescriptor::new("r.pdf"))
                    .with_entity_id("entity_42"),
            )
            .await
            .unwrap();

        assert_eq!(result.status, JobStatus::Failed);
        assert_eq!(result.entity_id, "entity_42");
        assert!(result.file_id.starts_with("file_"));
        assert!(result.error.as_deref().unwrap().starts_with("unknown tool:"));
        assert!(result.execution_time_seconds >= 0.0);

        let records = audit.replay().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].job_id, result.job_id);
        assert_eq!(records[0].observability, result.observability);
    }

    #[test]
    fn test_elapsed_seconds() {
        let start = Utc::now();
        assert_eq!(elapsed_seconds(start, start + Duration::milliseconds(1500)), 1.5);
        assert_eq!(elapsed_seconds(start, start - Duration::seconds(1)), 0.0);
    }

    #[test]
    fn test_result_json_flattens_outputs() {
        let mut state = crate::domain::state::tests::test_state(3);
        state.values.text = Some("hello".to_string());
        state.finish(JobStatus::Success);

        let json = serde_json::to_value(JobResult::from_state(state, 1.0)).unwrap();

        assert_eq!(json["status"], "success");
        assert_eq!(json["text"], "hello");
        assert!(json.get("events").is_none());
        assert_eq!(json["observability"]["retry_count"], 0);
    }
}
