//! Validation phase.

use serde_json::json;
use tracing::{info, warn};

use crate::domain::{ExecutionState, OutputSlot, Phase, ToolName};

use super::error::JobError;

/// Checks the conditions a job needs to succeed
#[derive(Debug, Clone)]
pub struct Validator {
    required: Vec<(OutputSlot, String)>,
}

impl Default for Validator {
    fn default() -> Self {
        Self {
            required: vec![
                (
                    OutputSlot::Text,
                    "No text extracted from document".to_string(),
                ),
                (
                    OutputSlot::Classification,
                    "Sector classification failed".to_string(),
                ),
                (OutputSlot::Events, "No events extracted".to_string()),
            ],
        }
    }
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the required slots and the message reported when each is missing
    pub fn with_required(mut self, required: Vec<(OutputSlot, String)>) -> Self {
        self.required = required;
        self
    }

    /// Required slots that hold no usable value
    pub fn missing_outputs(&self, state: &ExecutionState) -> Vec<OutputSlot> {
        self.required
            .iter()
            .filter(|(slot, _)| !state.values.has(*slot))
            .map(|(slot, _)| *slot)
            .collect()
    }

    /// Check every condition and record the outcome on `state`.
    ///
    /// All violations are collected. Only `validation_passed`,
    /// `validation_errors` and the execution log are written.
    pub fn validate(&self, state: &mut ExecutionState) -> Result<bool, JobError> {
        if state.is_terminal() {
            return Err(JobError::StateTerminal(state.job_id));
        }

        let mut errors: Vec<String> = self
            .required
            .iter()
            .filter(|(slot, _)| !state.values.has(*slot))
            .map(|(_, message)| message.clone())
            .collect();

        let mut failed_tools: Vec<ToolName> = Vec::new();
        for record in state.current_pass_failures() {
            if !failed_tools.contains(&record.tool) {
                failed_tools.push(record.tool);
            }
        }
        if !failed_tools.is_empty() {
            let names: Vec<&str> = failed_tools.iter().map(ToolName::as_str).collect();
            errors.push(format!("Tools failed: {}", names.join(", ")));
        }

        let passed = errors.is_empty();
        let result = json!({"validation_passed": passed, "errors": errors});
        state.validation_passed = passed;
        state.validation_errors = errors;
        state.log(Phase::Validator, result);

        if passed {
            info!(job_id = %state.job_id, "validation passed");
        } else {
            warn!(
                job_id = %state.job_id,
                errors = ?state.validation_errors,
                retry_count = state.retry_count,
                "validation failed"
            );
        }

        Ok(passed)
    }
}
