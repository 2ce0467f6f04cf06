//! Recovery phase.
//!
//! Decides whether a job that failed validation gets another pass, and
//! where that pass starts. The retry budget is checked before anything
//! is rewound, so `retry_count` never exceeds `max_retries`.

use std::collections::BTreeMap;

use serde_json::json;
use tracing::{error, info, warn};

use crate::domain::{ExecutionState, OutputSlot, Phase, ToolName};

use super::error::{max_retries_exceeded, JobError};
use super::validator::Validator;

/// Outcome of one recovery attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryDecision {
    /// Cursor rewound, run the executor again
    Retry { rewind_to: usize },

    /// Retry budget used up; the job is failed
    Exhausted,

    /// Nothing in the plan can fix the job; the job is failed
    Fatal,
}

/// Bounded retry with cursor rewind
#[derive(Debug, Clone, Default)]
pub struct RecoveryController {
    validator: Validator,
}

impl RecoveryController {
    pub fn new(validator: Validator) -> Self {
        Self { validator }
    }

    pub fn recover(&self, state: &mut ExecutionState) -> Result<RecoveryDecision, JobError> {
        if state.is_terminal() {
            return Err(JobError::StateTerminal(state.job_id));
        }

        if state.retry_count >= state.max_retries {
            let message = max_retries_exceeded(state.max_retries);
            error!(job_id = %state.job_id, retry_count = state.retry_count, "{}", message);
            state.log(
                Phase::Recovery,
                json!({"recovered": false, "reason": message}),
            );
            state.fail(message);
            return Ok(RecoveryDecision::Exhausted);
        }

        let (rewind_to, actions) = match self.target(state) {
            Ok(found) => found,
            Err(reason) => {
                let message = format!("No recovery target: {}", reason);
                error!(job_id = %state.job_id, "{}", message);
                state.log(
                    Phase::Recovery,
                    json!({"recovered": false, "reason": message}),
                );
                state.fail(message);
                return Ok(RecoveryDecision::Fatal);
            }
        };

        state.retry_count += 1;

        // this attempt used the last retry; nothing is rewound
        if state.retry_count >= state.max_retries {
            let message = max_retries_exceeded(state.max_retries);
            warn!(
                job_id = %state.job_id,
                retry_count = state.retry_count,
                max_retries = state.max_retries,
                "retry budget exhausted"
            );
            state.log(
                Phase::Recovery,
                json!({
                    "recovered": false,
                    "retry_scheduled": false,
                    "target": rewind_to,
                    "reason": message,
                }),
            );
            state.fail(message);
            return Ok(RecoveryDecision::Exhausted);
        }

        state.rewind(rewind_to);
        state.recovery_actions.extend(actions.iter().cloned());
        state.log(
            Phase::Recovery,
            json!({
                "recovered": true,
                "retry_scheduled": true,
                "rewind_to": rewind_to,
                "actions": actions,
            }),
        );

        info!(
            job_id = %state.job_id,
            retry_count = state.retry_count,
            rewind_to,
            "recovery scheduled retry"
        );
        Ok(RecoveryDecision::Retry { rewind_to })
    }

    /// Step to rewind to, with one action per thing being repaired.
    ///
    /// The target is the earliest of the failed steps and the producers of
    /// missing outputs. Failed-tool actions come first.
    fn target(&self, state: &ExecutionState) -> Result<(usize, Vec<String>), String> {
        let failed = self.failed_tool_targets(state);
        let missing = self.missing_output_targets(state)?;

        let rewind_to = failed
            .iter()
            .chain(missing.iter())
            .map(|(index, _)| *index)
            .min()
            .ok_or_else(|| {
                "validation failed without a failed tool or missing output".to_string()
            })?;

        let actions = failed
            .into_iter()
            .chain(missing)
            .map(|(_, action)| action)
            .collect();
        Ok((rewind_to, actions))
    }

    /// Steps whose tool failed in the current pass, one per tool
    fn failed_tool_targets(&self, state: &ExecutionState) -> Vec<(usize, String)> {
        let mut failed: BTreeMap<usize, ToolName> = BTreeMap::new();
        for record in state.current_pass_failures() {
            if !failed.values().any(|tool| *tool == record.tool) {
                failed.insert(record.step_index, record.tool);
            }
        }

        failed
            .into_iter()
            .map(|(index, tool)| (index, format!("Retry {} (step {})", tool, index)))
            .collect()
    }

    /// Producers of missing required outputs that already ran.
    ///
    /// Producers at or past the cursor run again anyway and are skipped.
    /// Errors when some missing output has no producer in the plan.
    fn missing_output_targets(
        &self,
        state: &ExecutionState,
    ) -> Result<Vec<(usize, String)>, String> {
        let missing = self.validator.missing_outputs(state);
        if missing.is_empty() {
            return Ok(Vec::new());
        }

        let plan = state
            .plan
            .as_ref()
            .ok_or_else(|| "job has no plan".to_string())?;

        let mut targets: Vec<(usize, OutputSlot)> = Vec::new();
        for slot in &missing {
            match plan.first_producer(*slot) {
                Some(index) if index < state.cursor => targets.push((index, *slot)),
                Some(_) => {}
                None => return Err(format!("no step produces {}", slot)),
            }
        }
        targets.sort();

        Ok(targets
            .into_iter()
            .filter_map(|(index, slot)| {
                plan.get(index).map(|step| {
                    (
                        index,
                        format!("Re-run {} (step {}) for missing {}", step.tool, index, slot),
                    )
                })
            })
            .collect())
    }
}
