//! Job state machine.
//!
//! ```text
//! Planning -> Executing -> Validating -> DoneSuccess
//!                 ^             |
//!                 |             v
//!                 +------- Recovering -> DoneFailed
//! ```
//!
//! Every pass through `Recovering` either rewinds the cursor and bumps
//! `retry_count`, or ends the job, so the machine always terminates.

use std::fmt;

use tracing::{debug, info, instrument};

use crate::domain::{ExecutionState, JobStatus};
use crate::tools::ToolRegistry;

use super::error::{max_retries_exceeded, JobError};
use super::executor::Executor;
use super::planner::{plan_job, Planner};
use super::recovery::{RecoveryController, RecoveryDecision};
use super::validator::Validator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphState {
    Planning,
    Executing,
    Validating,
    Recovering,
    DoneSuccess,
    DoneFailed,
}

impl GraphState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::DoneSuccess | Self::DoneFailed)
    }
}

impl fmt::Display for GraphState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Planning => "planning",
            Self::Executing => "executing",
            Self::Validating => "validating",
            Self::Recovering => "recovering",
            Self::DoneSuccess => "done_success",
            Self::DoneFailed => "done_failed",
        };
        f.write_str(name)
    }
}

/// Drives one job through the phases
pub struct GraphRunner<'a> {
    planner: &'a dyn Planner,
    registry: &'a ToolRegistry,
    validator: &'a Validator,
}

impl<'a> GraphRunner<'a> {
    pub fn new(planner: &'a dyn Planner, registry: &'a ToolRegistry, validator: &'a Validator) -> Self {
        Self {
            planner,
            registry,
            validator,
        }
    }

    /// Run until the job is terminal.
    ///
    /// Returns an error only if the job was already terminal when a phase
    /// tried to run; every other failure ends up in `state`.
    #[instrument(skip(self, state), fields(job_id = %state.job_id))]
    pub async fn run(&self, state: &mut ExecutionState) -> Result<GraphState, JobError> {
        let mut current = GraphState::Planning;

        while !current.is_terminal() {
            let next = self.step(current, state).await?;
            debug!(from = %current, to = %next, retry_count = state.retry_count, "transition");
            current = next;
        }

        info!(
            status = state.status.as_str(),
            retry_count = state.retry_count,
            "job finished"
        );
        Ok(current)
    }

    /// Perform one transition
    pub async fn step(
        &self,
        current: GraphState,
        state: &mut ExecutionState,
    ) -> Result<GraphState, JobError> {
        match current {
            GraphState::Planning => match plan_job(self.planner, state) {
                Ok(()) => Ok(GraphState::Executing),
                Err(err) => fail_on(err, state),
            },

            GraphState::Executing => match Executor::new(self.registry).run(state).await {
                Ok(_) => Ok(GraphState::Validating),
                Err(err) => fail_on(err, state),
            },

            GraphState::Validating => {
                if self.validator.validate(state)? {
                    state.error = None;
                    state.finish(JobStatus::Success);
                    Ok(GraphState::DoneSuccess)
                } else {
                    Ok(GraphState::Recovering)
                }
            }

            GraphState::Recovering => {
                match RecoveryController::new(self.validator.clone()).recover(state)? {
                    RecoveryDecision::Retry { .. } => Ok(GraphState::Executing),
                    RecoveryDecision::Exhausted => {
                        if !state.is_terminal() {
                            state.fail(max_retries_exceeded(state.max_retries));
                        }
                        Ok(GraphState::DoneFailed)
                    }
                    RecoveryDecision::Fatal => Ok(GraphState::DoneFailed),
                }
            }

            GraphState::DoneSuccess | GraphState::DoneFailed => Ok(current),
        }
    }
}

/// Fatal phase errors end the job; a terminal state is passed up
fn fail_on(err: JobError, state: &mut ExecutionState) -> Result<GraphState, JobError> {
    match err {
        JobError::StateTerminal(_) => Err(err),
        other => {
            state.fail(other.to_string());
            Ok(GraphState::DoneFailed)
        }
    }
}
