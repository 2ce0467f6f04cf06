//! Job-level errors.
//!
//! Tool failures never show up here: they are recorded in the job state
//! and handled by validation and recovery. These are the conditions that
//! end a job without a retry.

use thiserror::Error;
use uuid::Uuid;

use crate::domain::ToolName;

#[derive(Debug, Clone, Error)]
pub enum JobError {
    /// The plan could not be built
    #[error("Planner failed: {0}")]
    Planning(String),

    /// The plan reached a tool missing from the registry
    #[error("unknown tool: {tool} (step '{step}')")]
    UnknownTool { tool: ToolName, step: String },

    /// A phase was asked to run on a job that already finished
    #[error("Job {0} already reached a terminal state")]
    StateTerminal(Uuid),
}

/// Error message for an exhausted retry budget
pub fn max_retries_exceeded(max_retries: u32) -> String {
    format!("Max retries ({}) exceeded", max_retries)
}
