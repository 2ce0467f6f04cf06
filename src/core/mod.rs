//! Core orchestration logic.
//!
//! This module contains:
//! - Planner: builds the plan for a job
//! - Executor: runs plan steps from the cursor
//! - Validator: checks the conditions for job success
//! - RecoveryController: bounded retries with cursor rewind
//! - GraphRunner: the state machine tying the phases together
//! - Orchestrator: entry point producing a `JobResult`
//! - InputStore / AuditStore: persistence collaborators

pub mod audit;
pub mod error;
pub mod executor;
pub mod graph;
pub mod orchestrator;
pub mod planner;
pub mod recovery;
pub mod storage;
pub mod validator;

// Re-export commonly used types
pub use audit::{AuditRecord, AuditStore};
pub use error::JobError;
pub use executor::{ExecutionHalt, Executor};
pub use graph::{GraphRunner, GraphState};
pub use orchestrator::{JobRequest, JobResult, Observability, Orchestrator};
pub use planner::{plan_job, FixedPlanner, Planner, StaticPlanner};
pub use recovery::{RecoveryController, RecoveryDecision};
pub use storage::{InputStore, LocalInputStore};
pub use validator::Validator;
