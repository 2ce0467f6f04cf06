//! docflow - Retrying document-processing pipeline orchestrator
//!
//! Runs a document through a fixed plan of tools (text extraction,
//! classification, event extraction, risk detection, alerting, ...),
//! validates the result and retries failed steps by rewinding a cursor
//! into the plan.
//!
//! # Architecture
//!
//! Each job is a small state machine over one owned `ExecutionState`:
//! - Planning builds the plan and resets the cursor
//! - Executing runs steps from the cursor, halting on the first failure
//! - Validating checks the required outputs
//! - Recovering rewinds the cursor, bounded by `max_retries`
//!
//! Every tool call and phase is recorded in the state, so a finished job
//! carries its full execution trace.
//!
//! # Modules
//!
//! - `tools`: Tool contract, registry and the command/HTTP backends
//! - `core`: Phases, state machine and orchestrator
//! - `domain`: Data structures (ExecutionState, Plan, PipelineValues)
//! - `config`: Configuration loading
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Process a document
//! docflow run report.pdf --entity-id entity_1a2b3c4d
//!
//! # Inspect a finished job
//! docflow status <job-id>
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod tools;

// Re-export main types at crate root for convenience
pub use core::{JobRequest, JobResult, Orchestrator};
pub use domain::{ExecutionState, InputDescriptor, JobStatus, Plan, PipelineValues, ToolName};
pub use tools::{Tool, ToolOutput, ToolRegistry};
