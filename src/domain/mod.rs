//! Domain types for the docflow orchestrator.
//!
//! This module contains the core data structures:
//! - ExecutionState: the per-job record every phase mutates
//! - Plan: ordered, immutable steps bound to tools
//! - PipelineValues: typed slots for tool outputs
//! - Trace: append-only invocation and phase records

pub mod plan;
pub mod state;
pub mod trace;
pub mod values;

// Re-export commonly used types
pub use plan::{Plan, Step, ToolName};
pub use state::{ExecutionState, InputDescriptor, JobStatus, StoredInput};
pub use trace::{ExecutionLogEntry, Phase, ToolInvocationRecord};
pub use values::{Classification, OutputSlot, PipelineValues};
