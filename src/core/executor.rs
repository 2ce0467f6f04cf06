//! Execution phase.
//!
//! Walks the plan from the job's cursor, one step at a time, and stops at
//! the first step that does not succeed. The cursor is left on that step
//! so recovery can target it.

use std::time::Instant;

use serde_json::json;
use tracing::{error, info, warn};

use crate::domain::{ExecutionState, Phase, ToolInvocationRecord, ToolName};
use crate::tools::{DispatchError, ToolArgs, ToolRegistry};

use super::error::JobError;

/// Why an executor pass stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionHalt {
    /// The cursor reached the end of the plan
    Completed,

    /// A tool returned `success: false`
    ToolFailed { step_index: usize, tool: ToolName },

    /// A tool raised an error
    ToolRaised { step_index: usize, tool: ToolName },
}

/// Runs plan steps against a tool registry
pub struct Executor<'a> {
    registry: &'a ToolRegistry,
}

impl<'a> Executor<'a> {
    pub fn new(registry: &'a ToolRegistry) -> Self {
        Self { registry }
    }

    /// Execute steps from the cursor until the plan ends or a step fails.
    ///
    /// Tool failures are recorded in `state` and reported through the
    /// returned halt reason. Only an unknown tool is returned as an error.
    pub async fn run(&self, state: &mut ExecutionState) -> Result<ExecutionHalt, JobError> {
        if state.is_terminal() {
            return Err(JobError::StateTerminal(state.job_id));
        }

        info!(
            job_id = %state.job_id,
            current_step = state.cursor,
            pass = state.retry_count,
            "executor started"
        );

        while let Some(step) = state.current_step().cloned() {
            let step_index = state.cursor;
            let args = ToolArgs::bind(step.tool, state);

            info!(tool = %step.tool, step = step_index, "tool executing");
            let started = Instant::now();
            let result = self.registry.dispatch(args).await;
            let duration_ms = started.elapsed().as_millis() as u64;

            match result {
                Ok(output) if output.success => {
                    let summary = output.values.summarize();
                    state.record_invocation(
                        ToolInvocationRecord::new(
                            step.tool,
                            step_index,
                            step.name.clone(),
                            state.retry_count,
                            true,
                            summary,
                        )
                        .with_duration(duration_ms),
                    );

                    state.values.merge(step.tool.produces(), output.values);
                    state.advance();
                    state.log(
                        Phase::Executor,
                        json!({"tool": step.tool, "success": true, "step_completed": step.name}),
                    );

                    info!(tool = %step.tool, duration_ms, "executor step completed");
                }
                Ok(output) => {
                    let message = output
                        .error
                        .unwrap_or_else(|| "tool reported failure without a message".to_string());

                    state.record_invocation(
                        ToolInvocationRecord::new(
                            step.tool,
                            step_index,
                            step.name.clone(),
                            state.retry_count,
                            false,
                            "reported failure".to_string(),
                        )
                        .with_duration(duration_ms)
                        .with_error(message.clone()),
                    );
                    state.error = Some(format!(
                        "Tool {} failed at step '{}': {}",
                        step.tool, step.name, message
                    ));
                    state.log(
                        Phase::Executor,
                        json!({"tool": step.tool, "success": false, "step_failed": step.name, "error": message}),
                    );

                    warn!(tool = %step.tool, error = %message, "executor tool failed, stopping");
                    return Ok(ExecutionHalt::ToolFailed {
                        step_index,
                        tool: step.tool,
                    });
                }
                Err(DispatchError::UnknownTool { tool }) => {
                    error!(%tool, step = %step.name, "no tool registered for step");
                    state.log(
                        Phase::Executor,
                        json!({"tool": tool, "success": false, "unknown_tool": true, "step": step.name}),
                    );
                    return Err(JobError::UnknownTool {
                        tool,
                        step: step.name,
                    });
                }
                Err(DispatchError::Raised { tool, message }) => {
                    state.record_invocation(
                        ToolInvocationRecord::new(
                            tool,
                            step_index,
                            step.name.clone(),
                            state.retry_count,
                            false,
                            "raised error".to_string(),
                        )
                        .with_duration(duration_ms)
                        .with_error(message.clone()),
                    );
                    state.error = Some(format!("Execution failed at {}: {}", tool, message));
                    state.log(
                        Phase::Executor,
                        json!({"tool": tool, "success": false, "step_failed": step.name, "error": message}),
                    );

                    error!(%tool, error = %message, "executor error");
                    return Ok(ExecutionHalt::ToolRaised { step_index, tool });
                }
            }
        }

        info!(
            steps_completed = state.completed_steps.len(),
            total_steps = state.plan_len(),
            "executor finished"
        );
        Ok(ExecutionHalt::Completed)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use anyhow::Result;
    use async_trait::async_trait;

    use super::*;
    use crate::domain::state::tests::test_state;
    use crate::domain::{Classification, OutputSlot, Plan, PipelineValues, Step};
    use crate::tools::{Tool, ToolOutput};

    /// Succeeds, filling the slots the tool produces
    struct Filler(ToolName);

    #[async_trait]
    impl Tool for Filler {
        fn name(&self) -> ToolName {
            self.0
        }

        async fn invoke(&self, _args: ToolArgs) -> Result<ToolOutput> {
            let mut values = PipelineValues::default();
            for slot in self.0.produces() {
                match slot {
                    OutputSlot::Text => values.text = Some("document text".to_string()),
                    OutputSlot::Classification => {
                        values.classification = Some(Classification {
                            sector: "logistics".to_string(),
                            confidence: 0.7,
                        })
                    }
                    OutputSlot::Events => values.events = Some(vec![json!({"kind": "delay"})]),
                    _ => {}
                }
            }
            Ok(ToolOutput::ok(values))
        }
    }

    /// Fails (reports or raises) on its first `failures` calls
    struct Flaky {
        tool: ToolName,
        failures: usize,
        raise: bool,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Tool for Flaky {
        fn name(&self) -> ToolName {
            self.tool
        }

        async fn invoke(&self, _args: ToolArgs) -> Result<ToolOutput> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                if self.raise {
                    anyhow::bail!("connection reset");
                }
                return Ok(ToolOutput::failed("no events found"));
            }
            Ok(ToolOutput::ok(PipelineValues {
                events: Some(vec![json!({"kind": "late"})]),
                ..Default::default()
            }))
        }
    }

    fn three_step_plan() -> Plan {
        Plan::new(
            "three",
            "",
            vec![
                Step::new("preprocess", ToolName::PreprocessDocument, ""),
                Step::new("classify", ToolName::ClassifySector, ""),
                Step::new("extract", ToolName::ExtractEvents, ""),
            ],
        )
    }

    #[tokio::test]
    async fn test_runs_all_steps() {
        let registry = ToolRegistry::new()
            .with_tool(Filler(ToolName::PreprocessDocument))
            .with_tool(Filler(ToolName::ClassifySector))
            .with_tool(Filler(ToolName::ExtractEvents));

        let mut state = test_state(3);
        state.set_plan(three_step_plan());

        let halt = Executor::new(&registry).run(&mut state).await.unwrap();

        assert_eq!(halt, ExecutionHalt::Completed);
        assert_eq!(state.cursor, 3);
        assert_eq!(state.completed_steps, vec!["preprocess", "classify", "extract"]);
        assert_eq!(state.tool_invocations.len(), 3);
        assert!(state.tool_invocations.iter().all(|r| r.success && r.pass == 0));
        assert_eq!(state.values.text.as_deref(), Some("document text"));
        assert_eq!(state.execution_log.len(), 3);
    }

    #[tokio::test]
    async fn test_reported_failure_leaves_cursor_on_step() {
        let registry = ToolRegistry::new()
            .with_tool(Filler(ToolName::PreprocessDocument))
            .with_tool(Filler(ToolName::ClassifySector))
            .with_tool(Flaky {
                tool: ToolName::ExtractEvents,
                failures: 1,
                raise: false,
                calls: AtomicUsize::new(0),
            });

        let mut state = test_state(3);
        state.set_plan(three_step_plan());

        let halt = Executor::new(&registry).run(&mut state).await.unwrap();

        assert_eq!(
            halt,
            ExecutionHalt::ToolFailed {
                step_index: 2,
                tool: ToolName::ExtractEvents
            }
        );
        assert_eq!(state.cursor, 2);
        assert_eq!(state.completed_steps.len(), 2);
        assert!(state.values.events.is_none());

        let last = state.tool_invocations.last().unwrap();
        assert!(!last.success);
        assert_eq!(last.step_index, 2);
        assert_eq!(last.error.as_deref(), Some("no events found"));
        assert!(state.error.as_deref().unwrap().contains("no events found"));
    }

    #[tokio::test]
    async fn test_raised_error_is_recorded() {
        let registry = ToolRegistry::new().with_tool(Flaky {
            tool: ToolName::PreprocessDocument,
            failures: 1,
            raise: true,
            calls: AtomicUsize::new(0),
        });

        let mut state = test_state(3);
        state.set_plan(three_step_plan());

        let halt = Executor::new(&registry).run(&mut state).await.unwrap();

        assert!(matches!(halt, ExecutionHalt::ToolRaised { step_index: 0, .. }));
        assert_eq!(state.cursor, 0);
        assert_eq!(state.tool_invocations.len(), 1);
        assert!(state
            .error
            .as_deref()
            .unwrap()
            .starts_with("Execution failed at preprocess_document"));
    }

    #[tokio::test]
    async fn test_unknown_tool_is_fatal() {
        let registry = ToolRegistry::new().with_tool(Filler(ToolName::PreprocessDocument));

        let mut state = test_state(3);
        state.set_plan(three_step_plan());

        let err = Executor::new(&registry).run(&mut state).await.unwrap_err();

        assert!(matches!(
            err,
            JobError::UnknownTool {
                tool: ToolName::ClassifySector,
                ..
            }
        ));
        // the registered step ran, the unknown one left no invocation behind
        assert_eq!(state.cursor, 1);
        assert_eq!(state.tool_invocations.len(), 1);
    }

    #[tokio::test]
    async fn test_resumes_from_cursor() {
        let registry = ToolRegistry::new().with_tool(Filler(ToolName::ExtractEvents));

        let mut state = test_state(3);
        state.set_plan(three_step_plan());
        state.advance();
        state.advance();

        let halt = Executor::new(&registry).run(&mut state).await.unwrap();

        assert_eq!(halt, ExecutionHalt::Completed);
        assert_eq!(state.tool_invocations.len(), 1);
        assert_eq!(state.tool_invocations[0].tool, ToolName::ExtractEvents);
    }

    #[tokio::test]
    async fn test_terminal_state_rejected() {
        let registry = ToolRegistry::new();
        let mut state = test_state(3);
        state.set_plan(three_step_plan());
        state.fail("done");

        assert!(matches!(
            Executor::new(&registry).run(&mut state).await,
            Err(JobError::StateTerminal(_))
        ));
        assert!(state.tool_invocations.is_empty());
    }
}
