//! Tool contract and dispatch.
//!
//! Tools are the external operations a plan step invokes. The orchestrator
//! only knows a tool's name, the arguments it binds from job state, and the
//! success flag plus outputs it gets back. Concrete tools are reached
//! through the command and HTTP adapters, or registered directly.

pub mod args;
pub mod command;
pub mod http;

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::error;

use crate::config::ToolBackend;
use crate::domain::{PipelineValues, ToolName};

pub use args::ToolArgs;
pub use command::CommandTool;
pub use http::HttpTool;

/// What a tool returns.
///
/// Wire format: `{"success": bool, "error"?: string, ...slots}` where the
/// slots are the [`PipelineValues`] fields the tool produces. Any slot may
/// be omitted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolOutput {
    /// Whether the tool considers its work done
    #[serde(default)]
    pub success: bool,

    /// Failure description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Produced values
    #[serde(flatten)]
    pub values: PipelineValues,
}

impl ToolOutput {
    /// A successful output carrying `values`
    pub fn ok(values: PipelineValues) -> Self {
        Self {
            success: true,
            error: None,
            values,
        }
    }

    /// A reported failure
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            values: PipelineValues::default(),
        }
    }
}

/// Trait for tools the executor can invoke
#[async_trait]
pub trait Tool: Send + Sync {
    /// Which tool this is
    fn name(&self) -> ToolName;

    /// Run the tool with arguments bound from job state.
    ///
    /// `Ok` with `success: false` is a reported failure; `Err` is an
    /// unexpected one. Both are recoverable from the job's point of view.
    async fn invoke(&self, args: ToolArgs) -> Result<ToolOutput>;
}

/// Errors from looking up or invoking a tool
#[derive(Debug, Clone, Error)]
pub enum DispatchError {
    /// The plan reached a tool nobody registered. Configuration defect, never retried.
    #[error("unknown tool: {tool}")]
    UnknownTool { tool: ToolName },

    /// The tool itself raised an error
    #[error("tool {tool} raised: {message}")]
    Raised { tool: ToolName, message: String },
}

impl DispatchError {
    /// Whether the job must stop without retrying
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::UnknownTool { .. })
    }
}

/// Name-keyed table of tools.
///
/// Built once and handed to the orchestrator; jobs share it read-only.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<ToolName, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from the configured tool backends
    pub fn from_config(backends: &BTreeMap<ToolName, ToolBackend>) -> Self {
        let mut registry = Self::new();

        for (name, backend) in backends {
            let tool: Arc<dyn Tool> = match backend {
                ToolBackend::Command {
                    command,
                    timeout_seconds,
                } => Arc::new(
                    CommandTool::new(*name, command.clone())
                        .with_timeout(timeout_seconds.map(Duration::from_secs)),
                ),
                ToolBackend::Http {
                    url,
                    timeout_seconds,
                } => Arc::new(
                    HttpTool::new(*name, url.clone())
                        .with_timeout(timeout_seconds.map(Duration::from_secs)),
                ),
            };
            registry.register(tool);
        }

        registry
    }

    /// Register a tool under its own name, replacing any previous one
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Option<Arc<dyn Tool>> {
        self.tools.insert(tool.name(), tool)
    }

    /// Builder-style [`register`](Self::register)
    pub fn with_tool(mut self, tool: impl Tool + 'static) -> Self {
        self.register(Arc::new(tool));
        self
    }

    pub fn get(&self, name: ToolName) -> Result<&Arc<dyn Tool>, DispatchError> {
        self.tools
            .get(&name)
            .ok_or(DispatchError::UnknownTool { tool: name })
    }

    pub fn contains(&self, name: ToolName) -> bool {
        self.tools.contains_key(&name)
    }

    /// Registered tool names in declaration order
    pub fn names(&self) -> Vec<ToolName> {
        let mut names: Vec<ToolName> = self.tools.keys().copied().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Invoke `args`' tool.
    ///
    /// The tool runs on its own task, so a panic inside it comes back as
    /// [`DispatchError::Raised`] like any other raised error.
    pub async fn dispatch(&self, args: ToolArgs) -> Result<ToolOutput, DispatchError> {
        let name = args.tool();
        let tool = Arc::clone(self.get(name)?);

        let joined = tokio::spawn(async move { tool.invoke(args).await }).await;

        match joined {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(DispatchError::Raised {
                tool: name,
                message: format!("{:#}", e),
            }),
            Err(e) => {
                let message = panic_message(e);
                error!(tool = %name, error = %message, "tool task aborted");
                Err(DispatchError::Raised { tool: name, message })
            }
        }
    }
}

fn panic_message(err: tokio::task::JoinError) -> String {
    if !err.is_panic() {
        return format!("tool task cancelled: {}", err);
    }
    let payload = err.into_panic();
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string());
    format!("tool panicked: {}", detail)
}

impl fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}
