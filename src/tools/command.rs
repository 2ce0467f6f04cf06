//! Subprocess-backed tools.
//!
//! The configured program receives the bound arguments as a JSON object on
//! stdin and must print a tool output object on stdout. The tool name is
//! also exported as `DOCFLOW_TOOL`, so a single program can serve several
//! tools.

use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

use super::{Tool, ToolArgs, ToolOutput};
use crate::domain::ToolName;

/// Tool implemented by an external program
pub struct CommandTool {
    tool: ToolName,

    /// Program followed by its arguments
    command: Vec<String>,

    /// Kill the program if it runs longer than this
    timeout: Option<Duration>,
}

impl CommandTool {
    pub fn new(tool: ToolName, command: Vec<String>) -> Self {
        Self {
            tool,
            command,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Spawn the program, feed it `input` and collect stdout
    async fn run(&self, input: &[u8]) -> Result<Vec<u8>> {
        let (program, args) = self
            .command
            .split_first()
            .with_context(|| format!("No command configured for tool '{}'", self.tool))?;

        let mut child = Command::new(program)
            .args(args)
            .env("DOCFLOW_TOOL", self.tool.as_str())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to spawn '{}' for tool '{}'", program, self.tool))?;

        let stdin = child.stdin.take();
        let exchange = async move {
            if let Some(mut stdin) = stdin {
                match stdin.write_all(input).await {
                    // the child may exit without reading its arguments
                    Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
                    other => other
                        .with_context(|| format!("Failed to write arguments to '{}'", program))?,
                }
                // Drop stdin to signal EOF
            }
            child
                .wait_with_output()
                .await
                .with_context(|| format!("Failed to wait for '{}'", program))
        };

        // the limit covers the stdin write too; a dropped child is killed
        let output = match self.timeout {
            Some(limit) => timeout(limit, exchange)
                .await
                .with_context(|| format!("Tool '{}' timed out after {:?}", self.tool, limit))??,
            None => exchange.await?,
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let exit_code = output.status.code().unwrap_or(-1);
            anyhow::bail!(
                "Tool '{}' exited with code {}: {}",
                self.tool,
                exit_code,
                stderr.trim()
            );
        }

        Ok(output.stdout)
    }
}

#[async_trait]
impl Tool for CommandTool {
    fn name(&self) -> ToolName {
        self.tool
    }

    async fn invoke(&self, args: ToolArgs) -> Result<ToolOutput> {
        let input = serde_json::to_vec(&args).context("Failed to serialize tool arguments")?;
        debug!(tool = %self.tool, bytes = input.len(), "invoking command tool");

        let stdout = self.run(&input).await?;

        serde_json::from_slice(&stdout)
            .with_context(|| format!("Tool '{}' printed invalid output JSON", self.tool))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::domain::state::tests::test_state;

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".to_string(), "-c".to_string(), script.to_string()]
    }

    #[tokio::test]
    async fn test_parses_stdout() {
        let tool = CommandTool::new(
            ToolName::ClassifySector,
            sh(r#"cat > /dev/null; echo '{"success": true, "classification": {"sector": "finance", "confidence": 0.8}}'"#),
        );

        let state = test_state(3);
        let output = tool
            .invoke(ToolArgs::bind(ToolName::ClassifySector, &state))
            .await
            .unwrap();

        assert!(output.success);
        assert_eq!(output.values.classification.unwrap().sector, "finance");
    }

    #[tokio::test]
    async fn test_receives_arguments_and_tool_name() {
        // echo back the tool name and the entity id we were given
        let tool = CommandTool::new(
            ToolName::GetTimeline,
            sh(r#"input=$(cat); case "$input" in *entity_test*) echo "{\"success\": true, \"error\": \"$DOCFLOW_TOOL\"}";; *) echo '{"success": false}';; esac"#),
        );

        let state = test_state(3);
        let output = tool
            .invoke(ToolArgs::bind(ToolName::GetTimeline, &state))
            .await
            .unwrap();

        assert!(output.success);
        assert_eq!(output.error.as_deref(), Some("get_timeline"));
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_error() {
        let tool = CommandTool::new(
            ToolName::StoreEvents,
            sh("cat > /dev/null; echo 'db down' >&2; exit 3"),
        );

        let state = test_state(3);
        let err = tool
            .invoke(ToolArgs::bind(ToolName::StoreEvents, &state))
            .await
            .unwrap_err();

        let message = format!("{:#}", err);
        assert!(message.contains("code 3"));
        assert!(message.contains("db down"));
    }

    #[tokio::test]
    async fn test_timeout() {
        let tool = CommandTool::new(ToolName::StoreAlerts, sh("sleep 5"))
            .with_timeout(Some(Duration::from_millis(100)));

        let state = test_state(3);
        let err = tool
            .invoke(ToolArgs::bind(ToolName::StoreAlerts, &state))
            .await
            .unwrap_err();

        assert!(format!("{:#}", err).contains("timed out"));
    }

    #[tokio::test]
    async fn test_timeout_covers_large_arguments() {
        // far beyond the pipe buffer, and the child never reads stdin
        let mut state = test_state(3);
        state.values.text = Some("x".repeat(512 * 1024));

        let tool = CommandTool::new(ToolName::ClassifySector, sh("sleep 4"))
            .with_timeout(Some(Duration::from_millis(200)));

        let started = std::time::Instant::now();
        let err = tool
            .invoke(ToolArgs::bind(ToolName::ClassifySector, &state))
            .await
            .unwrap_err();

        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(format!("{:#}", err).contains("timed out"));
    }

    #[tokio::test]
    async fn test_child_ignoring_stdin_still_succeeds() {
        let mut state = test_state(3);
        state.values.text = Some("y".repeat(256 * 1024));

        let tool = CommandTool::new(
            ToolName::ClassifySector,
            sh(r#"echo '{"success": true, "classification": {"sector": "retail"}}'"#),
        )
        .with_timeout(Some(Duration::from_secs(10)));

        let output = tool
            .invoke(ToolArgs::bind(ToolName::ClassifySector, &state))
            .await
            .unwrap();
        assert_eq!(output.values.classification.unwrap().sector, "retail");
    }

    #[tokio::test]
    async fn test_empty_command_is_error() {
        let tool = CommandTool::new(ToolName::StoreAlerts, Vec::new());
        let state = test_state(3);
        assert!(tool
            .invoke(ToolArgs::bind(ToolName::StoreAlerts, &state))
            .await
            .is_err());
    }
}
