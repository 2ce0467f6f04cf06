//! HTTP-backed tools.
//!
//! Endpoint: POST <url> with the bound arguments as a JSON body. The
//! response body must be a tool output object.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::debug;

use super::{Tool, ToolArgs, ToolOutput};
use crate::domain::ToolName;

/// Tool implemented by a remote service
pub struct HttpTool {
    tool: ToolName,
    url: String,
    timeout: Option<Duration>,
    client: reqwest::Client,
}

impl HttpTool {
    pub fn new(tool: ToolName, url: String) -> Self {
        Self {
            tool,
            url,
            timeout: None,
            client: reqwest::Client::new(),
        }
    }

    /// Share a client (and its connection pool) across tools
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Tool for HttpTool {
    fn name(&self) -> ToolName {
        self.tool
    }

    async fn invoke(&self, args: ToolArgs) -> Result<ToolOutput> {
        debug!(tool = %self.tool, url = %self.url, "invoking http tool");

        let mut request = self.client.post(&self.url).json(&args);
        if let Some(limit) = self.timeout {
            request = request.timeout(limit);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("Failed to reach tool '{}' at {}", self.tool, self.url))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!(
                "Tool '{}' returned HTTP {}: {}",
                self.tool,
                status,
                body.trim()
            );
        }

        response
            .json::<ToolOutput>()
            .await
            .with_context(|| format!("Failed to parse response from tool '{}'", self.tool))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::state::tests::test_state;

    #[test]
    fn test_http_tool_creation() {
        let tool = HttpTool::new(
            ToolName::GenerateInsights,
            "http://localhost:8000/tools/generate_insights".to_string(),
        );
        assert_eq!(tool.name(), ToolName::GenerateInsights);
        assert_eq!(tool.url(), "http://localhost:8000/tools/generate_insights");
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_error() {
        let tool = HttpTool::new(ToolName::GenerateInsights, "http://127.0.0.1:9/".to_string())
            .with_timeout(Some(Duration::from_secs(2)));

        let state = test_state(3);
        let err = tool
            .invoke(ToolArgs::bind(ToolName::GenerateInsights, &state))
            .await
            .unwrap_err();

        assert!(err.to_string().contains("generate_insights"));
    }
}
