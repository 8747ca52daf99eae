//! MCP-backed tool host.

use super::{ToolError, ToolHost};
use crate::model::{ToolCall, ToolSpec};
use mcp::{Server, ServerConfig};
use serde_json::Value;
use tracing::{debug, info};

/// Tool host backed by an MCP server running as a child process.
pub struct McpToolHost {
    server: Server,
    specs: Vec<ToolSpec>,
    timeout_ms: u64,
}

impl McpToolHost {
    /// Spawn the server, run the handshake and cache its tool specs.
    pub async fn spawn(config: ServerConfig) -> Result<Self, mcp::Error> {
        let timeout_ms = u64::try_from(config.timeout.as_millis()).unwrap_or(u64::MAX);
        let server = Server::spawn(config).await?;
        server.initialize().await?;

        let specs: Vec<ToolSpec> = server.tools().await.into_iter().map(ToolSpec::from).collect();
        info!(
            server = server.name(),
            tools = specs.len(),
            "tool host ready"
        );

        Ok(Self {
            server,
            specs,
            timeout_ms,
        })
    }

    pub async fn shutdown(self) -> Result<(), mcp::Error> {
        self.server.shutdown().await
    }

    fn map_error(&self, error: mcp::Error) -> ToolError {
        match error {
            mcp::Error::ToolCallFailed(text) => ToolError::Execution(text),
            mcp::Error::Timeout => ToolError::Timeout(self.timeout_ms),
            mcp::Error::JsonRpc(e) => ToolError::InvalidInput(e.message),
            other => ToolError::Unavailable(other.to_string()),
        }
    }
}

impl ToolHost for McpToolHost {
    fn specs(&self) -> &[ToolSpec] {
        &self.specs
    }

    async fn execute(&self, call: &ToolCall) -> Result<Value, ToolError> {
        if !self.specs.iter().any(|spec| spec.name == call.name) {
            return Err(ToolError::NotFound(call.name.clone()));
        }
        if !call.input.is_object() {
            return Err(ToolError::InvalidInput(format!(
                "arguments must be an object, got {}",
                call.input
            )));
        }

        debug!(tool = %call.name, id = %call.id, "calling tool");
        let result = self
            .server
            .call_tool(&call.name, Some(call.input.clone()))
            .await
            .map_err(|e| self.map_error(e))?;

        Ok(Value::String(result.joined_text()))
    }
}
