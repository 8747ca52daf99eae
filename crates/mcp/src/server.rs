//! Client-side handle to a spawned MCP server (spawn, communicate, lifecycle).

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::protocol::{
    CallToolParams, CallToolResult, InitializeParams, InitializeResult, JsonRpcRequest,
    JsonRpcResponse, ListToolsResult, RequestId, Tool,
};

/// Default timeout for MCP operations.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum size of a single response line (1MB).
pub const MAX_OUTPUT_SIZE: usize = 1024 * 1024;

/// Configuration for an MCP server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub name: String,
    pub command: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl ServerConfig {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            args: Vec::new(),
            env: HashMap::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// How long `shutdown` waits for the child to exit on its own.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

/// Child stdout plus any line read only partway when a request timed out.
struct LineReader {
    inner: BufReader<ChildStdout>,
    pending: Vec<u8>,
}

/// Handle to a running MCP server.
///
/// The child process is killed when the handle is dropped.
pub struct Server {
    config: ServerConfig,
    process: Mutex<Child>,
    /// `None` once closed by `shutdown`.
    stdin: Mutex<Option<ChildStdin>>,
    stdout: Mutex<LineReader>,
    next_id: AtomicI64,
    initialized: Mutex<bool>,
    server_info: Mutex<Option<InitializeResult>>,
    tools: Mutex<Vec<Tool>>,
}

impl Server {
    /// Spawn a new MCP server process.
    pub async fn spawn(config: ServerConfig) -> Result<Self> {
        let mut cmd = Command::new(&config.command);
        cmd.args(&config.args)
            .envs(&config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let spawn_error = |source| Error::Spawn {
            command: config.command.clone(),
            source,
        };

        let mut process = cmd.spawn().map_err(spawn_error)?;

        let stdin = process
            .stdin
            .take()
            .ok_or_else(|| spawn_error(std::io::Error::other("failed to capture stdin")))?;

        let stdout = process
            .stdout
            .take()
            .ok_or_else(|| spawn_error(std::io::Error::other("failed to capture stdout")))?;

        debug!(server = %config.name, command = %config.command, "spawned MCP server");

        Ok(Self {
            config,
            process: Mutex::new(process),
            stdin: Mutex::new(Some(stdin)),
            stdout: Mutex::new(LineReader {
                inner: BufReader::new(stdout),
                pending: Vec::new(),
            }),
            next_id: AtomicI64::new(1),
            initialized: Mutex::new(false),
            server_info: Mutex::new(None),
            tools: Mutex::new(Vec::new()),
        })
    }

    /// Get the server name.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Initialize the server (must be called before other operations).
    pub async fn initialize(&self) -> Result<&Self> {
        let params = InitializeParams::default();
        let result: InitializeResult = self.request("initialize", Some(params)).await?;
        debug!(
            server = %self.config.name,
            remote = %result.server_info.name,
            protocol = %result.protocol_version,
            "MCP server initialized"
        );

        self.notify("notifications/initialized", None::<()>).await?;

        let has_tools = result.capabilities.tools.is_some();
        *self.server_info.lock().await = Some(result);
        *self.initialized.lock().await = true;

        if has_tools {
            self.refresh_tools().await?;
        }

        Ok(self)
    }

    /// Get server info (after initialization).
    pub async fn server_info(&self) -> Option<InitializeResult> {
        self.server_info.lock().await.clone()
    }

    /// Refresh the list of available tools.
    pub async fn refresh_tools(&self) -> Result<()> {
        let result: ListToolsResult = self.request("tools/list", None::<()>).await?;
        *self.tools.lock().await = result.tools;
        Ok(())
    }

    /// Get the list of available tools.
    pub async fn tools(&self) -> Vec<Tool> {
        self.tools.lock().await.clone()
    }

    /// Call a tool by name.
    ///
    /// A result flagged `isError` is returned as [`Error::ToolCallFailed`].
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Option<serde_json::Value>,
    ) -> Result<CallToolResult> {
        if !*self.initialized.lock().await {
            return Err(Error::NotInitialized);
        }

        let params = CallToolParams {
            name: name.to_string(),
            arguments,
        };

        let result: CallToolResult = self.request("tools/call", Some(params)).await?;

        if result.is_error {
            return Err(Error::ToolCallFailed(result.joined_text()));
        }

        Ok(result)
    }

    /// Check if the server process is still running.
    pub async fn is_running(&self) -> bool {
        let mut process = self.process.lock().await;
        matches!(process.try_wait(), Ok(None))
    }

    /// Shut down the server.
    ///
    /// Closing stdin lets a well-behaved server exit on EOF. One that is
    /// still running after a short grace period is killed.
    pub async fn shutdown(self) -> Result<()> {
        let _ = self.notify("shutdown", None::<()>).await;
        // Dropping the handle closes the pipe.
        drop(self.stdin.lock().await.take());

        let mut process = self.process.lock().await;
        match timeout(SHUTDOWN_GRACE, process.wait()).await {
            Ok(status) => {
                debug!(server = %self.config.name, ?status, "MCP server exited");
            }
            Err(_) => {
                debug!(server = %self.config.name, "MCP server ignored EOF, killing");
                let _ = process.kill().await;
            }
        }

        Ok(())
    }

    // --- Internal methods ---

    fn next_request_id(&self) -> RequestId {
        RequestId::Number(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    async fn request<P, R>(&self, method: &str, params: Option<P>) -> Result<R>
    where
        P: serde::Serialize,
        R: serde::de::DeserializeOwned,
    {
        let id = self.next_request_id();
        let mut request = JsonRpcRequest::new(id.clone(), method);
        if let Some(p) = params {
            request = request.with_params(p);
        }

        let request_json = serde_json::to_string(&request)?;
        trace!(server = %self.config.name, %method, "-> {request_json}");
        self.write_line(&request_json).await?;

        let response = timeout(self.config.timeout, self.read_response(&id))
            .await
            .map_err(|_| Error::Timeout)??;

        let result_value = response.into_result()?;
        let result: R = serde_json::from_value(result_value)?;

        Ok(result)
    }

    async fn notify<P>(&self, method: &str, params: Option<P>) -> Result<()>
    where
        P: serde::Serialize,
    {
        // Notifications have no ID
        let mut notification = serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
        });
        if let Some(params) = params {
            notification["params"] = serde_json::to_value(params)?;
        }

        self.write_line(&serde_json::to_string(&notification)?)
            .await
    }

    async fn write_line(&self, line: &str) -> Result<()> {
        let mut guard = self.stdin.lock().await;
        let stdin = guard.as_mut().ok_or(Error::ServerExited)?;
        stdin.write_all(line.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await?;
        Ok(())
    }

    /// Read until the response to `expected` arrives.
    ///
    /// Responses to earlier requests that timed out are discarded. Reads go
    /// through `read_until` into a buffer owned by the handle, so a line cut
    /// short by a timeout is resumed rather than lost.
    async fn read_response(&self, expected: &RequestId) -> Result<JsonRpcResponse> {
        let mut stdout = self.stdout.lock().await;

        loop {
            let reader = &mut *stdout;
            let bytes_read = reader.inner.read_until(b'\n', &mut reader.pending).await?;
            if bytes_read == 0 {
                return Err(Error::ServerExited);
            }
            let line = std::mem::take(&mut reader.pending);

            if line.len() > MAX_OUTPUT_SIZE {
                return Err(Error::OutputTooLarge {
                    size: line.len(),
                    max: MAX_OUTPUT_SIZE,
                });
            }

            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }

            let value: serde_json::Value = serde_json::from_slice(&line)?;
            // Server-initiated notifications and requests carry a method.
            if value.get("method").is_some() {
                trace!(
                    server = %self.config.name,
                    "skipping server message: {}",
                    String::from_utf8_lossy(&line).trim_end()
                );
                continue;
            }

            let response: JsonRpcResponse = serde_json::from_value(value)?;
            if response.id.as_ref() == Some(expected) {
                return Ok(response);
            }
            if is_stale(response.id.as_ref(), expected) {
                trace!(
                    server = %self.config.name,
                    id = ?response.id,
                    "discarding late response"
                );
                continue;
            }

            return Err(Error::InvalidResponse(format!(
                "response ID mismatch: expected {expected:?}, got {:?}",
                response.id
            )));
        }
    }
}

/// Whether `got` answers a request issued before `expected`.
fn is_stale(got: Option<&RequestId>, expected: &RequestId) -> bool {
    matches!(
        (got, expected),
        (Some(RequestId::Number(got)), RequestId::Number(expected)) if got < expected
    )
}
