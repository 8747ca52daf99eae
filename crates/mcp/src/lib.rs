//! MCP (Model Context Protocol) over stdio, both ends.
//!
//! [`Server`] spawns a server process and talks to it as a client.
//! [`serve`] runs the other side: it answers requests for a [`ToolHandler`].
//!
//! # Example
//!
//! ```no_run
//! use mcp::{Server, ServerConfig};
//!
//! # async fn example() -> mcp::Result<()> {
//! let config = ServerConfig::new("sqlite", "sqlchat-host")
//!     .arg("--database")
//!     .arg("database.db");
//!
//! let server = Server::spawn(config).await?;
//! server.initialize().await?;
//!
//! for tool in server.tools().await {
//!     println!("Tool: {}", tool.name);
//! }
//!
//! let result = server
//!     .call_tool("query_data", Some(serde_json::json!({ "sql": "SELECT 1" })))
//!     .await?;
//! println!("{}", result.joined_text());
//!
//! server.shutdown().await?;
//! # Ok(())
//! # }
//! ```

mod error;
mod protocol;
mod serve;
mod server;

pub use error::{Error, Result};
pub use protocol::{
    CallToolParams, CallToolResult, Implementation, IncomingMessage, InitializeParams,
    InitializeResult, JsonRpcError, JsonRpcRequest, JsonRpcResponse, ListToolsResult,
    PROTOCOL_VERSION, RequestId, ServerCapabilities, Tool, ToolContent, ToolsCapability,
};
pub use serve::{ToolHandler, serve};
pub use server::{DEFAULT_TIMEOUT, MAX_OUTPUT_SIZE, Server, ServerConfig};
