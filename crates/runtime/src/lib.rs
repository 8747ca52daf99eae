//! Conversational runtime: model backends, tool hosts and the session loop.
//!
//! A [`Session`] keeps the conversation history, sends it to a [`Backend`]
//! together with the specs of a [`ToolHost`], executes whatever tool calls
//! the model asks for and repeats until the model answers in plain text.
//!
//! # Example
//!
//! ```ignore
//! use mcp::ServerConfig;
//! use runtime::{AnthropicBackend, McpToolHost, Session};
//!
//! # async fn example() -> runtime::Result<()> {
//! let backend = AnthropicBackend::builder("sk-ant-api01-...", runtime::DEFAULT_MODEL)
//!     .system("You are a master SQLite assistant.")
//!     .build();
//! let tools = McpToolHost::spawn(
//!     ServerConfig::new("sqlite", "sqlchat-host").arg("--database").arg("database.db"),
//! )
//! .await?;
//!
//! let mut session = Session::new(backend, tools);
//! let answer = session.chat("Who is user 1?").await?;
//! println!("{answer}");
//! # Ok(())
//! # }
//! ```

mod error;
pub mod model;
pub mod providers;
mod session;
pub mod tools;

pub use error::{Error, Result};
pub use model::{
    Backend, FinishReason, Message, ModelError, ModelRequest, ModelResponse, Part, Role,
    ToolCall, ToolResult, ToolSpec, Usage,
};
pub use providers::{
    AnthropicBackend, AnthropicBackendBuilder, DEFAULT_BASE_URL, DEFAULT_MAX_TOKENS,
    DEFAULT_MODEL,
};
pub use session::{DEFAULT_MAX_TOOL_ROUNDS, Session};
pub use tools::{McpToolHost, ToolError, ToolHost};
