//! Tool hosts: the boundary between the model loop and side effects.

pub mod errors;
mod host;
mod mcp_host;

pub use errors::ToolError;
pub use host::ToolHost;
pub use mcp_host::McpToolHost;
