//! The `query_data` tool.

use mcp::{CallToolParams, CallToolResult, Implementation, JsonRpcError, Tool, ToolHandler};
use serde::Deserialize;
use serde_json::json;
use storage::Database;
use tracing::{debug, warn};

pub const QUERY_TOOL: &str = "query_data";

const SERVER_NAME: &str = "SQLite SQL Assistant";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct QueryArgs {
    sql: String,
}

/// Exposes one database connection as a single SQL tool.
pub struct SqlTools {
    db: Database,
}

impl SqlTools {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Run one statement, folding any failure into the returned text.
    pub fn query_data(&self, sql: &str) -> CallToolResult {
        debug!(%sql, "query_data");
        match self.db.query(sql) {
            Ok(output) => CallToolResult::text(output.to_string()),
            Err(e) => {
                warn!(%sql, error = %e, "statement failed");
                CallToolResult::error(format!("SQL error: {e}"))
            }
        }
    }
}

impl ToolHandler for SqlTools {
    fn info(&self) -> Implementation {
        Implementation {
            name: SERVER_NAME.to_string(),
            version: Some(env!("CARGO_PKG_VERSION").to_string()),
        }
    }

    fn instructions(&self) -> Option<String> {
        let mode = if self.db.policy().is_read_only() {
            "The database is read-only: only statements that do not modify it are accepted."
        } else {
            "Any single SQL statement is accepted, including ones that modify data or schema."
        };
        Some(format!(
            "Use `{QUERY_TOOL}` to run one SQLite statement at a time. \
             Inspect the schema through sqlite_schema when unsure. {mode}"
        ))
    }

    fn tools(&self) -> Vec<Tool> {
        vec![Tool {
            name: QUERY_TOOL.to_string(),
            description: Some("Executes raw SQL on the local SQLite database".to_string()),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "sql": {
                        "type": "string",
                        "description": "A single SQLite statement"
                    }
                },
                "required": ["sql"]
            }),
        }]
    }

    fn call_tool(&self, params: CallToolParams) -> Result<CallToolResult, JsonRpcError> {
        if params.name != QUERY_TOOL {
            return Err(JsonRpcError::invalid_params(format!(
                "unknown tool: {}",
                params.name
            )));
        }

        let arguments = params
            .arguments
            .ok_or_else(|| JsonRpcError::invalid_params("missing arguments"))?;
        let args: QueryArgs = serde_json::from_value(arguments)
            .map_err(|e| JsonRpcError::invalid_params(format!("bad arguments: {e}")))?;

        Ok(self.query_data(&args.sql))
    }
}
