//! Serving half: answer MCP requests on a line-delimited stream.
//!
//! The loop is strictly sequential. One request is read, handled and answered
//! before the next line is read, so handlers may own non-`Sync` resources such
//! as a database connection.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace, warn};

use crate::error::Result;
use crate::protocol::{
    CallToolParams, CallToolResult, Implementation, IncomingMessage, InitializeParams,
    InitializeResult, JsonRpcError, JsonRpcResponse, ListToolsResult, PROTOCOL_VERSION,
    ServerCapabilities, Tool, ToolsCapability,
};

/// The tool surface a server exposes.
pub trait ToolHandler {
    /// Name and version reported during initialization.
    fn info(&self) -> Implementation;

    /// Free-form usage hints for the client's model.
    fn instructions(&self) -> Option<String> {
        None
    }

    /// Tools advertised on `tools/list`.
    fn tools(&self) -> Vec<Tool>;

    /// Execute a tool.
    ///
    /// Execution failures belong in [`CallToolResult::error`]. Return `Err`
    /// only for protocol-level problems such as an unknown tool name or
    /// malformed arguments.
    fn call_tool(&self, params: CallToolParams) -> std::result::Result<CallToolResult, JsonRpcError>;
}

/// Serve requests from `reader`, writing responses to `writer`, until EOF.
pub async fn serve<H, R, W>(handler: &H, reader: R, mut writer: W) -> Result<()>
where
    H: ToolHandler,
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        trace!("<- {line}");

        let message: IncomingMessage = match serde_json::from_str(&line) {
            Ok(message) => message,
            Err(e) => {
                warn!("unparseable message: {e}");
                let response = JsonRpcResponse::failure(None, JsonRpcError::parse_error(e.to_string()));
                write_response(&mut writer, &response).await?;
                continue;
            }
        };

        let Some(id) = message.id.clone() else {
            debug!(method = %message.method, "notification");
            continue;
        };

        let response = match dispatch(handler, &message) {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(error) => {
                debug!(method = %message.method, %error, "request failed");
                JsonRpcResponse::failure(Some(id), error)
            }
        };
        write_response(&mut writer, &response).await?;
    }

    debug!("input closed, stopping");
    Ok(())
}

fn dispatch<H: ToolHandler>(
    handler: &H,
    message: &IncomingMessage,
) -> std::result::Result<Value, JsonRpcError> {
    match message.method.as_str() {
        "initialize" => {
            let params: InitializeParams = parse_params(message.params.clone())?;
            debug!(
                client = %params.client_info.name,
                requested = %params.protocol_version,
                "initialize"
            );
            to_value(InitializeResult {
                protocol_version: PROTOCOL_VERSION.to_string(),
                capabilities: ServerCapabilities {
                    tools: Some(ToolsCapability::default()),
                },
                server_info: handler.info(),
                instructions: handler.instructions(),
            })
        }
        "ping" => Ok(Value::Object(Default::default())),
        "tools/list" => to_value(ListToolsResult {
            tools: handler.tools(),
        }),
        "tools/call" => {
            let params: CallToolParams = parse_params(message.params.clone())?;
            to_value(handler.call_tool(params)?)
        }
        other => Err(JsonRpcError::method_not_found(other)),
    }
}

fn parse_params<T: DeserializeOwned>(params: Option<Value>) -> std::result::Result<T, JsonRpcError> {
    let params = params.ok_or_else(|| JsonRpcError::invalid_params("missing params"))?;
    serde_json::from_value(params).map_err(|e| JsonRpcError::invalid_params(e.to_string()))
}

fn to_value(value: impl Serialize) -> std::result::Result<Value, JsonRpcError> {
    serde_json::to_value(value).map_err(|e| JsonRpcError::new(-32603, e.to_string()))
}

async fn write_response<W: AsyncWrite + Unpin>(
    writer: &mut W,
    response: &JsonRpcResponse,
) -> Result<()> {
    let json = serde_json::to_string(response)?;
    trace!("-> {json}");
    writer.write_all(json.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::BufReader;

    struct Echo;

    impl ToolHandler for Echo {
        fn info(&self) -> Implementation {
            Implementation {
                name: "echo".into(),
                version: Some("0.0.1".into()),
            }
        }

        fn tools(&self) -> Vec<Tool> {
            vec![Tool {
                name: "echo".into(),
                description: None,
                input_schema: json!({"type": "object"}),
            }]
        }

        fn call_tool(
            &self,
            params: CallToolParams,
        ) -> std::result::Result<CallToolResult, JsonRpcError> {
            match params.name.as_str() {
                "echo" => Ok(CallToolResult::text(
                    params.arguments.unwrap_or(Value::Null).to_string(),
                )),
                other => Err(JsonRpcError::invalid_params(format!("unknown tool: {other}"))),
            }
        }
    }

    async fn run(input: &str) -> Vec<Value> {
        let mut output = Vec::new();
        serve(&Echo, BufReader::new(input.as_bytes()), &mut output)
            .await
            .unwrap();
        String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn handshake_and_listing() {
        let input = [
            json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": InitializeParams::default()}),
            json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
            json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}),
        ]
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("\n");

        let responses = run(&input).await;
        assert_eq!(responses.len(), 2, "notifications are not answered");
        assert_eq!(responses[0]["id"], 1);
        assert_eq!(responses[0]["result"]["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(responses[0]["result"]["serverInfo"]["name"], "echo");
        assert!(responses[0]["result"]["capabilities"]["tools"].is_object());
        assert_eq!(responses[1]["result"]["tools"][0]["name"], "echo");
    }

    #[tokio::test]
    async fn call_and_errors() {
        let input = [
            r#"{"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"name":"echo","arguments":{"a":1}}}"#,
            r#"{"jsonrpc":"2.0","id":2,"method":"tools/call","params":{"name":"nope"}}"#,
            r#"{"jsonrpc":"2.0","id":3,"method":"resources/list"}"#,
            r#"not json"#,
            r#"{"jsonrpc":"2.0","id":"x","method":"ping"}"#,
        ]
        .join("\n");

        let responses = run(&input).await;
        assert_eq!(responses.len(), 5);
        assert_eq!(responses[0]["result"]["content"][0]["text"], r#"{"a":1}"#);
        assert_eq!(responses[1]["error"]["code"], JsonRpcError::INVALID_PARAMS);
        assert_eq!(responses[2]["error"]["code"], JsonRpcError::METHOD_NOT_FOUND);
        assert_eq!(responses[3]["error"]["code"], JsonRpcError::PARSE_ERROR);
        assert_eq!(responses[3]["id"], Value::Null);
        assert_eq!(responses[4]["id"], "x");
        assert_eq!(responses[4]["result"], json!({}));
    }
}
