//! Anthropic Messages API backend.

use crate::model::{
    Backend, FinishReason, Message, ModelError, ModelRequest, ModelResponse, Part, Role,
    ToolCall, ToolSpec, Usage,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
pub const DEFAULT_MAX_TOKENS: u32 = 8000;

const ANTHROPIC_VERSION: &str = "2023-06-01";

// ─────────────────────────────────────────────────────────────────────────────
// API Wire Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ApiRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ApiTool>,
}

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: &'static str,
    content: Vec<ApiContentBlock>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ApiContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
    },
}

#[derive(Debug, Serialize)]
struct ApiTool {
    name: String,
    description: String,
    input_schema: Value,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    content: Vec<ApiResponseBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
    usage: ApiUsage,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ApiResponseBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    input_tokens: u32,
    output_tokens: u32,
}

// ─────────────────────────────────────────────────────────────────────────────
// Backend Implementation
// ─────────────────────────────────────────────────────────────────────────────

/// Builder for creating an Anthropic backend.
#[derive(Debug, Clone)]
pub struct AnthropicBackendBuilder {
    api_key: String,
    model: String,
    max_tokens: u32,
    system: Option<String>,
    base_url: String,
}

impl AnthropicBackendBuilder {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            max_tokens: DEFAULT_MAX_TOKENS,
            system: None,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Point the backend at another host, e.g. a proxy or a test server.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn build(self) -> AnthropicBackend {
        AnthropicBackend {
            client: reqwest::Client::new(),
            api_key: self.api_key,
            model: self.model,
            max_tokens: self.max_tokens,
            system: self.system,
            endpoint: format!("{}/v1/messages", self.base_url.trim_end_matches('/')),
        }
    }
}

/// Anthropic API backend.
pub struct AnthropicBackend {
    client: reqwest::Client,
    api_key: String,
    model: String,
    max_tokens: u32,
    system: Option<String>,
    endpoint: String,
}

impl AnthropicBackend {
    pub fn builder(
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> AnthropicBackendBuilder {
        AnthropicBackendBuilder::new(api_key, model)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn role_to_api(role: Role) -> &'static str {
        match role {
            Role::User | Role::System => "user",
            Role::Assistant => "assistant",
        }
    }

    fn part_to_api(part: &Part) -> Option<ApiContentBlock> {
        match part {
            Part::Text(text) if text.is_empty() => None,
            Part::Text(text) => Some(ApiContentBlock::Text { text: text.clone() }),
            Part::ToolCall(call) => Some(ApiContentBlock::ToolUse {
                id: call.id.clone(),
                name: call.name.clone(),
                input: call.input.clone(),
            }),
            Part::ToolResult(result) => Some(ApiContentBlock::ToolResult {
                tool_use_id: result.tool_call_id().to_string(),
                content: result.content(),
                is_error: result.is_error(),
            }),
        }
    }

    /// Convert history to wire messages.
    ///
    /// Consecutive turns with the same role are merged: the API wants every
    /// tool result answering one assistant turn inside a single user message.
    fn messages_to_api(messages: &[Message]) -> Vec<ApiMessage> {
        let mut out: Vec<ApiMessage> = Vec::new();
        for msg in messages.iter().filter(|m| m.role != Role::System) {
            let role = Self::role_to_api(msg.role);
            let blocks: Vec<ApiContentBlock> =
                msg.parts.iter().filter_map(Self::part_to_api).collect();
            if blocks.is_empty() {
                continue;
            }
            match out.last_mut() {
                Some(last) if last.role == role => last.content.extend(blocks),
                _ => out.push(ApiMessage {
                    role,
                    content: blocks,
                }),
            }
        }
        out
    }

    fn tool_to_api(spec: &ToolSpec) -> ApiTool {
        ApiTool {
            name: spec.name.clone(),
            description: spec.description.clone(),
            input_schema: spec.schema.clone(),
        }
    }

    fn response_to_message(blocks: Vec<ApiResponseBlock>) -> Message {
        let parts: Vec<Part> = blocks
            .into_iter()
            .filter_map(|block| match block {
                ApiResponseBlock::Text { text } if text.is_empty() => None,
                ApiResponseBlock::Text { text } => Some(Part::Text(text)),
                ApiResponseBlock::ToolUse { id, name, input } => {
                    Some(Part::ToolCall(ToolCall { id, name, input }))
                }
                ApiResponseBlock::Unknown => None,
            })
            .collect();

        Message {
            role: Role::Assistant,
            parts,
        }
    }

    fn finish_reason(stop_reason: Option<String>) -> FinishReason {
        match stop_reason.as_deref() {
            None | Some("end_turn") | Some("stop_sequence") => FinishReason::Stop,
            Some("tool_use") => FinishReason::ToolCalls,
            Some("max_tokens") => FinishReason::Length,
            Some("refusal") => FinishReason::ContentFilter,
            Some(other) => FinishReason::Unknown(other.to_string()),
        }
    }
}

impl std::fmt::Display for AnthropicBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "anthropic({})", self.model)
    }
}

impl Backend for AnthropicBackend {
    async fn call(&self, request: ModelRequest<'_>) -> Result<ModelResponse, ModelError> {
        let api_request = ApiRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            messages: Self::messages_to_api(request.messages),
            system: self.system.clone(),
            tools: request.tools.iter().map(Self::tool_to_api).collect(),
        };

        debug!(
            model = %self.model,
            messages = api_request.messages.len(),
            tools = api_request.tools.len(),
            "sending messages request"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .header("accept", "application/json")
            .json(&api_request)
            .send()
            .await
            .map_err(|e| ModelError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::Api(format!("{status}: {body}")));
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| ModelError::InvalidResponse(e.to_string()))?;

        let finish_reason = Self::finish_reason(api_response.stop_reason);
        let message = Self::response_to_message(api_response.content);
        let usage = Usage {
            input_tokens: api_response.usage.input_tokens,
            output_tokens: api_response.usage.output_tokens,
        };

        debug!(
            ?finish_reason,
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            "model responded"
        );

        Ok(ModelResponse {
            message,
            usage,
            finish_reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ToolResult;
    use crate::tools::ToolError;
    use mockito::Matcher;
    use serde_json::json;

    fn call(id: &str, sql: &str) -> Part {
        Part::ToolCall(ToolCall {
            id: id.into(),
            name: "query_data".into(),
            input: json!({ "sql": sql }),
        })
    }

    #[test]
    fn tool_results_are_merged_into_one_user_message() {
        let history = vec![
            Message::user("How many users and orders?"),
            Message {
                role: Role::Assistant,
                parts: vec![
                    Part::Text("Checking.".into()),
                    call("a", "SELECT count(*) FROM users"),
                    call("b", "SELECT count(*) FROM orders"),
                ],
            },
            Message::tool_result(ToolResult::Success {
                tool_call_id: "a".into(),
                output: Value::String("count(*)\n2".into()),
            }),
            Message::tool_result(ToolResult::Failure {
                tool_call_id: "b".into(),
                error: ToolError::Execution("SQL error: no such table: orders".into()),
            }),
        ];

        let wire = serde_json::to_value(AnthropicBackend::messages_to_api(&history)).unwrap();
        assert_eq!(
            wire,
            json!([
                {"role": "user", "content": [{"type": "text", "text": "How many users and orders?"}]},
                {"role": "assistant", "content": [
                    {"type": "text", "text": "Checking."},
                    {"type": "tool_use", "id": "a", "name": "query_data", "input": {"sql": "SELECT count(*) FROM users"}},
                    {"type": "tool_use", "id": "b", "name": "query_data", "input": {"sql": "SELECT count(*) FROM orders"}}
                ]},
                {"role": "user", "content": [
                    {"type": "tool_result", "tool_use_id": "a", "content": "count(*)\n2"},
                    {"type": "tool_result", "tool_use_id": "b", "content": "SQL error: no such table: orders", "is_error": true}
                ]}
            ])
        );
    }

    #[test]
    fn empty_turns_are_dropped() {
        let history = vec![
            Message::user("hi"),
            Message {
                role: Role::Assistant,
                parts: vec![],
            },
            Message::user("anyone there?"),
        ];
        let wire = AnthropicBackend::messages_to_api(&history);
        assert_eq!(wire.len(), 1);
        assert_eq!(wire[0].content.len(), 2);
    }

    #[test]
    fn stop_reasons() {
        assert_eq!(AnthropicBackend::finish_reason(None), FinishReason::Stop);
        assert_eq!(
            AnthropicBackend::finish_reason(Some("tool_use".into())),
            FinishReason::ToolCalls
        );
        assert_eq!(
            AnthropicBackend::finish_reason(Some("max_tokens".into())),
            FinishReason::Length
        );
        assert_eq!(
            AnthropicBackend::finish_reason(Some("pause_turn".into())),
            FinishReason::Unknown("pause_turn".into())
        );
    }

    #[test]
    fn display_and_defaults() {
        let backend = AnthropicBackend::builder("key", DEFAULT_MODEL)
            .base_url("http://localhost:9/")
            .build();
        assert_eq!(backend.to_string(), format!("anthropic({DEFAULT_MODEL})"));
        assert_eq!(backend.endpoint, "http://localhost:9/v1/messages");
        assert_eq!(backend.max_tokens, DEFAULT_MAX_TOKENS);
    }

    #[tokio::test]
    async fn call_sends_tools_and_parses_tool_use() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/messages")
            .match_header("x-api-key", "test-key")
            .match_header("anthropic-version", ANTHROPIC_VERSION)
            .match_body(Matcher::PartialJson(json!({
                "model": "test-model",
                "max_tokens": 8000,
                "system": "You are a SQL assistant."
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "id": "msg_1",
                    "type": "message",
                    "role": "assistant",
                    "content": [
                        {"type": "text", "text": "Let me look."},
                        {"type": "tool_use", "id": "toolu_1", "name": "query_data",
                         "input": {"sql": "SELECT name FROM users WHERE id=1"}}
                    ],
                    "stop_reason": "tool_use",
                    "usage": {"input_tokens": 12, "output_tokens": 7}
                })
                .to_string(),
            )
            .create_async()
            .await;

        let backend = AnthropicBackend::builder("test-key", "test-model")
            .system("You are a SQL assistant.")
            .base_url(server.url())
            .build();
        let tools = vec![ToolSpec {
            name: "query_data".into(),
            description: "Executes raw SQL".into(),
            schema: json!({"type": "object"}),
        }];
        let messages = vec![Message::user("Who is user 1?")];

        let response = backend
            .call(ModelRequest {
                messages: &messages,
                tools: &tools,
            })
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(response.finish_reason, FinishReason::ToolCalls);
        assert_eq!(response.usage.input_tokens, 12);
        assert_eq!(response.message.text(), "Let me look.");
        let calls = response.message.tool_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "toolu_1");
        assert_eq!(calls[0].input["sql"], "SELECT name FROM users WHERE id=1");
    }

    #[tokio::test]
    async fn api_errors_carry_status_and_body() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/messages")
            .with_status(401)
            .with_body(r#"{"type":"error","error":{"type":"authentication_error"}}"#)
            .create_async()
            .await;

        let backend = AnthropicBackend::builder("bad", "test-model")
            .base_url(server.url())
            .build();
        let messages = vec![Message::user("hi")];
        let err = backend
            .call(ModelRequest {
                messages: &messages,
                tools: &[],
            })
            .await
            .unwrap_err();

        match err {
            ModelError::Api(text) => {
                assert!(text.starts_with("401"));
                assert!(text.contains("authentication_error"));
            }
            other => panic!("expected api error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_body_is_invalid_response() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/messages")
            .with_status(200)
            .with_body("not json")
            .create_async()
            .await;

        let backend = AnthropicBackend::builder("key", "test-model")
            .base_url(server.url())
            .build();
        let messages = vec![Message::user("hi")];
        let err = backend
            .call(ModelRequest {
                messages: &messages,
                tools: &[],
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ModelError::InvalidResponse(_)));
    }
}
