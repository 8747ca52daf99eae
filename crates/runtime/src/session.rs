//! Session management.

use crate::model::{Backend, Message, ModelRequest, ToolResult};
use crate::tools::ToolHost;
use crate::{Error, Result};
use tracing::{debug, info, warn};

/// Tool rounds allowed per user turn unless configured otherwise.
pub const DEFAULT_MAX_TOOL_ROUNDS: usize = 8;

/// A conversation with a model that may call tools.
///
/// History lives only in memory and grows for the life of the session.
pub struct Session<B, H> {
    backend: B,
    tools: H,
    messages: Vec<Message>,
    max_tool_rounds: usize,
}

impl<B: Backend, H: ToolHost> Session<B, H> {
    pub fn new(backend: B, tools: H) -> Self {
        Self {
            backend,
            tools,
            messages: Vec::new(),
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
        }
    }

    /// Cap the number of tool rounds a single turn may take.
    pub fn with_max_tool_rounds(mut self, max_tool_rounds: usize) -> Self {
        self.max_tool_rounds = max_tool_rounds;
        self
    }

    pub fn history(&self) -> &[Message] {
        &self.messages
    }

    pub fn tools(&self) -> &H {
        &self.tools
    }

    /// Consume the session, handing back the tool host for shutdown.
    pub fn into_tools(self) -> H {
        self.tools
    }

    /// Send a user message and get the assistant's final answer.
    ///
    /// Tool calls are executed in the order the model listed them and their
    /// results fed back until the model answers without calling a tool. If
    /// the turn fails, the history is left exactly as it was before.
    pub async fn chat(&mut self, user_input: &str) -> Result<String> {
        let checkpoint = self.messages.len();
        self.messages.push(Message::user(user_input));

        match self.run_turn().await {
            Ok(answer) => Ok(answer),
            Err(e) => {
                warn!(error = %e, "turn failed, discarding it");
                self.messages.truncate(checkpoint);
                Err(e)
            }
        }
    }

    async fn run_turn(&mut self) -> Result<String> {
        let mut rounds = 0;
        loop {
            let response = self
                .backend
                .call(ModelRequest {
                    messages: &self.messages,
                    tools: self.tools.specs(),
                })
                .await?;

            debug!(
                finish_reason = ?response.finish_reason,
                input_tokens = response.usage.input_tokens,
                output_tokens = response.usage.output_tokens,
                "model turn"
            );

            let calls = response.message.tool_calls();
            let text = response.message.text();
            self.messages.push(response.message);

            if calls.is_empty() {
                return Ok(text);
            }
            if rounds == self.max_tool_rounds {
                return Err(Error::ToolRoundsExceeded {
                    limit: self.max_tool_rounds,
                });
            }
            rounds += 1;

            if !text.is_empty() {
                info!(text = %text, "assistant");
            }

            for call in calls {
                info!(tool = %call.name, input = %call.input, "tool call");
                let result = match self.tools.execute(&call).await {
                    Ok(output) => ToolResult::Success {
                        tool_call_id: call.id,
                        output,
                    },
                    Err(error) => {
                        warn!(tool = %call.name, error = %error, "tool call failed");
                        ToolResult::Failure {
                            tool_call_id: call.id,
                            error,
                        }
                    }
                };
                self.messages.push(Message::tool_result(result));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        FinishReason, ModelError, ModelResponse, Part, Role, ToolCall, ToolSpec, Usage,
    };
    use crate::tools::ToolError;
    use serde_json::{Value, json};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays canned replies and records how much history each call saw.
    #[derive(Default)]
    struct Scripted {
        replies: Mutex<VecDeque<std::result::Result<Message, ModelError>>>,
        seen: Mutex<Vec<usize>>,
    }

    impl Scripted {
        fn new(replies: Vec<std::result::Result<Message, ModelError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                seen: Mutex::default(),
            }
        }

        fn seen(&self) -> Vec<usize> {
            self.seen.lock().unwrap().clone()
        }
    }

    impl Backend for Scripted {
        async fn call(
            &self,
            request: ModelRequest<'_>,
        ) -> std::result::Result<ModelResponse, ModelError> {
            self.seen.lock().unwrap().push(request.messages.len());
            let message = self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .expect("script exhausted")?;
            let finish_reason = if message.tool_calls().is_empty() {
                FinishReason::Stop
            } else {
                FinishReason::ToolCalls
            };
            Ok(ModelResponse {
                message,
                usage: Usage::default(),
                finish_reason,
            })
        }
    }

    impl Backend for &Scripted {
        async fn call(
            &self,
            request: ModelRequest<'_>,
        ) -> std::result::Result<ModelResponse, ModelError> {
            (**self).call(request).await
        }
    }

    /// A host with no tools; every call is unknown.
    struct NoTools;

    impl ToolHost for NoTools {
        fn specs(&self) -> &[ToolSpec] {
            &[]
        }

        async fn execute(&self, call: &ToolCall) -> std::result::Result<Value, ToolError> {
            Err(ToolError::NotFound(call.name.clone()))
        }
    }

    /// Answers `SELECT name FROM users WHERE id=1` and fails everything else.
    struct Users {
        specs: Vec<ToolSpec>,
        calls: Mutex<Vec<String>>,
    }

    impl Users {
        fn new() -> Self {
            Self {
                specs: vec![ToolSpec {
                    name: "query_data".into(),
                    description: "Executes raw SQL".into(),
                    schema: json!({"type": "object", "required": ["sql"]}),
                }],
                calls: Mutex::default(),
            }
        }
    }

    impl ToolHost for Users {
        fn specs(&self) -> &[ToolSpec] {
            &self.specs
        }

        async fn execute(&self, call: &ToolCall) -> std::result::Result<Value, ToolError> {
            let sql = call.input["sql"].as_str().unwrap_or_default().to_string();
            self.calls.lock().unwrap().push(sql.clone());
            if sql == "SELECT name FROM users WHERE id=1" {
                Ok(Value::String("name\nAda".into()))
            } else {
                Err(ToolError::Execution(format!("SQL error: cannot run {sql}")))
            }
        }
    }

    fn asks(calls: &[(&str, &str)]) -> Message {
        Message {
            role: Role::Assistant,
            parts: calls
                .iter()
                .map(|(id, sql)| {
                    Part::ToolCall(ToolCall {
                        id: (*id).into(),
                        name: "query_data".into(),
                        input: json!({ "sql": sql }),
                    })
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn plain_answer_appends_two_turns() {
        let backend = Scripted::new(vec![Ok(Message::assistant("Hello!"))]);
        let mut session = Session::new(&backend, NoTools);

        let answer = session.chat("hi").await.unwrap();

        assert_eq!(answer, "Hello!");
        assert_eq!(session.history().len(), 2);
        assert_eq!(session.history()[0].text(), "hi");
        assert_eq!(session.history()[1].role, Role::Assistant);
        assert_eq!(backend.seen(), vec![1]);
    }

    #[tokio::test]
    async fn who_is_user_one() {
        let backend = Scripted::new(vec![
            Ok(asks(&[("t1", "SELECT name FROM users WHERE id=1")])),
            Ok(Message::assistant("User 1 is Ada.")),
        ]);
        let mut session = Session::new(&backend, Users::new());

        let answer = session.chat("Who is user 1?").await.unwrap();
        assert!(answer.contains("Ada"));

        let history = session.history();
        assert_eq!(history.len(), 4);
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[1].tool_calls()[0].id, "t1");
        let result = history[2].tool_results().next().unwrap();
        assert_eq!(result.tool_call_id(), "t1");
        assert_eq!(result.content(), "name\nAda");
        assert_eq!(history[3].text(), "User 1 is Ada.");

        assert_eq!(backend.seen(), vec![1, 3]);
    }

    #[tokio::test]
    async fn multiple_calls_run_in_order_with_one_result_each() {
        let backend = Scripted::new(vec![
            Ok(asks(&[
                ("a", "SELECT name FROM users WHERE id=1"),
                ("b", "SELECT * FROM orders"),
            ])),
            Ok(Message::assistant("Ada, and there is no orders table.")),
        ]);
        let tools = Users::new();
        let mut session = Session::new(&backend, tools);

        session.chat("Users and orders?").await.unwrap();

        let history = session.history();
        assert_eq!(history.len(), 5);
        let ids: Vec<_> = history[2..4]
            .iter()
            .flat_map(|m| m.tool_results())
            .map(|r| r.tool_call_id().to_string())
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(
            session.tools().calls.lock().unwrap().as_slice(),
            ["SELECT name FROM users WHERE id=1", "SELECT * FROM orders"]
        );
    }

    #[tokio::test]
    async fn tool_failure_goes_back_to_the_model() {
        let backend = Scripted::new(vec![
            Ok(asks(&[("x", "SELEC nonsense")])),
            Ok(Message::assistant("That query was invalid.")),
        ]);
        let mut session = Session::new(&backend, Users::new());

        let answer = session.chat("run something broken").await.unwrap();
        assert_eq!(answer, "That query was invalid.");

        let result = session.history()[2].tool_results().next().unwrap();
        assert!(result.is_error());
        assert!(result.content().starts_with("SQL error: "));
    }

    #[tokio::test]
    async fn unknown_tool_is_reported_not_fatal() {
        let backend = Scripted::new(vec![
            Ok(asks(&[("x", "SELECT 1")])),
            Ok(Message::assistant("No tools here.")),
        ]);
        let mut session = Session::new(&backend, NoTools);

        session.chat("query").await.unwrap();
        let result = session.history()[2].tool_results().next().unwrap();
        assert_eq!(result.content(), "tool not found: query_data");
    }

    #[tokio::test]
    async fn round_cap_fails_and_rolls_back() {
        let looping: Vec<_> = (0..3)
            .map(|i| Ok(asks(&[(&*format!("t{i}"), "SELECT name FROM users WHERE id=1")])))
            .collect();
        let backend = Scripted::new(looping);
        let mut session = Session::new(&backend, Users::new()).with_max_tool_rounds(2);

        let err = session.chat("loop forever").await.unwrap_err();
        assert!(matches!(err, Error::ToolRoundsExceeded { limit: 2 }));
        assert!(session.history().is_empty());
        assert_eq!(backend.seen(), vec![1, 3, 5]);
    }

    #[tokio::test]
    async fn backend_error_rolls_back_the_turn() {
        let backend = Scripted::new(vec![
            Ok(Message::assistant("first answer")),
            Ok(asks(&[("t1", "SELECT name FROM users WHERE id=1")])),
            Err(ModelError::Network("connection reset".into())),
            Ok(Message::assistant("recovered")),
        ]);
        let mut session = Session::new(&backend, Users::new());

        session.chat("one").await.unwrap();
        let before: Vec<String> = session.history().iter().map(|m| m.text()).collect();

        let err = session.chat("two").await.unwrap_err();
        assert!(matches!(err, Error::Model(ModelError::Network(_))));
        let after: Vec<String> = session.history().iter().map(|m| m.text()).collect();
        assert_eq!(before, after);

        assert_eq!(session.chat("three").await.unwrap(), "recovered");
        assert_eq!(session.history().len(), 4);
    }
}
