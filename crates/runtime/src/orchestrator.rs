//! The request / dispatch / finalize conversation loop.

use futures::future::join_all;
use tracing::{Instrument, debug, error, info_span, warn};
use uuid::Uuid;

use crate::fallback;
use crate::model::{Message, ModelBackend, ModelRequest, ToolCall, ToolResult, ToolSpec};
use crate::tools::{ToolInvoker, ToolName, describe_tools};
use crate::{Error, Result};
use bridge::ToolOutcome;

/// The reply to one conversation plus how it was produced.
#[derive(Debug, Clone, PartialEq)]
pub struct Exchange {
    pub reply: Message,
    pub route: Route,
}

/// Which path a request took through the loop.
#[derive(Debug, Clone, PartialEq)]
pub enum Route {
    /// The model answered without tools.
    Direct,
    /// The model was unreachable; the reply is canned.
    Fallback,
    /// Tools ran and the model answered from their results.
    ToolAssisted { results: Vec<ToolResult> },
}

struct Dispatch {
    results: Vec<ToolResult>,
    invoked: usize,
}

/// Drives one model backend and one tool invoker through a conversation.
pub struct Orchestrator<B, T> {
    backend: B,
    tools: T,
    catalog: &'static [ToolSpec],
}

impl<B: ModelBackend, T: ToolInvoker> Orchestrator<B, T> {
    pub fn new(backend: B, tools: T) -> Self {
        Self {
            backend,
            tools,
            catalog: describe_tools(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn tools(&self) -> &T {
        &self.tools
    }

    /// Answer a conversation with exactly one assistant message.
    ///
    /// Never fails: a model outage yields a canned reply and a failed
    /// follow-up call yields an apology carrying the error text.
    pub async fn handle_request(&self, messages: &[Message]) -> Message {
        let span = info_span!("request", id = %Uuid::new_v4());
        match self.exchange(messages).instrument(span).await {
            Ok(exchange) => exchange.reply,
            Err(e) => {
                error!(error = %e, "request failed");
                Message::assistant(format!(
                    "Sorry, an error occurred while processing your request: {e}"
                ))
            }
        }
    }

    /// Run one request cycle and report the route taken.
    pub async fn exchange(&self, messages: &[Message]) -> Result<Exchange> {
        let decision = match self
            .backend
            .complete(ModelRequest::tool_decision(messages, self.catalog))
            .await
        {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "model unavailable, answering with fallback");
                return Ok(Exchange {
                    reply: fallback::respond(messages),
                    route: Route::Fallback,
                });
            }
        };

        if !decision.has_tool_calls() {
            return Ok(Exchange {
                reply: decision,
                route: Route::Direct,
            });
        }

        let Dispatch { results, invoked } = self.dispatch(&decision.tool_calls).await;

        let mut transcript = Vec::with_capacity(messages.len() + 1 + results.len());
        transcript.extend_from_slice(messages);
        transcript.push(decision);
        transcript.extend(results.iter().map(ToolResult::to_message));

        let reply = self
            .backend
            .complete(ModelRequest::final_answer(&transcript))
            .await
            .map_err(|source| Error::Finalize {
                source,
                executed: invoked,
            })?;

        Ok(Exchange {
            reply,
            route: Route::ToolAssisted { results },
        })
    }

    async fn dispatch(&self, calls: &[ToolCall]) -> Dispatch {
        debug!(calls = calls.len(), "dispatching tool calls");

        if let Err(e) = self.tools.ensure_ready().await {
            warn!(error = %e, "tool service unavailable");
            let message = format!("tool service unavailable: {e}");
            return Dispatch {
                results: calls
                    .iter()
                    .map(|call| ToolResult::new(call, ToolOutcome::error(&message)))
                    .collect(),
                invoked: 0,
            };
        }

        let executed = join_all(calls.iter().map(|call| self.execute(call))).await;
        let invoked = executed.iter().filter(|(_, invoked)| *invoked).count();

        Dispatch {
            results: executed.into_iter().map(|(result, _)| result).collect(),
            invoked,
        }
    }

    /// Execute one call. The flag reports whether it reached the service.
    async fn execute(&self, call: &ToolCall) -> (ToolResult, bool) {
        let name = &call.function.name;

        if let Err(e) = name.parse::<ToolName>() {
            warn!(tool = %name, "model requested an unknown tool");
            return (ToolResult::new(call, ToolOutcome::error(e.to_string())), false);
        }

        let args = match call.function.parse_arguments() {
            Ok(args) => args,
            Err(e) => {
                warn!(tool = %name, error = %e, "rejected tool arguments");
                return (ToolResult::new(call, ToolOutcome::error(e.to_string())), false);
            }
        };

        let outcome = self.tools.invoke(name, args).await;
        if outcome.is_error() {
            warn!(tool = %name, "tool call failed");
        }
        (ToolResult::new(call, outcome), true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fallback::Intent;
    use crate::model::{ModelError, Role, ToolChoice};
    use serde_json::{Value, json};
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct Recorded {
        messages: Vec<Message>,
        tools: usize,
        choice: Option<ToolChoice>,
    }

    #[derive(Default)]
    struct ScriptedBackend {
        replies: Mutex<VecDeque<std::result::Result<Message, ModelError>>>,
        requests: Mutex<Vec<Recorded>>,
    }

    impl ScriptedBackend {
        fn new(replies: Vec<std::result::Result<Message, ModelError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                requests: Mutex::default(),
            }
        }

        fn requests(&self) -> std::sync::MutexGuard<'_, Vec<Recorded>> {
            self.requests.lock().unwrap()
        }
    }

    impl ModelBackend for ScriptedBackend {
        async fn complete(
            &self,
            request: ModelRequest<'_>,
        ) -> std::result::Result<Message, ModelError> {
            self.requests.lock().unwrap().push(Recorded {
                messages: request.messages.to_vec(),
                tools: request.tools().len(),
                choice: request.tool_choice(),
            });
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .expect("unexpected model call")
        }
    }

    #[derive(Default)]
    struct FakeTools {
        startup_error: Option<bridge::Error>,
        responses: HashMap<&'static str, Value>,
        delays: HashMap<&'static str, Duration>,
        ensure_calls: AtomicUsize,
        calls: Mutex<Vec<(String, Value)>>,
    }

    impl FakeTools {
        fn respond(mut self, tool: &'static str, payload: Value) -> Self {
            self.responses.insert(tool, payload);
            self
        }

        fn delay(mut self, tool: &'static str, delay: Duration) -> Self {
            self.delays.insert(tool, delay);
            self
        }

        fn failing(error: bridge::Error) -> Self {
            Self {
                startup_error: Some(error),
                ..Self::default()
            }
        }

        fn calls(&self) -> Vec<(String, Value)> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl ToolInvoker for FakeTools {
        async fn ensure_ready(&self) -> bridge::Result<()> {
            self.ensure_calls.fetch_add(1, Ordering::SeqCst);
            match &self.startup_error {
                Some(e) => Err(e.clone()),
                None => Ok(()),
            }
        }

        async fn invoke(&self, name: &str, args: Value) -> ToolOutcome {
            self.calls.lock().unwrap().push((name.to_string(), args));
            if let Some(delay) = self.delays.get(name) {
                tokio::time::sleep(*delay).await;
            }
            match self.responses.get(name) {
                Some(payload) => ToolOutcome::new(payload.clone()),
                None => ToolOutcome::error(format!("no response scripted for {name}")),
            }
        }
    }

    fn calling(calls: Vec<ToolCall>) -> Message {
        Message::assistant("").with_tool_calls(calls)
    }

    fn unreachable() -> ModelError {
        ModelError::Network("connection refused".into())
    }

    #[tokio::test]
    async fn direct_reply_is_returned_unchanged() {
        let backend = ScriptedBackend::new(vec![Ok(Message::assistant("Hi there"))]);
        let orchestrator = Orchestrator::new(backend, FakeTools::default());

        let exchange = orchestrator
            .exchange(&[Message::user("hello")])
            .await
            .unwrap();

        assert_eq!(exchange.reply, Message::assistant("Hi there"));
        assert_eq!(exchange.route, Route::Direct);
        assert_eq!(orchestrator.tools().ensure_calls.load(Ordering::SeqCst), 0);

        let requests = orchestrator.backend().requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].tools, 3);
        assert_eq!(requests[0].choice, Some(ToolChoice::Auto));
    }

    #[tokio::test]
    async fn unreachable_model_falls_back() {
        let backend = ScriptedBackend::new(vec![Err(unreachable())]);
        let orchestrator = Orchestrator::new(backend, FakeTools::default());

        let reply = orchestrator.handle_request(&[Message::user("你好")]).await;

        assert_eq!(reply.role, Role::Assistant);
        assert_eq!(reply.content, Intent::Greeting.reply());
        assert!(orchestrator.tools().calls().is_empty());
    }

    #[tokio::test]
    async fn tool_results_feed_the_final_call() {
        let backend = ScriptedBackend::new(vec![
            Ok(calling(vec![ToolCall::function("1", "get_tables", "{}")])),
            Ok(Message::assistant("There is one table: users.")),
        ]);
        let tools =
            FakeTools::default().respond("get_tables", json!({ "success": true, "tables": ["users"] }));
        let orchestrator = Orchestrator::new(backend, tools);

        let messages = [Message::user("列出所有表")];
        let exchange = orchestrator.exchange(&messages).await.unwrap();
        assert_eq!(exchange.reply.content, "There is one table: users.");

        let requests = orchestrator.backend().requests();
        assert_eq!(requests.len(), 2);
        let second = &requests[1];
        assert_eq!(second.tools, 0);
        assert_eq!(second.choice, None);
        assert_eq!(second.messages.len(), 3);
        assert_eq!(second.messages[0], messages[0]);
        assert!(second.messages[1].has_tool_calls());
        assert_eq!(
            second.messages[2],
            Message::tool("1", "get_tables", r#"{"success":true,"tables":["users"]}"#)
        );
    }

    #[tokio::test]
    async fn results_keep_call_order_under_concurrency() {
        let backend = ScriptedBackend::new(vec![
            Ok(calling(vec![
                ToolCall::function("a", "query_database", r#"{"sql":"SELECT 1"}"#),
                ToolCall::function("b", "get_tables", ""),
                ToolCall::function("c", "describe_table", r#"{"table_name":"users"}"#),
            ])),
            Ok(Message::assistant("done")),
        ]);
        let tools = FakeTools::default()
            .respond("query_database", json!({ "success": true, "data": [] }))
            .respond("get_tables", json!({ "success": true, "tables": [] }))
            .respond("describe_table", json!({ "success": true, "structure": [] }))
            .delay("query_database", Duration::from_millis(50));
        let orchestrator = Orchestrator::new(backend, tools);

        let exchange = orchestrator
            .exchange(&[Message::user("q")])
            .await
            .unwrap();

        let Route::ToolAssisted { results } = exchange.route else {
            panic!("expected tool-assisted route");
        };
        let ids: Vec<_> = results.iter().map(|r| r.tool_call_id.as_str()).collect();
        assert_eq!(ids, ["a", "b", "c"]);
        assert_eq!(orchestrator.tools().ensure_calls.load(Ordering::SeqCst), 1);

        let requests = orchestrator.backend().requests();
        let tool_ids: Vec<_> = requests[1].messages[2..]
            .iter()
            .map(|m| m.tool_call_id.as_deref().unwrap())
            .collect();
        assert_eq!(tool_ids, ["a", "b", "c"]);
    }

    #[tokio::test]
    async fn blank_arguments_mean_no_arguments() {
        let backend = ScriptedBackend::new(vec![
            Ok(calling(vec![ToolCall::function("1", "get_tables", "   ")])),
            Ok(Message::assistant("ok")),
        ]);
        let tools = FakeTools::default().respond("get_tables", json!({ "success": true, "tables": [] }));
        let orchestrator = Orchestrator::new(backend, tools);

        orchestrator.exchange(&[Message::user("q")]).await.unwrap();

        assert_eq!(
            orchestrator.tools().calls(),
            [("get_tables".to_string(), json!({}))]
        );
    }

    #[tokio::test]
    async fn invalid_arguments_become_error_results() {
        let backend = ScriptedBackend::new(vec![
            Ok(calling(vec![
                ToolCall::function("1", "query_database", "{not json"),
                ToolCall::function("2", "get_tables", "{}"),
            ])),
            Ok(Message::assistant("partial")),
        ]);
        let tools = FakeTools::default().respond("get_tables", json!({ "success": true, "tables": [] }));
        let orchestrator = Orchestrator::new(backend, tools);

        let exchange = orchestrator
            .exchange(&[Message::user("q")])
            .await
            .unwrap();

        let Route::ToolAssisted { results } = exchange.route else {
            panic!("expected tool-assisted route");
        };
        assert!(results[0].outcome.is_error());
        assert!(!results[1].outcome.is_error());
        assert_eq!(orchestrator.tools().calls().len(), 1);
    }

    #[tokio::test]
    async fn unknown_tool_is_not_invoked() {
        let backend = ScriptedBackend::new(vec![
            Ok(calling(vec![ToolCall::function("1", "drop_everything", "{}")])),
            Ok(Message::assistant("cannot")),
        ]);
        let orchestrator = Orchestrator::new(backend, FakeTools::default());

        let exchange = orchestrator
            .exchange(&[Message::user("q")])
            .await
            .unwrap();

        let Route::ToolAssisted { results } = exchange.route else {
            panic!("expected tool-assisted route");
        };
        assert_eq!(results[0].outcome.payload()["error"], "unknown tool: drop_everything");
        assert!(orchestrator.tools().calls().is_empty());
    }

    #[tokio::test]
    async fn startup_failure_fails_every_call() {
        let backend = ScriptedBackend::new(vec![
            Ok(calling(vec![
                ToolCall::function("1", "get_tables", "{}"),
                ToolCall::function("2", "describe_table", r#"{"table_name":"users"}"#),
            ])),
            Ok(Message::assistant("the database is unavailable")),
        ]);
        let tools = FakeTools::failing(bridge::Error::StartupTimeout(Duration::from_secs(10)));
        let orchestrator = Orchestrator::new(backend, tools);

        let exchange = orchestrator
            .exchange(&[Message::user("q")])
            .await
            .unwrap();

        let Route::ToolAssisted { results } = exchange.route else {
            panic!("expected tool-assisted route");
        };
        assert_eq!(results.len(), 2);
        for result in &results {
            let error = result.outcome.payload()["error"].as_str().unwrap();
            assert!(error.starts_with("tool service unavailable"));
        }
        assert!(orchestrator.tools().calls().is_empty());
        assert_eq!(exchange.reply.content, "the database is unavailable");
    }

    #[tokio::test]
    async fn finalize_failure_is_reported_not_fallen_back() {
        let backend = ScriptedBackend::new(vec![
            Ok(calling(vec![ToolCall::function(
                "1",
                "query_database",
                r#"{"sql":"DELETE FROM users"}"#,
            )])),
            Err(unreachable()),
        ]);
        let tools = FakeTools::default()
            .respond("query_database", json!({ "success": true, "data": { "rows_affected": 2 } }));
        let orchestrator = Orchestrator::new(backend, tools);

        let messages = [Message::user("hello, delete the users")];
        let err = orchestrator.exchange(&messages).await.unwrap_err();
        assert!(matches!(err, Error::Finalize { executed: 1, .. }));

        let reply = Orchestrator::new(
            ScriptedBackend::new(vec![
                Ok(calling(vec![ToolCall::function("1", "get_tables", "{}")])),
                Err(unreachable()),
            ]),
            FakeTools::default().respond("get_tables", json!({ "success": true, "tables": [] })),
        )
        .handle_request(&messages)
        .await;

        assert_eq!(reply.role, Role::Assistant);
        assert!(reply.content.starts_with("Sorry, an error occurred"));
        assert!(reply.content.contains("connection refused"));
        assert_ne!(reply.content, Intent::Greeting.reply());
    }
}
