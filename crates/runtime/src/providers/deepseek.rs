//! DeepSeek chat completions backend.
//!
//! DeepSeek speaks the OpenAI `chat/completions` dialect, so messages and tool
//! calls go over the wire in their native shape.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::model::{Message, ModelBackend, ModelError, ModelRequest, ToolSpec};
use crate::{Error, Result};

pub const DEFAULT_BASE_URL: &str = "https://api.deepseek.com";
pub const DEFAULT_MODEL: &str = "deepseek-chat";
pub const API_KEY_ENV: &str = "DEEPSEEK_API_KEY";

const COMPLETIONS_PATH: &str = "v1/chat/completions";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

// ─────────────────────────────────────────────────────────────────────────────
// API Wire Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ApiTool<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
}

#[derive(Debug, Serialize)]
struct ApiTool<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: &'a ToolSpec,
}

impl<'a> ApiTool<'a> {
    fn function(spec: &'a ToolSpec) -> Self {
        Self {
            kind: "function",
            function: spec,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    choices: Vec<ApiChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: Message,
}

/// Builder for creating a DeepSeek backend.
#[derive(Debug, Clone)]
pub struct DeepSeekBackendBuilder {
    api_key: Option<String>,
    model: String,
    base_url: String,
    timeout: Duration,
}

impl DeepSeekBackendBuilder {
    /// Create a new builder. A missing key is reported on the first call.
    pub fn new(api_key: Option<String>, model: impl Into<String>) -> Self {
        Self {
            api_key,
            model: model.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Override the API base URL (no `/v1` suffix).
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the per-request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build the backend.
    pub fn build(self) -> Result<DeepSeekBackend> {
        let base_url = self.base_url.trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(Error::Config(format!(
                "model base URL must be http(s): {base_url:?}"
            )));
        }

        Ok(DeepSeekBackend {
            client: reqwest::Client::new(),
            api_key: self.api_key.filter(|k| !k.trim().is_empty()),
            model: self.model,
            base_url,
            timeout: self.timeout,
        })
    }
}

/// DeepSeek API backend.
pub struct DeepSeekBackend {
    client: reqwest::Client,
    api_key: Option<String>,
    model: String,
    base_url: String,
    timeout: Duration,
}

impl DeepSeekBackend {
    /// Create a builder for the DeepSeek backend.
    pub fn builder(api_key: Option<String>, model: impl Into<String>) -> DeepSeekBackendBuilder {
        DeepSeekBackendBuilder::new(api_key, model)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!("{}/{COMPLETIONS_PATH}", self.base_url)
    }
}

impl std::fmt::Display for DeepSeekBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "deepseek({}, {})", self.model, self.base_url)
    }
}

impl ModelBackend for DeepSeekBackend {
    async fn complete(&self, request: ModelRequest<'_>) -> std::result::Result<Message, ModelError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ModelError::MissingCredential(API_KEY_ENV.to_string()))?;

        let api_request = ApiRequest {
            model: &self.model,
            messages: request.messages,
            tools: request.tools().iter().map(ApiTool::function).collect(),
            tool_choice: request.tool_choice().map(|c| c.as_str()),
        };

        debug!(
            model = %self.model,
            messages = request.messages.len(),
            tools = api_request.tools.len(),
            "sending chat completion"
        );

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(api_key)
            .timeout(self.timeout)
            .json(&api_request)
            .send()
            .await
            .map_err(|e| ModelError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::Api { status, body });
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| ModelError::InvalidResponse(e.to_string()))?;

        api_response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message)
            .ok_or_else(|| ModelError::InvalidResponse("response has no choices".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Role;
    use crate::tools::describe_tools;
    use serde_json::{Value, json};
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn backend(server: &MockServer, key: Option<&str>) -> DeepSeekBackend {
        DeepSeekBackend::builder(key.map(String::from), DEFAULT_MODEL)
            .base_url(server.uri())
            .build()
            .unwrap()
    }

    async fn mount_reply(server: &MockServer, message: Value) {
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "choices": [{ "message": message }] })),
            )
            .mount(server)
            .await;
    }

    async fn sent_body(server: &MockServer) -> Value {
        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        serde_json::from_slice(&requests[0].body).unwrap()
    }

    #[tokio::test]
    async fn tool_decision_offers_catalog() {
        let server = MockServer::start().await;
        mount_reply(&server, json!({ "role": "assistant", "content": "hi" })).await;

        let messages = [Message::user("hello")];
        let reply = backend(&server, Some("sk-test"))
            .complete(ModelRequest::tool_decision(&messages, describe_tools()))
            .await
            .unwrap();
        assert_eq!(reply, Message::assistant("hi"));

        let body = sent_body(&server).await;
        assert_eq!(body["model"], DEFAULT_MODEL);
        assert_eq!(body["tool_choice"], "auto");
        assert_eq!(body["messages"], json!([{ "role": "user", "content": "hello" }]));
        assert_eq!(body["tools"].as_array().unwrap().len(), 3);
        assert_eq!(body["tools"][0]["type"], "function");
        assert_eq!(body["tools"][0]["function"]["name"], "query_database");
    }

    #[tokio::test]
    async fn final_answer_omits_tools() {
        let server = MockServer::start().await;
        mount_reply(&server, json!({ "role": "assistant", "content": "done" })).await;

        let messages = [Message::user("hello")];
        backend(&server, Some("sk-test"))
            .complete(ModelRequest::final_answer(&messages))
            .await
            .unwrap();

        let body = sent_body(&server).await;
        assert!(body.get("tools").is_none());
        assert!(body.get("tool_choice").is_none());
    }

    #[tokio::test]
    async fn parses_tool_calls() {
        let server = MockServer::start().await;
        mount_reply(
            &server,
            json!({
                "role": "assistant",
                "content": null,
                "tool_calls": [{
                    "id": "call_0",
                    "type": "function",
                    "function": { "name": "describe_table", "arguments": "{\"table_name\":\"orders\"}" }
                }]
            }),
        )
        .await;

        let messages = [Message::user("what columns does orders have?")];
        let reply = backend(&server, Some("sk-test"))
            .complete(ModelRequest::tool_decision(&messages, describe_tools()))
            .await
            .unwrap();

        assert_eq!(reply.role, Role::Assistant);
        assert_eq!(reply.tool_calls.len(), 1);
        assert_eq!(reply.tool_calls[0].id, "call_0");
    }

    #[tokio::test]
    async fn non_success_status_is_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .mount(&server)
            .await;

        let messages = [Message::user("hello")];
        let err = backend(&server, Some("sk-test"))
            .complete(ModelRequest::final_answer(&messages))
            .await
            .unwrap_err();
        assert!(matches!(err, ModelError::Api { status: 401, ref body } if body == "bad key"));
    }

    #[tokio::test]
    async fn empty_choices_is_invalid_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
            .mount(&server)
            .await;

        let messages = [Message::user("hello")];
        let err = backend(&server, Some("sk-test"))
            .complete(ModelRequest::final_answer(&messages))
            .await
            .unwrap_err();
        assert!(matches!(err, ModelError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn missing_key_fails_without_request() {
        let server = MockServer::start().await;

        let messages = [Message::user("hello")];
        for key in [None, Some("  ")] {
            let err = backend(&server, key)
                .complete(ModelRequest::final_answer(&messages))
                .await
                .unwrap_err();
            assert!(matches!(err, ModelError::MissingCredential(_)));
        }
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[test]
    fn rejects_non_http_base_url() {
        let result = DeepSeekBackend::builder(None, DEFAULT_MODEL)
            .base_url("api.deepseek.com")
            .build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn display_names_model() {
        let backend = DeepSeekBackend::builder(None, "deepseek-chat")
            .base_url("https://api.deepseek.com/")
            .build()
            .unwrap();
        assert_eq!(backend.to_string(), "deepseek(deepseek-chat, https://api.deepseek.com)");
    }
}
