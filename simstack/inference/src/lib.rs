#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Chat-completions client consumed by the planner and the critic.
//!
//! The wire vocabulary includes tool-calling definitions, but requests never
//! populate them: the inference backend rejects the `tools` parameter, so it
//! stays off the wire.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One message in a chat conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Message role (`system`, `user`, `assistant`).
    pub role: String,
    /// Message text.
    pub content: String,
}

impl ChatMessage {
    /// Builds a system message.
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
        }
    }

    /// Builds a user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }
}

/// Function schema inside a tool definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDef {
    /// Function name.
    pub name: String,
    /// Function description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON-schema parameter object.
    pub parameters: serde_json::Value,
}

/// Tool definition in the shared chat vocabulary. Defined for wire
/// compatibility; never sent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDef {
    /// Tool type, always `"function"`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Function schema.
    pub function: FunctionDef,
}

/// Chat completion request.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    /// Model identifier.
    pub model: String,
    /// Ordered conversation messages.
    pub messages: Vec<ChatMessage>,
    /// Sampling temperature.
    pub temperature: f32,
    /// Tool definitions; kept `None` for backend compatibility.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDef>>,
}

impl ChatRequest {
    /// Builds a request without tool definitions.
    #[must_use]
    pub const fn new(model: String, messages: Vec<ChatMessage>, temperature: f32) -> Self {
        Self {
            model,
            messages,
            temperature,
            tools: None,
        }
    }
}

/// Completion extracted from a chat response.
#[derive(Debug, Clone)]
pub struct ChatOutcome {
    /// Text of the first choice.
    pub content: String,
    /// Token usage total when the backend reports one.
    pub total_tokens: Option<u64>,
}

/// Failure modes of a chat call.
#[derive(Debug, Error)]
pub enum ChatError {
    /// Transport-level failure.
    #[error("transport: {0}")]
    Transport(#[from] reqwest::Error),
    /// Backend returned a non-success status.
    #[error("inference backend returned status {status}")]
    Status {
        /// HTTP status code.
        status: u16,
    },
    /// Response body did not carry a usable completion.
    #[error("response carried no completion text")]
    EmptyCompletion,
    /// Call exceeded its budget.
    #[error("chat call timed out after {0:?}")]
    Timeout(Duration),
}

/// Chat backend seam; the HTTP implementation is swapped for stubs in tests.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Performs one chat call under the given budget.
    async fn chat(&self, request: ChatRequest, budget: Duration) -> Result<ChatOutcome, ChatError>;
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    #[serde(default)]
    message: Option<ChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    total_tokens: Option<u64>,
}

/// HTTP chat backend posting to an OpenAI-compatible endpoint.
pub struct HttpChatBackend {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpChatBackend {
    /// Creates a backend from the API base URL and optional key.
    pub fn new(api_base: &str, api_key: Option<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", api_base.trim_end_matches('/')),
            api_key,
        })
    }

    /// Endpoint the backend posts to.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ChatBackend for HttpChatBackend {
    async fn chat(&self, request: ChatRequest, budget: Duration) -> Result<ChatOutcome, ChatError> {
        let mut call = self.client.post(&self.endpoint).json(&request);
        if let Some(key) = &self.api_key {
            call = call.bearer_auth(key);
        }
        // One deadline for the whole exchange; the body read does not get a
        // second budget.
        let exchange = async {
            let response = call.send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(ChatError::Status {
                    status: status.as_u16(),
                });
            }
            let completion = response.json::<ChatCompletion>().await?;
            Ok(completion)
        };
        let completion = tokio::time::timeout(budget, exchange)
            .await
            .map_err(|_| ChatError::Timeout(budget))??;
        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message)
            .and_then(|message| message.content)
            .filter(|content| !content.is_empty())
            .ok_or(ChatError::EmptyCompletion)?;
        Ok(ChatOutcome {
            content,
            total_tokens: completion.usage.and_then(|usage| usage.total_tokens),
        })
    }
}

/// Slices the first `{` .. last `}` region of model output, for completions
/// that wrap JSON in prose.
#[must_use]
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end >= start).then(|| &text[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_omits_tools_on_the_wire() {
        let request = ChatRequest::new(
            "llama3.1-8b".into(),
            vec![ChatMessage::system("plan"), ChatMessage::user("goal")],
            0.7,
        );
        let value = serde_json::to_value(&request).unwrap();
        assert!(value.get("tools").is_none());
        assert_eq!(value["messages"][0]["role"], "system");
    }

    #[test]
    fn completion_navigation_extracts_content_and_usage() {
        let body = json!({
            "choices": [{"message": {"content": "{\"variants\": []}"}}],
            "usage": {"total_tokens": 512}
        });
        let completion: ChatCompletion = serde_json::from_value(body).unwrap();
        let content = completion.choices[0]
            .message
            .as_ref()
            .and_then(|m| m.content.clone())
            .unwrap();
        assert_eq!(content, "{\"variants\": []}");
        assert_eq!(completion.usage.unwrap().total_tokens, Some(512));
    }

    #[test]
    fn extracts_json_block_from_prose() {
        let text = "Here is the plan:\n{\"variants\": [1]}\nDone.";
        assert_eq!(extract_json_object(text), Some("{\"variants\": [1]}"));
        assert_eq!(extract_json_object("no json here"), None);
    }

    #[tokio::test]
    async fn budget_caps_the_whole_exchange() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            // Accept and hold the connection open without ever answering.
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(10)).await;
        });

        let backend = HttpChatBackend::new(&format!("http://{addr}/v1"), None).unwrap();
        let request = ChatRequest::new("llama3.1-8b".into(), vec![ChatMessage::user("hi")], 0.7);
        let budget = Duration::from_millis(300);
        let started = std::time::Instant::now();
        let err = backend.chat(request, budget).await.unwrap_err();
        assert!(matches!(err, ChatError::Timeout(_)));
        assert!(started.elapsed() < budget * 2);
        server.abort();
    }

    #[tokio::test]
    async fn unreachable_backend_reports_transport_error() {
        let backend = HttpChatBackend::new("http://127.0.0.1:1/v1", None).unwrap();
        let request = ChatRequest::new("llama3.1-8b".into(), vec![ChatMessage::user("hi")], 0.7);
        let err = backend
            .chat(request, Duration::from_millis(500))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ChatError::Transport(_) | ChatError::Timeout(_)
        ));
    }
}
