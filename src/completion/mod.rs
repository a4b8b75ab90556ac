//! Chat-completion client used for diagnosing failed commands.
//!
//! The wire format is the OpenAI-style chat completions API. Requests are
//! always a single attempt; there is no retry or backoff.

pub mod client;
pub mod stream;
#[cfg(test)]
pub(crate) mod testing;

use std::io;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use client::CompletionClient;
pub use stream::CompletionChunk;

/// Default chat completions endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";

/// Default model used for diagnosis.
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

/// Environment variable holding the API key.
pub const API_KEY_ENV_VAR: &str = "OPENAI_API_KEY";

/// Author of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Body of a chat completion request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub stream: bool,
}

impl CompletionRequest {
    /// A deterministic (temperature 0), non-streaming request.
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: 0.0,
            stream: false,
        }
    }

    /// Builder: set the streaming flag
    pub fn streaming(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    /// Content of the first message with the given role.
    pub fn message(&self, role: Role) -> Option<&str> {
        self.messages
            .iter()
            .find(|m| m.role == role)
            .map(|m| m.content.as_str())
    }
}

/// Per-delta callback used in streaming mode.
///
/// Returning an error aborts the stream with [`CompletionError::Output`].
pub type ChunkCallback<'a> = dyn FnMut(&str) -> io::Result<()> + Send + 'a;

/// Error types for completion requests
#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    #[error("API key not configured. Set OPENAI_API_KEY or add api_key to the config file.")]
    MissingApiKey,

    /// Network failure, including failures while reading a streamed body.
    #[error("network error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("completion endpoint returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("invalid response from completion endpoint: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("completion endpoint returned no choices")]
    EmptyResponse,

    #[error("failed to write completion output: {0}")]
    Output(#[from] io::Error),
}

/// Something that can answer a [`CompletionRequest`].
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Send the request and return the whole answer at once.
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError>;

    /// Send the request in streaming mode, calling `on_chunk` for every
    /// non-empty text delta in order.
    async fn complete_stream(
        &self,
        request: &CompletionRequest,
        on_chunk: &mut ChunkCallback<'_>,
    ) -> Result<(), CompletionError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_serializes_documented_body() {
        let request = CompletionRequest::new(
            "gpt-4o-mini",
            vec![ChatMessage::system("sys"), ChatMessage::user("hi")],
        )
        .streaming(true);

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            json!({
                "model": "gpt-4o-mini",
                "messages": [
                    {"role": "system", "content": "sys"},
                    {"role": "user", "content": "hi"}
                ],
                "temperature": 0.0,
                "stream": true
            })
        );
    }

    #[test]
    fn test_request_defaults() {
        let request = CompletionRequest::new(DEFAULT_MODEL, vec![]);
        assert_eq!(request.temperature, 0.0);
        assert!(!request.stream);
    }

    #[test]
    fn test_message_lookup_by_role() {
        let request = CompletionRequest::new(
            DEFAULT_MODEL,
            vec![ChatMessage::system("a"), ChatMessage::user("b")],
        );
        assert_eq!(request.message(Role::User), Some("b"));
        assert_eq!(request.message(Role::Assistant), None);
    }

    #[test]
    fn test_role_round_trip_names() {
        assert_eq!(serde_json::to_string(&Role::Assistant).unwrap(), "\"assistant\"");
        let role: Role = serde_json::from_str("\"system\"").unwrap();
        assert_eq!(role, Role::System);
    }

    #[test]
    fn test_error_messages() {
        let http = CompletionError::Http {
            status: 500,
            body: "oops".to_string(),
        };
        assert_eq!(http.to_string(), "completion endpoint returned HTTP 500: oops");
        assert!(CompletionError::MissingApiKey
            .to_string()
            .contains(API_KEY_ENV_VAR));
    }
}
