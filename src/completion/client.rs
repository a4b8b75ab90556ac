//! HTTP client for the chat completions endpoint.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::Deserialize;

use super::stream::{dispatch, FrameDecoder};
use super::{ChunkCallback, CompletionBackend, CompletionError, CompletionRequest, DEFAULT_ENDPOINT};

/// Chat completions client with bearer-token authorization
#[derive(Debug, Clone)]
pub struct CompletionClient {
    /// HTTP client
    client: Client,
    /// Full URL of the chat completions endpoint
    endpoint: String,
    /// API key; requests fail with `MissingApiKey` when absent
    api_key: Option<String>,
}

impl CompletionClient {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key: api_key.filter(|key| !key.trim().is_empty()),
        }
    }

    /// Builder: override the endpoint URL
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// POST `request` and return the response once its status is known good.
    async fn send(&self, request: &CompletionRequest) -> Result<reqwest::Response, CompletionError> {
        let api_key = self.api_key.as_deref().ok_or(CompletionError::MissingApiKey)?;

        tracing::debug!(
            endpoint = %self.endpoint,
            model = %request.model,
            stream = request.stream,
            "sending completion request"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {api_key}"))
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CompletionError::Http {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl CompletionBackend for CompletionClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        let response = self.send(request).await?;
        let body = response.bytes().await?;
        let envelope: ChatCompletionResponse = serde_json::from_slice(&body)?;

        let choice = envelope
            .choices
            .into_iter()
            .next()
            .ok_or(CompletionError::EmptyResponse)?;

        Ok(choice.message.content.unwrap_or_default())
    }

    async fn complete_stream(
        &self,
        request: &CompletionRequest,
        on_chunk: &mut ChunkCallback<'_>,
    ) -> Result<(), CompletionError> {
        let streaming;
        let request = if request.stream {
            request
        } else {
            streaming = request.clone().streaming(true);
            &streaming
        };

        let response = self.send(request).await?;
        let mut body = response.bytes_stream();
        let mut decoder = FrameDecoder::new();

        while let Some(bytes) = body.next().await {
            let bytes = bytes?;
            for frame in decoder.push(&bytes) {
                if dispatch(&frame, on_chunk)?.is_break() {
                    return Ok(());
                }
            }
        }

        if let Some(frame) = decoder.finish() {
            let _ = dispatch(&frame, on_chunk)?;
        }

        tracing::debug!("completion stream closed by transport");
        Ok(())
    }
}

// API types

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}
