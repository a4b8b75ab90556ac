//! In-memory backend for exercising callers without HTTP.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{ChunkCallback, CompletionBackend, CompletionError, CompletionRequest};

/// Records every request and answers with canned deltas.
#[derive(Debug, Clone, Default)]
pub struct RecordingBackend {
    requests: Arc<Mutex<Vec<CompletionRequest>>>,
    chunks: Vec<String>,
    fail_after: Option<usize>,
}

impl RecordingBackend {
    pub fn with_chunks(chunks: &[&str]) -> Self {
        Self {
            chunks: chunks.iter().map(|c| c.to_string()).collect(),
            ..Self::default()
        }
    }

    /// Deliver `n` chunks, then fail as if the connection dropped.
    pub fn failing_after(mut self, n: usize) -> Self {
        self.fail_after = Some(n);
        self
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn record(&self, request: &CompletionRequest) {
        self.requests.lock().unwrap().push(request.clone());
    }

    fn unavailable() -> CompletionError {
        CompletionError::Http {
            status: 503,
            body: "unavailable".to_string(),
        }
    }
}

#[async_trait]
impl CompletionBackend for RecordingBackend {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        self.record(request);
        if self.fail_after.is_some() {
            return Err(Self::unavailable());
        }
        Ok(self.chunks.concat())
    }

    async fn complete_stream(
        &self,
        request: &CompletionRequest,
        on_chunk: &mut ChunkCallback<'_>,
    ) -> Result<(), CompletionError> {
        self.record(request);
        for (i, chunk) in self.chunks.iter().enumerate() {
            if self.fail_after == Some(i) {
                return Err(Self::unavailable());
            }
            on_chunk(chunk.as_str())?;
        }
        if self.fail_after.is_some_and(|n| n >= self.chunks.len()) {
            return Err(Self::unavailable());
        }
        Ok(())
    }
}
