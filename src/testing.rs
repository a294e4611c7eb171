//! Deterministic stand-ins for the model and embedding providers, used by the
//! unit tests and the router tests.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::collections::hash_map::DefaultHasher;
use std::collections::VecDeque;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::domain::ports::{ChatModel, ChatRequest, EmbeddingService, ModelDelta, ModelResponse, ModelStream};
use crate::domain::{DomainError, Embedding, ToolCall};

/// Bag-of-words embedding: each lower-cased word bumps one hashed bucket, so
/// texts sharing words have a positive cosine similarity.
pub struct HashingEmbedding {
    dimension: usize,
    calls: AtomicUsize,
}

impl HashingEmbedding {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of `embed`/`embed_batch` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn vectorize(&self, text: &str) -> Embedding {
        let mut vec = vec![0.0; self.dimension];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let mut hasher = DefaultHasher::new();
            word.to_lowercase().hash(&mut hasher);
            vec[(hasher.finish() % self.dimension as u64) as usize] += 1.0;
        }
        Embedding::new(vec)
    }
}

impl Default for HashingEmbedding {
    fn default() -> Self {
        Self::new(64)
    }
}

#[async_trait]
impl EmbeddingService for HashingEmbedding {
    async fn embed(&self, text: &str) -> Result<Embedding, DomainError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.vectorize(text))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>, DomainError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|t| self.vectorize(t)).collect())
    }
}

/// Embedding provider that is always down.
pub struct FailingEmbedding;

#[async_trait]
impl EmbeddingService for FailingEmbedding {
    async fn embed(&self, _text: &str) -> Result<Embedding, DomainError> {
        Err(DomainError::external("embedding service unavailable"))
    }

    async fn embed_batch(&self, _texts: &[&str]) -> Result<Vec<Embedding>, DomainError> {
        Err(DomainError::external("embedding service unavailable"))
    }
}

type Responder = Box<dyn Fn(&ChatRequest) -> ModelResponse + Send + Sync>;

enum Script {
    Queue(Mutex<VecDeque<ModelResponse>>),
    Responder(Responder),
}

/// Chat model that replays queued responses, or computes them from the
/// request. Streaming splits text on spaces (keeping them) and emits tool
/// calls after the text.
pub struct ScriptedChatModel {
    script: Script,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedChatModel {
    pub fn new(responses: impl IntoIterator<Item = ModelResponse>) -> Self {
        Self {
            script: Script::Queue(Mutex::new(responses.into_iter().collect())),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn from_fn(responder: impl Fn(&ChatRequest) -> ModelResponse + Send + Sync + 'static) -> Self {
        Self {
            script: Script::Responder(Box::new(responder)),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Requests received so far, oldest first.
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    fn next_response(&self, request: &ChatRequest) -> Result<ModelResponse, DomainError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        match &self.script {
            Script::Queue(queue) => queue
                .lock()
                .map_err(|e| DomainError::internal(e.to_string()))?
                .pop_front()
                .ok_or_else(|| DomainError::external("scripted model has no more responses")),
            Script::Responder(responder) => Ok(responder(request)),
        }
    }
}

/// A response asking for a single tool call.
pub fn tool_call_response(id: &str, name: &str, arguments: serde_json::Value) -> ModelResponse {
    ModelResponse {
        content: Default::default(),
        tool_calls: vec![ToolCall::new(id, name, arguments)],
    }
}

#[async_trait]
impl ChatModel for ScriptedChatModel {
    async fn complete(&self, request: ChatRequest) -> Result<ModelResponse, DomainError> {
        self.next_response(&request)
    }

    async fn stream(&self, request: ChatRequest) -> Result<ModelStream, DomainError> {
        let response = self.next_response(&request)?;
        let text = response.content.flatten_text();

        let mut deltas: Vec<Result<ModelDelta, DomainError>> = text
            .split_inclusive(' ')
            .map(|fragment| Ok(ModelDelta::Text(fragment.to_string())))
            .collect();
        deltas.extend(
            response
                .tool_calls
                .into_iter()
                .map(|call| Ok(ModelDelta::ToolCall(call))),
        );

        Ok(stream::iter(deltas).boxed())
    }
}
