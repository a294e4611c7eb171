use futures::StreamExt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, instrument, warn};

use super::{HistorySummarizer, ToolRouter};
use crate::domain::{
    ports::{ChatModel, ChatRequest, CheckpointStore, ModelDelta, ModelResponse, ThreadGuard},
    DomainError, Message, Thread, ThreadId, TurnContext, UploadedFile,
};

const STREAM_BUFFER: usize = 32;

/// Text fragments of one streamed turn. Empty fragments mark tool activity.
pub type TokenStream = ReceiverStream<Result<String, DomainError>>;

/// Runs conversation turns: checkpointed history, optional summarization,
/// then the model/tool loop until the model answers without tool calls.
///
/// Turns on the same thread run one at a time; different threads are
/// independent.
pub struct ConversationEngine {
    model: Arc<dyn ChatModel>,
    tools: Arc<ToolRouter>,
    checkpoints: Arc<dyn CheckpointStore>,
    summarizer: Option<HistorySummarizer>,
    system_prompt: Option<String>,
    max_tool_rounds: usize,
    timeout: Duration,
}

impl ConversationEngine {
    pub fn new(
        model: Arc<dyn ChatModel>,
        tools: Arc<ToolRouter>,
        checkpoints: Arc<dyn CheckpointStore>,
    ) -> Self {
        Self {
            model,
            tools,
            checkpoints,
            summarizer: None,
            system_prompt: None,
            max_tool_rounds: 8,
            timeout: Duration::from_secs(120),
        }
    }

    pub fn with_summarizer(mut self, summarizer: HistorySummarizer) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_max_tool_rounds(mut self, rounds: usize) -> Self {
        self.max_tool_rounds = rounds;
        self
    }

    /// Bound on each model call and on each pull from a model stream.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Runs one turn to completion and returns the final assistant text.
    #[instrument(skip(self, query, files), fields(thread_id = %thread_id, files = files.len()))]
    pub async fn invoke(
        &self,
        query: &str,
        files: Vec<UploadedFile>,
        thread_id: &ThreadId,
    ) -> Result<String, DomainError> {
        let mut thread = self.begin_turn(query, thread_id).await?;
        let ctx = TurnContext::new(thread_id.clone(), files);

        for _ in 0..=self.max_tool_rounds {
            let response = self
                .bounded(self.model.complete(self.request_for(&thread)))
                .await?;

            if response.tool_calls.is_empty() {
                let answer = response.content.flatten_text();
                thread.push(response.into_message())?;
                info!(chars = answer.len(), "turn complete");
                return Ok(answer);
            }
            self.run_tools(&mut thread, &ctx, response).await?;
        }

        Err(self.round_limit_error())
    }

    /// Runs one turn in a background task and yields the fragments of the
    /// final answer in generation order. A round's text is held back until
    /// the round ends without tool calls, so text from tool rounds never
    /// appears; an empty fragment is sent before each tool round instead.
    /// Dropping the stream stops the turn at its next model delta.
    pub fn stream(
        self: &Arc<Self>,
        query: impl Into<String>,
        files: Vec<UploadedFile>,
        thread_id: ThreadId,
    ) -> TokenStream {
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let engine = Arc::clone(self);
        let query = query.into();

        tokio::spawn(async move {
            if let Err(e) = engine.stream_turn(&query, files, &thread_id, &tx).await {
                warn!(thread_id = %thread_id, error = %e, "streamed turn failed");
                let _ = tx.send(Err(e)).await;
            }
        });

        ReceiverStream::new(rx)
    }

    /// The checkpointed history of a thread, `None` if it was never used.
    pub async fn thread(&self, thread_id: &ThreadId) -> Result<Option<Thread>, DomainError> {
        self.checkpoints.snapshot(thread_id).await
    }

    #[instrument(skip_all, fields(thread_id = %thread_id, files = files.len()))]
    async fn stream_turn(
        &self,
        query: &str,
        files: Vec<UploadedFile>,
        thread_id: &ThreadId,
        tx: &mpsc::Sender<Result<String, DomainError>>,
    ) -> Result<(), DomainError> {
        let mut thread = self.begin_turn(query, thread_id).await?;
        let ctx = TurnContext::new(thread_id.clone(), files);

        for _ in 0..=self.max_tool_rounds {
            let mut deltas = self
                .bounded(self.model.stream(self.request_for(&thread)))
                .await?;
            let mut fragments = Vec::new();
            let mut tool_calls = Vec::new();

            loop {
                if tx.is_closed() {
                    debug!("stream consumer went away");
                    return Ok(());
                }
                let next = tokio::time::timeout(self.timeout, deltas.next())
                    .await
                    .map_err(|_| DomainError::timeout("model stream stalled"))?;
                match next {
                    Some(Ok(ModelDelta::Text(fragment))) if fragment.is_empty() => {}
                    Some(Ok(ModelDelta::Text(fragment))) => fragments.push(fragment),
                    Some(Ok(ModelDelta::ToolCall(call))) => tool_calls.push(call),
                    Some(Err(e)) => return Err(e),
                    None => break,
                }
            }

            let text = fragments.concat();
            if tool_calls.is_empty() {
                thread.push(Message::assistant(text))?;
                for fragment in fragments {
                    if tx.send(Ok(fragment)).await.is_err() {
                        debug!("stream consumer went away");
                        break;
                    }
                }
                info!("streamed turn complete");
                return Ok(());
            }

            if tx.send(Ok(String::new())).await.is_err() {
                debug!("stream consumer went away before tools ran");
                return Ok(());
            }
            let response = ModelResponse {
                content: text.into(),
                tool_calls,
            };
            self.run_tools(&mut thread, &ctx, response).await?;
        }

        Err(self.round_limit_error())
    }

    async fn begin_turn(&self, query: &str, thread_id: &ThreadId) -> Result<ThreadGuard, DomainError> {
        let mut thread = self.checkpoints.checkout(thread_id).await?;
        thread.push(Message::user(query))?;

        if let Some(summarizer) = &self.summarizer {
            if let Err(e) = summarizer.compact(&mut thread).await {
                warn!(error = %e, "summarization skipped");
            }
        }

        Ok(thread)
    }

    async fn run_tools(
        &self,
        thread: &mut Thread,
        ctx: &TurnContext,
        response: ModelResponse,
    ) -> Result<(), DomainError> {
        debug!(calls = response.tool_calls.len(), "running tools");
        let results = self.tools.execute_all(ctx, &response.tool_calls).await;
        thread.record_tool_round(response.into_message(), results)
    }

    fn request_for(&self, thread: &Thread) -> ChatRequest {
        let request = ChatRequest::new(thread.messages().to_vec()).with_tools(self.tools.definitions());
        match &self.system_prompt {
            Some(prompt) => request.with_system(prompt.clone()),
            None => request,
        }
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, DomainError>>,
    ) -> Result<T, DomainError> {
        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| DomainError::timeout("model call timed out"))?
    }

    fn round_limit_error(&self) -> DomainError {
        DomainError::validation(format!(
            "turn stopped after {} tool rounds without a final answer",
            self.max_tool_rounds
        ))
    }
}
