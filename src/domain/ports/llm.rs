use crate::domain::{errors::DomainError, Content, Message, ToolCall, ToolSpec};
use async_trait::async_trait;
use futures::stream::BoxStream;

/// Everything the model sees for one call.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub system: Option<String>,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolSpec>,
}

impl ChatRequest {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            ..Default::default()
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolSpec>) -> Self {
        self.tools = tools;
        self
    }
}

/// A complete model answer: content plus any requested tool calls.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelResponse {
    pub content: Content,
    pub tool_calls: Vec<ToolCall>,
}

impl ModelResponse {
    pub fn text(content: impl Into<Content>) -> Self {
        Self {
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }

    pub fn into_message(self) -> Message {
        Message::assistant_with_tools(self.content, self.tool_calls)
    }
}

/// One increment of a streamed model answer.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelDelta {
    Text(String),
    ToolCall(ToolCall),
}

pub type ModelStream = BoxStream<'static, Result<ModelDelta, DomainError>>;

#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, request: ChatRequest) -> Result<ModelResponse, DomainError>;

    /// Dropping the returned stream must release the underlying generation.
    async fn stream(&self, request: ChatRequest) -> Result<ModelStream, DomainError>;
}
