use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::conversation::{Message, ThreadId};
use super::upload::UploadedFile;

/// A model-issued request to run a named tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    Success,
    Failure,
}

/// Result of a tool invocation. Rendered text always starts with
/// [`ToolOutcome::SUCCESS_PREFIX`] or [`ToolOutcome::FAILURE_PREFIX`];
/// transcript consumers match on those prefixes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolOutcome {
    Success(String),
    Failure(String),
}

impl ToolOutcome {
    pub const SUCCESS_PREFIX: &'static str = "Success: ";
    pub const FAILURE_PREFIX: &'static str = "Fail: ";

    pub fn success(detail: impl Into<String>) -> Self {
        Self::Success(detail.into())
    }

    pub fn failure(detail: impl Into<String>) -> Self {
        Self::Failure(detail.into())
    }

    pub fn status(&self) -> ToolStatus {
        match self {
            Self::Success(_) => ToolStatus::Success,
            Self::Failure(_) => ToolStatus::Failure,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn to_text(&self) -> String {
        match self {
            Self::Success(detail) => format!("{}{detail}", Self::SUCCESS_PREFIX),
            Self::Failure(detail) => format!("{}{detail}", Self::FAILURE_PREFIX),
        }
    }

    pub fn into_message(self, tool_call_id: impl Into<String>) -> Message {
        Message::Tool {
            tool_call_id: tool_call_id.into(),
            content: self.to_text(),
            status: self.status(),
        }
    }
}

/// Schema advertised to the model for one tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Per-turn data handed to tools. Files belong to this turn only and are not
/// part of the checkpointed history.
#[derive(Debug, Clone)]
pub struct TurnContext {
    pub thread_id: ThreadId,
    pub files: Vec<UploadedFile>,
}

impl TurnContext {
    pub fn new(thread_id: ThreadId, files: Vec<UploadedFile>) -> Self {
        Self { thread_id, files }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_prefixes() {
        assert_eq!(ToolOutcome::success("done").to_text(), "Success: done");
        assert_eq!(ToolOutcome::failure("nope").to_text(), "Fail: nope");
    }

    #[test]
    fn test_outcome_into_message_carries_status() {
        let message = ToolOutcome::failure("nope").into_message("call-1");
        assert_eq!(
            message,
            Message::Tool {
                tool_call_id: "call-1".into(),
                content: "Fail: nope".into(),
                status: ToolStatus::Failure,
            }
        );
    }
}
