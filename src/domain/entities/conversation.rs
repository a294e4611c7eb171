use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::tool::{ToolCall, ToolStatus};
use crate::domain::errors::{DomainError, Result};

/// Opaque conversation identifier supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThreadId(String);

impl ThreadId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ThreadId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ThreadId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A conversation's checkpointed history.
///
/// Messages are append-only except for summarization, which replaces a
/// prefix with a single [`Message::Summary`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thread {
    pub id: ThreadId,
    messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Thread {
    pub fn new(id: impl Into<ThreadId>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Appends one message. Tool results must answer a call made by the
    /// nearest preceding assistant message that is still unanswered.
    pub fn push(&mut self, message: Message) -> Result<()> {
        if let Message::Tool { tool_call_id, .. } = &message {
            if !self.pending_tool_call_ids().contains(&tool_call_id.as_str()) {
                return Err(DomainError::validation(format!(
                    "tool result {tool_call_id} does not answer a pending tool call"
                )));
            }
        }
        self.messages.push(message);
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Appends an assistant tool-call message together with its results, or
    /// nothing at all.
    pub fn record_tool_round(&mut self, assistant: Message, results: Vec<Message>) -> Result<()> {
        let requested: Vec<&str> = assistant.tool_calls().iter().map(|c| c.id.as_str()).collect();
        if requested.is_empty() {
            return Err(DomainError::validation(
                "tool round recorded without tool calls",
            ));
        }
        for result in &results {
            match result {
                Message::Tool { tool_call_id, .. } if requested.contains(&tool_call_id.as_str()) => {}
                _ => {
                    return Err(DomainError::validation(
                        "tool round contains a message that is not a matching tool result",
                    ))
                }
            }
        }

        self.messages.push(assistant);
        self.messages.extend(results);
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Replaces `messages[..upto]` with a single summary message.
    pub fn replace_prefix(&mut self, upto: usize, summary: impl Into<String>) {
        let upto = upto.min(self.messages.len());
        self.messages.splice(
            ..upto,
            [Message::Summary {
                content: summary.into(),
            }],
        );
        self.updated_at = Utc::now();
    }

    fn pending_tool_call_ids(&self) -> Vec<&str> {
        let mut answered = Vec::new();
        for message in self.messages.iter().rev() {
            match message {
                Message::Tool { tool_call_id, .. } => answered.push(tool_call_id.as_str()),
                Message::Assistant { tool_calls, .. } => {
                    return tool_calls
                        .iter()
                        .map(|c| c.id.as_str())
                        .filter(|id| !answered.contains(id))
                        .collect();
                }
                _ => break,
            }
        }
        Vec::new()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Message {
    User {
        content: String,
    },
    Assistant {
        content: Content,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCall>,
    },
    Tool {
        tool_call_id: String,
        content: String,
        status: ToolStatus,
    },
    /// Condensed earlier history, produced by summarization.
    Summary {
        content: String,
    },
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self::User {
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<Content>) -> Self {
        Self::Assistant {
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }

    pub fn assistant_with_tools(content: impl Into<Content>, tool_calls: Vec<ToolCall>) -> Self {
        Self::Assistant {
            content: content.into(),
            tool_calls,
        }
    }

    pub fn role(&self) -> MessageRole {
        match self {
            Self::User { .. } => MessageRole::User,
            Self::Assistant { .. } => MessageRole::Assistant,
            Self::Tool { .. } => MessageRole::Tool,
            Self::Summary { .. } => MessageRole::System,
        }
    }

    /// Plain text of the message; non-text content parts contribute nothing.
    pub fn text(&self) -> String {
        match self {
            Self::User { content } | Self::Summary { content } | Self::Tool { content, .. } => {
                content.clone()
            }
            Self::Assistant { content, .. } => content.flatten_text(),
        }
    }

    pub fn tool_calls(&self) -> &[ToolCall] {
        match self {
            Self::Assistant { tool_calls, .. } => tool_calls,
            _ => &[],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "System",
            Self::User => "User",
            Self::Assistant => "Assistant",
            Self::Tool => "Tool",
        }
    }
}

/// Model output content: a plain string, a nested list, or a single tagged part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
    Text(String),
    Parts(Vec<Content>),
    Part(ContentPart),
}

impl Content {
    /// Concatenates every textual part, depth first, in order.
    pub fn flatten_text(&self) -> String {
        let mut out = String::new();
        self.write_text(&mut out);
        out
    }

    fn write_text(&self, out: &mut String) {
        match self {
            Self::Text(text) => out.push_str(text),
            Self::Parts(parts) => parts.iter().for_each(|part| part.write_text(out)),
            Self::Part(ContentPart::Text { text }) => out.push_str(text),
            Self::Part(_) => {}
        }
    }
}

impl Default for Content {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

impl From<String> for Content {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for Content {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<Vec<ContentPart>> for Content {
    fn from(parts: Vec<ContentPart>) -> Self {
        Self::Parts(parts.into_iter().map(Self::Part).collect())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text {
        #[serde(default)]
        text: String,
    },
    ToolCall(ToolCall),
    /// Images, audio, reasoning traces and anything else without text.
    #[serde(other)]
    Other,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ToolOutcome;
    use serde_json::json;

    fn call(id: &str) -> ToolCall {
        ToolCall::new(id, "search_memory", json!({ "query": "ball" }))
    }

    #[test]
    fn test_flatten_plain_string() {
        let content = Content::from("hello");
        assert_eq!(content.flatten_text(), "hello");
    }

    #[test]
    fn test_flatten_nested_parts_drops_non_text() {
        let content: Content = serde_json::from_value(json!([
            "a",
            { "type": "text", "text": "b" },
            { "type": "image_url", "image_url": "http://x/y.png" },
            [ { "type": "text", "text": "c" }, "d" ],
            { "type": "tool_call", "id": "1", "name": "query_weather", "arguments": {} }
        ]))
        .unwrap();

        assert_eq!(content.flatten_text(), "abcd");
    }

    #[test]
    fn test_flatten_single_object() {
        let text: Content = serde_json::from_value(json!({ "type": "text", "text": "x" })).unwrap();
        let image: Content = serde_json::from_value(json!({ "type": "image" })).unwrap();

        assert_eq!(text.flatten_text(), "x");
        assert_eq!(image.flatten_text(), "");
    }

    #[test]
    fn test_tool_result_must_answer_pending_call() {
        let mut thread = Thread::new("t1");
        thread.push(Message::user("hi")).unwrap();

        let orphan = ToolOutcome::success("x").into_message("missing");
        assert!(thread.push(orphan).is_err());

        thread
            .push(Message::assistant_with_tools("", vec![call("c1")]))
            .unwrap();
        thread
            .push(ToolOutcome::success("found").into_message("c1"))
            .unwrap();

        let duplicate = ToolOutcome::success("again").into_message("c1");
        assert!(thread.push(duplicate).is_err());
        assert_eq!(thread.len(), 3);
    }

    #[test]
    fn test_record_tool_round_is_all_or_nothing() {
        let mut thread = Thread::new("t1");
        let assistant = Message::assistant_with_tools("", vec![call("c1")]);
        let results = vec![
            ToolOutcome::success("ok").into_message("c1"),
            ToolOutcome::failure("bad").into_message("c2"),
        ];

        assert!(thread.record_tool_round(assistant, results).is_err());
        assert!(thread.is_empty());
    }

    #[test]
    fn test_replace_prefix_with_summary() {
        let mut thread = Thread::new("t1");
        for i in 0..4 {
            thread.push(Message::user(format!("m{i}"))).unwrap();
        }

        thread.replace_prefix(3, "earlier talk");

        assert_eq!(thread.len(), 2);
        assert_eq!(thread.messages()[0].role(), MessageRole::System);
        assert_eq!(thread.messages()[0].text(), "earlier talk");
        assert_eq!(thread.messages()[1].text(), "m3");
    }
}
