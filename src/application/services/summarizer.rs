use std::sync::Arc;
use tracing::{info, instrument};

use crate::domain::{
    ports::{ChatModel, ChatRequest},
    DomainError, Message, Thread,
};

const MESSAGE_OVERHEAD_TOKENS: usize = 3;

/// Rough token count: four characters per token plus a fixed cost per
/// message, tool-call arguments included.
pub fn approximate_tokens(messages: &[Message]) -> usize {
    messages
        .iter()
        .map(|message| {
            let arguments: usize = message
                .tool_calls()
                .iter()
                .map(|c| c.name.len() + c.arguments.to_string().len())
                .sum();
            (message.text().chars().count() + arguments).div_ceil(4) + MESSAGE_OVERHEAD_TOKENS
        })
        .sum()
}

/// Condenses older history into a single summary message once the thread
/// grows past a token threshold.
pub struct HistorySummarizer {
    model: Arc<dyn ChatModel>,
    max_tokens_before_summary: usize,
    messages_to_keep: usize,
    prompt: String,
}

impl HistorySummarizer {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self {
            model,
            max_tokens_before_summary: 1000,
            messages_to_keep: 5,
            prompt: "Summarize the conversation so far.\n\n{messages}".to_string(),
        }
    }

    pub fn with_max_tokens(mut self, max_tokens_before_summary: usize) -> Self {
        self.max_tokens_before_summary = max_tokens_before_summary;
        self
    }

    pub fn with_messages_to_keep(mut self, messages_to_keep: usize) -> Self {
        self.messages_to_keep = messages_to_keep.max(1);
        self
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    /// Number of leading messages to fold into the summary, if any.
    ///
    /// The kept tail never starts with a tool result, so results stay next to
    /// the assistant message that requested them.
    pub fn cutoff(&self, messages: &[Message]) -> Option<usize> {
        if messages.len() <= self.messages_to_keep
            || approximate_tokens(messages) <= self.max_tokens_before_summary
        {
            return None;
        }

        let mut cut = messages.len() - self.messages_to_keep;
        while cut > 0 && matches!(messages[cut], Message::Tool { .. }) {
            cut -= 1;
        }

        match (cut, messages.first()) {
            (0, _) => None,
            (1, Some(Message::Summary { .. })) => None,
            _ => Some(cut),
        }
    }

    /// Replaces the older part of `thread` with a summary. Returns whether
    /// anything changed.
    #[instrument(skip_all, fields(thread_id = %thread.id, messages = thread.len()))]
    pub async fn compact(&self, thread: &mut Thread) -> Result<bool, DomainError> {
        let Some(cut) = self.cutoff(thread.messages()) else {
            return Ok(false);
        };

        let transcript = transcript(&thread.messages()[..cut]);
        let prompt = if self.prompt.contains("{messages}") {
            self.prompt.replace("{messages}", &transcript)
        } else {
            format!("{}\n\n{transcript}", self.prompt)
        };

        let response = self
            .model
            .complete(ChatRequest::new(vec![Message::user(prompt)]))
            .await?;
        let summary = response.content.flatten_text();

        thread.replace_prefix(cut, summary);
        info!(summarized = cut, remaining = thread.len(), "history summarized");
        Ok(true)
    }
}

fn transcript(messages: &[Message]) -> String {
    messages
        .iter()
        .map(|message| match message {
            Message::Assistant { tool_calls, .. } if !tool_calls.is_empty() => {
                let names: Vec<&str> = tool_calls.iter().map(|c| c.name.as_str()).collect();
                format!("Assistant: {} [called {}]", message.text(), names.join(", "))
            }
            Message::Summary { content } => format!("Summary: {content}"),
            _ => format!("{}: {}", message.role().as_str(), message.text()),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ports::ModelResponse, ToolCall, ToolOutcome};
    use crate::testing::ScriptedChatModel;
    use serde_json::json;

    fn summarizer(model: Arc<ScriptedChatModel>, max_tokens: usize, keep: usize) -> HistorySummarizer {
        HistorySummarizer::new(model)
            .with_max_tokens(max_tokens)
            .with_messages_to_keep(keep)
    }

    fn long_thread(turns: usize) -> Thread {
        let mut thread = Thread::new("t");
        for i in 0..turns {
            thread.push(Message::user(format!("question {i} {}", "x".repeat(40)))).unwrap();
            thread.push(Message::assistant(format!("answer {i} {}", "y".repeat(40)))).unwrap();
        }
        thread
    }

    #[test]
    fn test_approximate_tokens() {
        let messages = vec![Message::user("abcdefgh"), Message::assistant("abc")];

        assert_eq!(approximate_tokens(&messages), (2 + 3) + (1 + 3));
    }

    #[test]
    fn test_no_cutoff_under_threshold() {
        let model = Arc::new(ScriptedChatModel::new([]));
        let thread = long_thread(4);

        assert_eq!(summarizer(model.clone(), 10_000, 5).cutoff(thread.messages()), None);
        assert_eq!(summarizer(model, 1, 20).cutoff(thread.messages()), None);
    }

    #[test]
    fn test_cutoff_never_orphans_tool_results() {
        let model = Arc::new(ScriptedChatModel::new([]));
        let mut thread = long_thread(2);
        thread.push(Message::user("weather?")).unwrap();
        thread
            .record_tool_round(
                Message::assistant_with_tools("", vec![ToolCall::new("c1", "query_weather", json!({}))]),
                vec![ToolOutcome::success("sunny").into_message("c1")],
            )
            .unwrap();
        thread.push(Message::assistant("It is sunny.")).unwrap();

        // Keeping 2 would start the tail at the tool result.
        let cut = summarizer(model, 1, 2).cutoff(thread.messages()).unwrap();

        assert!(matches!(thread.messages()[cut], Message::Assistant { .. }));
        assert_eq!(thread.messages()[cut].tool_calls().len(), 1);
    }

    #[tokio::test]
    async fn test_compact_replaces_prefix() {
        let model = Arc::new(ScriptedChatModel::new([ModelResponse::text("they talked about x and y")]));
        let mut thread = long_thread(5);

        let changed = summarizer(model.clone(), 50, 4).compact(&mut thread).await.unwrap();

        assert!(changed);
        assert_eq!(thread.len(), 5);
        assert_eq!(
            thread.messages()[0],
            Message::Summary {
                content: "they talked about x and y".to_string()
            }
        );
        let requests = model.requests();
        assert!(requests[0].messages[0].text().contains("User: question 0"));
        assert!(!requests[0].messages[0].text().contains("question 4"));
    }

    #[tokio::test]
    async fn test_compact_noop_when_short() {
        let model = Arc::new(ScriptedChatModel::new([]));
        let mut thread = long_thread(1);

        assert!(!summarizer(model.clone(), 1000, 5).compact(&mut thread).await.unwrap());
        assert!(model.requests().is_empty());
    }
}
