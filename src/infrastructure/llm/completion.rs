use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use rig::completion::{AssistantContent, CompletionModel, CompletionRequestBuilder, ToolDefinition};
use rig::message::{Message as RigMessage, ToolResultContent, UserContent};
use rig::streaming::StreamedAssistantContent;
use rig::OneOrMany;

use crate::domain::{
    ports::{ChatModel, ChatRequest, ModelDelta, ModelResponse, ModelStream},
    Content, ContentPart, DomainError, Message, ToolCall, ToolSpec,
};

const SUMMARY_PREFIX: &str = "Here is a summary of the conversation to date:";

/// [`ChatModel`] over any rig completion model.
pub struct RigChatModel<M> {
    model: M,
}

impl<M: CompletionModel> RigChatModel<M> {
    pub fn new(model: M) -> Self {
        Self { model }
    }

    fn request(&self, request: ChatRequest) -> Result<CompletionRequestBuilder<M>, DomainError> {
        let mut history: Vec<RigMessage> = request.messages.into_iter().map(to_rig_message).collect();
        let prompt = history
            .pop()
            .ok_or_else(|| DomainError::validation("chat request has no messages"))?;

        let mut builder = self
            .model
            .completion_request(prompt)
            .messages(history)
            .tools(request.tools.into_iter().map(to_tool_definition).collect());
        if let Some(system) = request.system {
            builder = builder.preamble(system);
        }
        Ok(builder)
    }
}

#[async_trait]
impl<M> ChatModel for RigChatModel<M>
where
    M: CompletionModel + 'static,
    M::StreamingResponse: 'static,
{
    async fn complete(&self, request: ChatRequest) -> Result<ModelResponse, DomainError> {
        let response = self
            .request(request)?
            .send()
            .await
            .map_err(|e| DomainError::external(e.to_string()))?;

        Ok(from_choice(response.choice))
    }

    async fn stream(&self, request: ChatRequest) -> Result<ModelStream, DomainError> {
        let response = self
            .request(request)?
            .stream()
            .await
            .map_err(|e| DomainError::external(e.to_string()))?;

        // Text is forwarded as it arrives; tool calls are taken from the
        // aggregated choice once the provider stream ends.
        let deltas = stream::unfold(Some(response), |state| async move {
            let mut response = state?;
            loop {
                match response.next().await {
                    Some(Ok(StreamedAssistantContent::Text(text))) => {
                        return Some((vec![Ok(ModelDelta::Text(text.text))], Some(response)));
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        return Some((vec![Err(DomainError::external(e.to_string()))], None));
                    }
                    None => {
                        let calls = from_choice(response.choice.clone())
                            .tool_calls
                            .into_iter()
                            .map(|call| Ok(ModelDelta::ToolCall(call)))
                            .collect();
                        return Some((calls, None));
                    }
                }
            }
        })
        .flat_map(stream::iter);

        Ok(deltas.boxed())
    }
}

fn to_tool_definition(spec: ToolSpec) -> ToolDefinition {
    ToolDefinition {
        name: spec.name,
        description: spec.description,
        parameters: spec.parameters,
    }
}

fn to_rig_message(message: Message) -> RigMessage {
    match message {
        Message::User { content } => RigMessage::user(content),
        Message::Summary { content } => RigMessage::user(format!("{SUMMARY_PREFIX}\n\n{content}")),
        Message::Tool {
            tool_call_id,
            content,
            ..
        } => RigMessage::User {
            content: OneOrMany::one(UserContent::tool_result(
                tool_call_id,
                OneOrMany::one(ToolResultContent::text(content)),
            )),
        },
        Message::Assistant {
            content,
            tool_calls,
        } => {
            let text = content.flatten_text();
            let mut parts = Vec::new();
            if !text.is_empty() {
                parts.push(AssistantContent::text(text));
            }
            parts.extend(
                tool_calls
                    .into_iter()
                    .map(|call| AssistantContent::tool_call(call.id, call.name, call.arguments)),
            );
            match OneOrMany::many(parts) {
                Ok(content) => RigMessage::Assistant { id: None, content },
                Err(_) => RigMessage::assistant(""),
            }
        }
    }
}

fn from_choice(choice: OneOrMany<AssistantContent>) -> ModelResponse {
    let mut parts = Vec::new();
    let mut tool_calls = Vec::new();

    for item in choice.into_iter() {
        match item {
            AssistantContent::Text(text) => parts.push(ContentPart::Text { text: text.text }),
            AssistantContent::ToolCall(call) => tool_calls.push(ToolCall::new(
                call.id,
                call.function.name,
                call.function.arguments,
            )),
            _ => parts.push(ContentPart::Other),
        }
    }

    ModelResponse {
        content: Content::from(parts),
        tool_calls,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_choice_splits_text_and_tool_calls() {
        let choice = OneOrMany::many(vec![
            AssistantContent::text("Checking the weather."),
            AssistantContent::tool_call("call_1", "query_weather", json!({"location": "Taipei"})),
        ])
        .unwrap();

        let response = from_choice(choice);

        assert_eq!(response.content.flatten_text(), "Checking the weather.");
        assert_eq!(response.tool_calls.len(), 1);
        assert_eq!(response.tool_calls[0].name, "query_weather");
        assert_eq!(response.tool_calls[0].arguments["location"], "Taipei");
    }

    #[test]
    fn test_tool_only_assistant_message_keeps_calls() {
        let message = Message::assistant_with_tools(
            "",
            vec![ToolCall::new("call_1", "save_memory", json!({}))],
        );

        match to_rig_message(message) {
            RigMessage::Assistant { content, .. } => {
                assert_eq!(content.len(), 1);
                assert!(matches!(content.first(), AssistantContent::ToolCall(_)));
            }
            other => panic!("expected assistant message, got {other:?}"),
        }
    }
}
