use std::sync::Arc;
use tracing::{info, instrument};

use crate::domain::{
    ports::{DynTool, Tool},
    Message, ToolCall, ToolOutcome, ToolSpec, TurnContext,
};

/// The set of tools offered to the model, dispatched by name.
#[derive(Clone, Default)]
pub struct ToolRouter {
    tools: Vec<Arc<dyn DynTool>>,
}

impl ToolRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// A tool registered under an existing name replaces it.
    pub fn with_tool<T: Tool + 'static>(mut self, tool: T) -> Self {
        let tool: Arc<dyn DynTool> = Arc::new(tool);
        match self.tools.iter_mut().find(|t| t.name() == tool.name()) {
            Some(existing) => *existing = tool,
            None => self.tools.push(tool),
        }
        self
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn definitions(&self) -> Vec<ToolSpec> {
        self.tools.iter().map(|t| t.definition()).collect()
    }

    /// Runs one call and wraps the outcome as a tool message answering it.
    #[instrument(skip(self, ctx, call), fields(tool = %call.name, tool_call_id = %call.id))]
    pub async fn execute(&self, ctx: &TurnContext, call: &ToolCall) -> Message {
        let outcome = match self.tools.iter().find(|t| t.name() == call.name) {
            Some(tool) => tool.call_json(ctx, call.arguments.clone()).await,
            None => ToolOutcome::failure(format!("unknown tool: {}", call.name)),
        };
        info!(success = outcome.is_success(), "tool finished");
        outcome.into_message(&call.id)
    }

    /// Calls run one after another, results in call order.
    pub async fn execute_all(&self, ctx: &TurnContext, calls: &[ToolCall]) -> Vec<Message> {
        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            results.push(self.execute(ctx, call).await);
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ThreadId, ToolStatus};
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Deserialize)]
    struct EchoArgs {
        text: String,
    }

    struct EchoTool;

    impl Tool for EchoTool {
        const NAME: &'static str = "echo";

        type Args = EchoArgs;

        fn definition(&self) -> ToolSpec {
            ToolSpec {
                name: Self::NAME.to_string(),
                description: "Echo the text".to_string(),
                parameters: json!({ "type": "object" }),
            }
        }

        async fn call(&self, _ctx: &TurnContext, args: EchoArgs) -> ToolOutcome {
            ToolOutcome::success(args.text)
        }
    }

    fn ctx() -> TurnContext {
        TurnContext::new(ThreadId::from("t"), Vec::new())
    }

    #[tokio::test]
    async fn test_execute_known_tool() {
        let router = ToolRouter::new().with_tool(EchoTool);
        let call = ToolCall::new("call_1", "echo", json!({ "text": "hi" }));

        let message = router.execute(&ctx(), &call).await;

        assert_eq!(
            message,
            Message::Tool {
                tool_call_id: "call_1".to_string(),
                content: "Success: hi".to_string(),
                status: ToolStatus::Success,
            }
        );
    }

    #[tokio::test]
    async fn test_unknown_tool_is_failure() {
        let router = ToolRouter::new().with_tool(EchoTool);
        let call = ToolCall::new("call_1", "teleport", json!({}));

        let message = router.execute(&ctx(), &call).await;

        assert_eq!(message.text(), "Fail: unknown tool: teleport");
    }

    #[tokio::test]
    async fn test_execute_all_keeps_order() {
        let router = ToolRouter::new().with_tool(EchoTool).with_tool(EchoTool);
        let calls = vec![
            ToolCall::new("a", "echo", json!({ "text": "one" })),
            ToolCall::new("b", "echo", json!({ "text": "two" })),
        ];

        let results = router.execute_all(&ctx(), &calls).await;

        assert_eq!(router.names(), vec!["echo"]);
        assert_eq!(results[0].text(), "Success: one");
        assert_eq!(results[1].text(), "Success: two");
    }
}
