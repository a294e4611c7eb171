use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::future::Future;

use crate::domain::{ToolOutcome, ToolSpec, TurnContext};

/// A capability the model can call. Failures are reported through
/// [`ToolOutcome::Failure`], never as errors.
pub trait Tool: Send + Sync {
    const NAME: &'static str;

    type Args: DeserializeOwned + Send;

    fn definition(&self) -> ToolSpec;

    fn call(
        &self,
        ctx: &TurnContext,
        args: Self::Args,
    ) -> impl Future<Output = ToolOutcome> + Send;
}

/// Object-safe view of [`Tool`] taking raw JSON arguments.
#[async_trait]
pub trait DynTool: Send + Sync {
    fn name(&self) -> &'static str;

    fn definition(&self) -> ToolSpec;

    async fn call_json(&self, ctx: &TurnContext, arguments: Value) -> ToolOutcome;
}

#[async_trait]
impl<T: Tool> DynTool for T {
    fn name(&self) -> &'static str {
        T::NAME
    }

    fn definition(&self) -> ToolSpec {
        Tool::definition(self)
    }

    async fn call_json(&self, ctx: &TurnContext, arguments: Value) -> ToolOutcome {
        // Models send `null` for tools without parameters.
        let arguments = if arguments.is_null() {
            Value::Object(Default::default())
        } else {
            arguments
        };
        match serde_json::from_value::<T::Args>(arguments) {
            Ok(args) => self.call(ctx, args).await,
            Err(e) => ToolOutcome::failure(format!("invalid arguments for {}: {e}", T::NAME)),
        }
    }
}
