mod completion;

pub use completion::RigChatModel;

use rig::client::{CompletionClient, ProviderClient};
use rig::providers::{anthropic, gemini, openai};
use std::sync::Arc;

use crate::domain::ports::ChatModel;
use crate::infrastructure::config::{ChatProvider, LlmConfig};

/// Credentials are read from the environment; `Config::validate` has already
/// checked that they are present.
pub fn build_chat_model(config: &LlmConfig) -> Arc<dyn ChatModel> {
    match config.provider {
        ChatProvider::OpenAi => {
            let client = openai::Client::from_env();
            Arc::new(RigChatModel::new(client.completion_model(&config.model)))
        }
        ChatProvider::Anthropic => {
            let client = anthropic::Client::from_env();
            Arc::new(RigChatModel::new(client.completion_model(&config.model)))
        }
        ChatProvider::Gemini => {
            let client = gemini::Client::from_env();
            Arc::new(RigChatModel::new(client.completion_model(&config.model)))
        }
    }
}
