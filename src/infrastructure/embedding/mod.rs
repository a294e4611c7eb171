mod text;

pub use text::TextEmbedding;

use rig::client::{EmbeddingsClient, ProviderClient};
use rig::providers::{gemini, openai};
use std::sync::Arc;

use crate::domain::ports::EmbeddingService;
use crate::infrastructure::config::{EmbeddingConfig, EmbeddingProvider};

/// Credentials are read from the environment; `Config::validate` has already
/// checked that they are present.
pub fn build_embedding(config: &EmbeddingConfig) -> Arc<dyn EmbeddingService> {
    match config.provider {
        EmbeddingProvider::OpenAi => {
            let client = openai::Client::from_env();
            Arc::new(TextEmbedding::new(client.embedding_model(&config.model)))
        }
        EmbeddingProvider::Gemini => {
            let client = gemini::Client::from_env();
            Arc::new(TextEmbedding::new(client.embedding_model(&config.model)))
        }
    }
}
