use std::sync::Arc;
use tracing::info;

use crate::application::{ConversationEngine, HistorySummarizer, ToolRouter};
use crate::domain::{DomainError, TextSplitter};
use crate::infrastructure::{
    build_chat_model, build_embedding, build_vector_store, default_pipeline, AppConfig,
    InMemoryCheckpointStore, OpenMeteoClient, SaveMemoryTool, SearchMemoryTool, WeatherTool,
};

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ConversationEngine>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(engine: Arc<ConversationEngine>, config: AppConfig) -> Self {
        Self {
            engine,
            config: Arc::new(config),
        }
    }

    /// Wires the configured providers together and initializes the vector
    /// store. Fails on the first unusable component.
    pub async fn from_config(config: AppConfig) -> Result<Self, DomainError> {
        let settings = &config.config;

        let embedding = build_embedding(&settings.embedding);
        let store = build_vector_store(&settings.vector_store, embedding)?;
        store.init_store().await?;
        info!(
            provider = ?settings.vector_store.provider,
            collection = %settings.vector_store.collection,
            "vector store ready"
        );

        let splitter = TextSplitter::new(settings.memory.chunk_size, settings.memory.chunk_overlap);
        let tools = ToolRouter::new()
            .with_tool(
                SaveMemoryTool::new(Arc::new(default_pipeline()), store.clone()).with_splitter(splitter),
            )
            .with_tool(SearchMemoryTool::new(store).with_top_k(settings.memory.search_top_k))
            .with_tool(WeatherTool::new(OpenMeteoClient::from_config(&settings.weather)));

        let model = build_chat_model(&settings.llm);
        let summarizer = HistorySummarizer::new(model.clone())
            .with_max_tokens(settings.summarization.max_tokens_before_summary)
            .with_messages_to_keep(settings.summarization.messages_to_keep)
            .with_prompt(config.prompts.summary.prompt.clone());

        let engine = ConversationEngine::new(
            model,
            Arc::new(tools),
            Arc::new(InMemoryCheckpointStore::new()),
        )
        .with_summarizer(summarizer)
        .with_system_prompt(config.prompts.agent.system.clone())
        .with_max_tool_rounds(settings.llm.max_tool_rounds)
        .with_timeout(settings.llm.timeout());

        info!(provider = ?settings.llm.provider, model = %settings.llm.model, "conversation engine ready");
        Ok(Self::new(Arc::new(engine), config))
    }
}
