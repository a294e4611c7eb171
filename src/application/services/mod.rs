mod conversation;
mod ingestion;
mod summarizer;
mod tool_router;
mod vector_store;

pub use conversation::{ConversationEngine, TokenStream};
pub use ingestion::DocumentIngestionPipeline;
pub use summarizer::{approximate_tokens, HistorySummarizer};
pub use tool_router::ToolRouter;
pub use vector_store::ManagedVectorStore;
