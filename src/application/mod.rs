//! Application layer - Use cases and orchestration.
//!
//! Services here depend on domain ports (traits) rather than concrete
//! implementations; the infrastructure layer supplies the adapters.

pub mod services;

pub use services::{
    ConversationEngine, DocumentIngestionPipeline, HistorySummarizer, ManagedVectorStore,
    TokenStream, ToolRouter,
};
