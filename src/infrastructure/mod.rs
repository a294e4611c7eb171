pub mod checkpoint;
pub mod config;
pub mod embedding;
pub mod extractors;
pub mod llm;
pub mod tools;
pub mod vector_store;

pub use checkpoint::InMemoryCheckpointStore;
pub use config::{AppConfig, Config, PromptsConfig};
pub use embedding::{build_embedding, TextEmbedding};
pub use extractors::{default_pipeline, PdfExtractor, TextExtractor};
pub use llm::{build_chat_model, RigChatModel};
pub use tools::{OpenMeteoClient, SaveMemoryTool, SearchMemoryTool, WeatherTool};
pub use vector_store::{build_vector_store, InMemoryBackend, InMemoryRegistry, PgVectorBackend, QdrantBackend};
