mod checkpoint;
mod embedding;
mod extractor;
mod llm;
mod tool;
mod vector_store;

pub use checkpoint::{CheckpointStore, ThreadGuard};
pub use embedding::EmbeddingService;
pub use extractor::Extractor;
pub use llm::{ChatModel, ChatRequest, ModelDelta, ModelResponse, ModelStream};
pub use tool::{DynTool, Tool};
pub use vector_store::{CollectionBackend, CollectionStatus, VectorStore};
