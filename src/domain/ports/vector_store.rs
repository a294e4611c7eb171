use crate::domain::{errors::DomainError, Document, Embedding};
use async_trait::async_trait;

/// Provider-agnostic vector store over one collection.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Idempotent: creates the collection if needed, tolerating one that
    /// already exists. A second call after success does nothing.
    async fn init_store(&self) -> Result<(), DomainError>;

    /// Drops the collection. Maintenance and tests only.
    async fn destroy_store(&self) -> Result<(), DomainError>;

    async fn add_documents(&self, documents: &[Document]) -> Result<(), DomainError>;

    /// Up to `k` documents, best match first. Empty when nothing matches.
    async fn similarity_search(&self, query: &str, k: usize) -> Result<Vec<Document>, DomainError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionStatus {
    Created,
    /// The dimension the existing collection was created with.
    AlreadyExists { dimension: usize },
}

/// Storage primitives a backend provider implements. Embedding and
/// collection lifecycle are handled once, above this trait.
#[async_trait]
pub trait CollectionBackend: Send + Sync {
    fn name(&self) -> &'static str;

    async fn create_collection(&self, dimension: usize) -> Result<CollectionStatus, DomainError>;

    async fn drop_collection(&self) -> Result<(), DomainError>;

    /// Inserts all rows or none, as far as the backend allows.
    async fn insert(&self, rows: Vec<(Document, Embedding)>) -> Result<(), DomainError>;

    async fn search(&self, query: &Embedding, k: usize) -> Result<Vec<Document>, DomainError>;
}
