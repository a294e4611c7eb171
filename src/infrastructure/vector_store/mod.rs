mod in_memory;
mod postgres;
mod qdrant;

pub use in_memory::{InMemoryBackend, InMemoryRegistry};
pub use postgres::PgVectorBackend;
pub use qdrant::QdrantBackend;

use std::sync::Arc;

use crate::application::services::ManagedVectorStore;
use crate::domain::{
    ports::{EmbeddingService, VectorStore},
    DomainError,
};
use crate::infrastructure::config::{VectorStoreConfig, VectorStoreProvider};

/// Builds the configured backend. Nothing is contacted until `init_store`.
pub fn build_vector_store(
    config: &VectorStoreConfig,
    embedding: Arc<dyn EmbeddingService>,
) -> Result<Arc<dyn VectorStore>, DomainError> {
    let store: Arc<dyn VectorStore> = match config.provider {
        VectorStoreProvider::Qdrant => Arc::new(ManagedVectorStore::new(
            QdrantBackend::new(&config.url, &config.collection)?,
            embedding,
        )),
        VectorStoreProvider::Postgres => Arc::new(ManagedVectorStore::new(
            PgVectorBackend::connect_lazy(&config.url, &config.collection)?,
            embedding,
        )),
        VectorStoreProvider::Memory => Arc::new(ManagedVectorStore::new(
            InMemoryBackend::new(InMemoryRegistry::default(), &config.collection),
            embedding,
        )),
    };
    Ok(store)
}
