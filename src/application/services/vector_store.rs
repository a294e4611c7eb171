use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{OnceCell, RwLock};
use tracing::{debug, info, instrument};

use crate::domain::{
    ports::{CollectionBackend, CollectionStatus, EmbeddingService, VectorStore},
    Document, DomainError, Embedding,
};

/// Text embedded once to learn the provider's vector dimension.
const DIMENSION_PROBE: &str = "hello";

/// [`VectorStore`] on top of any [`CollectionBackend`].
///
/// Owns the embedding step and the collection lifecycle so that backends
/// only deal in vectors. The collection is created lazily on `init_store`
/// with the dimension reported by the embedding provider.
pub struct ManagedVectorStore<B> {
    backend: B,
    embedding: Arc<dyn EmbeddingService>,
    dimension: OnceCell<usize>,
    ready: RwLock<Option<usize>>,
}

impl<B: CollectionBackend> ManagedVectorStore<B> {
    pub fn new(backend: B, embedding: Arc<dyn EmbeddingService>) -> Self {
        Self {
            backend,
            embedding,
            dimension: OnceCell::new(),
            ready: RwLock::new(None),
        }
    }

    async fn dimension(&self) -> Result<usize, DomainError> {
        self.dimension
            .get_or_try_init(|| async {
                let probe = self.embedding.embed(DIMENSION_PROBE).await?;
                match probe.dimension() {
                    0 => Err(DomainError::configuration(
                        "embedding provider returned an empty vector",
                    )),
                    n => Ok(n),
                }
            })
            .await
            .copied()
    }

    async fn require_ready(&self) -> Result<usize, DomainError> {
        let ready = *self.ready.read().await;
        ready.ok_or_else(|| {
            DomainError::not_initialized(format!(
                "{} store used before init_store",
                self.backend.name()
            ))
        })
    }

    fn check_dimension(expected: usize, embedding: &Embedding) -> Result<(), DomainError> {
        if embedding.dimension() == expected {
            Ok(())
        } else {
            Err(DomainError::configuration(format!(
                "embedding dimension {} does not match collection dimension {expected}",
                embedding.dimension()
            )))
        }
    }
}

#[async_trait]
impl<B: CollectionBackend> VectorStore for ManagedVectorStore<B> {
    #[instrument(skip(self), fields(backend = self.backend.name()))]
    async fn init_store(&self) -> Result<(), DomainError> {
        // Held for the whole call so concurrent initializers wait for the first.
        let mut ready = self.ready.write().await;
        if ready.is_some() {
            return Ok(());
        }

        let dimension = self.dimension().await?;
        match self.backend.create_collection(dimension).await? {
            CollectionStatus::Created => info!(dimension, "collection created"),
            CollectionStatus::AlreadyExists { dimension: existing } if existing != dimension => {
                return Err(DomainError::configuration(format!(
                    "existing collection has dimension {existing}, embedding provider produces {dimension}"
                )));
            }
            CollectionStatus::AlreadyExists { .. } => debug!(dimension, "collection already exists"),
        }

        *ready = Some(dimension);
        Ok(())
    }

    #[instrument(skip(self), fields(backend = self.backend.name()))]
    async fn destroy_store(&self) -> Result<(), DomainError> {
        let mut ready = self.ready.write().await;
        self.backend.drop_collection().await?;
        *ready = None;
        info!("collection dropped");
        Ok(())
    }

    #[instrument(skip(self, documents), fields(count = documents.len()))]
    async fn add_documents(&self, documents: &[Document]) -> Result<(), DomainError> {
        let dimension = self.require_ready().await?;
        if documents.is_empty() {
            return Ok(());
        }

        let texts: Vec<&str> = documents.iter().map(|d| d.page_content.as_str()).collect();
        let embeddings = self.embedding.embed_batch(&texts).await?;
        if embeddings.len() != documents.len() {
            return Err(DomainError::external(format!(
                "embedding provider returned {} vectors for {} documents",
                embeddings.len(),
                documents.len()
            )));
        }
        for embedding in &embeddings {
            Self::check_dimension(dimension, embedding)?;
        }

        let rows = documents.iter().cloned().zip(embeddings).collect();
        self.backend.insert(rows).await
    }

    #[instrument(skip(self, query))]
    async fn similarity_search(&self, query: &str, k: usize) -> Result<Vec<Document>, DomainError> {
        let dimension = self.require_ready().await?;
        if k == 0 {
            return Ok(Vec::new());
        }

        let embedding = self.embedding.embed(query).await?;
        Self::check_dimension(dimension, &embedding)?;
        self.backend.search(&embedding, k).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::vector_store::{InMemoryBackend, InMemoryRegistry};
    use crate::testing::HashingEmbedding;

    fn store(registry: &InMemoryRegistry, dimension: usize) -> ManagedVectorStore<InMemoryBackend> {
        ManagedVectorStore::new(
            InMemoryBackend::new(registry.clone(), "knowledge"),
            Arc::new(HashingEmbedding::new(dimension)),
        )
    }

    struct BrokenBackend;

    #[async_trait]
    impl CollectionBackend for BrokenBackend {
        fn name(&self) -> &'static str {
            "broken"
        }

        async fn create_collection(&self, _dimension: usize) -> Result<CollectionStatus, DomainError> {
            Err(DomainError::external("connection refused"))
        }

        async fn drop_collection(&self) -> Result<(), DomainError> {
            Ok(())
        }

        async fn insert(&self, _rows: Vec<(Document, Embedding)>) -> Result<(), DomainError> {
            Ok(())
        }

        async fn search(&self, _query: &Embedding, _k: usize) -> Result<Vec<Document>, DomainError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_init_is_idempotent() {
        let registry = InMemoryRegistry::default();
        let store = store(&registry, 32);

        store.init_store().await.unwrap();
        store.init_store().await.unwrap();

        assert_eq!(registry.collection_count(), 1);
    }

    #[tokio::test]
    async fn test_existing_collection_is_tolerated() {
        let registry = InMemoryRegistry::default();
        let first = store(&registry, 32);
        let second = store(&registry, 32);

        first.init_store().await.unwrap();
        second.init_store().await.unwrap();

        first
            .add_documents(&[Document::new("the ball costs five cents").with_source("a.txt")])
            .await
            .unwrap();
        let found = second.similarity_search("ball", 4).await.unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].source(), Some("a.txt"));
    }

    #[tokio::test]
    async fn test_dimension_is_probed_once() {
        let embedding = Arc::new(HashingEmbedding::new(16));
        let store = ManagedVectorStore::new(
            InMemoryBackend::new(InMemoryRegistry::default(), "knowledge"),
            embedding.clone(),
        );

        store.init_store().await.unwrap();
        store.destroy_store().await.unwrap();
        store.init_store().await.unwrap();

        assert_eq!(embedding.calls(), 1);
    }

    #[tokio::test]
    async fn test_use_before_init_fails() {
        let store = store(&InMemoryRegistry::default(), 32);

        let add = store.add_documents(&[Document::new("x")]).await;
        let search = store.similarity_search("x", 4).await;

        assert!(matches!(add, Err(DomainError::NotInitialized(_))));
        assert!(matches!(search, Err(DomainError::NotInitialized(_))));
    }

    #[tokio::test]
    async fn test_search_empty_store() {
        let store = store(&InMemoryRegistry::default(), 32);
        store.init_store().await.unwrap();

        assert!(store.similarity_search("anything", 4).await.unwrap().is_empty());
        assert!(store.similarity_search("anything", 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_search_ranks_best_match_first() {
        let store = store(&InMemoryRegistry::default(), 64);
        store.init_store().await.unwrap();
        store
            .add_documents(&[
                Document::new("rust borrow checker rules"),
                Document::new("the ball costs five cents"),
                Document::new("weather in taipei is humid"),
            ])
            .await
            .unwrap();

        let found = store.similarity_search("how much does the ball cost", 2).await.unwrap();

        assert!(found.len() <= 2);
        assert_eq!(found[0].page_content, "the ball costs five cents");
    }

    #[tokio::test]
    async fn test_existing_collection_with_other_dimension_fails_init() {
        let registry = InMemoryRegistry::default();
        store(&registry, 8).init_store().await.unwrap();

        let other = store(&registry, 16);
        let result = other.init_store().await;

        assert!(matches!(result, Err(DomainError::Configuration(_))));
        assert!(matches!(
            other.add_documents(&[Document::new("text")]).await,
            Err(DomainError::NotInitialized(_))
        ));
    }

    #[tokio::test]
    async fn test_destroy_requires_init_again() {
        let registry = InMemoryRegistry::default();
        let store = store(&registry, 32);
        store.init_store().await.unwrap();

        store.destroy_store().await.unwrap();

        assert_eq!(registry.collection_count(), 0);
        assert!(matches!(
            store.similarity_search("x", 1).await,
            Err(DomainError::NotInitialized(_))
        ));
        store.init_store().await.unwrap();
        assert_eq!(registry.collection_count(), 1);
    }

    #[tokio::test]
    async fn test_backend_errors_propagate_from_init() {
        let store = ManagedVectorStore::new(BrokenBackend, Arc::new(HashingEmbedding::new(8)));

        let result = store.init_store().await;

        assert!(matches!(result, Err(DomainError::ExternalService(_))));
        assert!(matches!(
            store.add_documents(&[Document::new("x")]).await,
            Err(DomainError::NotInitialized(_))
        ));
    }
}
