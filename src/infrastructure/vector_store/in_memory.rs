use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::domain::{
    ports::{CollectionBackend, CollectionStatus},
    Document, DomainError, Embedding,
};

struct Collection {
    dimension: usize,
    rows: Vec<(Document, Embedding)>,
}

/// Process-wide set of named collections. Clones share the same collections,
/// so several backends can point at one "server".
#[derive(Clone, Default)]
pub struct InMemoryRegistry {
    collections: Arc<RwLock<HashMap<String, Collection>>>,
}

impl InMemoryRegistry {
    pub fn collection_count(&self) -> usize {
        self.collections.read().map(|c| c.len()).unwrap_or(0)
    }
}

/// Brute-force cosine search over one collection of an [`InMemoryRegistry`].
pub struct InMemoryBackend {
    registry: InMemoryRegistry,
    collection: String,
    min_score: Option<f32>,
}

impl InMemoryBackend {
    pub fn new(registry: InMemoryRegistry, collection: impl Into<String>) -> Self {
        Self {
            registry,
            collection: collection.into(),
            min_score: None,
        }
    }

    /// Drop matches scoring below `min_score`.
    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = Some(min_score);
        self
    }

    fn missing(&self) -> DomainError {
        DomainError::not_found(format!("collection {} does not exist", self.collection))
    }
}

#[async_trait]
impl CollectionBackend for InMemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn create_collection(&self, dimension: usize) -> Result<CollectionStatus, DomainError> {
        let mut collections = self
            .registry
            .collections
            .write()
            .map_err(|e| DomainError::internal(e.to_string()))?;

        if let Some(existing) = collections.get(&self.collection) {
            return Ok(CollectionStatus::AlreadyExists {
                dimension: existing.dimension,
            });
        }
        collections.insert(
            self.collection.clone(),
            Collection {
                dimension,
                rows: Vec::new(),
            },
        );
        Ok(CollectionStatus::Created)
    }

    async fn drop_collection(&self) -> Result<(), DomainError> {
        self.registry
            .collections
            .write()
            .map_err(|e| DomainError::internal(e.to_string()))?
            .remove(&self.collection);
        Ok(())
    }

    async fn insert(&self, rows: Vec<(Document, Embedding)>) -> Result<(), DomainError> {
        let mut collections = self
            .registry
            .collections
            .write()
            .map_err(|e| DomainError::internal(e.to_string()))?;
        let collection = collections
            .get_mut(&self.collection)
            .ok_or_else(|| self.missing())?;

        if let Some((_, bad)) = rows
            .iter()
            .find(|(_, e)| e.dimension() != collection.dimension)
        {
            return Err(DomainError::configuration(format!(
                "vector dimension {} does not match collection dimension {}",
                bad.dimension(),
                collection.dimension
            )));
        }

        collection.rows.extend(rows);
        Ok(())
    }

    async fn search(&self, query: &Embedding, k: usize) -> Result<Vec<Document>, DomainError> {
        let collections = self
            .registry
            .collections
            .read()
            .map_err(|e| DomainError::internal(e.to_string()))?;
        let collection = collections.get(&self.collection).ok_or_else(|| self.missing())?;

        let mut results: Vec<(&Document, f32)> = collection
            .rows
            .iter()
            .map(|(doc, embedding)| (doc, query.cosine_similarity(embedding)))
            .filter(|(_, score)| self.min_score.map_or(true, |min| *score >= min))
            .collect();

        results.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        Ok(results
            .into_iter()
            .take(k)
            .map(|(doc, _)| doc.clone())
            .collect())
    }
}
