use async_trait::async_trait;
use rig::embeddings::EmbeddingModel;

use crate::domain::{ports::EmbeddingService, DomainError, Embedding};

/// [`EmbeddingService`] over any rig embedding model.
pub struct TextEmbedding<M> {
    model: M,
}

impl<M: EmbeddingModel> TextEmbedding<M> {
    pub fn new(model: M) -> Self {
        Self { model }
    }
}

#[async_trait]
impl<M> EmbeddingService for TextEmbedding<M>
where
    M: EmbeddingModel + 'static,
{
    async fn embed(&self, text: &str) -> Result<Embedding, DomainError> {
        let embedding = self
            .model
            .embed_text(text)
            .await
            .map_err(|e| DomainError::external(e.to_string()))?;

        Ok(Embedding::from_f64(embedding.vec))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>, DomainError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut embeddings = Vec::with_capacity(texts.len());
        for batch in texts.chunks(M::MAX_DOCUMENTS.max(1)) {
            let batch: Vec<String> = batch.iter().map(|t| t.to_string()).collect();
            let result = self
                .model
                .embed_texts(batch)
                .await
                .map_err(|e| DomainError::external(e.to_string()))?;
            embeddings.extend(result.into_iter().map(|e| Embedding::from_f64(e.vec)));
        }

        Ok(embeddings)
    }
}
