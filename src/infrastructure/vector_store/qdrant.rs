use async_trait::async_trait;
use qdrant_client::qdrant::{
    vectors_config, CreateCollectionBuilder, DeleteCollectionBuilder, Distance, PointStruct,
    SearchPointsBuilder, UpsertPointsBuilder, VectorParamsBuilder,
};
use qdrant_client::{Payload, Qdrant, QdrantError};
use uuid::Uuid;

use crate::domain::{
    ports::{CollectionBackend, CollectionStatus},
    Document, DomainError, Embedding, Metadata,
};

pub struct QdrantBackend {
    client: Qdrant,
    collection: String,
}

impl QdrantBackend {
    pub fn new(url: &str, collection: &str) -> Result<Self, DomainError> {
        let client = Qdrant::from_url(url)
            .build()
            .map_err(|e| DomainError::external(e.to_string()))?;

        Ok(Self {
            client,
            collection: collection.to_string(),
        })
    }

    /// Metadata is stored as a JSON string so it reads back losslessly.
    fn payload_json(document: &Document) -> Result<serde_json::Value, DomainError> {
        let metadata = serde_json::to_string(&document.metadata)
            .map_err(|e| DomainError::internal(e.to_string()))?;

        Ok(serde_json::json!({
            "page_content": document.page_content,
            "metadata": metadata,
        }))
    }

    async fn existing_dimension(&self) -> Result<usize, DomainError> {
        let info = self
            .client
            .collection_info(self.collection.as_str())
            .await
            .map_err(|e| DomainError::external(e.to_string()))?;

        info.result
            .and_then(|info| info.config)
            .and_then(|config| config.params)
            .and_then(|params| params.vectors_config)
            .and_then(|vectors| vectors.config)
            .and_then(|config| match config {
                vectors_config::Config::Params(params) => Some(params.size as usize),
                vectors_config::Config::ParamsMap(_) => None,
            })
            .ok_or_else(|| {
                DomainError::configuration(format!(
                    "collection {} has no single unnamed vector config",
                    self.collection
                ))
            })
    }

    fn payload(document: &Document) -> Result<Payload, DomainError> {
        Self::payload_json(document)?
            .try_into()
            .map_err(|_| DomainError::internal("Failed to create payload"))
    }
}

fn is_already_exists(err: &QdrantError) -> bool {
    err.to_string().contains("already exists")
}

#[async_trait]
impl CollectionBackend for QdrantBackend {
    fn name(&self) -> &'static str {
        "qdrant"
    }

    async fn create_collection(&self, dimension: usize) -> Result<CollectionStatus, DomainError> {
        let result = self
            .client
            .create_collection(
                CreateCollectionBuilder::new(&self.collection)
                    .vectors_config(VectorParamsBuilder::new(dimension as u64, Distance::Cosine)),
            )
            .await;

        match result {
            Ok(_) => Ok(CollectionStatus::Created),
            Err(e) if is_already_exists(&e) => Ok(CollectionStatus::AlreadyExists {
                dimension: self.existing_dimension().await?,
            }),
            Err(e) => Err(DomainError::external(e.to_string())),
        }
    }

    async fn drop_collection(&self) -> Result<(), DomainError> {
        self.client
            .delete_collection(DeleteCollectionBuilder::new(&self.collection))
            .await
            .map_err(|e| DomainError::external(e.to_string()))?;

        Ok(())
    }

    async fn insert(&self, rows: Vec<(Document, Embedding)>) -> Result<(), DomainError> {
        let points = rows
            .into_iter()
            .map(|(document, embedding)| {
                Ok(PointStruct::new(
                    Uuid::new_v4().to_string(),
                    embedding.into_inner(),
                    Self::payload(&document)?,
                ))
            })
            .collect::<Result<Vec<_>, DomainError>>()?;

        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection, points).wait(true))
            .await
            .map_err(|e| DomainError::external(e.to_string()))?;

        Ok(())
    }

    async fn search(&self, query: &Embedding, k: usize) -> Result<Vec<Document>, DomainError> {
        let results = self
            .client
            .search_points(
                SearchPointsBuilder::new(&self.collection, query.as_slice().to_vec(), k as u64)
                    .with_payload(true),
            )
            .await
            .map_err(|e| DomainError::external(e.to_string()))?;

        let documents = results
            .result
            .into_iter()
            .filter_map(|point| {
                let payload = point.payload;

                let page_content = payload.get("page_content")?.as_str()?.to_string();
                let metadata = payload
                    .get("metadata")
                    .and_then(|v| v.as_str())
                    .and_then(|s| serde_json::from_str::<Metadata>(s).ok())
                    .unwrap_or_default();

                Some(Document::new(page_content).with_metadata(metadata))
            })
            .collect();

        Ok(documents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_carries_content_and_metadata() {
        let document = Document::new("hello").with_source("a.pdf");

        let json = QdrantBackend::payload_json(&document).unwrap();

        assert_eq!(json["page_content"], "hello");
        assert_eq!(json["metadata"], r#"{"source":"a.pdf"}"#);
        assert!(QdrantBackend::payload(&document).is_ok());
    }
}
