use futures::future::try_join_all;
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::domain::{ports::Extractor, Blob, Document, DomainError, UploadedFile};

/// Converts uploaded files into documents by MIME-dispatched extractors.
///
/// Resolution order for a MIME type: exact match, then the first registered
/// `type/*` wildcard whose prefix matches, otherwise
/// [`DomainError::UnsupportedMimeType`].
#[derive(Clone, Default)]
pub struct DocumentIngestionPipeline {
    handlers: Vec<(String, Arc<dyn Extractor>)>,
}

impl DocumentIngestionPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_extractor<E>(mut self, patterns: &[&str], extractor: E) -> Self
    where
        E: Extractor + 'static,
    {
        self.register(patterns, extractor);
        self
    }

    /// Re-registering a pattern replaces its handler but keeps its position.
    pub fn register<E>(&mut self, patterns: &[&str], extractor: E)
    where
        E: Extractor + 'static,
    {
        let extractor: Arc<dyn Extractor> = Arc::new(extractor);
        for pattern in patterns {
            let pattern = pattern.to_lowercase();
            match self.handlers.iter_mut().find(|(key, _)| *key == pattern) {
                Some((_, handler)) => *handler = extractor.clone(),
                None => self.handlers.push((pattern, extractor.clone())),
            }
        }
    }

    pub fn resolve_handler(&self, mime: &str) -> Result<&dyn Extractor, DomainError> {
        let mime = mime.to_lowercase();

        let exact = self.handlers.iter().find(|(key, _)| *key == mime);
        let wildcard = || {
            self.handlers.iter().find(|(key, _)| {
                key.strip_suffix('*')
                    .filter(|prefix| prefix.ends_with('/'))
                    .is_some_and(|prefix| mime.starts_with(prefix))
            })
        };

        exact
            .or_else(wildcard)
            .map(|(_, handler)| handler.as_ref())
            .ok_or(DomainError::UnsupportedMimeType(mime))
    }

    /// Reads every file concurrently and extracts them in input order. The
    /// first failure aborts the whole batch.
    #[instrument(skip(self, files), fields(count = files.len()))]
    pub async fn load_documents(&self, files: &[UploadedFile]) -> Result<Vec<Document>, DomainError> {
        let blobs = try_join_all(files.iter().map(Self::file_to_blob)).await?;

        let mut documents = Vec::new();
        for blob in &blobs {
            documents.extend(self.blob_to_documents(blob)?);
        }

        debug!(documents = documents.len(), "documents loaded");
        Ok(documents)
    }

    pub async fn file_to_blob(file: &UploadedFile) -> Result<Blob, DomainError> {
        let data = file.read().await?;
        Ok(Blob::from_data(
            data,
            file.content_type.as_deref(),
            &file.filename,
        ))
    }

    pub fn blob_to_documents(&self, blob: &Blob) -> Result<Vec<Document>, DomainError> {
        self.resolve_handler(&blob.mime_type)?.extract(blob)
    }
}
