use crate::domain::{errors::DomainError, Blob, Document};

/// Turns one blob of a known MIME type into documents.
pub trait Extractor: Send + Sync {
    fn extract(&self, blob: &Blob) -> Result<Vec<Document>, DomainError>;
}

impl<F> Extractor for F
where
    F: Fn(&Blob) -> Result<Vec<Document>, DomainError> + Send + Sync,
{
    fn extract(&self, blob: &Blob) -> Result<Vec<Document>, DomainError> {
        self(blob)
    }
}
