use serde_json::Value;
use std::panic;

use crate::domain::{ports::Extractor, Blob, Document, DomainError, Metadata};

/// One document per page, tagged with `page` (0-based) and `total_pages`.
pub struct PdfExtractor;

impl Extractor for PdfExtractor {
    fn extract(&self, blob: &Blob) -> Result<Vec<Document>, DomainError> {
        let data: &[u8] = &blob.data;
        // pdf-extract panics on some malformed files instead of erroring.
        let pages = panic::catch_unwind(|| pdf_extract::extract_text_from_mem_by_pages(data))
            .map_err(|_| DomainError::extraction(format!("{}: PDF parser crashed", blob.source())))?
            .map_err(|e| DomainError::extraction(format!("{}: PDF parse error: {e}", blob.source())))?;

        Ok(page_documents(blob.source(), pages))
    }
}

pub fn page_documents(source: &str, pages: Vec<String>) -> Vec<Document> {
    let total_pages = pages.len();
    pages
        .into_iter()
        .enumerate()
        .map(|(page, text)| {
            let mut metadata = Metadata::new();
            metadata.insert("source".to_string(), Value::from(source));
            metadata.insert("page".to_string(), Value::from(page));
            metadata.insert("total_pages".to_string(), Value::from(total_pages));
            Document::new(text).with_metadata(metadata)
        })
        .collect()
}
