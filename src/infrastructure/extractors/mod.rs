mod pdf;
mod text;

pub use pdf::{page_documents, PdfExtractor};
pub use text::TextExtractor;

use crate::application::services::DocumentIngestionPipeline;

/// PDF files by page, any `text/*` type as a single document.
pub fn default_pipeline() -> DocumentIngestionPipeline {
    DocumentIngestionPipeline::new()
        .with_extractor(&["application/pdf"], PdfExtractor)
        .with_extractor(&["text/*"], TextExtractor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DomainError, UploadedFile};

    #[tokio::test]
    async fn test_default_pipeline_dispatch() {
        let pipeline = default_pipeline();
        let files = vec![
            UploadedFile::from_bytes("a.md", Some("text/markdown".into()), "# notes"),
            UploadedFile::from_bytes("b.txt", Some("TEXT/PLAIN; charset=utf-8".into()), "plain"),
        ];

        let docs = pipeline.load_documents(&files).await.unwrap();

        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].source(), Some("a.md"));
        assert_eq!(docs[1].page_content, "plain");
    }

    #[tokio::test]
    async fn test_default_pipeline_rejects_images() {
        let files = vec![UploadedFile::from_bytes("cat.png", Some("image/png".into()), vec![0u8; 4])];

        let result = default_pipeline().load_documents(&files).await;

        assert!(matches!(result, Err(DomainError::UnsupportedMimeType(m)) if m == "image/png"));
    }
}
