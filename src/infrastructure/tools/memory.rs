use serde::Deserialize;
use serde_json::json;
use std::fmt;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::application::services::DocumentIngestionPipeline;
use crate::domain::{
    ports::{Tool, VectorStore},
    DomainError, TextSplitter, ToolOutcome, ToolSpec, TurnContext, UploadedFile,
};

const SAVED: &str = "the files were added to the knowledge base";
const NOT_SAVED: &str = "no files were provided";

#[derive(Debug, Default, Deserialize)]
pub struct SaveMemoryArgs {}

#[derive(Debug, Deserialize)]
pub struct SearchMemoryArgs {
    pub query: String,
}

/// Why `save_memory` failed. The caller only ever sees [`NOT_SAVED`].
enum SaveFailure {
    NoFiles,
    Extraction(DomainError),
    Insertion(DomainError),
}

impl fmt::Display for SaveFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoFiles => write!(f, "no files attached to the turn"),
            Self::Extraction(e) => write!(f, "extraction failed: {e}"),
            Self::Insertion(e) => write!(f, "insertion failed: {e}"),
        }
    }
}

/// Ingests the turn's attached files into the knowledge base.
pub struct SaveMemoryTool {
    pipeline: Arc<DocumentIngestionPipeline>,
    store: Arc<dyn VectorStore>,
    splitter: TextSplitter,
}

impl SaveMemoryTool {
    pub fn new(pipeline: Arc<DocumentIngestionPipeline>, store: Arc<dyn VectorStore>) -> Self {
        Self {
            pipeline,
            store,
            splitter: TextSplitter::default(),
        }
    }

    pub fn with_splitter(mut self, splitter: TextSplitter) -> Self {
        self.splitter = splitter;
        self
    }

    async fn save(&self, files: &[UploadedFile]) -> Result<usize, SaveFailure> {
        if files.is_empty() {
            return Err(SaveFailure::NoFiles);
        }

        let documents = self
            .pipeline
            .load_documents(files)
            .await
            .map_err(SaveFailure::Extraction)?;
        let chunks = self.splitter.split_documents(&documents);

        self.store
            .add_documents(&chunks)
            .await
            .map_err(SaveFailure::Insertion)?;

        Ok(chunks.len())
    }
}

impl Tool for SaveMemoryTool {
    const NAME: &'static str = "save_memory";

    type Args = SaveMemoryArgs;

    fn definition(&self) -> ToolSpec {
        ToolSpec {
            name: Self::NAME.to_string(),
            description: "Save the files the user attached to this message into the knowledge base \
                          so they can be searched later."
                .to_string(),
            parameters: json!({ "type": "object", "properties": {} }),
        }
    }

    #[instrument(skip_all, fields(thread_id = %ctx.thread_id, files = ctx.files.len()))]
    async fn call(&self, ctx: &TurnContext, _args: SaveMemoryArgs) -> ToolOutcome {
        match self.save(&ctx.files).await {
            Ok(chunks) => {
                info!(chunks, "files saved");
                ToolOutcome::success(SAVED)
            }
            Err(cause) => {
                warn!(cause = %cause, "save_memory failed");
                ToolOutcome::failure(NOT_SAVED)
            }
        }
    }
}

/// Similarity search over the knowledge base.
pub struct SearchMemoryTool {
    store: Arc<dyn VectorStore>,
    top_k: usize,
}

impl SearchMemoryTool {
    pub fn new(store: Arc<dyn VectorStore>) -> Self {
        Self { store, top_k: 4 }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }
}

impl Tool for SearchMemoryTool {
    const NAME: &'static str = "search_memory";

    type Args = SearchMemoryArgs;

    fn definition(&self) -> ToolSpec {
        ToolSpec {
            name: Self::NAME.to_string(),
            description: "Search the knowledge base for material the user supplied earlier."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "What to look for"
                    }
                },
                "required": ["query"]
            }),
        }
    }

    #[instrument(skip_all, fields(thread_id = %ctx.thread_id, top_k = self.top_k))]
    async fn call(&self, ctx: &TurnContext, args: SearchMemoryArgs) -> ToolOutcome {
        match self.store.similarity_search(&args.query, self.top_k).await {
            Ok(documents) if documents.is_empty() => {
                ToolOutcome::failure("nothing relevant was found in the knowledge base")
            }
            Ok(documents) => ToolOutcome::success(
                documents
                    .iter()
                    .map(|d| d.page_content.as_str())
                    .collect::<Vec<_>>()
                    .join("\n"),
            ),
            Err(e) => {
                warn!(error = %e, "search_memory failed");
                ToolOutcome::failure(format!("knowledge base search failed: {e}"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::services::ManagedVectorStore;
    use crate::domain::{ports::DynTool, ThreadId};
    use crate::infrastructure::extractors::default_pipeline;
    use crate::infrastructure::vector_store::{InMemoryBackend, InMemoryRegistry};
    use crate::testing::{FailingEmbedding, HashingEmbedding};

    async fn ready_store() -> Arc<dyn VectorStore> {
        let store = ManagedVectorStore::new(
            InMemoryBackend::new(InMemoryRegistry::default(), "kb"),
            Arc::new(HashingEmbedding::default()),
        );
        store.init_store().await.unwrap();
        Arc::new(store)
    }

    fn ctx(files: Vec<UploadedFile>) -> TurnContext {
        TurnContext::new(ThreadId::from("t"), files)
    }

    #[tokio::test]
    async fn test_save_then_search() {
        let store = ready_store().await;
        let save = SaveMemoryTool::new(Arc::new(default_pipeline()), store.clone());
        let search = SearchMemoryTool::new(store);
        let files = vec![UploadedFile::from_bytes(
            "facts.txt",
            Some("text/plain".into()),
            "The ball costs $0.05.",
        )];

        let saved = save.call_json(&ctx(files), serde_json::Value::Null).await;
        let found = search
            .call_json(&ctx(vec![]), json!({ "query": "how much is the ball" }))
            .await;

        assert_eq!(saved.to_text(), "Success: the files were added to the knowledge base");
        assert_eq!(found.to_text(), "Success: The ball costs $0.05.");
    }

    #[tokio::test]
    async fn test_save_without_files_fails() {
        let save = SaveMemoryTool::new(Arc::new(default_pipeline()), ready_store().await);

        let outcome = save.call_json(&ctx(vec![]), json!({})).await;

        assert_eq!(outcome.to_text(), "Fail: no files were provided");
    }

    #[tokio::test]
    async fn test_save_unsupported_file_fails_with_same_message() {
        let save = SaveMemoryTool::new(Arc::new(default_pipeline()), ready_store().await);
        let files = vec![UploadedFile::from_bytes("cat.png", Some("image/png".into()), vec![1u8, 2, 3])];

        let outcome = save.call_json(&ctx(files), json!({})).await;

        assert_eq!(outcome.to_text(), "Fail: no files were provided");
    }

    #[tokio::test]
    async fn test_search_empty_store_fails() {
        let search = SearchMemoryTool::new(ready_store().await);

        let outcome = search.call_json(&ctx(vec![]), json!({ "query": "anything" })).await;

        assert!(!outcome.is_success());
        assert!(outcome.to_text().starts_with("Fail: "));
    }

    #[tokio::test]
    async fn test_search_error_becomes_failure() {
        let store = ManagedVectorStore::new(
            InMemoryBackend::new(InMemoryRegistry::default(), "kb"),
            Arc::new(FailingEmbedding),
        );
        let search = SearchMemoryTool::new(Arc::new(store));

        let outcome = search.call_json(&ctx(vec![]), json!({ "query": "x" })).await;

        assert!(outcome.to_text().starts_with("Fail: knowledge base search failed"));
    }

    #[tokio::test]
    async fn test_search_requires_query_argument() {
        let search = SearchMemoryTool::new(ready_store().await);

        let outcome = search.call_json(&ctx(vec![]), json!({})).await;

        assert!(outcome.to_text().starts_with("Fail: invalid arguments for search_memory"));
    }
}
