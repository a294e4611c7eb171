use serde::{Deserialize, Serialize};
use serde_json::Value;

pub type Metadata = serde_json::Map<String, Value>;

/// A unit of ingested knowledge. Metadata always carries `source`; documents
/// cut from a PDF also carry `page` and `total_pages`, and chunks produced by
/// [`TextSplitter`] add `chunk_index`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub page_content: String,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Document {
    pub fn new(page_content: impl Into<String>) -> Self {
        Self {
            page_content: page_content.into(),
            metadata: Metadata::new(),
        }
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.metadata
            .insert("source".to_string(), Value::String(source.into()));
        self
    }

    pub fn source(&self) -> Option<&str> {
        self.metadata.get("source").and_then(Value::as_str)
    }

    pub fn page(&self) -> Option<u64> {
        self.metadata.get("page").and_then(Value::as_u64)
    }
}

/// Splits documents into bounded chunks.
///
/// Paragraphs (blank-line separated) are packed together until adding the
/// next one would exceed `chunk_size` characters. A paragraph that is larger
/// than `chunk_size` on its own is cut into character windows that overlap by
/// `chunk_overlap`.
#[derive(Debug, Clone, Copy)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl TextSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            chunk_overlap: chunk_overlap.min(chunk_size - 1),
        }
    }

    pub fn split_documents(&self, documents: &[Document]) -> Vec<Document> {
        documents
            .iter()
            .flat_map(|doc| {
                self.split_text(&doc.page_content)
                    .into_iter()
                    .enumerate()
                    .map(|(index, text)| {
                        let mut metadata = doc.metadata.clone();
                        metadata.insert("chunk_index".to_string(), Value::from(index));
                        Document::new(text).with_metadata(metadata)
                    })
            })
            .collect()
    }

    pub fn split_text(&self, content: &str) -> Vec<String> {
        let paragraphs = content
            .split("\n\n")
            .map(str::trim)
            .filter(|s| !s.is_empty());

        let mut chunks = Vec::new();
        let mut current = String::new();
        let mut current_len = 0;

        for paragraph in paragraphs {
            let paragraph_len = paragraph.chars().count();

            if paragraph_len > self.chunk_size {
                if !current.is_empty() {
                    chunks.push(std::mem::take(&mut current));
                    current_len = 0;
                }
                chunks.extend(self.windows(paragraph));
                continue;
            }

            let would_exceed = !current.is_empty() && current_len + paragraph_len + 2 > self.chunk_size;
            if would_exceed {
                chunks.push(std::mem::take(&mut current));
                current_len = 0;
            }

            if !current.is_empty() {
                current.push_str("\n\n");
                current_len += 2;
            }
            current.push_str(paragraph);
            current_len += paragraph_len;
        }

        if !current.is_empty() {
            chunks.push(current);
        }

        chunks
    }

    fn windows(&self, text: &str) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        let step = self.chunk_size - self.chunk_overlap;
        let mut windows = Vec::new();
        let mut start = 0;

        while start < chars.len() {
            let end = (start + self.chunk_size).min(chars.len());
            let window: String = chars[start..end].iter().collect();
            let window = window.trim();
            if !window.is_empty() {
                windows.push(window.to_string());
            }
            if end == chars.len() {
                break;
            }
            start += step;
        }

        windows
    }
}

impl Default for TextSplitter {
    fn default() -> Self {
        Self::new(1000, 100)
    }
}
