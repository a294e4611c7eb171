use bytes::Bytes;
use serde_json::json;
use std::path::PathBuf;

use super::document::Metadata;
use crate::domain::errors::{DomainError, Result};

pub const DEFAULT_ENCODING: &str = "utf-8";

#[derive(Debug, Clone)]
enum FileSource {
    Memory(Bytes),
    Disk(PathBuf),
}

/// A file attached to a single request. Never persisted directly; it only
/// lives long enough to be turned into documents.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: String,
    pub content_type: Option<String>,
    source: FileSource,
}

impl UploadedFile {
    pub fn from_bytes(
        filename: impl Into<String>,
        content_type: Option<String>,
        data: impl Into<Bytes>,
    ) -> Self {
        Self {
            filename: filename.into(),
            content_type,
            source: FileSource::Memory(data.into()),
        }
    }

    pub fn from_path(path: impl Into<PathBuf>, content_type: Option<String>) -> Self {
        let path = path.into();
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            filename,
            content_type,
            source: FileSource::Disk(path),
        }
    }

    pub async fn read(&self) -> Result<Bytes> {
        match &self.source {
            FileSource::Memory(data) => Ok(data.clone()),
            FileSource::Disk(path) => tokio::fs::read(path).await.map(Bytes::from).map_err(|e| {
                DomainError::internal(format!("failed to read {}: {e}", path.display()))
            }),
        }
    }
}

/// Raw bytes plus the MIME information used to pick an extractor.
#[derive(Debug, Clone)]
pub struct Blob {
    pub data: Bytes,
    /// Lower-cased MIME type without parameters.
    pub mime_type: String,
    pub encoding: String,
    pub path: String,
    pub metadata: Metadata,
}

impl Blob {
    pub fn from_data(data: Bytes, content_type: Option<&str>, filename: &str) -> Self {
        let (mime_type, charset) = parse_content_type(content_type.unwrap_or_default());
        let metadata = json!({
            "source": filename,
            "filename": filename,
            "content_type": content_type,
            "size": data.len(),
        });

        Self {
            data,
            mime_type,
            encoding: charset.unwrap_or_else(|| DEFAULT_ENCODING.to_string()),
            path: filename.to_string(),
            metadata: match metadata {
                serde_json::Value::Object(map) => map,
                _ => Metadata::new(),
            },
        }
    }

    /// Filename recorded in the blob metadata, falling back to the path.
    pub fn source(&self) -> &str {
        self.metadata
            .get("filename")
            .and_then(|v| v.as_str())
            .unwrap_or(&self.path)
    }
}

/// Splits `type/subtype; charset=x` into the lower-cased essence and the
/// optional charset.
pub fn parse_content_type(raw: &str) -> (String, Option<String>) {
    let mut parts = raw.split(';');
    let essence = parts.next().unwrap_or_default().trim().to_lowercase();
    let charset = parts.find_map(|param| {
        let (key, value) = param.split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| value.trim().trim_matches('"').to_lowercase())
    });
    (essence, charset)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_content_type() {
        assert_eq!(
            parse_content_type("Text/Markdown; charset=\"UTF-8\""),
            ("text/markdown".to_string(), Some("utf-8".to_string()))
        );
        assert_eq!(
            parse_content_type("application/pdf"),
            ("application/pdf".to_string(), None)
        );
        assert_eq!(parse_content_type(""), (String::new(), None));
    }

    #[test]
    fn test_blob_metadata() {
        let blob = Blob::from_data(Bytes::from_static(b"hello"), Some("text/plain"), "a.txt");

        assert_eq!(blob.mime_type, "text/plain");
        assert_eq!(blob.encoding, DEFAULT_ENCODING);
        assert_eq!(blob.source(), "a.txt");
        assert_eq!(blob.metadata["source"], "a.txt");
        assert_eq!(blob.metadata["content_type"], "text/plain");
        assert_eq!(blob.metadata["size"], 5);
    }

    #[tokio::test]
    async fn test_read_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "from disk").unwrap();

        let file = UploadedFile::from_path(&path, Some("text/plain".into()));

        assert_eq!(file.filename, "notes.txt");
        assert_eq!(file.read().await.unwrap(), Bytes::from_static(b"from disk"));
    }
}
