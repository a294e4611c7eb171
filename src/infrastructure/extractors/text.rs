use encoding_rs::{Encoding, UTF_8};
use tracing::debug;

use crate::domain::{ports::Extractor, Blob, Document, DomainError};

/// The whole blob as a single document, keeping the blob metadata.
pub struct TextExtractor;

impl Extractor for TextExtractor {
    fn extract(&self, blob: &Blob) -> Result<Vec<Document>, DomainError> {
        let text = decode(&blob.data, &blob.encoding);
        Ok(vec![Document::new(text).with_metadata(blob.metadata.clone())])
    }
}

/// Decodes with the declared charset. An unknown label, or bytes the charset
/// rejects, fall back to UTF-8 with replacement characters.
fn decode(data: &[u8], label: &str) -> String {
    let encoding = Encoding::for_label(label.as_bytes()).unwrap_or_else(|| {
        debug!(label, "unknown charset, decoding as UTF-8");
        UTF_8
    });
    let data = if encoding == UTF_8 {
        data.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(data)
    } else {
        data
    };

    match encoding.decode_without_bom_handling_and_without_replacement(data) {
        Some(text) => text.into_owned(),
        None => {
            debug!(encoding = encoding.name(), "invalid byte sequences replaced");
            String::from_utf8_lossy(data).into_owned()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn extract(data: &'static [u8], content_type: &str) -> String {
        let blob = Blob::from_data(Bytes::from_static(data), Some(content_type), "menu.txt");
        TextExtractor.extract(&blob).unwrap().remove(0).page_content
    }

    #[test]
    fn test_text_keeps_blob_metadata() {
        let blob = Blob::from_data(Bytes::from_static(b"ball costs $0.05"), Some("text/plain"), "notes.txt");

        let docs = TextExtractor.extract(&blob).unwrap();

        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].page_content, "ball costs $0.05");
        assert_eq!(docs[0].metadata, blob.metadata);
        assert_eq!(docs[0].source(), Some("notes.txt"));
    }

    #[test]
    fn test_declared_charset_is_used() {
        assert_eq!(extract(b"caf\xE9", "text/plain; charset=iso-8859-1"), "café");
        assert_eq!(
            extract(b"\x82\xb1\x82\xf1\x82\xc9\x82\xbf\x82\xcd", "text/plain; charset=Shift_JIS"),
            "こんにちは"
        );
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        assert_eq!(extract(b"caf\xE9", "text/plain; charset=utf-8"), "caf\u{FFFD}");
        assert_eq!(extract(b"caf\xE9", "text/plain"), "caf\u{FFFD}");
    }

    #[test]
    fn test_unknown_charset_falls_back_to_utf8() {
        assert_eq!(extract("café".as_bytes(), "text/plain; charset=x-klingon"), "café");
    }

    #[test]
    fn test_bom_is_stripped() {
        assert_eq!(decode(b"\xEF\xBB\xBFhi", "utf-8"), "hi");
    }
}
