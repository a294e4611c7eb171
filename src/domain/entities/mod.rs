mod conversation;
mod document;
mod embedding;
mod tool;
mod upload;

pub use conversation::{Content, ContentPart, Message, MessageRole, Thread, ThreadId};
pub use document::{Document, Metadata, TextSplitter};
pub use embedding::Embedding;
pub use tool::{ToolCall, ToolOutcome, ToolSpec, ToolStatus, TurnContext};
pub use upload::{parse_content_type, Blob, UploadedFile, DEFAULT_ENCODING};
