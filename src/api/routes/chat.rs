use axum::{
    body::Body,
    extract::{Multipart, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use futures::{future, StreamExt};
use serde::{Deserialize, Serialize};

use crate::api::state::AppState;
use crate::domain::{DomainError, Message, ThreadId, UploadedFile};

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub answer: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ThreadResponse {
    pub thread_id: String,
    pub messages: Vec<Message>,
}

struct ChatForm {
    thread_id: ThreadId,
    query: String,
    files: Vec<UploadedFile>,
}

pub fn status_for(error: &DomainError) -> StatusCode {
    match error {
        DomainError::Validation(_) => StatusCode::BAD_REQUEST,
        DomainError::NotFound(_) => StatusCode::NOT_FOUND,
        DomainError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn bad_form(error: impl std::fmt::Display) -> StatusCode {
    tracing::warn!(error = %error, "Rejected chat form");
    StatusCode::BAD_REQUEST
}

/// Fields: `thread_id`, `query`, and any number of `files`.
async fn read_form(mut multipart: Multipart) -> Result<ChatForm, StatusCode> {
    let mut thread_id = None;
    let mut query = None;
    let mut files = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(bad_form)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "thread_id" => thread_id = Some(field.text().await.map_err(bad_form)?),
            "query" => query = Some(field.text().await.map_err(bad_form)?),
            "files" => {
                let filename = field.file_name().unwrap_or("upload").to_string();
                let content_type = field.content_type().map(str::to_string);
                let data = field.bytes().await.map_err(bad_form)?;
                files.push(UploadedFile::from_bytes(filename, content_type, data));
            }
            _ => {}
        }
    }

    let thread_id = thread_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| bad_form("missing thread_id"))?;
    let query = query.ok_or_else(|| bad_form("missing query"))?;

    Ok(ChatForm {
        thread_id: ThreadId::new(thread_id),
        query,
        files,
    })
}

pub async fn chat_handler(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<ChatResponse>, StatusCode> {
    let form = read_form(multipart).await?;

    let answer = state
        .engine
        .invoke(&form.query, form.files, &form.thread_id)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, thread_id = %form.thread_id, "Chat turn failed");
            status_for(&e)
        })?;

    Ok(Json(ChatResponse { answer }))
}

pub async fn chat_stream_handler(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Response, StatusCode> {
    let form = read_form(multipart).await?;
    let thread_id = form.thread_id.clone();

    let fragments = state
        .engine
        .stream(form.query, form.files, form.thread_id)
        .filter(|fragment| future::ready(!matches!(fragment, Ok(text) if text.is_empty())))
        .inspect(move |fragment| {
            if let Err(e) = fragment {
                tracing::error!(error = %e, thread_id = %thread_id, "Streamed chat turn failed");
            }
        });

    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        Body::from_stream(fragments),
    )
        .into_response())
}

pub async fn get_thread(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
) -> Result<Json<ThreadResponse>, StatusCode> {
    let thread = state
        .engine
        .thread(&ThreadId::new(thread_id))
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to load thread");
            status_for(&e)
        })?
        .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(ThreadResponse {
        thread_id: thread.id.to_string(),
        messages: thread.messages().to_vec(),
    }))
}
