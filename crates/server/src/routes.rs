use std::sync::Arc;

use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        DefaultBodyLimit, Multipart, State,
    },
    http::StatusCode,
    response::sse::{Event, Sse},
    routing::{get, post},
    Json, Router,
};
use futures::{Stream, StreamExt};
use serde_json::{json, Value};
use stemsplit_job_manager::JobManager;
use tracing::{event, instrument, Level};

use crate::{
    error::{AppError, AppResult},
    wire::WireMessage,
};

#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<JobManager>,
}

/// Build the application router. Uploads larger than `max_upload_bytes` are rejected.
pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/process", post(process))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// POST /process
///
/// Accepts a multipart form with a `file` field, starts a job on it, and streams the job's
/// events back. Closing the connection abandons the job.
#[instrument(skip_all)]
async fn process(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> AppResult<Sse<impl Stream<Item = Result<Event, axum::Error>>>> {
    let mut multipart = multipart.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let (filename, data) = read_upload(&mut multipart).await?;

    let job = state.manager.start(&data, &filename).await?;
    event!(Level::INFO, job_id = %job.id(), %filename, size = data.len(), "Streaming job events");

    let events = job
        .events()
        .map(|event| WireMessage::from(event).to_sse());
    Ok(Sse::new(events))
}

/// Read the `file` field from the form, ignoring any other fields.
async fn read_upload(multipart: &mut Multipart) -> AppResult<(String, Vec<u8>)> {
    let mut upload = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field.file_name().unwrap_or_default().to_string();
        let data = field.bytes().await.map_err(multipart_error)?;
        upload = Some((filename, data.to_vec()));
    }

    upload.ok_or_else(|| AppError::BadRequest("Missing required 'file' field".into()))
}

fn multipart_error(e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge(e.body_text())
    } else {
        AppError::BadRequest(e.body_text())
    }
}
