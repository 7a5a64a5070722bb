//! Upload intake.

use std::path::{Path, PathBuf};

use axum::extract::multipart::Field;
use axum::extract::{Multipart, State};
use axum::Json;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use vedit_models::{Event, TransformRequest, Validate};

use crate::error::{ApiError, ApiResult};
use crate::metrics::record_upload_bytes;
use crate::state::AppState;

/// Response for an accepted request.
#[derive(Debug, Serialize)]
pub struct ProcessResponse {
    pub message: String,
    pub id: String,
}

/// Accept a multipart form with an `event` JSON request and an optional
/// `file` upload, then emit it for processing.
pub async fn process(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<Json<ProcessResponse>> {
    let mut upload = None;

    let result = accept(&state, multipart, &mut upload).await;
    if result.is_err() {
        if let Some(path) = &upload {
            discard_upload(path).await;
        }
    }
    result.map_err(|e| e.for_environment(state.config.is_production()))
}

async fn accept(
    state: &AppState,
    mut multipart: Multipart,
    upload: &mut Option<PathBuf>,
) -> ApiResult<Json<ProcessResponse>> {
    let mut request = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(e.to_string()))?
    {
        match field.name() {
            Some("event") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::bad_request(e.to_string()))?;
                request = Some(parse_request(&text)?);
            }
            Some("file") => {
                if upload.is_some() {
                    return Err(ApiError::bad_request("more than one file uploaded"));
                }
                *upload = Some(store_upload(&state.config.input_path, field).await?);
            }
            other => debug!("Ignoring form field {:?}", other),
        }
    }

    let mut request = request.ok_or_else(|| ApiError::bad_request("missing event field"))?;

    if let Some(path) = upload.as_ref() {
        request.input.local_file_path = Some(path.to_string_lossy().to_string());
    }
    if request.source().is_none() {
        return Err(ApiError::bad_request("no valid input file provided"));
    }

    let event = Event::new(request);
    let id = event.id.to_string();

    state.emitter.send(event).await.map_err(|e| {
        error!(event_id = %id, "Failed to send event: {}", e);
        ApiError::from(e)
    })?;

    info!(event_id = %id, "Accepted processing request");

    Ok(Json(ProcessResponse {
        message: "processing request".to_string(),
        id,
    }))
}

/// Decode and validate the `event` field.
pub fn parse_request(text: &str) -> ApiResult<TransformRequest> {
    let request: TransformRequest = serde_json::from_str(text).map_err(|e| {
        warn!("Failed to decode request: {}", e);
        ApiError::bad_request(format!("invalid request: {}", e))
    })?;

    request.validate().map_err(|e| {
        warn!("Failed to validate request: {}", e);
        ApiError::from(e)
    })?;

    Ok(request)
}

/// Stream an uploaded file to `<dir>/<uuid>.<ext>`.
async fn store_upload(dir: &Path, mut field: Field<'_>) -> ApiResult<PathBuf> {
    let extension = field
        .file_name()
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(str::to_string);

    let name = match extension {
        Some(ext) => format!("{}.{}", Uuid::new_v4(), ext),
        None => Uuid::new_v4().to_string(),
    };
    let path = dir.join(name);

    let mut file = tokio::fs::File::create(&path).await?;
    let mut written: u64 = 0;

    loop {
        let chunk = match field.chunk().await {
            Ok(Some(chunk)) => chunk,
            Ok(None) => break,
            Err(e) => {
                drop(file);
                discard_upload(&path).await;
                return Err(ApiError::bad_request(format!("upload interrupted: {}", e)));
            }
        };
        if let Err(e) = file.write_all(&chunk).await {
            drop(file);
            discard_upload(&path).await;
            return Err(e.into());
        }
        written += chunk.len() as u64;
    }
    file.flush().await?;

    record_upload_bytes(written);
    debug!("Stored upload {} ({} bytes)", path.display(), written);

    Ok(path)
}

async fn discard_upload(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        warn!("Failed to remove upload {}: {}", path.display(), e);
    }
}
