//! Multipart document upload endpoint

use axum::extract::{Multipart, State};
use axum::Json;
use serde::Serialize;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::history::IntakeSource;
use crate::intake;
use crate::processing::QueuedJob;
use crate::server::state::AppState;

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub queued: Vec<QueuedJob>,
    pub rejected: Vec<UploadError>,
}

#[derive(Debug, Serialize)]
pub struct UploadError {
    pub filename: String,
    pub error: String,
}

/// POST /api/upload - place documents in a client inbox and queue them
///
/// Multipart form: a `client` field (must precede the files), an optional
/// `metadata` JSON field passed through to the program, then file parts.
/// A full queue answers 429; already-queued siblings stay queued.
pub async fn upload_documents(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>> {
    let mut client: Option<String> = None;
    let mut metadata = serde_json::json!({});
    let mut queued = Vec::new();
    let mut rejected = Vec::new();
    let mut saw_file = false;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::BadRequest(format!("failed to read multipart field: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();

        if name == "client" {
            let text = field
                .text()
                .await
                .map_err(|e| Error::BadRequest(format!("failed to read client field: {}", e)))?;
            client = Some(text.trim().to_string());
            continue;
        }
        if name == "metadata" {
            let data = field
                .bytes()
                .await
                .map_err(|e| Error::BadRequest(format!("failed to read metadata field: {}", e)))?;
            metadata = serde_json::from_slice(&data)
                .map_err(|e| Error::BadRequest(format!("metadata is not valid JSON: {}", e)))?;
            continue;
        }

        let Some(client) = client.as_deref() else {
            return Err(Error::BadRequest(
                "the 'client' field must precede file parts".to_string(),
            ));
        };
        if state.scripts().resolve(client).is_none() {
            return Err(Error::UnknownClient(client.to_string()));
        }

        let filename = field
            .file_name()
            .map(|s| s.to_string())
            .unwrap_or_else(|| format!("document-{}.pdf", Uuid::new_v4()));

        let data = match field.bytes().await {
            Ok(data) => data,
            Err(e) => {
                rejected.push(UploadError {
                    filename,
                    error: format!("failed to read file: {}", e),
                });
                continue;
            }
        };

        saw_file = true;
        tracing::info!(client, filename = %filename, size = data.len(), "received upload");

        intake::place_upload(&state.config().storage.base_dir, client, &filename, &data).await?;
        let job =
            state
                .processor()
                .submit_document(client, &filename, metadata.clone(), IntakeSource::Upload)?;
        queued.push(job);
    }

    if !saw_file && rejected.is_empty() {
        return Err(Error::BadRequest("no file parts in upload".to_string()));
    }
    Ok(Json(UploadResponse { queued, rejected }))
}
