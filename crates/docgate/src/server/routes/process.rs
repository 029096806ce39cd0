//! Inbox processing trigger

use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::history::IntakeSource;
use crate::intake;
use crate::processing::QueuedJob;
use crate::server::state::AppState;

#[derive(Debug, Serialize)]
pub struct ProcessResponse {
    pub client: String,
    pub queued: Vec<QueuedJob>,
    /// Documents the queue turned away; resubmit once it drains.
    pub rejected: Vec<String>,
}

/// POST /api/process/:client - queue every document waiting in the inbox
pub async fn process_inbox(
    State(state): State<AppState>,
    Path(client): Path<String>,
) -> Result<Json<ProcessResponse>> {
    dispatch_inbox(&state, &client).map(Json)
}

/// Shared with the background scan loop.
pub(crate) fn dispatch_inbox(state: &AppState, client: &str) -> Result<ProcessResponse> {
    if state.scripts().resolve(client).is_none() {
        return Err(Error::UnknownClient(client.to_string()));
    }

    let pending = intake::pending_documents(&state.config().storage.base_dir, client);
    let mut queued = Vec::new();
    let mut rejected = Vec::new();

    for path in pending {
        let Some(filename) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        match state.processor().submit_document(
            client,
            filename,
            serde_json::json!({}),
            IntakeSource::Folder,
        ) {
            Ok(job) => queued.push(job),
            Err(Error::QueueFull) => rejected.push(filename.to_string()),
            Err(e) => return Err(e),
        }
    }

    tracing::info!(
        client,
        queued = queued.len(),
        rejected = rejected.len(),
        "inbox dispatch complete"
    );
    Ok(ProcessResponse {
        client: client.to_string(),
        queued,
        rejected,
    })
}
