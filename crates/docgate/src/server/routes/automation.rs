//! External automation entry point
//!
//! Used by systems that place documents in the inbox themselves (network
//! shares, RPA jobs) and only need the gateway to run the program.

use axum::extract::State;
use axum::Json;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::history::IntakeSource;
use crate::intake;
use crate::processing::QueuedJob;
use crate::server::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AutomationRequest {
    pub client: String,
    pub filename: String,
    /// Passed through to the program as its third argument.
    #[serde(default = "default_metadata")]
    pub metadata: serde_json::Value,
}

fn default_metadata() -> serde_json::Value {
    serde_json::json!({})
}

/// POST /api/automation - queue a document already waiting in the inbox
pub async fn automation_call(
    State(state): State<AppState>,
    Json(request): Json<AutomationRequest>,
) -> Result<Json<QueuedJob>> {
    let filename = intake::sanitize_filename(&request.filename)?;

    let inbox_path = state
        .config()
        .storage
        .base_dir
        .join(&request.client)
        .join(intake::INBOX_DIR)
        .join(filename);
    if !inbox_path.is_file() {
        return Err(Error::BadRequest(format!(
            "'{}' is not waiting in the {} inbox",
            filename, request.client
        )));
    }

    let job = state.processor().submit_document(
        &request.client,
        filename,
        request.metadata,
        IntakeSource::Automation,
    )?;
    Ok(Json(job))
}
