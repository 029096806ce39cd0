//! API routes for the docgate server

pub mod automation;
pub mod history;
pub mod process;
pub mod upload;

use axum::{
    extract::{DefaultBodyLimit, State},
    routing::{get, post},
    Json, Router,
};

use crate::server::state::AppState;

/// Build all API routes
pub fn api_routes(max_upload_size: usize) -> Router<AppState> {
    Router::new()
        // Intake - with larger body limit for file uploads
        .route(
            "/upload",
            post(upload::upload_documents).layer(DefaultBodyLimit::max(max_upload_size)),
        )
        .route("/process/:client", post(process::process_inbox))
        .route("/automation", post(automation::automation_call))
        // History
        .route("/history", get(history::query_history))
        .route("/history/stats", get(history::history_stats))
        // Queue
        .route("/queue", get(queue_status))
        // Info
        .route("/info", get(info))
}

/// GET /api/queue - admission queue status
async fn queue_status(State(state): State<AppState>) -> Json<serde_json::Value> {
    let queue = state.queue();
    Json(serde_json::json!({
        "pending": queue.pending(),
        "running": queue.running(),
        "max_concurrent": queue.max_concurrent(),
        "max_queue_size": queue.max_queue_size(),
    }))
}

/// API info endpoint
async fn info() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": "docgate",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Document intake gateway for per-client processing programs",
        "endpoints": {
            "POST /api/upload": "Upload documents for a client (multipart)",
            "POST /api/process/:client": "Queue every document waiting in the client's inbox",
            "POST /api/automation": "Queue a document already placed by an external system",
            "GET /api/history": "Paginated processing history",
            "GET /api/history/stats": "History totals",
            "GET /api/queue": "Admission queue status"
        }
    }))
}
