//! API-key check for the /api surface

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;

use crate::error::Error;
use crate::server::state::AppState;

pub const API_KEY_HEADER: &str = "x-api-key";

/// Compare the `x-api-key` header against the configured key.
/// No configured key disables the check.
pub async fn require_api_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, Error> {
    if let Some(expected) = state.config().server.api_key.as_deref() {
        let presented = request
            .headers()
            .get(API_KEY_HEADER)
            .and_then(|value| value.to_str().ok());
        if presented != Some(expected) {
            return Err(Error::Unauthorized);
        }
    }
    Ok(next.run(request).await)
}
