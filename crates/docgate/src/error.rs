//! Crate-wide error and result types

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    /// The admission queue is at capacity; the caller must resubmit later.
    #[error("job queue is full")]
    QueueFull,

    /// A second invocation of a program basename was attempted while one
    /// is still in flight.
    #[error("program '{0}' is already running")]
    AlreadyRunning(String),

    #[error("unsupported script extension for '{0}'")]
    UnsupportedExtension(String),

    /// The host could not start the external program.
    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("unknown client '{0}'")]
    UnknownClient(String),

    #[error("invalid request: {0}")]
    BadRequest(String),

    #[error("invalid API key")]
    Unauthorized,

    #[error("history error: {0}")]
    History(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Internal(String),
}

impl Error {
    fn status(&self) -> StatusCode {
        match self {
            Error::QueueFull => StatusCode::TOO_MANY_REQUESTS,
            Error::AlreadyRunning(_) => StatusCode::CONFLICT,
            Error::UnknownClient(_) => StatusCode::NOT_FOUND,
            Error::BadRequest(_) | Error::UnsupportedExtension(_) => StatusCode::BAD_REQUEST,
            Error::Unauthorized => StatusCode::UNAUTHORIZED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}
