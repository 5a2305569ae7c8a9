use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use hls::StoreError;

/// Errors that can surface at the HTTP boundary. Every variant maps to a 400:
/// nothing about the pipeline's internals is client-visible.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("requested media sequence is outside the current window")]
    OutOfWindow(#[from] StoreError),

    #[error("no init segment for this variant")]
    NoInit,

    #[error("malformed query parameters: {0}")]
    BadQuery(String),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        tracing::warn!(error = %self, "rejecting request");
        (StatusCode::BAD_REQUEST, self.to_string()).into_response()
    }
}

pub type ServerResult<T> = Result<T, ServerError>;
