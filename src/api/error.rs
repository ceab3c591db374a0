use thiserror::Error;

/// Errors from the HydroBox backend client.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Connection refused, DNS failure, timeout and friends
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Invalid JSON from backend: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid base URL: {0}")]
    InvalidUrl(String),
}
