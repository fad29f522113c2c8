//! Marionette error types

use std::path::PathBuf;
use std::time::Duration;

/// Marionette error types
#[derive(Debug, thiserror::Error)]
pub enum MarionetteError {
    // Collaborator/network errors
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("authentication failed")]
    AuthenticationFailed,

    // Soft errors
    #[error("empty response from collaborator")]
    EmptyResponse,

    // Data errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Configuration errors
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A video or image asset could not be resolved to metadata.
    #[error("asset error for {path:?}: {reason}")]
    Asset { path: PathBuf, reason: String },

    #[error("playback error: {0}")]
    Playback(String),
}

impl MarionetteError {
    /// Whether a retry of the same request may succeed.
    ///
    /// Network failures, rate limiting and 5xx responses are transient;
    /// everything else is permanent.
    pub fn is_transient(&self) -> bool {
        match self {
            MarionetteError::Http(_) | MarionetteError::RateLimited { .. } => true,
            MarionetteError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Server-provided retry hint, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            MarionetteError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }

    pub(crate) fn asset(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        MarionetteError::Asset {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Map a non-success HTTP status to an error.
///
/// Shared by the HTTP collaborators so status classification stays in one place.
pub(crate) fn status_error(response: &reqwest::Response, service: &str) -> Result<()> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }

    match status.as_u16() {
        401 | 403 => Err(MarionetteError::AuthenticationFailed),
        429 => {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .map(Duration::from_secs);
            Err(MarionetteError::RateLimited { retry_after })
        }
        code => Err(MarionetteError::Api {
            status: code,
            message: format!("{service} returned {status}"),
        }),
    }
}

/// Result type alias for Marionette operations
pub type Result<T> = std::result::Result<T, MarionetteError>;
