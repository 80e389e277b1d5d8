//! Client error types.

use thiserror::Error;

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, ApiError>;

/// Errors surfaced by the remote generation API client.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The API key was rejected (HTTP 401).
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// The account cannot pay for the request (HTTP 402).
    #[error("Insufficient credits: {0}")]
    InsufficientCredits(String),

    /// Too many requests (HTTP 429). The only retryable variant.
    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),

    /// Any other non-2xx response.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Message from the error body, or the status reason.
        message: String,
    },

    /// A request or progress stream exceeded its timeout.
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// A progress stream ended without a single data record.
    #[error("No data received from stream")]
    EmptyStream,

    /// An artifact URL could not be fetched.
    #[error("Failed to download artifact {url}: {reason}")]
    Download {
        /// The artifact URL.
        url: String,
        /// Why the download failed.
        reason: String,
    },

    /// Transport-level HTTP failure.
    #[error("HTTP error: {0}")]
    Http(#[source] reqwest::Error),

    /// URL parsing failed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Writing a downloaded artifact failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid client configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Timeout(err.to_string())
        } else {
            ApiError::Http(err)
        }
    }
}

impl ApiError {
    /// Classify a failed HTTP response.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            401 => ApiError::Authentication(message),
            402 => ApiError::InsufficientCredits(message),
            429 => ApiError::RateLimit(message),
            _ => ApiError::Api { status, message },
        }
    }

    /// HTTP status code associated with this error, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ApiError::Authentication(_) => Some(401),
            ApiError::InsufficientCredits(_) => Some(402),
            ApiError::RateLimit(_) => Some(429),
            ApiError::Api { status, .. } => Some(*status),
            ApiError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Returns true if the request may be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ApiError::RateLimit(_))
    }

    /// Check if this is an authentication error.
    pub fn is_auth_error(&self) -> bool {
        matches!(self, ApiError::Authentication(_))
    }
}

/// Error body returned by the API.
#[derive(Debug, serde::Deserialize)]
pub(crate) struct ErrorResponse {
    #[serde(default)]
    pub message: Option<String>,
}
