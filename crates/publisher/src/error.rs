//! Error types for the publisher

use thiserror::Error;

/// Result type alias for publishing operations
pub type ApiResult<T> = Result<T, ApiError>;

/// Publishing and polling errors
#[derive(Error, Debug)]
pub enum ApiError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Reading a file to upload failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Descriptor or content resolution failed
    #[error(transparent)]
    Build(#[from] kiwix_core::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Missing environment variable
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    /// The access token was rejected
    #[error("The credentials have been revoked or expired, please re-authorize")]
    CredentialsExpired,

    /// API returned an error response
    #[error("API error ({status}): {message}")]
    ApiResponse {
        /// HTTP status code
        status: u16,
        /// Error message from API
        message: String,
    },

    /// A response lacked a field the workflow needs
    #[error("Unexpected API response: missing `{0}`")]
    MissingField(&'static str),

    /// The test run never reached a terminal state
    #[error("Test run still not finished after {attempts} attempts")]
    PollTimeout {
        /// Number of polls made
        attempts: u32,
    },

    /// The test run finished with failures
    #[error("Test run finished with success ratio {ratio}")]
    TestsFailed {
        /// Ratio of passing tests reported by the run
        ratio: f64,
    },

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl ApiError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a missing env var error
    pub fn missing_env(var: impl Into<String>) -> Self {
        Self::MissingEnvVar(var.into())
    }

    /// Create an API response error; 401 means the token is no longer valid
    pub fn api_response(status: u16, message: impl Into<String>) -> Self {
        if status == 401 {
            return Self::CredentialsExpired;
        }
        Self::ApiResponse {
            status,
            message: message.into(),
        }
    }

    /// Check if this is a client error (4xx)
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::CredentialsExpired)
            || matches!(self, Self::ApiResponse { status, .. } if (400..500).contains(status))
    }
}
