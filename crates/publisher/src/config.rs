//! Configuration for the publishing client
//!
//! The credential is an OAuth2 access token stored in the file named by
//! `GOOGLE_API_KEY`, either raw or as the `access_token` of a JSON document.

use crate::error::{ApiError, ApiResult};
use kiwix_core::config::{expand_path, PublishConfig};
use serde::Deserialize;
use std::env;
use std::path::Path;
use std::time::Duration;

/// Public publishing API endpoint
pub const DEFAULT_API_URL: &str = "https://androidpublisher.googleapis.com";

/// Variable naming the credential file
pub const CREDENTIAL_VAR: &str = "GOOGLE_API_KEY";

/// Variable overriding the API endpoint
pub const API_URL_VAR: &str = "PLAY_API_URL";

/// Time allowed to establish a connection, uploads included
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// API base URL, without the `androidpublisher/v3` path
    pub base_url: String,
    /// OAuth2 bearer token
    pub access_token: String,
    /// Total timeout of JSON calls; media uploads are not bounded by it
    pub timeout: Duration,
    pub connect_timeout: Duration,
}

#[derive(Deserialize)]
struct TokenFile {
    access_token: String,
}

impl ClientConfig {
    /// Create configuration from the environment and the `[publish]` section
    ///
    /// Reads the following environment variables:
    /// - `GOOGLE_API_KEY`: path of the credential file (required)
    /// - `PLAY_API_URL`: API base URL (optional)
    pub fn from_env(publish: &PublishConfig) -> ApiResult<Self> {
        let key_path = env::var(CREDENTIAL_VAR).map_err(|_| ApiError::missing_env(CREDENTIAL_VAR))?;
        let access_token = read_token(&expand_path(&key_path))?;
        let base_url = env::var(API_URL_VAR).unwrap_or_else(|_| DEFAULT_API_URL.to_string());

        let config = Self {
            base_url,
            access_token,
            timeout: Duration::from_secs(publish.timeout_secs),
            connect_timeout: CONNECT_TIMEOUT,
        };
        config.validate()?;
        Ok(config)
    }

    /// Configuration with an explicit token, for tests and embedding
    pub fn new(base_url: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            access_token: access_token.into(),
            timeout: Duration::from_secs(300),
            connect_timeout: CONNECT_TIMEOUT,
        }
    }

    /// Builder-style method to set timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> ApiResult<()> {
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(ApiError::InvalidUrl(self.base_url.clone()));
        }
        if self.access_token.is_empty() {
            return Err(ApiError::config("access token is empty"));
        }
        if self.timeout.is_zero() || self.connect_timeout.is_zero() {
            return Err(ApiError::config("timeout cannot be zero"));
        }
        Ok(())
    }
}

/// Read an access token from a raw or JSON credential file
pub fn read_token(path: &Path) -> ApiResult<String> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        ApiError::config(format!("cannot read credential {}: {}", path.display(), e))
    })?;
    let trimmed = content.trim();
    if trimmed.starts_with('{') {
        let file: TokenFile = serde_json::from_str(trimmed)?;
        return Ok(file.access_token);
    }
    Ok(trimmed.to_string())
}
