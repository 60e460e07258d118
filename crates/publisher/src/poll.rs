//! CI test-run polling
//!
//! A results endpoint is polled at a fixed interval until the run reports
//! `FINISHED`, up to a bounded number of attempts.

use crate::error::{ApiError, ApiResult};
use kiwix_core::config::PollConfig;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Terminal state of a test run
pub const FINISHED: &str = "FINISHED";

/// Status document returned by the results endpoint
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStatus {
    pub state: String,
    #[serde(default)]
    pub success_ratio: Option<f64>,
}

impl RunStatus {
    pub fn is_finished(&self) -> bool {
        self.state.eq_ignore_ascii_case(FINISHED)
    }

    /// Whether every test passed; a missing ratio counts as failure
    pub fn passed(&self) -> bool {
        self.success_ratio.is_some_and(|r| r >= 1.0)
    }
}

/// Something that reports the current state of a test run
#[allow(async_fn_in_trait)]
pub trait RunSource {
    async fn status(&self) -> ApiResult<RunStatus>;
}

/// Results endpoint reached over HTTP
#[derive(Debug, Clone)]
pub struct HttpRunSource {
    client: Client,
    url: String,
}

impl HttpRunSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> ApiResult<Self> {
        let url = url.into();
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ApiError::InvalidUrl(url));
        }
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url })
    }
}

impl RunSource for HttpRunSource {
    #[instrument(skip(self), fields(url = %self.url))]
    async fn status(&self) -> ApiResult<RunStatus> {
        let response = self.client.get(&self.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ApiError::api_response(status.as_u16(), message));
        }
        Ok(response.json().await?)
    }
}

/// Polling bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl From<&PollConfig> for PollSettings {
    fn from(config: &PollConfig) -> Self {
        Self {
            interval: Duration::from_secs(config.interval_secs),
            max_attempts: config.max_attempts,
        }
    }
}

/// Errors that end polling at once instead of counting as an attempt
fn is_fatal(err: &ApiError) -> bool {
    err.is_client_error() || matches!(err, ApiError::Json(_))
}

/// Poll `source` until the run finishes
///
/// Returns the final status when every test passed. A finished run with
/// failures is reported immediately. Transport errors and server errors
/// count as an attempt; client errors end polling.
pub async fn await_run<S: RunSource>(source: &S, settings: PollSettings) -> ApiResult<RunStatus> {
    for attempt in 1..=settings.max_attempts {
        match source.status().await {
            Ok(status) if status.is_finished() => {
                info!(attempt, ratio = ?status.success_ratio, "test run finished");
                if status.passed() {
                    return Ok(status);
                }
                return Err(ApiError::TestsFailed {
                    ratio: status.success_ratio.unwrap_or(0.0),
                });
            }
            Ok(status) => debug!(attempt, state = %status.state, "test run pending"),
            Err(e) if is_fatal(&e) => return Err(e),
            Err(e) => warn!(attempt, error = %e, "status request failed"),
        }
        if attempt < settings.max_attempts {
            tokio::time::sleep(settings.interval).await;
        }
    }
    Err(ApiError::PollTimeout {
        attempts: settings.max_attempts,
    })
}
