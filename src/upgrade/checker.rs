//! Update checker: query the release endpoint and compare versions.

use super::release::{AssetMatcher, ReleaseInfo, UpdatePackage};
use crate::config::UpdateSettings;
use crate::constants::{CHECK_INITIAL_BACKOFF, CHECK_MAX_RETRIES, CHECK_REQUEST_TIMEOUT, USER_AGENT};
use crate::core::CheckError;
use crate::version::AppVersion;
use reqwest::StatusCode;
use std::time::Duration;
use tokio_retry::RetryIf;
use tokio_retry::strategy::ExponentialBackoff;
use tracing::{debug, info, warn};

/// Result of a successful check. A failed check is `Err(CheckError)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    /// The latest release is not newer than the running version.
    NoUpdate {
        /// Latest published version.
        latest: AppVersion,
    },
    /// A strictly newer release is available.
    Available(UpdatePackage),
}

/// Queries one "latest release" endpoint.
#[derive(Debug, Clone)]
pub struct UpdateChecker {
    client: reqwest::Client,
    endpoint: String,
    matcher: AssetMatcher,
    max_retries: usize,
    initial_backoff: Duration,
}

impl UpdateChecker {
    /// Checker for `endpoint` selecting assets with `matcher`.
    pub fn new(endpoint: impl Into<String>, matcher: AssetMatcher) -> Result<Self, CheckError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(CHECK_REQUEST_TIMEOUT)
            .build()
            .map_err(CheckError::Network)?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            matcher,
            max_retries: CHECK_MAX_RETRIES,
            initial_backoff: CHECK_INITIAL_BACKOFF,
        })
    }

    /// Checker configured from the `[update]` settings.
    pub fn from_settings(settings: &UpdateSettings) -> Result<Self, CheckError> {
        let matcher = AssetMatcher::from_setting(settings.asset_pattern.as_deref())?;
        Self::new(settings.release_api_url.clone(), matcher)
    }

    /// Override the first retry delay; later delays keep doubling.
    #[must_use]
    pub fn with_initial_backoff(mut self, delay: Duration) -> Self {
        self.initial_backoff = delay;
        self
    }

    /// Query the endpoint and compare its latest release with `current`.
    ///
    /// Rate limiting and 5xx responses are retried up to three times with
    /// exponential backoff (1s, 2s, 4s). Not-found and every other failure are
    /// returned immediately.
    pub async fn check(&self, current: &AppVersion) -> Result<CheckOutcome, CheckError> {
        debug!(endpoint = %self.endpoint, current = %current, "Checking for updates");

        let release = RetryIf::spawn(
            self.backoff(),
            || self.fetch_release(),
            |e: &CheckError| {
                let transient = e.is_transient();
                if transient {
                    warn!(error = %e, "Transient release query failure");
                }
                transient
            },
        )
        .await?;

        let latest = release.version()?;
        if latest <= *current {
            debug!(latest = %latest, "Already on latest version");
            return Ok(CheckOutcome::NoUpdate { latest });
        }

        let package = release.into_package(&self.matcher)?;
        info!(current = %current, latest = %package.version, "Update available");
        Ok(CheckOutcome::Available(package))
    }

    fn backoff(&self) -> impl Iterator<Item = Duration> + use<> {
        // Delays are base^n * factor: from_millis(2) with factor d/2 yields d, 2d, 4d.
        let factor = u64::try_from(self.initial_backoff.as_millis() / 2)
            .unwrap_or(u64::MAX)
            .max(1);
        ExponentialBackoff::from_millis(2)
            .factor(factor)
            .take(self.max_retries)
    }

    async fn fetch_release(&self) -> Result<ReleaseInfo, CheckError> {
        let response = self
            .client
            .get(&self.endpoint)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .send()
            .await
            .map_err(CheckError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(status, &response, &self.endpoint));
        }

        response
            .json::<ReleaseInfo>()
            .await
            .map_err(CheckError::from_reqwest)
    }
}

fn classify_status(status: StatusCode, response: &reqwest::Response, url: &str) -> CheckError {
    let code = status.as_u16();
    let budget_exhausted = response
        .headers()
        .get("x-ratelimit-remaining")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim() == "0");

    match status {
        StatusCode::NOT_FOUND => CheckError::NotFound {
            url: url.to_string(),
        },
        StatusCode::TOO_MANY_REQUESTS => CheckError::RateLimited { status: code },
        StatusCode::FORBIDDEN if budget_exhausted => CheckError::RateLimited { status: code },
        s if s.is_server_error() => CheckError::Server { status: code },
        _ => CheckError::UnexpectedStatus { status: code },
    }
}
