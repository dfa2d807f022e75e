//! Prometheus configuration reloads.

use std::future::Future;
use std::time::Duration;

use tracing::debug;
use url::Url;

use crate::error::ReloadError;

/// Timeout of a single reload request.
pub const RELOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// Something that can tell Prometheus to reload its rule files.
pub trait Reloader: Send + Sync {
    /// Triggers one reload.
    fn reload(&self) -> impl Future<Output = Result<(), ReloadError>> + Send;
}

/// Calls `POST <base>/-/reload` on a Prometheus server.
///
/// Prometheus must run with `--web.enable-lifecycle`.
#[derive(Debug, Clone)]
pub struct PrometheusReloader {
    client: reqwest::Client,
    url: Url,
}

impl PrometheusReloader {
    /// Creates a reloader for the given reload endpoint.
    ///
    /// # Errors
    ///
    /// Returns `ReloadError::Request` if the HTTP client cannot be built.
    pub fn new(url: Url) -> Result<Self, ReloadError> {
        let client = reqwest::Client::builder().timeout(RELOAD_TIMEOUT).build()?;
        Ok(Self { client, url })
    }

    /// The reload endpoint.
    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.url
    }
}

impl Reloader for PrometheusReloader {
    async fn reload(&self) -> Result<(), ReloadError> {
        let response = self.client.post(self.url.clone()).send().await?;
        let status = response.status();
        if status.is_success() {
            debug!(url = %self.url, status = status.as_u16(), "prometheus reloaded");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(ReloadError::Status {
            status: status.as_u16(),
            body: body.trim().to_string(),
        })
    }
}
