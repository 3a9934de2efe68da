//! Endpoint probing.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::redirect::Policy;

use crate::error::SyncError;

/// Asks one endpoint whether it is reachable.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Prober: Send + Sync {
    /// Send a probe and return the HTTP status the endpoint answered with.
    ///
    /// Transport failures (DNS, refused connection, TLS, timeout) are errors.
    async fn probe(&self, endpoint: &str, timeout: Duration) -> Result<u16, SyncError>;
}

/// [`Prober`] that issues `HEAD` requests with reqwest.
///
/// Redirects are not followed; a 3xx answer already proves the network path.
#[derive(Debug, Clone)]
pub struct HttpProber {
    client: reqwest::Client,
}

impl HttpProber {
    /// Build the underlying HTTP client.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialized.
    pub fn new() -> Result<Self, SyncError> {
        let client = reqwest::Client::builder()
            .redirect(Policy::none())
            .user_agent(concat!("offsync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SyncError::Network(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Prober for HttpProber {
    async fn probe(&self, endpoint: &str, timeout: Duration) -> Result<u16, SyncError> {
        let response = self
            .client
            .head(endpoint)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| SyncError::Network(format!("{endpoint}: {e}")))?;

        Ok(response.status().as_u16())
    }
}
