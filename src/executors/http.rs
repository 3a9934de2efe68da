//! HTTP executor for `api_call` operations.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;

use crate::error::SyncError;
use crate::features::queue::Payload;
use crate::features::sync::Executor;

/// Request described by an `api_call` payload.
///
/// ```json
/// {"method": "POST", "url": "https://api.example.com/runs",
///  "headers": {"Authorization": "Bearer ..."}, "body": {"name": "run-1"}}
/// ```
#[derive(Debug, Deserialize)]
struct ApiCallRequest {
    #[serde(default = "default_method")]
    method: String,
    url: String,
    #[serde(default)]
    headers: HashMap<String, String>,
    #[serde(default)]
    body: Option<serde_json::Value>,
}

fn default_method() -> String {
    "POST".to_string()
}

/// Sends `api_call` payloads with reqwest.
///
/// A 2xx answer is success, any other status is a reported failure, and
/// transport errors or malformed payloads are errors.
#[derive(Debug, Clone)]
pub struct HttpCallExecutor {
    client: reqwest::Client,
}

impl HttpCallExecutor {
    /// Default per-request timeout.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new() -> Result<Self, SyncError> {
        Self::with_timeout(Self::DEFAULT_TIMEOUT)
    }

    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn with_timeout(timeout: Duration) -> Result<Self, SyncError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("offsync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SyncError::Network(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Executor for HttpCallExecutor {
    async fn execute(&self, payload: &Payload) -> anyhow::Result<bool> {
        let request: ApiCallRequest =
            serde_json::from_value(serde_json::Value::Object(payload.clone()))
                .context("invalid api_call payload")?;

        let method = reqwest::Method::from_bytes(request.method.to_uppercase().as_bytes())
            .with_context(|| format!("invalid HTTP method {:?}", request.method))?;

        let mut builder = self.client.request(method.clone(), &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .with_context(|| format!("{method} {} failed", request.url))?;

        let status = response.status();
        if !status.is_success() {
            tracing::debug!(%method, url = %request.url, %status, "api call rejected");
        }
        Ok(status.is_success())
    }
}
