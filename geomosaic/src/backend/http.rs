//! Blocking HTTP implementation of [`ComputeBackend`].

use std::time::Duration;

use reqwest::blocking::{Client, Response};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tracing::debug;

use super::operations::{parse_operation_response, OperationResponse};
use super::types::{AssetInfo, AssetQuery, ErrorBody, ExportResponse, HealthResponse};
use super::{BackendError, ComputeBackend, DEFAULT_BACKEND_URL, DEFAULT_TIMEOUT_SECS};
use crate::export::ExportRequest;

/// Compute backend reached over HTTP with reqwest.
#[derive(Debug, Clone)]
pub struct ReqwestBackend {
    client: Client,
    base_url: String,
    timeout: Option<Duration>,
}

impl ReqwestBackend {
    /// Creates a client for `base_url` with the default timeout.
    pub fn new(base_url: impl Into<String>) -> Result<Self, BackendError> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT_SECS)
    }

    /// Creates a client with a custom timeout. `0` keeps reqwest's default.
    pub fn with_timeout(base_url: impl Into<String>, timeout_secs: u64) -> Result<Self, BackendError> {
        let timeout = (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs));

        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(|e| {
            BackendError::Transport(format!("failed to create HTTP client: {}", e))
        })?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn send(&self, request: reqwest::blocking::RequestBuilder) -> Result<Response, BackendError> {
        request.send().map_err(|e| {
            if e.is_timeout() {
                BackendError::Transport(format!(
                    "timed out after {}s",
                    self.timeout.map(|t| t.as_secs()).unwrap_or_default()
                ))
            } else {
                BackendError::Transport(e.to_string())
            }
        })
    }

    /// Turns a non-success response into a classified error.
    fn check(response: Response) -> Result<Response, BackendError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().unwrap_or_default();
        let detail = serde_json::from_str::<ErrorBody>(&text)
            .map(|body| body.detail)
            .unwrap_or_else(|_| {
                if text.trim().is_empty() {
                    status.to_string()
                } else {
                    text.trim().to_string()
                }
            });

        Err(BackendError::classify(status.as_u16(), detail))
    }

    fn json<T: DeserializeOwned>(response: Response) -> Result<T, BackendError> {
        response
            .json::<T>()
            .map_err(|e| BackendError::InvalidResponse(e.to_string()))
    }
}

impl Default for ReqwestBackend {
    fn default() -> Self {
        // Client::new() only panics if the TLS backend cannot initialise.
        Self {
            client: Client::new(),
            base_url: DEFAULT_BACKEND_URL.to_string(),
            timeout: None,
        }
    }
}

impl ComputeBackend for ReqwestBackend {
    fn health(&self) -> Result<(), BackendError> {
        let response = Self::check(self.send(self.client.get(self.url("health")))?)?;
        let body: HealthResponse = Self::json(response)?;
        if body.ok {
            Ok(())
        } else {
            Err(BackendError::InvalidResponse(
                "health endpoint reported ok=false".to_string(),
            ))
        }
    }

    fn first_asset(&self, query: &AssetQuery) -> Result<Option<AssetInfo>, BackendError> {
        debug!(product = %query.product, "Querying first asset");
        let response = self.send(
            self.client
                .get(self.url("assets/first"))
                .query(&query.to_query()),
        )?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        Self::json(Self::check(response)?).map(Some)
    }

    fn export(&self, request: &ExportRequest) -> Result<String, BackendError> {
        let response = Self::check(self.send(self.client.post(self.url("export")).json(request))?)?;
        let body: ExportResponse = Self::json(response)?;
        Ok(body.url)
    }

    fn run_operation(
        &self,
        operation: &str,
        params: &[(String, String)],
    ) -> Result<OperationResponse, BackendError> {
        debug!(operation, "Running remote operation");
        let response = Self::check(
            self.send(
                self.client
                    .get(self.url(&format!("tif/{}", operation)))
                    .query(params),
            )?,
        )?;
        let body: serde_json::Value = Self::json(response)?;
        parse_operation_response(&body)
    }
}
