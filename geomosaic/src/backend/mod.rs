//! Remote compute backend.
//!
//! The backend owns the imagery catalogue and performs the actual raster
//! computation. This crate talks to it through the [`ComputeBackend`] trait so
//! the pipeline can be driven by a mock in tests.
//!
//! # Endpoints
//!
//! | Call                       | HTTP                         |
//! |----------------------------|------------------------------|
//! | [`ComputeBackend::health`] | `GET  /health`               |
//! | [`ComputeBackend::first_asset`] | `GET /assets/first`     |
//! | [`ComputeBackend::export`] | `POST /export`               |
//! | [`ComputeBackend::run_operation`] | `GET /tif/{operation}` |

mod http;
pub mod operations;
mod types;

pub use http::ReqwestBackend;
pub use operations::{OperationResponse, RemoteTile, RemoteTiling};
pub use types::{AssetInfo, AssetQuery, BandInfo};

use std::fmt;

use crate::export::ExportRequest;

/// Default backend address.
pub const DEFAULT_BACKEND_URL: &str = "http://gee:8000";

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 180;

/// Errors reported by the compute backend, classified for diagnosis.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendError {
    /// Credentials missing or rejected.
    Authorization(String),

    /// Backend quota or rate limit exhausted.
    Quota(String),

    /// The request geometry was rejected as invalid or empty.
    InvalidGeometry(String),

    /// Any other non-success status.
    Http { status: u16, detail: String },

    /// The request never got a response.
    Transport(String),

    /// The response could not be understood.
    InvalidResponse(String),
}

impl BackendError {
    /// Classifies a failed response from its status code and detail text.
    pub fn classify(status: u16, detail: impl Into<String>) -> Self {
        let detail = detail.into();
        let lower = detail.to_ascii_lowercase();

        if status == 401 || status == 403 || lower.contains("not authorized") {
            BackendError::Authorization(detail)
        } else if status == 429 || lower.contains("quota") || lower.contains("rate limit") {
            BackendError::Quota(detail)
        } else if lower.contains("geometry") {
            BackendError::InvalidGeometry(detail)
        } else {
            BackendError::Http { status, detail }
        }
    }
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendError::Authorization(detail) => {
                write!(f, "backend authorization failed: {}", detail)
            }
            BackendError::Quota(detail) => write!(f, "backend quota exceeded: {}", detail),
            BackendError::InvalidGeometry(detail) => {
                write!(f, "backend rejected geometry: {}", detail)
            }
            BackendError::Http { status, detail } => {
                write!(f, "backend returned HTTP {}: {}", status, detail)
            }
            BackendError::Transport(reason) => write!(f, "backend request failed: {}", reason),
            BackendError::InvalidResponse(reason) => {
                write!(f, "invalid backend response: {}", reason)
            }
        }
    }
}

impl std::error::Error for BackendError {}

/// Operations the pipeline needs from the compute backend.
pub trait ComputeBackend: Send + Sync {
    /// Probes the backend; `Ok(())` when it reports healthy.
    fn health(&self) -> Result<(), BackendError>;

    /// Most recent asset of the product matching the query, if any.
    fn first_asset(&self, query: &AssetQuery) -> Result<Option<AssetInfo>, BackendError>;

    /// Submits one export request and returns the download URL.
    fn export(&self, request: &ExportRequest) -> Result<String, BackendError>;

    /// Runs a named operation server-side with already-normalized parameters.
    fn run_operation(
        &self,
        operation: &str,
        params: &[(String, String)],
    ) -> Result<OperationResponse, BackendError>;
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Mock backend for testing.
    ///
    /// Export responses are popped in order; once exhausted every export
    /// returns `default_url` with the tile index appended.
    pub struct MockBackend {
        pub healthy: bool,
        pub asset: Option<AssetInfo>,
        pub exports: Mutex<VecDeque<Result<String, BackendError>>>,
        pub submitted: Mutex<Vec<ExportRequest>>,
        pub default_url: String,
        pub operation: Option<OperationResponse>,
    }

    impl MockBackend {
        pub fn new(asset: Option<AssetInfo>) -> Self {
            Self {
                healthy: true,
                asset,
                exports: Mutex::new(VecDeque::new()),
                submitted: Mutex::new(Vec::new()),
                default_url: "http://mock/tile".to_string(),
                operation: None,
            }
        }

        pub fn push_export(&self, result: Result<String, BackendError>) {
            self.exports.lock().unwrap().push_back(result);
        }

        pub fn submitted(&self) -> Vec<ExportRequest> {
            self.submitted.lock().unwrap().clone()
        }
    }

    impl ComputeBackend for MockBackend {
        fn health(&self) -> Result<(), BackendError> {
            if self.healthy {
                Ok(())
            } else {
                Err(BackendError::Transport("connection refused".to_string()))
            }
        }

        fn first_asset(&self, _query: &AssetQuery) -> Result<Option<AssetInfo>, BackendError> {
            Ok(self.asset.clone())
        }

        fn export(&self, request: &ExportRequest) -> Result<String, BackendError> {
            let index = self.submitted.lock().unwrap().len();
            self.submitted.lock().unwrap().push(request.clone());
            match self.exports.lock().unwrap().pop_front() {
                Some(result) => result,
                None => Ok(format!("{}/{}", self.default_url, index)),
            }
        }

        fn run_operation(
            &self,
            _operation: &str,
            _params: &[(String, String)],
        ) -> Result<OperationResponse, BackendError> {
            self.operation
                .clone()
                .ok_or_else(|| BackendError::InvalidResponse("no operation configured".into()))
        }
    }

    #[test]
    fn test_classify_by_status() {
        assert!(matches!(
            BackendError::classify(401, "nope"),
            BackendError::Authorization(_)
        ));
        assert!(matches!(
            BackendError::classify(403, "forbidden"),
            BackendError::Authorization(_)
        ));
        assert!(matches!(
            BackendError::classify(429, "slow down"),
            BackendError::Quota(_)
        ));
    }

    #[test]
    fn test_classify_by_detail() {
        assert!(matches!(
            BackendError::classify(400, "User memory limit / Quota exceeded"),
            BackendError::Quota(_)
        ));
        assert!(matches!(
            BackendError::classify(400, "Invalid GeoJSON geometry"),
            BackendError::InvalidGeometry(_)
        ));
        assert!(matches!(
            BackendError::classify(500, "Image.clip: Geometry is empty"),
            BackendError::InvalidGeometry(_)
        ));
        assert!(matches!(
            BackendError::classify(502, "empty response body"),
            BackendError::Http { status: 502, .. }
        ));
        assert_eq!(
            BackendError::classify(500, "boom"),
            BackendError::Http {
                status: 500,
                detail: "boom".to_string()
            }
        );
    }

    #[test]
    fn test_display_keeps_detail_verbatim() {
        let err = BackendError::classify(429, "Too many concurrent aggregations.");
        assert_eq!(
            err.to_string(),
            "backend quota exceeded: Too many concurrent aggregations."
        );
    }

    #[test]
    fn test_mock_backend_health() {
        let mut mock = MockBackend::new(None);
        assert!(mock.health().is_ok());
        mock.healthy = false;
        assert!(mock.health().is_err());
    }
}
