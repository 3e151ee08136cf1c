//! Top-level error type for a pipeline run.

use thiserror::Error;

use crate::backend::BackendError;
use crate::calibration::CalibrationError;
use crate::config::ConfigError;
use crate::crs::CrsError;
use crate::download::DownloadError;
use crate::fetch::FetchError;
use crate::grid::GridError;
use crate::mosaic::MergeError;
use crate::projection::ProjectionError;
use crate::region::RegionError;
use crate::request::RequestError;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Any failure of a pipeline run. Nothing is retried; the caller decides
/// whether to rerun the whole batch.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Region(#[from] RegionError),

    #[error(transparent)]
    Request(#[from] RequestError),

    #[error(transparent)]
    Crs(#[from] CrsError),

    #[error(transparent)]
    Projection(#[from] ProjectionError),

    #[error(transparent)]
    Calibration(#[from] CalibrationError),

    #[error(transparent)]
    Grid(#[from] GridError),

    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("export failed at {0}")]
    Fetch(#[from] FetchError),

    #[error("download failed: {0}")]
    Download(#[from] DownloadError),

    #[error("merge failed: {0}")]
    Merge(#[from] MergeError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Broad failure classes, used for logging and exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    Projection,
    TooManyTiles,
    Backend,
    Download,
    Merge,
    Configuration,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Validation => "validation",
            ErrorCategory::Projection => "projection",
            ErrorCategory::TooManyTiles => "too_many_tiles",
            ErrorCategory::Backend => "backend",
            ErrorCategory::Download => "download",
            ErrorCategory::Merge => "merge",
            ErrorCategory::Configuration => "configuration",
        }
    }
}

impl PipelineError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            PipelineError::Region(_)
            | PipelineError::Request(_)
            | PipelineError::Crs(_)
            | PipelineError::Calibration(_) => ErrorCategory::Validation,
            PipelineError::Grid(GridError::TooManyTiles { .. }) => ErrorCategory::TooManyTiles,
            PipelineError::Grid(_) => ErrorCategory::Validation,
            PipelineError::Projection(ProjectionError::Backend(_)) => ErrorCategory::Backend,
            PipelineError::Projection(_) => ErrorCategory::Projection,
            PipelineError::Backend(_) | PipelineError::Fetch(_) => ErrorCategory::Backend,
            PipelineError::Download(_) => ErrorCategory::Download,
            PipelineError::Merge(_) => ErrorCategory::Merge,
            PipelineError::Config(_) => ErrorCategory::Configuration,
        }
    }
}
