//! Tile download into a per-run staging directory.
//!
//! ```text
//! TileDownloader
//!         │
//!         ├── DownloadClient (trait)
//!         │       └── ReqwestDownloadClient
//!         │
//!         ├── StagingArea ({base}/{tiles}/{output_id}, cleared per run)
//!         │
//!         └── TileRepair hooks (run after each download, before merge)
//!                 └── SinusoidalSphereRepair
//! ```
//!
//! Tiles are downloaded one after another. The first failure aborts the
//! batch and leaves any already-written tiles on disk; the next run for
//! the same output id clears them.

mod checksum;
mod http;
pub mod repair;
mod staging;

pub use checksum::calculate_file_checksum;
pub use http::{
    DownloadClient, DownloadedTile, ProgressCallback, ReqwestDownloadClient, TileDownloader,
};
pub use repair::{apply_repairs, SinusoidalSphereRepair, TileRepair};
pub use staging::{validate_output_id, OutputLayout, RunTag, StagingArea};

use std::io;
use std::path::PathBuf;

/// Result type for download operations.
pub type DownloadResult<T> = Result<T, DownloadError>;

/// Errors that can occur while staging or downloading tiles.
#[derive(Debug)]
pub enum DownloadError {
    /// Network error or non-success status.
    DownloadFailed { url: String, reason: String },

    /// The request exceeded the client timeout.
    Timeout { url: String, timeout_secs: u64 },

    /// Failed to write a tile or clear the staging directory.
    WriteFailed { path: PathBuf, source: io::Error },

    /// Failed to read back a downloaded tile.
    ReadFailed { path: PathBuf, source: io::Error },

    /// Failed to create a staging directory.
    CreateDirFailed { path: PathBuf, source: io::Error },

    /// The server returned zero bytes.
    EmptyFile { url: String, path: PathBuf },

    /// Output ids become directory and file names.
    InvalidOutputId(String),

    /// The downloaded file is not a readable GeoTIFF.
    InvalidRaster { path: PathBuf, reason: String },

    /// A repair hook could not rewrite the tile.
    RepairFailed { path: PathBuf, reason: String },
}

impl std::fmt::Display for DownloadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DownloadFailed { url, reason } => {
                write!(f, "failed to download {}: {}", url, reason)
            }
            Self::Timeout { url, timeout_secs } => {
                write!(f, "download of {} timed out after {}s", url, timeout_secs)
            }
            Self::WriteFailed { path, source } => {
                write!(f, "failed to write {}: {}", path.display(), source)
            }
            Self::ReadFailed { path, source } => {
                write!(f, "failed to read {}: {}", path.display(), source)
            }
            Self::CreateDirFailed { path, source } => {
                write!(
                    f,
                    "failed to create directory {}: {}",
                    path.display(),
                    source
                )
            }
            Self::EmptyFile { url, path } => {
                write!(f, "empty file downloaded from {} to {}", url, path.display())
            }
            Self::InvalidOutputId(id) => write!(f, "invalid output id: {:?}", id),
            Self::InvalidRaster { path, reason } => {
                write!(f, "{} is not a readable GeoTIFF: {}", path.display(), reason)
            }
            Self::RepairFailed { path, reason } => {
                write!(f, "failed to repair {}: {}", path.display(), reason)
            }
        }
    }
}

impl std::error::Error for DownloadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::WriteFailed { source, .. } => Some(source),
            Self::ReadFailed { source, .. } => Some(source),
            Self::CreateDirFailed { source, .. } => Some(source),
            _ => None,
        }
    }
}
