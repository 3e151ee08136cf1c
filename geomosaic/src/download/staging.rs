//! Output directory layout and per-run staging directories.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use tracing::info;

use super::{DownloadError, DownloadResult};

pub const DEFAULT_TILES_SUBDIR: &str = "tiles";
pub const DEFAULT_MERGED_SUBDIR: &str = "merged";

/// Where tiles and merged rasters live under the base output directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    base_dir: PathBuf,
    tiles_subdir: String,
    merged_subdir: String,
}

impl OutputLayout {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self::with_subdirs(base_dir, DEFAULT_TILES_SUBDIR, DEFAULT_MERGED_SUBDIR)
    }

    pub fn with_subdirs(
        base_dir: impl Into<PathBuf>,
        tiles_subdir: impl Into<String>,
        merged_subdir: impl Into<String>,
    ) -> Self {
        Self {
            base_dir: base_dir.into(),
            tiles_subdir: tiles_subdir.into(),
            merged_subdir: merged_subdir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// `{base}/{tiles}/{output_id}`
    pub fn tiles_dir(&self, output_id: &str) -> PathBuf {
        self.base_dir.join(&self.tiles_subdir).join(output_id)
    }

    /// `{base}/{merged}`
    pub fn merged_dir(&self) -> PathBuf {
        self.base_dir.join(&self.merged_subdir)
    }
}

/// Local timestamp that tags every file produced by one run.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RunTag(String);

impl RunTag {
    pub fn now() -> Self {
        Self(Local::now().format("%Y%m%d_%H%M%S").to_string())
    }

    /// Fixed tag, mostly for tests.
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Rejects ids that are empty, path-like, or contain characters outside
/// `[A-Za-z0-9._-]`.
pub fn validate_output_id(output_id: &str) -> DownloadResult<()> {
    let valid = !output_id.is_empty()
        && output_id != "."
        && output_id != ".."
        && output_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));

    if valid {
        Ok(())
    } else {
        Err(DownloadError::InvalidOutputId(output_id.to_string()))
    }
}

/// Tile directory for one output id, exclusively owned by the current run.
#[derive(Debug, Clone)]
pub struct StagingArea {
    dir: PathBuf,
    output_id: String,
    run: RunTag,
}

impl StagingArea {
    /// Clears and recreates the tile directory for `output_id`.
    ///
    /// Concurrent runs for the same output id are not safe; callers must
    /// serialize them.
    pub fn prepare(layout: &OutputLayout, output_id: &str, run: RunTag) -> DownloadResult<Self> {
        validate_output_id(output_id)?;
        let dir = layout.tiles_dir(output_id);

        if dir.exists() {
            fs::remove_dir_all(&dir).map_err(|e| DownloadError::WriteFailed {
                path: dir.clone(),
                source: e,
            })?;
        }
        fs::create_dir_all(&dir).map_err(|e| DownloadError::CreateDirFailed {
            path: dir.clone(),
            source: e,
        })?;

        info!(output_id, run = %run, path = %dir.display(), "Staging directory ready");

        Ok(Self {
            dir,
            output_id: output_id.to_string(),
            run,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn output_id(&self) -> &str {
        &self.output_id
    }

    pub fn run(&self) -> &RunTag {
        &self.run
    }

    /// `{output_id}_{run}_tile_{index:02}.tif`
    pub fn tile_path(&self, index: usize) -> PathBuf {
        self.dir
            .join(format!("{}_{}_tile_{:02}.tif", self.output_id, self.run, index))
    }
}
