//! Final merge step.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info};

use super::{MergeError, VirtualMosaic};
use crate::download::{DownloadedTile, RunTag};
use crate::geotiff::{read_header, write_geotiff};

/// The merged output of one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergedRaster {
    pub output_id: String,
    pub path: PathBuf,
    pub run_tag: String,
    /// Staged tiles the output was built from, with size and SHA-256.
    pub tiles: Vec<DownloadedTile>,
    pub width: u32,
    pub height: u32,
    pub bands: usize,
}

/// Merges staged tiles into `{merged_dir}/{output_id}_{run}.tif`.
#[derive(Debug, Clone)]
pub struct MosaicMerger {
    merged_dir: PathBuf,
}

impl MosaicMerger {
    pub fn new(merged_dir: impl Into<PathBuf>) -> Self {
        Self {
            merged_dir: merged_dir.into(),
        }
    }

    pub fn merged_dir(&self) -> &Path {
        &self.merged_dir
    }

    pub fn output_path(&self, output_id: &str, run: &RunTag) -> PathBuf {
        self.merged_dir.join(format!("{}_{}.tif", output_id, run))
    }

    /// First of `{id}_{run}.tif`, `{id}_{run}_1.tif`, ... that does not exist
    /// yet. Run tags have one-second resolution.
    fn unused_output_path(&self, output_id: &str, run: &RunTag) -> PathBuf {
        let mut path = self.output_path(output_id, run);
        let mut n = 0u32;
        while path.exists() {
            n += 1;
            path = self
                .merged_dir
                .join(format!("{}_{}_{}.tif", output_id, run, n));
        }
        path
    }

    fn vrt_path(&self, output_id: &str, run: &RunTag) -> PathBuf {
        self.merged_dir.join(format!("{}_{}.vrt", output_id, run))
    }

    /// Merges `tiles`. Nothing is written to the final path unless the
    /// whole merge succeeds.
    pub fn merge(
        &self,
        output_id: &str,
        run: &RunTag,
        tiles: &[DownloadedTile],
    ) -> Result<MergedRaster, MergeError> {
        if tiles.is_empty() {
            return Err(MergeError::NoTiles);
        }

        fs::create_dir_all(&self.merged_dir).map_err(|e| MergeError::Io {
            path: self.merged_dir.clone(),
            source: e,
        })?;

        let output = self.unused_output_path(output_id, run);
        let partial = output.with_extension("tif.partial");

        let result = if tiles.len() == 1 {
            self.copy_single(&tiles[0], &partial)
        } else {
            self.merge_many(output_id, run, tiles, &partial)
        };

        let (width, height, bands) = match result {
            Ok(dims) => dims,
            Err(e) => {
                fs::remove_file(&partial).ok();
                return Err(e);
            }
        };

        fs::rename(&partial, &output).map_err(|e| {
            fs::remove_file(&partial).ok();
            MergeError::Io {
                path: output.clone(),
                source: e,
            }
        })?;

        info!(
            output_id,
            tiles = tiles.len(),
            width,
            height,
            path = %output.display(),
            "Merge complete"
        );

        Ok(MergedRaster {
            output_id: output_id.to_string(),
            path: output,
            run_tag: run.to_string(),
            tiles: tiles.to_vec(),
            width,
            height,
            bands,
        })
    }

    fn copy_single(
        &self,
        tile: &DownloadedTile,
        partial: &Path,
    ) -> Result<(u32, u32, usize), MergeError> {
        let header = read_header(&tile.path).map_err(|e| MergeError::GeoTiff {
            path: tile.path.clone(),
            source: e,
        })?;

        fs::copy(&tile.path, partial).map_err(|e| MergeError::Io {
            path: partial.to_path_buf(),
            source: e,
        })?;

        debug!(tile = %tile.path.display(), "Single tile copied");
        Ok((header.width, header.height, header.bands))
    }

    fn merge_many(
        &self,
        output_id: &str,
        run: &RunTag,
        tiles: &[DownloadedTile],
        partial: &Path,
    ) -> Result<(u32, u32, usize), MergeError> {
        let mut headers = Vec::with_capacity(tiles.len());
        for tile in tiles {
            let header = read_header(&tile.path).map_err(|e| MergeError::GeoTiff {
                path: tile.path.clone(),
                source: e,
            })?;
            headers.push((tile.path.clone(), header));
        }

        let mosaic = VirtualMosaic::from_headers(&headers)?;
        let vrt = self.vrt_path(output_id, run);
        mosaic.write(&vrt)?;
        debug!(path = %vrt.display(), sources = mosaic.sources().len(), "VRT written");

        let written = mosaic.materialize().and_then(|raster| {
            write_geotiff(&raster, partial).map_err(|e| MergeError::GeoTiff {
                path: partial.to_path_buf(),
                source: e,
            })
        });
        fs::remove_file(&vrt).ok();
        written?;

        Ok((mosaic.width(), mosaic.height(), mosaic.bands()))
    }
}
