//! Merging downloaded tiles into one raster.
//!
//! A single tile is copied to the merged directory. Several tiles are
//! described by a [`VirtualMosaic`] (written next to the output as a GDAL
//! VRT document), materialized into a `.tif.partial` file, and renamed into
//! place only once fully written. The VRT is removed afterwards.
//!
//! Sample types differ between the two paths. A single-tile output is the
//! tile's own bytes, so its sample type is preserved exactly. A multi-tile
//! output is always Float32. Integer samples up to 2^24 (every 8- and
//! 16-bit band) convert exactly; larger UInt32/Int32 values and Float64
//! samples are rounded to the nearest Float32.

mod merger;
mod vrt;

pub use merger::{MergedRaster, MosaicMerger};
pub use vrt::{MosaicSource, VirtualMosaic};

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::geotiff::GeoTiffError;

/// Errors produced while merging tiles.
#[derive(Debug, Error)]
pub enum MergeError {
    #[error("no tiles to merge")]
    NoTiles,

    #[error("tile {path} cannot join the mosaic: {reason}")]
    Incompatible { path: PathBuf, reason: String },

    #[error("GeoTIFF error on {path}: {source}")]
    GeoTiff {
        path: PathBuf,
        #[source]
        source: GeoTiffError,
    },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
