//! Minimal GeoTIFF reading and writing on top of the `tiff` crate.
//!
//! Only what the mosaic pipeline needs: strip or tile images with any
//! integer or float sample type are decoded to `f32`; output is always
//! written as uncompressed, pixel-interleaved `Float32` with
//! ModelPixelScale, ModelTiepoint and the GeoKey tags.

pub mod keys;
mod reader;
mod writer;

pub use keys::{GeoKeyDirectory, GeoKeyValue};
pub use reader::{read_geotiff, read_geotiff_from, read_header};
pub use writer::{write_geotiff, write_geotiff_to};

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::crs::{Bounds, Crs};
use crate::grid::GeoTransform;

/// Errors produced while reading or writing GeoTIFFs.
#[derive(Debug, Error)]
pub enum GeoTiffError {
    #[error("I/O error on {path}: {source}")]
    Io { path: PathBuf, source: io::Error },

    #[error("TIFF error: {0}")]
    Tiff(#[from] tiff::TiffError),

    #[error("missing GeoTIFF tag {0}")]
    MissingTag(&'static str),

    #[error("invalid GeoKey directory: {0}")]
    InvalidGeoKeys(String),

    #[error("pixel buffer holds {actual} samples, expected {expected}")]
    SampleCount { expected: usize, actual: usize },

    #[error("unsupported raster: {0}")]
    Unsupported(String),
}

/// Pixel-to-world mapping of a north-up raster.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterTransform {
    pub origin_x: f64,
    pub origin_y: f64,
    pub pixel_width: f64,
    /// Positive; rows go south.
    pub pixel_height: f64,
}

impl RasterTransform {
    pub fn new(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            origin_x,
            origin_y,
            pixel_width,
            pixel_height,
        }
    }

    /// GDAL order: `[origin_x, pixel_width, 0, origin_y, 0, -pixel_height]`.
    pub fn to_gdal(&self) -> [f64; 6] {
        [
            self.origin_x,
            self.pixel_width,
            0.0,
            self.origin_y,
            0.0,
            -self.pixel_height,
        ]
    }
}

impl From<GeoTransform> for RasterTransform {
    fn from(t: GeoTransform) -> Self {
        Self::new(t.origin_x, t.origin_y, t.scale, t.scale)
    }
}

/// Everything about a GeoTIFF except its pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterHeader {
    pub width: u32,
    pub height: u32,
    pub bands: usize,
    pub transform: RasterTransform,
    pub keys: GeoKeyDirectory,
    pub nodata: Option<f64>,
}

impl RasterHeader {
    /// Rectangle covered, in CRS units.
    pub fn bounds(&self) -> Bounds {
        let t = &self.transform;
        Bounds::new(
            t.origin_x,
            t.origin_y - self.height as f64 * t.pixel_height,
            t.origin_x + self.width as f64 * t.pixel_width,
            t.origin_y,
        )
    }

    pub fn crs(&self) -> Option<Crs> {
        self.keys.crs()
    }
}

/// A decoded GeoTIFF with band-interleaved `f32` samples.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoRaster {
    pub width: u32,
    pub height: u32,
    pub bands: usize,
    /// `pixels[(row * width + col) * bands + band]`
    pub pixels: Vec<f32>,
    pub transform: RasterTransform,
    pub keys: GeoKeyDirectory,
    pub nodata: Option<f64>,
}

impl GeoRaster {
    /// Raster filled with `fill`.
    pub fn filled(
        width: u32,
        height: u32,
        bands: usize,
        fill: f32,
        transform: RasterTransform,
        keys: GeoKeyDirectory,
    ) -> Self {
        Self {
            width,
            height,
            bands,
            pixels: vec![fill; width as usize * height as usize * bands],
            transform,
            keys,
            nodata: None,
        }
    }

    pub fn header(&self) -> RasterHeader {
        RasterHeader {
            width: self.width,
            height: self.height,
            bands: self.bands,
            transform: self.transform,
            keys: self.keys.clone(),
            nodata: self.nodata,
        }
    }

    pub fn sample_index(&self, col: u32, row: u32, band: usize) -> usize {
        (row as usize * self.width as usize + col as usize) * self.bands + band
    }

    pub fn get(&self, col: u32, row: u32, band: usize) -> f32 {
        self.pixels[self.sample_index(col, row, band)]
    }

    pub fn set(&mut self, col: u32, row: u32, band: usize, value: f32) {
        let i = self.sample_index(col, row, band);
        self.pixels[i] = value;
    }

    pub(crate) fn check_len(&self) -> Result<(), GeoTiffError> {
        let expected = self.width as usize * self.height as usize * self.bands;
        if self.pixels.len() != expected {
            return Err(GeoTiffError::SampleCount {
                expected,
                actual: self.pixels.len(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_bounds() {
        let raster = GeoRaster::filled(
            4,
            2,
            1,
            0.0,
            RasterTransform::new(100.0, 50.0, 10.0, 5.0),
            GeoKeyDirectory::new(),
        );
        assert_eq!(raster.header().bounds(), Bounds::new(100.0, 40.0, 140.0, 50.0));
    }

    #[test]
    fn test_interleaved_indexing() {
        let mut raster = GeoRaster::filled(
            3,
            2,
            2,
            0.0,
            RasterTransform::new(0.0, 0.0, 1.0, 1.0),
            GeoKeyDirectory::new(),
        );
        raster.set(2, 1, 1, 7.0);
        assert_eq!(raster.sample_index(2, 1, 1), 11);
        assert_eq!(raster.get(2, 1, 1), 7.0);
        assert!(raster.check_len().is_ok());

        raster.pixels.pop();
        assert!(matches!(
            raster.check_len(),
            Err(GeoTiffError::SampleCount { .. })
        ));
    }

    #[test]
    fn test_transform_from_grid() {
        let t = RasterTransform::from(GeoTransform::new(10.0, 1000.0, 2000.0));
        assert_eq!(t.to_gdal(), [1000.0, 10.0, 0.0, 2000.0, 0.0, -10.0]);
    }
}
