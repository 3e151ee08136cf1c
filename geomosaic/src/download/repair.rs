//! Post-download spatial-reference repairs.
//!
//! Some products come back from the backend with a projection definition
//! that GDAL-style readers misinterpret. A repair is keyed on a signature in
//! the GeoKey directory and rewrites only the metadata; pixel values are
//! written back unchanged (as Float32).

use std::fs;
use std::path::Path;

use tracing::warn;

use super::{DownloadError, DownloadResult};
use crate::crs::MODIS_SPHERE_RADIUS;
use crate::geotiff::keys::{CT_SINUSOIDAL, PROJ_COORD_TRANS};
use crate::geotiff::{read_geotiff, read_header, write_geotiff, GeoKeyDirectory, GeoRaster};

/// A narrow metadata fix applied to a downloaded tile.
pub trait TileRepair: Send + Sync {
    fn name(&self) -> &'static str;

    /// True if the tile carries the signature this repair fixes.
    fn matches(&self, keys: &GeoKeyDirectory) -> bool;

    fn repair(&self, raster: &mut GeoRaster);
}

/// Sinusoidal tiles whose geographic model is not the MODIS sphere.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SinusoidalSphereRepair {
    radius: f64,
}

impl Default for SinusoidalSphereRepair {
    fn default() -> Self {
        Self {
            radius: MODIS_SPHERE_RADIUS,
        }
    }
}

impl SinusoidalSphereRepair {
    pub fn radius(&self) -> f64 {
        self.radius
    }
}

impl TileRepair for SinusoidalSphereRepair {
    fn name(&self) -> &'static str {
        "sinusoidal-sphere"
    }

    fn matches(&self, keys: &GeoKeyDirectory) -> bool {
        keys.get_short(PROJ_COORD_TRANS) == Some(CT_SINUSOIDAL) && !keys.is_sphere(self.radius)
    }

    fn repair(&self, raster: &mut GeoRaster) {
        raster.keys.set_sphere(self.radius);
    }
}

/// Runs every matching repair on the tile at `path`, rewriting it in place
/// through a temporary file. Returns the names of the repairs applied.
pub fn apply_repairs(
    path: &Path,
    repairs: &[Box<dyn TileRepair>],
) -> DownloadResult<Vec<&'static str>> {
    if repairs.is_empty() {
        return Ok(Vec::new());
    }

    let invalid = |e: crate::geotiff::GeoTiffError| DownloadError::InvalidRaster {
        path: path.to_path_buf(),
        reason: e.to_string(),
    };

    let header = read_header(path).map_err(invalid)?;
    let matching: Vec<&dyn TileRepair> = repairs
        .iter()
        .map(|r| r.as_ref())
        .filter(|r| r.matches(&header.keys))
        .collect();

    if matching.is_empty() {
        return Ok(Vec::new());
    }

    let mut raster = read_geotiff(path).map_err(invalid)?;
    for repair in &matching {
        repair.repair(&mut raster);
        warn!(path = %path.display(), repair = repair.name(), "Applied SRS repair");
    }

    let tmp = path.with_extension("tif.repair");
    write_geotiff(&raster, &tmp).map_err(|e| {
        fs::remove_file(&tmp).ok();
        DownloadError::RepairFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        }
    })?;
    fs::rename(&tmp, path).map_err(|e| DownloadError::WriteFailed {
        path: path.to_path_buf(),
        source: e,
    })?;

    Ok(matching.iter().map(|r| r.name()).collect())
}
