//! Payload-size policy for export requests.

use serde::Serialize;

use crate::crs::Bounds;
use crate::region::Region;

/// Default internal ceiling (45 MiB), with headroom under the backend limit.
pub const DEFAULT_PAYLOAD_CEILING_BYTES: u64 = 45 * 1024 * 1024;

/// Hard limit enforced by the backend (48 MiB).
pub const BACKEND_HARD_LIMIT_BYTES: u64 = 48 * 1024 * 1024;

/// Every exported sample is a 32-bit float.
pub const BYTES_PER_SAMPLE: u64 = 4;

/// Meters per degree used for payload estimates of geographic extents.
const ESTIMATE_METERS_PER_DEGREE: f64 = 111_320.0;

/// How the backend is asked to size an export.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ExportMode {
    /// Pixel size in CRS units; output size follows from the extent.
    Scale { scale: f64 },
    /// Fixed pixel dimensions; pixel size follows from the extent.
    Dimensions { width: u32, height: u32 },
}

impl ExportMode {
    pub fn is_scale(&self) -> bool {
        matches!(self, ExportMode::Scale { .. })
    }
}

/// Estimated output size of one export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PayloadEstimate {
    pub width: u64,
    pub height: u64,
    pub bands: u64,
}

impl PayloadEstimate {
    pub fn bytes(&self) -> u64 {
        self.width
            .saturating_mul(self.height)
            .saturating_mul(self.bands)
            .saturating_mul(BYTES_PER_SAMPLE)
    }
}

/// Chooses between scale and dimensions mode against a byte ceiling.
///
/// Deterministic: the same inputs always produce the same mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayloadPolicy {
    ceiling_bytes: u64,
}

impl Default for PayloadPolicy {
    fn default() -> Self {
        Self {
            ceiling_bytes: DEFAULT_PAYLOAD_CEILING_BYTES,
        }
    }
}

impl PayloadPolicy {
    /// Creates a policy, capping the ceiling at the backend's hard limit.
    pub fn new(ceiling_bytes: u64) -> Self {
        Self {
            ceiling_bytes: ceiling_bytes.clamp(BYTES_PER_SAMPLE, BACKEND_HARD_LIMIT_BYTES),
        }
    }

    pub fn ceiling_bytes(&self) -> u64 {
        self.ceiling_bytes
    }

    /// Largest pixel count whose payload fits the ceiling.
    pub fn max_pixels(&self, bands: usize) -> u64 {
        self.ceiling_bytes / (bands.max(1) as u64 * BYTES_PER_SAMPLE)
    }

    /// Largest square tile edge whose payload fits the ceiling.
    pub fn max_tile_edge(&self, bands: usize) -> u32 {
        let mut edge = (self.max_pixels(bands) as f64).sqrt().floor() as u64;
        while edge > 1 && edge * edge > self.max_pixels(bands) {
            edge -= 1;
        }
        edge.clamp(1, u32::MAX as u64) as u32
    }

    /// Estimate for a rectangle already in target CRS units.
    pub fn estimate_bounds(&self, bounds: &Bounds, scale: f64, bands: usize) -> PayloadEstimate {
        PayloadEstimate {
            width: pixels(bounds.width(), scale),
            height: pixels(bounds.height(), scale),
            bands: bands.max(1) as u64,
        }
    }

    /// Estimate for a WGS84 region exported at `scale`.
    ///
    /// `scale` is in degrees when `geographic`, otherwise in meters; meter
    /// widths are corrected by `cos(latitude)` at the region's center.
    pub fn estimate_region(
        &self,
        region: &Region,
        scale: f64,
        geographic: bool,
        bands: usize,
    ) -> PayloadEstimate {
        let (width, height) = if geographic {
            (region.width_deg(), region.height_deg())
        } else {
            let (_, lat) = region.center();
            (
                region.width_deg() * ESTIMATE_METERS_PER_DEGREE * lat.to_radians().cos(),
                region.height_deg() * ESTIMATE_METERS_PER_DEGREE,
            )
        };

        PayloadEstimate {
            width: pixels(width, scale),
            height: pixels(height, scale),
            bands: bands.max(1) as u64,
        }
    }

    /// Scale mode if the estimate fits the ceiling, otherwise dimensions mode
    /// shrunk isotropically so `width * height * bands * 4 <= ceiling`.
    pub fn decide(&self, estimate: &PayloadEstimate, scale: f64) -> ExportMode {
        if estimate.bytes() <= self.ceiling_bytes {
            return ExportMode::Scale { scale };
        }

        let max_pixels = self.max_pixels(estimate.bands as usize) as f64;
        let area = estimate.width as f64 * estimate.height as f64;
        let factor = (area / max_pixels).sqrt();

        let mut width = ((estimate.width as f64 / factor).floor() as u64).max(1);
        let mut height = ((estimate.height as f64 / factor).floor() as u64).max(1);

        // Floating-point rounding can leave the product one row over.
        while (PayloadEstimate {
            width,
            height,
            bands: estimate.bands,
        })
        .bytes()
            > self.ceiling_bytes
            && (width > 1 || height > 1)
        {
            if width >= height {
                width -= 1;
            } else {
                height -= 1;
            }
        }

        ExportMode::Dimensions {
            width: width.min(u32::MAX as u64) as u32,
            height: height.min(u32::MAX as u64) as u32,
        }
    }
}

fn pixels(extent: f64, scale: f64) -> u64 {
    ((extent / scale).ceil().max(1.0)) as u64
}
