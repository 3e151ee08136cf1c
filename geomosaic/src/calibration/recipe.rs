//! Image recipes: the calibrated, masked and reduced image the backend computes.

use serde::Serialize;

use super::cloud_mask::CloudMask;
use super::family::ProductFamily;
use crate::region::Region;
use crate::request::{DateWindow, OutputKind, Reducer};

/// Linear correction `band' = band * scale + offset`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BandCalibration {
    pub band: String,
    pub scale: f64,
    pub offset: f64,
}

impl BandCalibration {
    pub fn identity(band: impl Into<String>) -> Self {
        Self {
            band: band.into(),
            scale: 1.0,
            offset: 0.0,
        }
    }

    pub fn apply(&self, value: f64) -> f64 {
        value * self.scale + self.offset
    }

    pub fn is_identity(&self) -> bool {
        self.scale == 1.0 && self.offset == 0.0
    }
}

/// `(a - b) / (a + b)`, NaN where the denominator is zero.
pub fn normalized_difference(a: f64, b: f64) -> f64 {
    let sum = a + b;
    if sum == 0.0 {
        f64::NAN
    } else {
        (a - b) / sum
    }
}

/// Description of the image one request exports, sent to the backend as-is.
///
/// The region is a clip applied once to the full image before it is
/// reprojected onto the tile grid.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageRecipe {
    pub product: String,
    pub family: ProductFamily,
    pub window: DateWindow,
    pub region: Region,
    /// Source bands read from each image, in output order for `Bands`.
    pub bands: Vec<String>,
    pub cloud_mask: Option<CloudMask>,
    /// Empty when calibration was not requested.
    pub calibration: Vec<BandCalibration>,
    pub reducer: Reducer,
    pub output: OutputKind,
}

impl ImageRecipe {
    /// Bands in the exported raster.
    pub fn output_band_count(&self) -> usize {
        self.output.band_count(self.bands.len())
    }

    /// Calibration for `band`, identity if none was resolved.
    pub fn calibration_for(&self, band: &str) -> BandCalibration {
        self.calibration
            .iter()
            .find(|c| c.band == band)
            .cloned()
            .unwrap_or_else(|| BandCalibration::identity(band))
    }

    /// Evaluates the recipe's output for one pixel of one source image.
    ///
    /// `values` are raw digital numbers in the order of [`ImageRecipe::bands`].
    /// Used to check recipes locally; the backend performs the real evaluation.
    pub fn evaluate_pixel(&self, values: &[f64]) -> Vec<f64> {
        let calibrated: Vec<f64> = self
            .bands
            .iter()
            .zip(values)
            .map(|(band, v)| self.calibration_for(band).apply(*v))
            .collect();

        match &self.output {
            OutputKind::Bands => calibrated,
            OutputKind::NormalizedDifference { band1, band2 } => {
                let pick = |name: &str| {
                    self.bands
                        .iter()
                        .position(|b| b == name)
                        .and_then(|i| calibrated.get(i).copied())
                        .unwrap_or(f64::NAN)
                };
                vec![normalized_difference(pick(band1), pick(band2))]
            }
        }
    }
}
