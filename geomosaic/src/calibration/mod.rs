//! Radiometric calibration, cloud masking and image assembly.
//!
//! Product identifiers are classified into a [`ProductFamily`] once per
//! request; the family selects a calibration table and a cloud-mask rule
//! from the [`FamilyRegistry`]. Asset-level scale/offset properties take
//! priority over the table.

mod cloud_mask;
mod family;
mod recipe;

pub use cloud_mask::{CloudMask, CloudMaskRule};
pub use family::{BandRule, FamilyRegistry, FamilyRules, ProductFamily};
pub use recipe::{normalized_difference, BandCalibration, ImageRecipe};

use thiserror::Error;
use tracing::{debug, warn};

use crate::backend::AssetInfo;
use crate::region::Region;
use crate::request::{OutputKind, ProductSpec};

/// Errors produced while assembling an image recipe.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CalibrationError {
    #[error("no bands selected for product '{0}'")]
    NoBands(String),

    #[error("band '{band}' not found in product '{product}' (available: {available})")]
    UnknownBand {
        band: String,
        product: String,
        available: String,
    },
}

/// Builds calibrated image recipes.
#[derive(Debug, Clone, Default)]
pub struct RadiometricCalibrator {
    registry: FamilyRegistry,
}

impl RadiometricCalibrator {
    pub fn new(registry: FamilyRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &FamilyRegistry {
        &self.registry
    }

    /// Scale/offset for one band: asset properties first, then the family table.
    pub fn band_calibration(
        &self,
        rules: &FamilyRules,
        band: &str,
        asset: Option<&AssetInfo>,
    ) -> BandCalibration {
        if let Some((scale, offset)) = asset.and_then(|a| property_scale_offset(a, band)) {
            return BandCalibration {
                band: band.to_string(),
                scale,
                offset,
            };
        }

        let (scale, offset) = rules.table_scale_offset(band);
        BandCalibration {
            band: band.to_string(),
            scale,
            offset,
        }
    }

    /// Assembles the recipe for a request.
    ///
    /// `asset` is the first matching asset when one was inspected; it supplies
    /// band names for `all`, scale/offset properties and quality-band presence.
    pub fn build(
        &self,
        spec: &ProductSpec,
        output: &OutputKind,
        region: &Region,
        asset: Option<&AssetInfo>,
    ) -> Result<ImageRecipe, CalibrationError> {
        let rules = self.registry.resolve(&spec.product);

        let bands = match output {
            OutputKind::Bands => spec
                .bands
                .resolve(&asset.map(AssetInfo::band_names).unwrap_or_default()),
            OutputKind::NormalizedDifference { band1, band2 } => {
                vec![band1.clone(), band2.clone()]
            }
        };

        if bands.is_empty() {
            return Err(CalibrationError::NoBands(spec.product.clone()));
        }

        if let Some(asset) = asset.filter(|a| !a.bands.is_empty()) {
            if let Some(missing) = bands.iter().find(|b| !asset.has_band(b)) {
                return Err(CalibrationError::UnknownBand {
                    band: missing.clone(),
                    product: spec.product.clone(),
                    available: asset.band_names().join(","),
                });
            }
        }

        let calibration = if spec.calibrate {
            bands
                .iter()
                .map(|b| self.band_calibration(&rules, b, asset))
                .collect()
        } else {
            Vec::new()
        };

        let cloud_mask = if spec.cloud_mask {
            let mask = rules.cloud_mask.as_ref().and_then(|rule| rule.resolve(asset));
            if mask.is_none() {
                warn!(
                    product = %spec.product,
                    family = %rules.family,
                    "Cloud mask requested but no quality band available, skipping"
                );
            }
            mask
        } else {
            None
        };

        debug!(
            product = %spec.product,
            family = %rules.family,
            bands = bands.len(),
            calibrated = spec.calibrate,
            masked = cloud_mask.is_some(),
            reducer = %spec.reducer,
            "Built image recipe"
        );

        Ok(ImageRecipe {
            product: spec.product.clone(),
            family: rules.family,
            window: spec.window,
            region: *region,
            bands,
            cloud_mask,
            calibration,
            reducer: spec.reducer,
            output: output.clone(),
        })
    }
}

/// Scale/offset recorded on the asset itself.
///
/// Recognizes `{band}_scale`/`{band}_offset` and the Landsat Level-2
/// `REFLECTANCE_MULT_BAND_n` / `TEMPERATURE_MULT_BAND_ST_Bn` families.
fn property_scale_offset(asset: &AssetInfo, band: &str) -> Option<(f64, f64)> {
    if let Some(scale) = asset.number_property(&format!("{}_scale", band)) {
        let offset = asset
            .number_property(&format!("{}_offset", band))
            .unwrap_or(0.0);
        return Some((scale, offset));
    }

    let (mult_key, add_key) = if let Some(n) = band.strip_prefix("SR_B") {
        (
            format!("REFLECTANCE_MULT_BAND_{}", n),
            format!("REFLECTANCE_ADD_BAND_{}", n),
        )
    } else if band.starts_with("ST_B") {
        (
            format!("TEMPERATURE_MULT_BAND_{}", band),
            format!("TEMPERATURE_ADD_BAND_{}", band),
        )
    } else {
        return None;
    };

    Some((
        asset.number_property(&mult_key)?,
        asset.number_property(&add_key)?,
    ))
}
