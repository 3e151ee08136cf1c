//! Native projection inference from a product's first matching asset.

use thiserror::Error;
use tracing::debug;

use crate::backend::{AssetInfo, AssetQuery, BackendError, ComputeBackend};
use crate::crs::Crs;
use crate::region::Region;
use crate::request::DateWindow;

/// Why the native projection could not be determined.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ProjectionError {
    #[error("projection inference failed for '{product}': {reason}")]
    Inference { product: String, reason: String },

    #[error("projection inference failed: {0}")]
    Backend(#[from] BackendError),
}

/// CRS and nominal scale of a product, as read from one asset.
#[derive(Debug, Clone, PartialEq)]
pub struct NativeProjection {
    pub crs: Crs,
    /// Meters per pixel.
    pub nominal_scale: f64,
    pub asset_id: String,
    pub band: String,
}

/// Resolves native projections through a [`ComputeBackend`].
pub struct NativeProjectionResolver<'a> {
    backend: &'a dyn ComputeBackend,
}

impl<'a> NativeProjectionResolver<'a> {
    pub fn new(backend: &'a dyn ComputeBackend) -> Self {
        Self { backend }
    }

    /// Fetches the first asset matching the product, region and window.
    pub fn first_asset(
        &self,
        product: &str,
        region: &Region,
        band: Option<&str>,
        window: Option<DateWindow>,
    ) -> Result<AssetInfo, ProjectionError> {
        let mut query = AssetQuery::new(product, *region).with_band(band);
        if let Some(window) = window {
            query = query.with_window(window);
        }

        self.backend
            .first_asset(&query)?
            .ok_or_else(|| ProjectionError::Inference {
                product: product.to_string(),
                reason: "no asset matches the region and date window".to_string(),
            })
    }

    /// Reads the projection of `band` (or the asset's first band) from the
    /// first matching asset. Never guesses from the product name.
    pub fn resolve(
        &self,
        product: &str,
        region: &Region,
        band: Option<&str>,
        window: Option<DateWindow>,
    ) -> Result<(NativeProjection, AssetInfo), ProjectionError> {
        let asset = self.first_asset(product, region, band, window)?;
        let projection = projection_of(product, &asset, band)?;
        Ok((projection, asset))
    }
}

/// Projection of `band` in `asset`, falling back to the first band.
pub fn projection_of(
    product: &str,
    asset: &AssetInfo,
    band: Option<&str>,
) -> Result<NativeProjection, ProjectionError> {
    let fail = |reason: String| ProjectionError::Inference {
        product: product.to_string(),
        reason,
    };

    let info = band
        .and_then(|b| asset.band(b))
        .or_else(|| asset.bands.first())
        .ok_or_else(|| fail(format!("asset '{}' has no bands", asset.id)))?;

    let crs = info.crs.parse::<Crs>().map_err(|e| fail(e.to_string()))?;

    if !info.nominal_scale.is_finite() || info.nominal_scale <= 0.0 {
        return Err(fail(format!(
            "band '{}' reports nominal scale {}",
            info.name, info.nominal_scale
        )));
    }

    debug!(
        product,
        asset = %asset.id,
        band = %info.name,
        crs = %crs,
        scale = info.nominal_scale,
        "Resolved native projection"
    );

    Ok(NativeProjection {
        crs,
        nominal_scale: info.nominal_scale,
        asset_id: asset.id.clone(),
        band: info.name.clone(),
    })
}
