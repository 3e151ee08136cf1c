//! Export request construction.
//!
//! Every tile of a batch is exported with the grid's CRS and the grid's
//! shared affine transform, so the backend never resamples one tile
//! differently from its neighbours. The [`PayloadPolicy`] decides whether a
//! request can use scale mode or must fall back to fixed pixel dimensions.

mod policy;

pub use policy::{
    ExportMode, PayloadEstimate, PayloadPolicy, BACKEND_HARD_LIMIT_BYTES, BYTES_PER_SAMPLE,
    DEFAULT_PAYLOAD_CEILING_BYTES,
};

use serde::Serialize;
use tracing::{debug, warn};

use crate::calibration::ImageRecipe;
use crate::crs::{Bounds, Crs};
use crate::grid::{Tile, TileGrid};

/// Where a tile sits in its batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TileRef {
    pub index: usize,
    pub row: u32,
    pub col: u32,
}

impl From<&Tile> for TileRef {
    fn from(tile: &Tile) -> Self {
        Self {
            index: tile.index,
            row: tile.row,
            col: tile.col,
        }
    }
}

/// Area an export covers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExportExtent {
    /// A grid rectangle in target CRS units.
    Tile { bounds: Bounds },
    /// The request region in WGS84 degrees.
    Region { bounds: [f64; 4] },
}

/// One export submitted to the backend.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportRequest {
    pub tile: TileRef,
    pub recipe: ImageRecipe,
    pub crs: Crs,
    pub extent: ExportExtent,
    /// Shared grid transform, backend order. Present for tiled exports in
    /// scale mode.
    pub crs_transform: Option<[f64; 6]>,
    #[serde(flatten)]
    pub mode: ExportMode,
    pub band_count: usize,
    pub estimated_bytes: u64,
    pub format: &'static str,
}

/// Builds export requests for a recipe.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExportRequestBuilder {
    policy: PayloadPolicy,
}

impl ExportRequestBuilder {
    pub fn new(policy: PayloadPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &PayloadPolicy {
        &self.policy
    }

    /// One request per grid tile, all sharing the grid's CRS and transform.
    ///
    /// A tile that falls back to fixed dimensions carries no transform,
    /// since the backend derives its own pixel size from the dimensions.
    pub fn for_grid(&self, recipe: &ImageRecipe, grid: &TileGrid) -> Vec<ExportRequest> {
        let bands = recipe.output_band_count();
        let transform = grid.transform().to_array();

        grid.tiles()
            .iter()
            .map(|tile| {
                let estimate = self.policy.estimate_bounds(&tile.bounds, grid.scale, bands);
                let mode = self.policy.decide(&estimate, grid.scale);
                if !mode.is_scale() {
                    warn!(
                        row = tile.row,
                        col = tile.col,
                        bytes = estimate.bytes(),
                        ceiling = self.policy.ceiling_bytes(),
                        "Tile exceeds payload ceiling, exporting with fixed dimensions"
                    );
                }

                debug!(
                    row = tile.row,
                    col = tile.col,
                    bytes = estimate.bytes(),
                    scale_mode = mode.is_scale(),
                    "Built tile export request"
                );

                ExportRequest {
                    tile: TileRef::from(tile),
                    recipe: recipe.clone(),
                    crs: grid.crs,
                    extent: ExportExtent::Tile {
                        bounds: tile.bounds,
                    },
                    crs_transform: mode.is_scale().then_some(transform),
                    mode,
                    band_count: bands,
                    estimated_bytes: estimate.bytes(),
                    format: "GEO_TIFF",
                }
            })
            .collect()
    }

    /// A single request covering the whole region.
    ///
    /// `scale` is in `crs` units (degrees for geographic CRSs).
    pub fn for_region(&self, recipe: &ImageRecipe, crs: Crs, scale: f64) -> ExportRequest {
        let bands = recipe.output_band_count();
        let estimate =
            self.policy
                .estimate_region(&recipe.region, scale, crs.is_geographic(), bands);
        let mode = self.policy.decide(&estimate, scale);

        debug!(
            crs = %crs,
            bytes = estimate.bytes(),
            scale_mode = mode.is_scale(),
            "Built region export request"
        );

        ExportRequest {
            tile: TileRef {
                index: 0,
                row: 0,
                col: 0,
            },
            recipe: recipe.clone(),
            crs,
            extent: ExportExtent::Region {
                bounds: recipe.region.to_array(),
            },
            crs_transform: None,
            mode,
            band_count: bands,
            estimated_bytes: estimate.bytes(),
            format: "GEO_TIFF",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::ProductFamily;
    use crate::grid::GridPlanner;
    use crate::region::Region;
    use crate::request::{DateWindow, OutputKind, Reducer};
    use chrono::NaiveDate;

    const UTM_20S: Crs = Crs::Utm {
        zone: 20,
        north: false,
    };

    fn recipe(region: Region, bands: usize) -> ImageRecipe {
        ImageRecipe {
            product: "COPERNICUS/S2_SR_HARMONIZED".to_string(),
            family: ProductFamily::Sentinel2,
            window: DateWindow::single(NaiveDate::from_ymd_opt(2024, 1, 5).unwrap()),
            region,
            bands: (1..=bands).map(|i| format!("B{i}")).collect(),
            cloud_mask: None,
            calibration: vec![],
            reducer: Reducer::Mosaic,
            output: OutputKind::Bands,
        }
    }

    #[test]
    fn test_grid_requests_share_transform() {
        let region = Region::new(-64.30, -31.52, -64.05, -31.30).unwrap();
        let grid = GridPlanner::new(1024, 64).plan(&region, UTM_20S, 10.0).unwrap();
        let requests = ExportRequestBuilder::default().for_grid(&recipe(region, 3), &grid);

        assert_eq!(requests.len(), 9);
        let transform = grid.transform().to_array();
        for (i, req) in requests.iter().enumerate() {
            assert_eq!(req.tile.index, i);
            assert_eq!(req.crs, UTM_20S);
            assert_eq!(req.crs_transform, Some(transform));
            assert_eq!(req.mode, ExportMode::Scale { scale: 10.0 });
            assert_eq!(req.band_count, 3);
        }
    }

    #[test]
    fn test_oversized_tile_uses_dimensions() {
        let region = Region::new(-64.30, -31.52, -64.05, -31.30).unwrap();
        let grid = GridPlanner::new(4096, 64).plan(&region, UTM_20S, 10.0).unwrap();
        let requests = ExportRequestBuilder::default().for_grid(&recipe(region, 3), &grid);
        assert!(requests.iter().all(|r| !r.mode.is_scale()));
        assert!(requests.iter().all(|r| r.crs_transform.is_none()));
    }

    #[test]
    fn test_region_request() {
        let region = Region::new(-64.30, -31.52, -64.05, -31.30).unwrap();
        let req = ExportRequestBuilder::default().for_region(&recipe(region, 3), UTM_20S, 30.0);
        assert_eq!(req.mode, ExportMode::Scale { scale: 30.0 });
        assert_eq!(req.crs_transform, None);
        assert_eq!(
            req.extent,
            ExportExtent::Region {
                bounds: [-64.30, -31.52, -64.05, -31.30]
            }
        );
    }

    #[test]
    fn test_request_json_shape() {
        let region = Region::new(-64.30, -31.52, -64.05, -31.30).unwrap();
        let req = ExportRequestBuilder::default().for_region(&recipe(region, 1), UTM_20S, 30.0);
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["crs"], "EPSG:32720");
        assert_eq!(json["mode"], "scale");
        assert_eq!(json["scale"], 30.0);
        assert_eq!(json["extent"]["type"], "region");
        assert_eq!(json["format"], "GEO_TIFF");
    }
}
