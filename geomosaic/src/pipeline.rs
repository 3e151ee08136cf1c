//! End-to-end run for one output id.
//!
//! ```text
//! prepare:  projection ─► recipe ─► grid (tiled) ─► export requests
//! execute:  staging ─► TileFetcher ─► TileDownloader ─► MosaicMerger
//! ```
//!
//! `prepare` only reads asset metadata from the backend; validation errors
//! and grids that exceed the tile ceiling are reported before any export is
//! submitted. The staging directory is cleared only when `execute` starts.

use tracing::{info, warn};

use crate::backend::operations::Operation;
use crate::backend::{AssetInfo, ComputeBackend, OperationResponse, ReqwestBackend};
use crate::calibration::{ImageRecipe, RadiometricCalibrator};
use crate::config::ConfigFile;
use crate::crs::Crs;
use crate::download::{
    DownloadClient, OutputLayout, ProgressCallback, ReqwestDownloadClient, RunTag, StagingArea,
    TileDownloader,
};
use crate::error::PipelineResult;
use crate::export::{ExportRequest, ExportRequestBuilder, PayloadPolicy, TileRef};
use crate::fetch::{FetchedTile, TileFetcher};
use crate::grid::{GridPlanner, TileGrid};
use crate::mosaic::{MergedRaster, MosaicMerger};
use crate::projection::{projection_of, NativeProjection, NativeProjectionResolver, ProjectionError};
use crate::region::Region;
use crate::request::{OutputKind, ProductSpec, ProjectionSpec, Resolution, TargetCrs};

/// One locally planned run.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineRequest {
    pub output_id: String,
    pub product: ProductSpec,
    pub output: OutputKind,
    pub region: Region,
    pub projection: ProjectionSpec,
    pub tiled: bool,
    /// Overrides the planner's tile edge.
    pub tile_size_px: Option<u32>,
    /// Overrides the planner's tile ceiling.
    pub max_tiles: Option<usize>,
}

impl PipelineRequest {
    /// Band whose projection stands for the whole product.
    fn reference_band(&self) -> Option<&str> {
        match &self.output {
            OutputKind::Bands => self.product.bands.first(),
            OutputKind::NormalizedDifference { band1, .. } => Some(band1.as_str()),
        }
    }
}

/// Everything decided before the first export call.
#[derive(Debug, Clone, PartialEq)]
pub struct RunPlan {
    pub output_id: String,
    pub crs: Crs,
    /// Pixel size in `crs` units.
    pub scale: f64,
    pub native: Option<NativeProjection>,
    pub recipe: ImageRecipe,
    /// Present for tiled runs.
    pub grid: Option<TileGrid>,
    pub requests: Vec<ExportRequest>,
}

/// Runs requests against a backend and writes results under a layout.
pub struct Pipeline {
    backend: Box<dyn ComputeBackend>,
    downloader: Box<dyn DownloadClient>,
    layout: OutputLayout,
    planner: GridPlanner,
    policy: PayloadPolicy,
    calibrator: RadiometricCalibrator,
    progress: Option<ProgressCallback>,
}

impl Pipeline {
    pub fn new(
        backend: Box<dyn ComputeBackend>,
        downloader: Box<dyn DownloadClient>,
        layout: OutputLayout,
    ) -> Self {
        Self {
            backend,
            downloader,
            layout,
            planner: GridPlanner::default(),
            policy: PayloadPolicy::default(),
            calibrator: RadiometricCalibrator::default(),
            progress: None,
        }
    }

    /// HTTP backend and downloader configured from `config`.
    pub fn from_config(config: &ConfigFile) -> PipelineResult<Self> {
        let backend = ReqwestBackend::with_timeout(&config.backend.url, config.backend.timeout_secs)?;
        let downloader = ReqwestDownloadClient::with_timeout(config.backend.timeout_secs)?;

        Ok(Self::new(Box::new(backend), Box::new(downloader), config.output_layout())
            .with_planner(config.grid_planner())
            .with_policy(config.payload_policy()))
    }

    pub fn with_planner(mut self, planner: GridPlanner) -> Self {
        self.planner = planner;
        self
    }

    pub fn with_policy(mut self, policy: PayloadPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_calibrator(mut self, calibrator: RadiometricCalibrator) -> Self {
        self.calibrator = calibrator;
        self
    }

    /// Reports `(tiles_done, tiles_total, bytes)` after each download.
    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn backend(&self) -> &dyn ComputeBackend {
        self.backend.as_ref()
    }

    pub fn layout(&self) -> &OutputLayout {
        &self.layout
    }

    pub fn planner(&self) -> &GridPlanner {
        &self.planner
    }

    /// Plans and executes `request`.
    pub fn run(&self, request: &PipelineRequest) -> PipelineResult<MergedRaster> {
        let plan = self.prepare(request)?;
        self.execute(&plan)
    }

    /// Resolves the projection, plans the grid and builds every export
    /// request without submitting any of them.
    pub fn prepare(&self, request: &PipelineRequest) -> PipelineResult<RunPlan> {
        crate::download::validate_output_id(&request.output_id)?;

        let resolver = NativeProjectionResolver::new(self.backend.as_ref());
        let product = request.product.product.as_str();
        let band = request.reference_band();
        let window = Some(request.product.window);

        let (native, asset) = if request.projection.needs_native() {
            let (native, asset) = resolver.resolve(product, &request.region, band, window)?;
            (Some(native), Some(asset))
        } else {
            (None, self.optional_asset(&resolver, request, band)?)
        };

        let crs = match (request.projection.crs, &native) {
            (TargetCrs::Explicit(crs), _) => crs,
            (TargetCrs::Native, Some(native)) => native.crs,
            (TargetCrs::Native, None) => unresolved(product)?,
        };
        let meters = match (request.projection.resolution, &native) {
            (Resolution::Meters(m), _) => m,
            (Resolution::Native, Some(native)) => native.nominal_scale,
            (Resolution::Native, None) => unresolved(product)?,
        };
        let scale = crs.meters_to_units(meters);

        let recipe =
            self.calibrator
                .build(&request.product, &request.output, &request.region, asset.as_ref())?;

        let grid = if request.tiled {
            Some(self.plan_grid(request, crs, scale, recipe.output_band_count())?)
        } else {
            None
        };

        let builder = ExportRequestBuilder::new(self.policy);
        let requests = match &grid {
            Some(grid) => builder.for_grid(&recipe, grid),
            None => vec![builder.for_region(&recipe, crs, scale)],
        };

        info!(
            output_id = %request.output_id,
            crs = %crs,
            scale,
            tiled = request.tiled,
            requests = requests.len(),
            "Run planned"
        );

        Ok(RunPlan {
            output_id: request.output_id.clone(),
            crs,
            scale,
            native,
            recipe,
            grid,
            requests,
        })
    }

    /// Clears staging, exports, downloads and merges a prepared plan.
    pub fn execute(&self, plan: &RunPlan) -> PipelineResult<MergedRaster> {
        let staging = StagingArea::prepare(&self.layout, &plan.output_id, RunTag::now())?;
        let fetched = TileFetcher::new(self.backend.as_ref()).fetch_all(&plan.requests)?;
        self.download_and_merge(&staging, &fetched)
    }

    /// Lets the backend plan and export through a named operation, then
    /// downloads and merges its tiles locally.
    pub fn run_remote(
        &self,
        output_id: &str,
        operation: &Operation,
        params: &[(String, String)],
    ) -> PipelineResult<MergedRaster> {
        crate::download::validate_output_id(output_id)?;

        let response = self.backend.run_operation(&operation.endpoint(), params)?;
        let fetched = remote_tiles(response);
        info!(
            output_id,
            operation = %operation,
            tiles = fetched.len(),
            "Remote operation returned"
        );

        let staging = StagingArea::prepare(&self.layout, output_id, RunTag::now())?;
        self.download_and_merge(&staging, &fetched)
    }

    fn download_and_merge(
        &self,
        staging: &StagingArea,
        fetched: &[FetchedTile],
    ) -> PipelineResult<MergedRaster> {
        let downloaded = TileDownloader::new(self.downloader.as_ref())
            .with_standard_repairs()
            .download_all(staging, fetched, self.progress.as_ref())?;
        info!(output_id = staging.output_id(), tiles = downloaded.len(), "Tiles downloaded");

        let merger = MosaicMerger::new(self.layout.merged_dir());
        Ok(merger.merge(staging.output_id(), staging.run(), &downloaded)?)
    }

    /// Plans the grid with the tile edge clamped so every tile fits the
    /// payload ceiling in scale mode.
    fn plan_grid(
        &self,
        request: &PipelineRequest,
        crs: Crs,
        scale: f64,
        bands: usize,
    ) -> PipelineResult<TileGrid> {
        let requested = request.tile_size_px.unwrap_or(self.planner.tile_size_px());
        let max_edge = self.policy.max_tile_edge(bands);
        let tile_size = if requested > max_edge {
            warn!(
                requested,
                clamped = max_edge,
                bands,
                "Tile size exceeds payload ceiling, clamping"
            );
            max_edge
        } else {
            requested
        };

        let planner = self
            .planner
            .with_tile_size(tile_size)
            .with_max_tiles(request.max_tiles.unwrap_or(self.planner.max_tiles()));
        let grid = planner.plan(&request.region, crs, scale)?;

        info!(
            output_id = %request.output_id,
            rows = grid.rows,
            cols = grid.cols,
            tile_size_px = tile_size,
            "Grid planned"
        );
        Ok(grid)
    }

    /// With an explicit projection the asset only enriches the recipe, so a
    /// missing one is not an error.
    fn optional_asset(
        &self,
        resolver: &NativeProjectionResolver<'_>,
        request: &PipelineRequest,
        band: Option<&str>,
    ) -> PipelineResult<Option<AssetInfo>> {
        match resolver.first_asset(
            &request.product.product,
            &request.region,
            band,
            Some(request.product.window),
        ) {
            Ok(asset) => Ok(Some(asset)),
            Err(ProjectionError::Inference { reason, .. }) => {
                warn!(
                    product = %request.product.product,
                    reason = %reason,
                    "No asset to inspect, using family defaults"
                );
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn unresolved<T>(product: &str) -> PipelineResult<T> {
    Err(ProjectionError::Inference {
        product: product.to_string(),
        reason: "native projection was not resolved".to_string(),
    }
    .into())
}

/// Converts a remote response into download jobs in row-major order.
fn remote_tiles(response: OperationResponse) -> Vec<FetchedTile> {
    match response {
        OperationResponse::Single { url } => vec![FetchedTile {
            tile: TileRef {
                index: 0,
                row: 0,
                col: 0,
            },
            url,
        }],
        OperationResponse::Tiled { tiling, tiles } => {
            let mut fetched: Vec<FetchedTile> = tiles
                .into_iter()
                .map(|t| FetchedTile {
                    tile: TileRef {
                        index: t.row as usize * tiling.cols as usize + t.col as usize,
                        row: t.row,
                        col: t.col,
                    },
                    url: t.url,
                })
                .collect();
            fetched.sort_by_key(|t| t.tile.index);
            fetched
        }
    }
}

/// Projection of a product as reported by its first asset.
pub fn native_projection(
    backend: &dyn ComputeBackend,
    spec: &ProductSpec,
    region: &Region,
) -> PipelineResult<NativeProjection> {
    let resolver = NativeProjectionResolver::new(backend);
    let asset = resolver.first_asset(&spec.product, region, spec.bands.first(), Some(spec.window))?;
    Ok(projection_of(&spec.product, &asset, spec.bands.first())?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::tests::MockBackend;
    use crate::backend::{BandInfo, RemoteTile, RemoteTiling};
    use crate::download::tests::MockDownloadClient;
    use crate::error::{ErrorCategory, PipelineError};
    use crate::request::{parse_date, BandSelection};
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn asset(crs: &str, scale: f64) -> AssetInfo {
        AssetInfo {
            id: "COPERNICUS/S2_SR_HARMONIZED/20240105T141051".to_string(),
            time_start: Some(1_704_463_851_000),
            bands: ["B2", "B3", "B4", "B8", "SCL"]
                .iter()
                .map(|b| BandInfo {
                    name: b.to_string(),
                    crs: crs.to_string(),
                    nominal_scale: scale,
                })
                .collect(),
            properties: BTreeMap::new(),
        }
    }

    fn request(tiled: bool) -> PipelineRequest {
        PipelineRequest {
            output_id: "cordoba".to_string(),
            product: ProductSpec::single_date(
                "COPERNICUS/S2_SR_HARMONIZED",
                parse_date("2024-01-05").unwrap(),
            )
            .with_bands(BandSelection::parse("B4,B3,B2").unwrap()),
            output: OutputKind::Bands,
            region: Region::new(-64.30, -31.52, -64.05, -31.30).unwrap(),
            projection: ProjectionSpec::default(),
            tiled,
            tile_size_px: None,
            max_tiles: None,
        }
    }

    fn pipeline(backend: MockBackend, temp: &TempDir) -> Pipeline {
        Pipeline::new(
            Box::new(backend),
            Box::new(MockDownloadClient::new()),
            OutputLayout::new(temp.path()),
        )
    }

    #[test]
    fn test_prepare_tiled_uses_native_projection() {
        let temp = TempDir::new().unwrap();
        let p = pipeline(MockBackend::new(Some(asset("EPSG:32720", 10.0))), &temp);

        let plan = p.prepare(&request(true)).unwrap();
        let grid = plan.grid.as_ref().unwrap();

        assert_eq!(plan.crs, Crs::Utm { zone: 20, north: false });
        assert_eq!(plan.scale, 10.0);
        assert_eq!((grid.rows, grid.cols), (3, 3));
        assert_eq!(plan.requests.len(), 9);
        let transform = plan.requests[0].crs_transform;
        assert!(plan.requests.iter().all(|r| r.crs_transform == transform));
        // Nothing exported and nothing staged yet.
        assert!(!temp.path().join("tiles").exists());
    }

    #[test]
    fn test_prepare_untiled_is_single_request() {
        let temp = TempDir::new().unwrap();
        let p = pipeline(MockBackend::new(Some(asset("EPSG:32720", 10.0))), &temp);

        let plan = p.prepare(&request(false)).unwrap();
        assert!(plan.grid.is_none());
        assert_eq!(plan.requests.len(), 1);
        assert!(plan.requests[0].crs_transform.is_none());
    }

    #[test]
    fn test_tile_size_clamped_to_payload_ceiling() {
        let temp = TempDir::new().unwrap();
        let p = pipeline(MockBackend::new(Some(asset("EPSG:32720", 10.0))), &temp);

        let mut req = request(true);
        req.tile_size_px = Some(4096);
        req.max_tiles = Some(100);
        let plan = p.prepare(&req).unwrap();

        assert_eq!(plan.grid.unwrap().tile_size_px, 1982);
        assert!(plan.requests.iter().all(|r| r.mode.is_scale()));
    }

    #[test]
    fn test_missing_asset_fails_strictly() {
        let temp = TempDir::new().unwrap();
        let p = pipeline(MockBackend::new(None), &temp);

        let err = p.prepare(&request(true)).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Projection);
    }

    #[test]
    fn test_explicit_projection_tolerates_missing_asset() {
        let temp = TempDir::new().unwrap();
        let p = pipeline(MockBackend::new(None), &temp);

        let mut req = request(false);
        req.projection = ProjectionSpec::parse("EPSG:3857", "20").unwrap();
        let plan = p.prepare(&req).unwrap();
        assert_eq!(plan.crs, Crs::WebMercator);
        assert!(plan.native.is_none());
    }

    #[test]
    fn test_too_many_tiles_reported_before_export() {
        let temp = TempDir::new().unwrap();
        let backend = MockBackend::new(Some(asset("EPSG:32720", 10.0)));
        let p = pipeline(backend, &temp);

        let mut req = request(true);
        req.max_tiles = Some(4);
        let err = p.run(&req).unwrap_err();

        assert!(matches!(err, PipelineError::Grid(_)));
        assert_eq!(err.category(), ErrorCategory::TooManyTiles);
        assert!(!temp.path().join("tiles").exists());
    }

    #[test]
    fn test_invalid_output_id() {
        let temp = TempDir::new().unwrap();
        let p = pipeline(MockBackend::new(Some(asset("EPSG:32720", 10.0))), &temp);

        let mut req = request(false);
        req.output_id = "../escape".to_string();
        assert!(matches!(p.prepare(&req), Err(PipelineError::Download(_))));
    }

    #[test]
    fn test_remote_tiles_are_row_major() {
        let tiling = RemoteTiling {
            crs: "EPSG:32720".to_string(),
            transform: [10.0, 0.0, 0.0, 0.0, -10.0, 0.0],
            rows: 2,
            cols: 2,
        };
        let tile = |row, col| RemoteTile {
            row,
            col,
            bbox: [0.0; 4],
            url: format!("http://t/{}/{}", row, col),
        };
        let fetched = remote_tiles(OperationResponse::Tiled {
            tiling,
            tiles: vec![tile(1, 1), tile(0, 1), tile(1, 0), tile(0, 0)],
        });

        let order: Vec<usize> = fetched.iter().map(|f| f.tile.index).collect();
        assert_eq!(order, vec![0, 1, 2, 3]);
        assert_eq!(fetched[2].url, "http://t/1/0");
    }

    #[test]
    fn test_native_projection_helper() {
        let backend = MockBackend::new(Some(asset("EPSG:32720", 10.0)));
        let req = request(false);
        let native = native_projection(&backend, &req.product, &req.region).unwrap();
        assert_eq!(native.nominal_scale, 10.0);
        assert_eq!(native.band, "B4");
    }
}
