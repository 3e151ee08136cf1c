//! Action-descriptor boundary.
//!
//! The job-execution layer hands over `{operationName, parameters, outputId}`
//! and expects back either the path of a merged raster or a failure string.
//! [`Executor::execute`] is the only place where a [`PipelineError`] is turned
//! into text; nothing escapes it.
//!
//! [`PipelineError`]: crate::error::PipelineError

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{error, info};

use crate::backend::operations::{normalize_params, Operation};
use crate::config::{ConfigFile, PlanningMode};
use crate::error::PipelineResult;
use crate::mosaic::MergedRaster;
use crate::pipeline::{Pipeline, PipelineRequest};
use crate::region::Region;
use crate::request::{
    parse_date, BandSelection, DateWindow, OutputKind, ProductSpec, ProjectionSpec, Reducer,
    RequestError,
};

/// One unit of work from the job-execution layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionDescriptor {
    #[serde(alias = "operationName")]
    pub operation_name: String,
    #[serde(default)]
    pub parameters: Map<String, Value>,
    #[serde(alias = "outputId")]
    pub output_id: String,
}

impl ActionDescriptor {
    pub fn new(
        operation_name: impl Into<String>,
        parameters: Map<String, Value>,
        output_id: impl Into<String>,
    ) -> Self {
        Self {
            operation_name: operation_name.into(),
            parameters,
            output_id: output_id.into(),
        }
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Result of [`Executor::execute`].
#[derive(Debug, Clone)]
pub enum ActionOutcome {
    Completed(MergedRaster),
    Failed(String),
}

impl ActionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ActionOutcome::Completed(_))
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            ActionOutcome::Completed(merged) => Some(merged.path.as_path()),
            ActionOutcome::Failed(_) => None,
        }
    }

    /// The merged path, or the failure text. Callers must treat anything
    /// that is not an existing path as an error.
    pub fn into_contract_string(self) -> String {
        match self {
            ActionOutcome::Completed(merged) => merged.path.display().to_string(),
            ActionOutcome::Failed(message) => message,
        }
    }
}

/// Runs action descriptors through a [`Pipeline`].
pub struct Executor {
    pipeline: Pipeline,
    planning: PlanningMode,
}

impl Executor {
    pub fn new(pipeline: Pipeline) -> Self {
        Self {
            pipeline,
            planning: PlanningMode::Local,
        }
    }

    pub fn with_planning(mut self, planning: PlanningMode) -> Self {
        self.planning = planning;
        self
    }

    pub fn from_config(config: &ConfigFile) -> PipelineResult<Self> {
        Ok(Self::new(Pipeline::from_config(config)?).with_planning(config.backend.planning))
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn planning(&self) -> PlanningMode {
        self.planning
    }

    /// Executes `action`. Never panics on bad input and never returns an
    /// error; failures come back as [`ActionOutcome::Failed`].
    pub fn execute(&self, action: &ActionDescriptor) -> ActionOutcome {
        match self.try_execute(action) {
            Ok(merged) => {
                info!(
                    operation = %action.operation_name,
                    output_id = %action.output_id,
                    path = %merged.path.display(),
                    "Action completed"
                );
                ActionOutcome::Completed(merged)
            }
            Err(e) => {
                error!(
                    operation = %action.operation_name,
                    output_id = %action.output_id,
                    category = e.category().as_str(),
                    error = %e,
                    "Action failed"
                );
                ActionOutcome::Failed(format!("{} failed: {}", action.operation_name, e))
            }
        }
    }

    /// Like [`Executor::execute`] but keeps the typed error.
    pub fn try_execute(&self, action: &ActionDescriptor) -> PipelineResult<MergedRaster> {
        let operation: Operation = action.operation_name.parse()?;
        // Validated in both modes so bad input never reaches the backend.
        let request = build_request(&operation, &action.output_id, &action.parameters)?;

        match self.planning {
            PlanningMode::Local => self.pipeline.run(&request),
            PlanningMode::Remote => {
                let params = normalize_params(&action.parameters)?;
                self.pipeline
                    .run_remote(&action.output_id, &operation, &params)
            }
        }
    }
}

/// Builds a pipeline request from an operation and its raw parameters.
///
/// `bbox` and `bands` may be lists or comma strings. `palette` is accepted
/// and ignored since GeoTIFF output carries no styling.
pub fn build_request(
    operation: &Operation,
    output_id: &str,
    parameters: &Map<String, Value>,
) -> Result<PipelineRequest, RequestError> {
    let params = Params::new(parameters)?;

    let product = params.required("product")?;
    let region: Region = params.required("bbox")?.parse()?;
    let projection = ProjectionSpec::parse(
        params.get("projection").unwrap_or("default"),
        params.get("resolution").unwrap_or("default"),
    )?;

    let mut spec = if operation.kind.is_composite() {
        let window = DateWindow::parse_range(params.required("start")?, params.required("end")?)?;
        let reducer: Reducer = params.required("reducer")?.parse()?;
        ProductSpec::composite(product, window, reducer)
    } else {
        ProductSpec::single_date(product, parse_date(params.required("date")?)?)
    };

    let output = if operation.kind.is_index() {
        let band1 = params.required("band1")?.to_string();
        let band2 = params.required("band2")?.to_string();
        spec = spec.with_bands(BandSelection::Named(vec![band1.clone(), band2.clone()]));
        OutputKind::NormalizedDifference { band1, band2 }
    } else {
        spec = spec.with_bands(BandSelection::parse(params.get("bands").unwrap_or(""))?);
        OutputKind::Bands
    };

    let spec = spec
        .with_cloud_mask(params.flag("cloud_mask")?)
        .with_calibration(params.flag("scale_offset")?);

    Ok(PipelineRequest {
        output_id: output_id.to_string(),
        product: spec,
        output,
        region,
        projection,
        tiled: operation.tiled,
        tile_size_px: params.positive("tile_size")?,
        max_tiles: params.positive("max_tiles")?,
    })
}

/// Normalized parameters keyed by name.
struct Params {
    values: HashMap<String, String>,
}

impl Params {
    fn new(parameters: &Map<String, Value>) -> Result<Self, RequestError> {
        Ok(Self {
            values: normalize_params(parameters)?.into_iter().collect(),
        })
    }

    /// Present and non-empty.
    fn get(&self, name: &str) -> Option<&str> {
        self.values
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    fn required(&self, name: &'static str) -> Result<&str, RequestError> {
        self.get(name).ok_or(RequestError::MissingParameter(name))
    }

    fn flag(&self, name: &'static str) -> Result<bool, RequestError> {
        match self.get(name).map(str::to_ascii_lowercase).as_deref() {
            None => Ok(false),
            Some("true" | "1" | "yes") => Ok(true),
            Some("false" | "0" | "no") => Ok(false),
            Some(other) => Err(RequestError::InvalidParameter {
                name,
                reason: format!("expected a boolean, got '{}'", other),
            }),
        }
    }

    fn positive<T>(&self, name: &'static str) -> Result<Option<T>, RequestError>
    where
        T: std::str::FromStr + PartialOrd + Default,
    {
        let Some(raw) = self.get(name) else {
            return Ok(None);
        };
        match raw.parse::<T>() {
            Ok(v) if v > T::default() => Ok(Some(v)),
            _ => Err(RequestError::InvalidParameter {
                name,
                reason: format!("expected a positive integer, got '{}'", raw),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::tests::MockBackend;
    use crate::backend::{AssetInfo, BandInfo, OperationResponse};
    use crate::crs::Crs;
    use crate::download::tests::MockDownloadClient;
    use crate::download::OutputLayout;
    use crate::geotiff::{write_geotiff_to, GeoKeyDirectory, GeoRaster, RasterTransform};
    use crate::request::{Reducer, Resolution, TargetCrs};
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::io::Cursor;
    use tempfile::TempDir;

    fn params(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    fn asset() -> AssetInfo {
        AssetInfo {
            id: "COPERNICUS/S2_SR_HARMONIZED/20240105T141051".to_string(),
            time_start: Some(1_704_463_851_000),
            bands: ["B2", "B3", "B4", "B8"]
                .iter()
                .map(|b| BandInfo {
                    name: b.to_string(),
                    crs: "EPSG:32720".to_string(),
                    nominal_scale: 10.0,
                })
                .collect(),
            properties: BTreeMap::new(),
        }
    }

    fn tile_bytes() -> Vec<u8> {
        let raster = GeoRaster::filled(
            4,
            3,
            1,
            0.25,
            RasterTransform::new(500_000.0, 6_500_000.0, 10.0, 10.0),
            GeoKeyDirectory::for_crs(Crs::Utm {
                zone: 20,
                north: false,
            }),
        );
        let mut cursor = Cursor::new(Vec::new());
        write_geotiff_to(&raster, &mut cursor).unwrap();
        cursor.into_inner()
    }

    fn executor(backend: MockBackend, downloads: MockDownloadClient, temp: &TempDir) -> Executor {
        Executor::new(Pipeline::new(
            Box::new(backend),
            Box::new(downloads),
            OutputLayout::new(temp.path()),
        ))
    }

    #[test]
    fn test_descriptor_accepts_camel_case() {
        let action = ActionDescriptor::from_json(
            r#"{"operationName": "rgb_tif", "parameters": {"product": "X"}, "outputId": "out"}"#,
        )
        .unwrap();
        assert_eq!(action.operation_name, "rgb_tif");
        assert_eq!(action.output_id, "out");
        assert_eq!(action.parameters["product"], "X");

        let action =
            ActionDescriptor::from_json(r#"{"operation_name": "index_tif", "output_id": "o"}"#)
                .unwrap();
        assert!(action.parameters.is_empty());
    }

    #[test]
    fn test_build_rgb_request() {
        let op: Operation = "rgb_tif_tiled".parse().unwrap();
        let req = build_request(
            &op,
            "cordoba",
            &params(json!({
                "product": "COPERNICUS/S2_SR_HARMONIZED",
                "bands": ["B4", "B3", "B2"],
                "bbox": [-64.30, -31.52, -64.05, -31.30],
                "date": "2024-01-05",
                "resolution": 20,
                "projection": "EPSG:32720",
                "tile_size": 512,
                "cloud_mask": true,
                "palette": ["red", "green"],
            })),
        )
        .unwrap();

        assert!(req.tiled);
        assert_eq!(req.output, OutputKind::Bands);
        assert_eq!(req.product.bands.first(), Some("B4"));
        assert_eq!(req.product.reducer, Reducer::Mosaic);
        assert!(req.product.cloud_mask);
        assert!(!req.product.calibrate);
        assert_eq!(req.projection.resolution, Resolution::Meters(20.0));
        assert!(matches!(req.projection.crs, TargetCrs::Explicit(_)));
        assert_eq!(req.tile_size_px, Some(512));
        assert_eq!(req.max_tiles, None);
    }

    #[test]
    fn test_build_index_composite_request() {
        let op: Operation = "index_composite_tif".parse().unwrap();
        let req = build_request(
            &op,
            "ndvi",
            &params(json!({
                "product": "COPERNICUS/S2_SR_HARMONIZED",
                "band1": "B8",
                "band2": "B4",
                "bbox": "-64.30,-31.52,-64.05,-31.30",
                "start": "2024-01-01",
                "end": "2024-02-01",
                "reducer": "Median",
                "scale_offset": "yes",
            })),
        )
        .unwrap();

        assert!(!req.tiled);
        assert_eq!(
            req.output,
            OutputKind::NormalizedDifference {
                band1: "B8".to_string(),
                band2: "B4".to_string()
            }
        );
        assert_eq!(
            req.product.bands,
            BandSelection::Named(vec!["B8".to_string(), "B4".to_string()])
        );
        assert_eq!(req.product.reducer, Reducer::Median);
        assert!(req.product.calibrate);
        assert!(req.projection.needs_native());
    }

    #[test]
    fn test_build_request_errors() {
        let rgb: Operation = "rgb_tif".parse().unwrap();
        let composite: Operation = "rgb_composite_tif".parse().unwrap();
        let base = json!({
            "product": "P",
            "bbox": [-64.3, -31.5, -64.0, -31.3],
            "date": "2024-01-05",
        });

        let mut missing = params(base.clone());
        missing.remove("bbox");
        assert!(matches!(
            build_request(&rgb, "o", &missing),
            Err(RequestError::MissingParameter("bbox"))
        ));

        assert!(matches!(
            build_request(&composite, "o", &params(base.clone())),
            Err(RequestError::MissingParameter("start"))
        ));

        let mut bad_bbox = params(base.clone());
        bad_bbox.insert("bbox".to_string(), json!([1, 2, 3]));
        assert!(build_request(&rgb, "o", &bad_bbox).is_err());

        let mut bad_flag = params(base.clone());
        bad_flag.insert("cloud_mask".to_string(), json!("maybe"));
        assert!(matches!(
            build_request(&rgb, "o", &bad_flag),
            Err(RequestError::InvalidParameter { name: "cloud_mask", .. })
        ));

        let mut bad_tiles = params(base.clone());
        bad_tiles.insert("max_tiles".to_string(), json!(0));
        assert!(matches!(
            build_request(&rgb, "o", &bad_tiles),
            Err(RequestError::InvalidParameter { name: "max_tiles", .. })
        ));

        let mut reducer = params(base);
        reducer.insert("start".to_string(), json!("2024-01-01"));
        reducer.insert("end".to_string(), json!("2024-01-31"));
        reducer.insert("reducer".to_string(), json!("average"));
        assert!(matches!(
            build_request(&composite, "o", &reducer),
            Err(RequestError::InvalidReducer(_))
        ));
    }

    #[test]
    fn test_execute_local_single_tile() {
        let temp = TempDir::new().unwrap();
        let downloads = MockDownloadClient::new().with_body("http://mock/tile/0", tile_bytes());
        let exec = executor(MockBackend::new(Some(asset())), downloads, &temp);

        let action = ActionDescriptor::new(
            "rgb_tif",
            params(json!({
                "product": "COPERNICUS/S2_SR_HARMONIZED",
                "bands": "B4",
                "bbox": [-64.30, -31.52, -64.29, -31.51],
                "date": "2024-01-05",
            })),
            "cordoba",
        );
        let outcome = exec.execute(&action);

        assert!(outcome.is_success(), "{:?}", outcome);
        let path = outcome.path().unwrap().to_path_buf();
        assert!(path.exists());
        assert!(path.starts_with(temp.path().join("merged")));
        assert_eq!(outcome.into_contract_string(), path.display().to_string());
    }

    #[test]
    fn test_execute_failure_is_a_string() {
        let temp = TempDir::new().unwrap();
        let exec = executor(MockBackend::new(None), MockDownloadClient::new(), &temp);

        let action = ActionDescriptor::new(
            "rgb_tif",
            params(json!({"product": "P", "bbox": "1,2,3", "date": "2024-01-05"})),
            "o",
        );
        let outcome = exec.execute(&action);
        assert!(!outcome.is_success());
        assert!(outcome.path().is_none());
        assert!(outcome.into_contract_string().starts_with("rgb_tif failed: "));

        let outcome = exec.execute(&ActionDescriptor::new("hillshade_tif", Map::new(), "o"));
        assert!(outcome
            .into_contract_string()
            .contains("unknown operation 'hillshade_tif'"));
    }

    #[test]
    fn test_execute_remote_single_url() {
        let temp = TempDir::new().unwrap();
        let mut backend = MockBackend::new(None);
        backend.operation = Some(OperationResponse::Single {
            url: "http://plugin/result.tif".to_string(),
        });
        let downloads =
            MockDownloadClient::new().with_body("http://plugin/result.tif", tile_bytes());
        let exec = executor(backend, downloads, &temp).with_planning(PlanningMode::Remote);

        let action = ActionDescriptor::new(
            "rgb_tif",
            params(json!({
                "product": "P",
                "bbox": [-64.3, -31.5, -64.0, -31.3],
                "date": "2024-01-05",
            })),
            "remote_out",
        );
        let merged = exec.try_execute(&action).unwrap();
        assert_eq!(merged.output_id, "remote_out");
        assert_eq!((merged.width, merged.height, merged.bands), (4, 3, 1));
    }
}
