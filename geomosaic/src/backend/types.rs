//! Wire types exchanged with the compute backend.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::crs::Crs;
use crate::region::Region;
use crate::request::DateWindow;

/// Query for the first asset of a product intersecting a region.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetQuery {
    pub product: String,
    pub region: Region,
    pub window: Option<DateWindow>,
    /// Band whose projection is wanted; `None` means the asset's first band.
    pub band: Option<String>,
}

impl AssetQuery {
    pub fn new(product: impl Into<String>, region: Region) -> Self {
        Self {
            product: product.into(),
            region,
            window: None,
            band: None,
        }
    }

    pub fn with_window(mut self, window: DateWindow) -> Self {
        self.window = Some(window);
        self
    }

    pub fn with_band(mut self, band: Option<&str>) -> Self {
        self.band = band.map(str::to_string);
        self
    }

    /// Query-string pairs for `GET /assets/first`.
    pub fn to_query(&self) -> Vec<(&'static str, String)> {
        let mut query = vec![
            ("product", self.product.clone()),
            ("bbox", self.region.to_query_string()),
        ];
        if let Some(window) = &self.window {
            query.push(("start", window.start().format("%Y-%m-%d").to_string()));
            query.push(("end", window.end().format("%Y-%m-%d").to_string()));
        }
        if let Some(band) = &self.band {
            query.push(("band", band.clone()));
        }
        query
    }
}

/// Projection metadata for one band of an asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandInfo {
    pub name: String,
    /// CRS code as reported by the backend; may be one this crate cannot project to.
    pub crs: String,
    /// Nominal ground sampling distance in meters.
    pub nominal_scale: f64,
}

impl BandInfo {
    pub fn parsed_crs(&self) -> Option<Crs> {
        self.crs.parse().ok()
    }
}

/// The subset of an asset's metadata the pipeline needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetInfo {
    pub id: String,
    /// Acquisition time in milliseconds since the epoch.
    #[serde(default)]
    pub time_start: Option<i64>,
    pub bands: Vec<BandInfo>,
    #[serde(default)]
    pub properties: BTreeMap<String, serde_json::Value>,
}

impl AssetInfo {
    pub fn band(&self, name: &str) -> Option<&BandInfo> {
        self.bands.iter().find(|b| b.name == name)
    }

    pub fn band_names(&self) -> Vec<String> {
        self.bands.iter().map(|b| b.name.clone()).collect()
    }

    pub fn has_band(&self, name: &str) -> bool {
        self.band(name).is_some()
    }

    /// Numeric property, accepting both JSON numbers and numeric strings.
    pub fn number_property(&self, key: &str) -> Option<f64> {
        match self.properties.get(key)? {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

/// `POST /export` response.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ExportResponse {
    pub url: String,
}

/// `GET /health` response.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct HealthResponse {
    #[serde(default)]
    pub ok: bool,
}

/// Error body returned by the backend on failure.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(alias = "error", alias = "message")]
    pub detail: String,
}
