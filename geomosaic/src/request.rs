//! Typed request model: product, date window, bands, reducer and target grid.
//!
//! These types are what the action parameters are parsed into before any
//! network call happens. Every parse failure here is a validation error that
//! is reported immediately and never retried.

use std::fmt;
use std::str::FromStr;

use chrono::{Duration, NaiveDate};
use serde::Serialize;
use thiserror::Error;

use crate::crs::{Crs, CrsError};
use crate::region::RegionError;

/// ISO date format accepted for dates.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Errors produced while building a request from raw parameters.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RequestError {
    #[error("invalid date '{0}': expected YYYY-MM-DD")]
    InvalidDate(String),

    #[error("invalid date range: start {start} is after end {end}")]
    InvalidDateRange { start: NaiveDate, end: NaiveDate },

    #[error("invalid reducer '{0}': expected mean, median, min, max or mosaic")]
    InvalidReducer(String),

    #[error("invalid band list '{0}'")]
    InvalidBands(String),

    #[error("invalid resolution '{0}': expected a positive number of meters or 'default'")]
    InvalidResolution(String),

    #[error("invalid projection: {0}")]
    InvalidProjection(#[from] CrsError),

    #[error("missing required parameter '{0}'")]
    MissingParameter(&'static str),

    #[error("invalid parameter '{name}': {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error(transparent)]
    Region(#[from] RegionError),
}

/// Parses a `YYYY-MM-DD` date.
pub fn parse_date(input: &str) -> Result<NaiveDate, RequestError> {
    NaiveDate::parse_from_str(input.trim(), DATE_FORMAT)
        .map_err(|_| RequestError::InvalidDate(input.to_string()))
}

/// A half-open date window `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateWindow {
    /// One calendar day.
    Single(NaiveDate),
    /// `[start, end)`, with `start < end`.
    Range { start: NaiveDate, end: NaiveDate },
}

impl DateWindow {
    pub fn single(date: NaiveDate) -> Self {
        DateWindow::Single(date)
    }

    /// Builds a range window. `start == end` collapses to a single day.
    pub fn range(start: NaiveDate, end: NaiveDate) -> Result<Self, RequestError> {
        if start > end {
            return Err(RequestError::InvalidDateRange { start, end });
        }
        if start == end {
            return Ok(DateWindow::Single(start));
        }
        Ok(DateWindow::Range { start, end })
    }

    /// Parses the `start`/`end` parameter pair.
    pub fn parse_range(start: &str, end: &str) -> Result<Self, RequestError> {
        Self::range(parse_date(start)?, parse_date(end)?)
    }

    pub fn start(&self) -> NaiveDate {
        match self {
            DateWindow::Single(d) => *d,
            DateWindow::Range { start, .. } => *start,
        }
    }

    /// Exclusive end of the window.
    pub fn end(&self) -> NaiveDate {
        match self {
            DateWindow::Single(d) => *d + Duration::days(1),
            DateWindow::Range { end, .. } => *end,
        }
    }

    pub fn is_single_day(&self) -> bool {
        matches!(self, DateWindow::Single(_))
    }
}

impl Serialize for DateWindow {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let mut s = serializer.serialize_struct("DateWindow", 2)?;
        s.serialize_field("start", &self.start().format(DATE_FORMAT).to_string())?;
        s.serialize_field("end", &self.end().format(DATE_FORMAT).to_string())?;
        s.end()
    }
}

/// Temporal reducer applied across a filtered collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Reducer {
    Mean,
    Median,
    Min,
    Max,
    Mosaic,
}

impl Reducer {
    pub fn as_str(&self) -> &'static str {
        match self {
            Reducer::Mean => "mean",
            Reducer::Median => "median",
            Reducer::Min => "min",
            Reducer::Max => "max",
            Reducer::Mosaic => "mosaic",
        }
    }
}

impl FromStr for Reducer {
    type Err = RequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mean" => Ok(Reducer::Mean),
            "median" => Ok(Reducer::Median),
            "min" => Ok(Reducer::Min),
            "max" => Ok(Reducer::Max),
            "mosaic" => Ok(Reducer::Mosaic),
            _ => Err(RequestError::InvalidReducer(s.to_string())),
        }
    }
}

impl fmt::Display for Reducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which bands of the product to keep.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum BandSelection {
    #[default]
    All,
    Named(Vec<String>),
}

impl BandSelection {
    /// Parses a comma list. Empty input or `all` selects every band.
    pub fn parse(input: &str) -> Result<Self, RequestError> {
        let trimmed = input.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("all") {
            return Ok(BandSelection::All);
        }

        let names: Vec<String> = trimmed.split(',').map(|b| b.trim().to_string()).collect();
        if names.iter().any(|n| n.is_empty()) {
            return Err(RequestError::InvalidBands(input.to_string()));
        }
        Ok(BandSelection::Named(names))
    }

    /// The first named band, used to probe the native projection.
    pub fn first(&self) -> Option<&str> {
        match self {
            BandSelection::All => None,
            BandSelection::Named(names) => names.first().map(String::as_str),
        }
    }

    /// Resolves the selection against the bands an asset actually has.
    pub fn resolve(&self, available: &[String]) -> Vec<String> {
        match self {
            BandSelection::All => available.to_vec(),
            BandSelection::Named(names) => names.clone(),
        }
    }

    /// Comma form used in backend query strings (`all` for every band).
    pub fn to_query_string(&self) -> String {
        match self {
            BandSelection::All => "all".to_string(),
            BandSelection::Named(names) => names.join(","),
        }
    }
}

/// Target pixel size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Resolution {
    /// Use the product's nominal scale.
    Native,
    /// Explicit meters per pixel.
    Meters(f64),
}

impl FromStr for Resolution {
    type Err = RequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("default") {
            return Ok(Resolution::Native);
        }
        match trimmed.parse::<f64>() {
            Ok(v) if v.is_finite() && v > 0.0 => Ok(Resolution::Meters(v)),
            _ => Err(RequestError::InvalidResolution(s.to_string())),
        }
    }
}

/// Target CRS choice.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TargetCrs {
    Native,
    Explicit(Crs),
}

impl FromStr for TargetCrs {
    type Err = RequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("default") {
            return Ok(TargetCrs::Native);
        }
        Ok(TargetCrs::Explicit(trimmed.parse::<Crs>()?))
    }
}

/// Target CRS and resolution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectionSpec {
    pub crs: TargetCrs,
    pub resolution: Resolution,
}

impl Default for ProjectionSpec {
    fn default() -> Self {
        Self {
            crs: TargetCrs::Native,
            resolution: Resolution::Native,
        }
    }
}

impl ProjectionSpec {
    pub fn parse(projection: &str, resolution: &str) -> Result<Self, RequestError> {
        Ok(Self {
            crs: projection.parse()?,
            resolution: resolution.parse()?,
        })
    }

    /// True when either the CRS or the scale has to come from the product.
    pub fn needs_native(&self) -> bool {
        matches!(self.crs, TargetCrs::Native) || matches!(self.resolution, Resolution::Native)
    }
}

/// What to compute from the selected bands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutputKind {
    /// Export the selected bands as-is.
    Bands,
    /// `(b1 - b2) / (b1 + b2)` after calibration.
    NormalizedDifference { band1: String, band2: String },
}

impl OutputKind {
    pub fn band_count(&self, selected: usize) -> usize {
        match self {
            OutputKind::Bands => selected.max(1),
            OutputKind::NormalizedDifference { .. } => 1,
        }
    }
}

/// Everything needed to build the image for one product.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductSpec {
    pub product: String,
    pub window: DateWindow,
    pub bands: BandSelection,
    pub reducer: Reducer,
    pub cloud_mask: bool,
    pub calibrate: bool,
}

impl ProductSpec {
    /// Single-date request. The day's images are mosaicked.
    pub fn single_date(product: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            product: product.into(),
            window: DateWindow::single(date),
            bands: BandSelection::All,
            reducer: Reducer::Mosaic,
            cloud_mask: false,
            calibrate: false,
        }
    }

    /// Date-range composite with an explicit reducer.
    pub fn composite(product: impl Into<String>, window: DateWindow, reducer: Reducer) -> Self {
        Self {
            product: product.into(),
            window,
            bands: BandSelection::All,
            reducer,
            cloud_mask: false,
            calibrate: false,
        }
    }

    pub fn with_bands(mut self, bands: BandSelection) -> Self {
        self.bands = bands;
        self
    }

    pub fn with_cloud_mask(mut self, enabled: bool) -> Self {
        self.cloud_mask = enabled;
        self
    }

    pub fn with_calibration(mut self, enabled: bool) -> Self {
        self.calibrate = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        parse_date(s).unwrap()
    }

    #[test]
    fn test_parse_date() {
        assert_eq!(date("2024-01-15"), NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
        assert!(matches!(
            parse_date("15/01/2024"),
            Err(RequestError::InvalidDate(_))
        ));
        assert!(parse_date("2024-02-30").is_err());
    }

    #[test]
    fn test_single_window_is_one_day() {
        let w = DateWindow::single(date("2024-03-01"));
        assert_eq!(w.start(), date("2024-03-01"));
        assert_eq!(w.end(), date("2024-03-02"));
        assert!(w.is_single_day());
    }

    #[test]
    fn test_range_equal_dates_collapses() {
        let w = DateWindow::parse_range("2024-03-01", "2024-03-01").unwrap();
        assert_eq!(w, DateWindow::Single(date("2024-03-01")));
    }

    #[test]
    fn test_range_inverted_rejected() {
        let err = DateWindow::parse_range("2024-03-10", "2024-03-01").unwrap_err();
        assert!(matches!(err, RequestError::InvalidDateRange { .. }));
    }

    #[test]
    fn test_range_end_is_exclusive() {
        let w = DateWindow::parse_range("2024-01-01", "2024-02-01").unwrap();
        assert_eq!(w.end(), date("2024-02-01"));
        assert!(!w.is_single_day());
    }

    #[test]
    fn test_reducer_parse() {
        assert_eq!("Median".parse::<Reducer>().unwrap(), Reducer::Median);
        assert_eq!(" mosaic ".parse::<Reducer>().unwrap(), Reducer::Mosaic);
        assert_eq!(
            "sum".parse::<Reducer>().unwrap_err(),
            RequestError::InvalidReducer("sum".to_string())
        );
    }

    #[test]
    fn test_band_selection() {
        assert_eq!(BandSelection::parse("").unwrap(), BandSelection::All);
        assert_eq!(BandSelection::parse("ALL").unwrap(), BandSelection::All);
        assert_eq!(
            BandSelection::parse("B4, B3,B2").unwrap(),
            BandSelection::Named(vec!["B4".into(), "B3".into(), "B2".into()])
        );
        assert!(BandSelection::parse("B4,,B2").is_err());
    }

    #[test]
    fn test_band_selection_resolve() {
        let available = vec!["B1".to_string(), "B2".to_string()];
        assert_eq!(BandSelection::All.resolve(&available), available);
        assert_eq!(BandSelection::All.first(), None);
    }

    #[test]
    fn test_resolution_parse() {
        assert_eq!("default".parse::<Resolution>().unwrap(), Resolution::Native);
        assert_eq!("30".parse::<Resolution>().unwrap(), Resolution::Meters(30.0));
        assert!("-5".parse::<Resolution>().is_err());
        assert!("abc".parse::<Resolution>().is_err());
    }

    #[test]
    fn test_projection_spec() {
        let spec = ProjectionSpec::parse("EPSG:32720", "10").unwrap();
        assert!(!spec.needs_native());
        assert!(ProjectionSpec::parse("default", "10").unwrap().needs_native());
        assert!(matches!(
            ProjectionSpec::parse("EPSG:9999", "10"),
            Err(RequestError::InvalidProjection(_))
        ));
    }

    #[test]
    fn test_output_band_count() {
        assert_eq!(OutputKind::Bands.band_count(3), 3);
        let nd = OutputKind::NormalizedDifference {
            band1: "B8".into(),
            band2: "B4".into(),
        };
        assert_eq!(nd.band_count(2), 1);
    }
}
