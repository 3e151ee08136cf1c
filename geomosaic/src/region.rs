//! Bounding box parsing and validation.
//!
//! Regions are always WGS84 longitude/latitude rectangles with planar
//! (non-geodesic) edges. Parsing rejects anything that does not look like
//! four degree values in `xmin,ymin,xmax,ymax` order.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;

/// Largest absolute X magnitude accepted before assuming projected meters.
pub const MAX_ABS_X_DEGREES: f64 = 360.0;

/// Largest absolute Y magnitude accepted before assuming projected meters.
pub const MAX_ABS_Y_DEGREES: f64 = 180.0;

/// Errors produced while parsing a bounding box.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RegionError {
    /// The input is not exactly four finite numbers.
    #[error("invalid bbox format '{0}': expected 'xmin,ymin,xmax,ymax'")]
    InvalidBBoxFormat(String),

    /// The rectangle is empty or inverted.
    #[error("invalid bbox dimensions: xmin={xmin}, ymin={ymin}, xmax={xmax}, ymax={ymax} (need xmin < xmax and ymin < ymax)")]
    InvalidBBoxDimensions {
        xmin: f64,
        ymin: f64,
        xmax: f64,
        ymax: f64,
    },

    /// The magnitudes look like projected meters rather than degrees.
    #[error("bbox values look like projected coordinates, not degrees: x up to {max_abs_x}, y up to {max_abs_y}")]
    UnitMismatch { max_abs_x: f64, max_abs_y: f64 },
}

/// A validated WGS84 rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Region {
    xmin: f64,
    ymin: f64,
    xmax: f64,
    ymax: f64,
}

impl Region {
    /// Creates a region after validating ordering and units.
    pub fn new(xmin: f64, ymin: f64, xmax: f64, ymax: f64) -> Result<Self, RegionError> {
        if ![xmin, ymin, xmax, ymax].iter().all(|v| v.is_finite()) {
            return Err(RegionError::InvalidBBoxFormat(format!(
                "{},{},{},{}",
                xmin, ymin, xmax, ymax
            )));
        }

        if xmin >= xmax || ymin >= ymax {
            return Err(RegionError::InvalidBBoxDimensions {
                xmin,
                ymin,
                xmax,
                ymax,
            });
        }

        let max_abs_x = xmin.abs().max(xmax.abs());
        let max_abs_y = ymin.abs().max(ymax.abs());
        if max_abs_x > MAX_ABS_X_DEGREES || max_abs_y > MAX_ABS_Y_DEGREES {
            return Err(RegionError::UnitMismatch {
                max_abs_x,
                max_abs_y,
            });
        }

        Ok(Self {
            xmin,
            ymin,
            xmax,
            ymax,
        })
    }

    /// Parses `"xmin,ymin,xmax,ymax"`.
    ///
    /// Surrounding brackets and whitespace are tolerated so that a JSON-ish
    /// `[a, b, c, d]` string also parses.
    pub fn parse(input: &str) -> Result<Self, RegionError> {
        let trimmed = input
            .trim()
            .trim_start_matches('[')
            .trim_end_matches(']')
            .trim();

        let values: Vec<f64> = trimmed
            .split(',')
            .map(|part| part.trim().parse::<f64>())
            .collect::<Result<_, _>>()
            .map_err(|_| RegionError::InvalidBBoxFormat(input.to_string()))?;

        Self::from_slice(&values).map_err(|e| match e {
            RegionError::InvalidBBoxFormat(_) => RegionError::InvalidBBoxFormat(input.to_string()),
            other => other,
        })
    }

    /// Builds a region from a slice that must hold exactly four values.
    pub fn from_slice(values: &[f64]) -> Result<Self, RegionError> {
        match values {
            [xmin, ymin, xmax, ymax] => Self::new(*xmin, *ymin, *xmax, *ymax),
            _ => Err(RegionError::InvalidBBoxFormat(
                values
                    .iter()
                    .map(|v| v.to_string())
                    .collect::<Vec<_>>()
                    .join(","),
            )),
        }
    }

    pub fn xmin(&self) -> f64 {
        self.xmin
    }

    pub fn ymin(&self) -> f64 {
        self.ymin
    }

    pub fn xmax(&self) -> f64 {
        self.xmax
    }

    pub fn ymax(&self) -> f64 {
        self.ymax
    }

    /// Width in degrees of longitude.
    pub fn width_deg(&self) -> f64 {
        self.xmax - self.xmin
    }

    /// Height in degrees of latitude.
    pub fn height_deg(&self) -> f64 {
        self.ymax - self.ymin
    }

    /// Center as `(lon, lat)`.
    pub fn center(&self) -> (f64, f64) {
        (
            (self.xmin + self.xmax) / 2.0,
            (self.ymin + self.ymax) / 2.0,
        )
    }

    /// Regions are planar rectangles, never geodesic polygons.
    pub fn is_geodesic(&self) -> bool {
        false
    }

    /// The four values in `[xmin, ymin, xmax, ymax]` order.
    pub fn to_array(&self) -> [f64; 4] {
        [self.xmin, self.ymin, self.xmax, self.ymax]
    }

    /// Query-string form used by the backend (`xmin,ymin,xmax,ymax`).
    pub fn to_query_string(&self) -> String {
        format!("{},{},{},{}", self.xmin, self.ymin, self.xmax, self.ymax)
    }
}

impl FromStr for Region {
    type Err = RegionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.to_query_string())
    }
}
