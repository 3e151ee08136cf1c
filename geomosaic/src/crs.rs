//! Coordinate reference systems and forward projection from WGS84.
//!
//! Only the projections the compute backend hands out as product-native
//! systems (or accepts as explicit targets) are supported:
//!
//! - `EPSG:4326` geographic lon/lat (identity)
//! - `EPSG:3857` spherical Web Mercator
//! - `EPSG:326xx` / `EPSG:327xx` UTM north/south on the WGS84 ellipsoid
//! - `SR-ORG:6974` MODIS sinusoidal on a sphere
//!
//! UTM formulas follow Snyder 1987 (USGS Prof. Paper 1395, pp. 61-64).

use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::region::Region;

// WGS84 ellipsoid
const A: f64 = 6_378_137.0;
const F: f64 = 1.0 / 298.257_223_563;
const E2: f64 = 2.0 * F - F * F;
const E_PRIME2: f64 = E2 / (1.0 - E2);
const K0: f64 = 0.9996;
const FALSE_EASTING: f64 = 500_000.0;
const FALSE_NORTHING_SOUTH: f64 = 10_000_000.0;

/// Radius of the sphere used by the MODIS sinusoidal grid.
pub const MODIS_SPHERE_RADIUS: f64 = 6_371_007.181;

/// Latitude limit of the Web Mercator projection.
pub const WEB_MERCATOR_MAX_LAT: f64 = 85.051_128_78;

/// Meters per degree along the equator on the WGS84 ellipsoid.
pub const METERS_PER_DEGREE: f64 = 111_319.490_793_273_57;

/// Samples taken along each region edge when reprojecting bounds.
const EDGE_SAMPLES: usize = 16;

/// Errors produced while parsing or using a CRS.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CrsError {
    /// The CRS code is syntactically fine but not supported here.
    #[error("unsupported CRS '{0}' (supported: EPSG:4326, EPSG:3857, EPSG:326xx, EPSG:327xx, SR-ORG:6974)")]
    Unsupported(String),
}

/// Axis-aligned rectangle in some CRS's units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Bounds {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// True if `other` lies entirely inside (or on the edge of) `self`.
    pub fn contains(&self, other: &Bounds) -> bool {
        other.min_x >= self.min_x
            && other.max_x <= self.max_x
            && other.min_y >= self.min_y
            && other.max_y <= self.max_y
    }

    /// Smallest rectangle covering both inputs.
    pub fn union(&self, other: &Bounds) -> Bounds {
        Bounds::new(
            self.min_x.min(other.min_x),
            self.min_y.min(other.min_y),
            self.max_x.max(other.max_x),
            self.max_y.max(other.max_y),
        )
    }

    pub fn to_array(&self) -> [f64; 4] {
        [self.min_x, self.min_y, self.max_x, self.max_y]
    }
}

/// A supported coordinate reference system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Crs {
    /// WGS84 longitude/latitude (EPSG:4326).
    Geographic,
    /// Spherical Web Mercator (EPSG:3857).
    WebMercator,
    /// Universal Transverse Mercator zone on WGS84.
    Utm { zone: u8, north: bool },
    /// MODIS sinusoidal (SR-ORG:6974).
    Sinusoidal,
}

impl Crs {
    /// Canonical code string understood by the backend.
    pub fn code(&self) -> String {
        match self {
            Crs::Geographic => "EPSG:4326".to_string(),
            Crs::WebMercator => "EPSG:3857".to_string(),
            Crs::Utm { zone, north: true } => format!("EPSG:{}", 32600 + *zone as u32),
            Crs::Utm { zone, north: false } => format!("EPSG:{}", 32700 + *zone as u32),
            Crs::Sinusoidal => "SR-ORG:6974".to_string(),
        }
    }

    /// EPSG code, if the CRS has one.
    pub fn epsg(&self) -> Option<u32> {
        match self {
            Crs::Geographic => Some(4326),
            Crs::WebMercator => Some(3857),
            Crs::Utm { zone, north: true } => Some(32600 + *zone as u32),
            Crs::Utm { zone, north: false } => Some(32700 + *zone as u32),
            Crs::Sinusoidal => None,
        }
    }

    /// Geographic systems measure in degrees, all others in meters.
    pub fn is_geographic(&self) -> bool {
        matches!(self, Crs::Geographic)
    }

    /// Converts a ground resolution in meters into this CRS's units.
    pub fn meters_to_units(&self, meters: f64) -> f64 {
        if self.is_geographic() {
            meters / METERS_PER_DEGREE
        } else {
            meters
        }
    }

    /// Projects a WGS84 `(lon, lat)` pair in degrees into this CRS.
    pub fn project(&self, lon: f64, lat: f64) -> (f64, f64) {
        match *self {
            Crs::Geographic => (lon, lat),
            Crs::WebMercator => web_mercator(lon, lat),
            Crs::Utm { zone, north } => wgs84_to_utm(lon, lat, zone, north),
            Crs::Sinusoidal => sinusoidal(lon, lat),
        }
    }

    /// Reprojects a WGS84 region and returns the envelope in this CRS.
    ///
    /// Every edge is densified before projecting so curved edges (UTM far
    /// from the central meridian, sinusoidal) are still fully enclosed.
    pub fn project_region(&self, region: &Region) -> Bounds {
        if self.is_geographic() {
            return Bounds::new(region.xmin(), region.ymin(), region.xmax(), region.ymax());
        }

        let mut min_x = f64::MAX;
        let mut min_y = f64::MAX;
        let mut max_x = f64::MIN;
        let mut max_y = f64::MIN;

        let mut include = |lon: f64, lat: f64| {
            let (x, y) = self.project(lon, lat);
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        };

        for i in 0..=EDGE_SAMPLES {
            let t = i as f64 / EDGE_SAMPLES as f64;
            let lon = region.xmin() + t * region.width_deg();
            let lat = region.ymin() + t * region.height_deg();
            include(lon, region.ymin());
            include(lon, region.ymax());
            include(region.xmin(), lat);
            include(region.xmax(), lat);
        }

        Bounds::new(min_x, min_y, max_x, max_y)
    }
}

impl FromStr for Crs {
    type Err = CrsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim().to_ascii_uppercase();

        if code == "SR-ORG:6974" {
            return Ok(Crs::Sinusoidal);
        }

        let epsg = code
            .strip_prefix("EPSG:")
            .and_then(|n| n.parse::<u32>().ok())
            .ok_or_else(|| CrsError::Unsupported(s.to_string()))?;

        match epsg {
            4326 => Ok(Crs::Geographic),
            3857 => Ok(Crs::WebMercator),
            32601..=32660 => Ok(Crs::Utm {
                zone: (epsg - 32600) as u8,
                north: true,
            }),
            32701..=32760 => Ok(Crs::Utm {
                zone: (epsg - 32700) as u8,
                north: false,
            }),
            _ => Err(CrsError::Unsupported(s.to_string())),
        }
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl Serialize for Crs {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.code())
    }
}

impl<'de> Deserialize<'de> for Crs {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code = String::deserialize(deserializer)?;
        code.parse().map_err(serde::de::Error::custom)
    }
}

fn web_mercator(lon: f64, lat: f64) -> (f64, f64) {
    let lat = lat.clamp(-WEB_MERCATOR_MAX_LAT, WEB_MERCATOR_MAX_LAT);
    let x = A * lon.to_radians();
    let y = A * (PI / 4.0 + lat.to_radians() / 2.0).tan().ln();
    (x, y)
}

fn sinusoidal(lon: f64, lat: f64) -> (f64, f64) {
    let lat_rad = lat.to_radians();
    let x = MODIS_SPHERE_RADIUS * lon.to_radians() * lat_rad.cos();
    let y = MODIS_SPHERE_RADIUS * lat_rad;
    (x, y)
}

/// WGS84 `(lon, lat)` in degrees to UTM `(easting, northing)` in meters.
fn wgs84_to_utm(lon_deg: f64, lat_deg: f64, zone: u8, north: bool) -> (f64, f64) {
    let lat = lat_deg.to_radians();
    let lon = lon_deg.to_radians();
    let lon0 = ((zone as f64 - 1.0) * 6.0 - 180.0 + 3.0).to_radians();

    let sin_lat = lat.sin();
    let cos_lat = lat.cos();
    let tan_lat = lat.tan();

    let n = A / (1.0 - E2 * sin_lat * sin_lat).sqrt();
    let t = tan_lat * tan_lat;
    let c = E_PRIME2 * cos_lat * cos_lat;
    let a = cos_lat * (lon - lon0);
    let m = meridional_arc(lat);

    let a2 = a * a;
    let a4 = a2 * a2;
    let a6 = a4 * a2;

    let easting = K0
        * n
        * (a + (1.0 - t + c) * a2 * a / 6.0
            + (5.0 - 18.0 * t + t * t + 72.0 * c - 58.0 * E_PRIME2) * a4 * a / 120.0)
        + FALSE_EASTING;

    let northing = K0
        * (m + n
            * tan_lat
            * (a2 / 2.0
                + (5.0 - t + 9.0 * c + 4.0 * c * c) * a4 / 24.0
                + (61.0 - 58.0 * t + t * t + 600.0 * c - 330.0 * E_PRIME2) * a6 / 720.0));

    if north {
        (easting, northing)
    } else {
        (easting, northing + FALSE_NORTHING_SOUTH)
    }
}

/// Meridional arc from the equator to `lat` (radians), Snyder eq. 3-21.
fn meridional_arc(lat: f64) -> f64 {
    let e4 = E2 * E2;
    let e6 = e4 * E2;

    A * ((1.0 - E2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0) * lat
        - (3.0 * E2 / 8.0 + 3.0 * e4 / 32.0 + 45.0 * e6 / 1024.0) * (2.0 * lat).sin()
        + (15.0 * e4 / 256.0 + 45.0 * e6 / 1024.0) * (4.0 * lat).sin()
        - (35.0 * e6 / 3072.0) * (6.0 * lat).sin())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_parse_codes() {
        assert_eq!("EPSG:4326".parse::<Crs>().unwrap(), Crs::Geographic);
        assert_eq!("epsg:3857".parse::<Crs>().unwrap(), Crs::WebMercator);
        assert_eq!(
            "EPSG:32720".parse::<Crs>().unwrap(),
            Crs::Utm {
                zone: 20,
                north: false
            }
        );
        assert_eq!(
            "EPSG:32630".parse::<Crs>().unwrap(),
            Crs::Utm {
                zone: 30,
                north: true
            }
        );
        assert_eq!("SR-ORG:6974".parse::<Crs>().unwrap(), Crs::Sinusoidal);
    }

    #[test]
    fn test_parse_unsupported() {
        assert!(matches!(
            "EPSG:32600".parse::<Crs>(),
            Err(CrsError::Unsupported(_))
        ));
        assert!(matches!(
            "EPSG:2193".parse::<Crs>(),
            Err(CrsError::Unsupported(_))
        ));
        assert!(matches!("default".parse::<Crs>(), Err(CrsError::Unsupported(_))));
    }

    #[test]
    fn test_code_round_trip() {
        for code in ["EPSG:4326", "EPSG:3857", "EPSG:32721", "EPSG:32601", "SR-ORG:6974"] {
            let crs: Crs = code.parse().unwrap();
            assert_eq!(crs.code(), code);
        }
    }

    // Reference: pyproj Transformer 4326 -> 32630, (-3.7037, 40.4168)
    #[test]
    fn test_madrid_utm30n() {
        let (e, n) = Crs::Utm {
            zone: 30,
            north: true,
        }
        .project(-3.7037, 40.4168);
        assert_abs_diff_eq!(e, 440_298.94, epsilon = 1.0);
        assert_abs_diff_eq!(n, 4_474_257.31, epsilon = 1.0);
    }

    // Reference: pyproj Transformer 4326 -> 32721, (-58.3816, -34.6037)
    #[test]
    fn test_buenos_aires_utm21s() {
        let (e, n) = Crs::Utm {
            zone: 21,
            north: false,
        }
        .project(-58.3816, -34.6037);
        assert_abs_diff_eq!(e, 373_317.50, epsilon = 1.0);
        assert_abs_diff_eq!(n, 6_170_036.17, epsilon = 1.0);
    }

    #[test]
    fn test_web_mercator_origin_and_edge() {
        let (x, y) = Crs::WebMercator.project(0.0, 0.0);
        assert_abs_diff_eq!(x, 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(y, 0.0, epsilon = 1e-6);

        let (x, _) = Crs::WebMercator.project(180.0, 0.0);
        assert_abs_diff_eq!(x, 20_037_508.342789244, epsilon = 1e-3);
    }

    #[test]
    fn test_sinusoidal_shrinks_with_latitude() {
        let (x_eq, _) = Crs::Sinusoidal.project(10.0, 0.0);
        let (x_60, y_60) = Crs::Sinusoidal.project(10.0, 60.0);
        assert_abs_diff_eq!(x_60, x_eq * 0.5, epsilon = 1e-6);
        assert_abs_diff_eq!(y_60, MODIS_SPHERE_RADIUS * 60f64.to_radians(), epsilon = 1e-6);
    }

    #[test]
    fn test_project_region_geographic_is_identity() {
        let region = Region::new(-3.75, 40.40, -3.70, 40.45).unwrap();
        let bounds = Crs::Geographic.project_region(&region);
        assert_eq!(bounds, Bounds::new(-3.75, 40.40, -3.70, 40.45));
    }

    #[test]
    fn test_project_region_utm_encloses_corners() {
        let region = Region::new(-64.30, -31.52, -64.05, -31.30).unwrap();
        let crs = Crs::Utm {
            zone: 20,
            north: false,
        };
        let bounds = crs.project_region(&region);

        for (lon, lat) in [
            (-64.30, -31.52),
            (-64.30, -31.30),
            (-64.05, -31.52),
            (-64.05, -31.30),
        ] {
            let (x, y) = crs.project(lon, lat);
            assert!(x >= bounds.min_x && x <= bounds.max_x);
            assert!(y >= bounds.min_y && y <= bounds.max_y);
        }

        assert!(bounds.width() > 23_000.0 && bounds.width() < 25_000.0);
        assert!(bounds.height() > 24_000.0 && bounds.height() < 25_000.0);
    }

    #[test]
    fn test_meters_to_units() {
        assert_eq!(Crs::WebMercator.meters_to_units(10.0), 10.0);
        assert_abs_diff_eq!(
            Crs::Geographic.meters_to_units(METERS_PER_DEGREE),
            1.0,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_serde_as_code_string() {
        let json = serde_json::to_string(&Crs::Utm {
            zone: 20,
            north: false,
        })
        .unwrap();
        assert_eq!(json, "\"EPSG:32720\"");
        let back: Crs = serde_json::from_str(&json).unwrap();
        assert_eq!(
            back,
            Crs::Utm {
                zone: 20,
                north: false
            }
        );
    }

    #[test]
    fn test_bounds_union_and_contains() {
        let a = Bounds::new(0.0, 0.0, 1.0, 1.0);
        let b = Bounds::new(1.0, -1.0, 2.0, 0.5);
        let u = a.union(&b);
        assert_eq!(u, Bounds::new(0.0, -1.0, 2.0, 1.0));
        assert!(u.contains(&a));
        assert!(u.contains(&b));
        assert!(!a.contains(&b));
    }
}
