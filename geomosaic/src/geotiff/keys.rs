//! GeoTIFF key directory (tags 34735, 34736, 34737).

use std::collections::BTreeMap;

use super::GeoTiffError;
use crate::crs::{Crs, MODIS_SPHERE_RADIUS};

/// `GeoKeyDirectoryTag`
pub const TAG_GEO_KEY_DIRECTORY: u16 = 34735;
/// `GeoDoubleParamsTag`
pub const TAG_GEO_DOUBLE_PARAMS: u16 = 34736;
/// `GeoAsciiParamsTag`
pub const TAG_GEO_ASCII_PARAMS: u16 = 34737;

pub const GT_MODEL_TYPE: u16 = 1024;
pub const GT_RASTER_TYPE: u16 = 1025;
pub const GEOGRAPHIC_TYPE: u16 = 2048;
pub const GEOG_CITATION: u16 = 2049;
pub const GEOG_GEODETIC_DATUM: u16 = 2050;
pub const GEOG_ANGULAR_UNITS: u16 = 2054;
pub const GEOG_ELLIPSOID: u16 = 2056;
pub const GEOG_SEMI_MAJOR_AXIS: u16 = 2057;
pub const GEOG_SEMI_MINOR_AXIS: u16 = 2058;
pub const GEOG_INV_FLATTENING: u16 = 2059;
pub const PROJECTED_CS_TYPE: u16 = 3072;
pub const PROJECTION: u16 = 3074;
pub const PROJ_COORD_TRANS: u16 = 3075;
pub const PROJ_LINEAR_UNITS: u16 = 3076;
pub const PROJ_FALSE_EASTING: u16 = 3082;
pub const PROJ_FALSE_NORTHING: u16 = 3083;
pub const PROJ_CENTER_LONG: u16 = 3088;

pub const MODEL_PROJECTED: u16 = 1;
pub const MODEL_GEOGRAPHIC: u16 = 2;
pub const RASTER_PIXEL_IS_AREA: u16 = 1;
pub const USER_DEFINED: u16 = 32767;
pub const CT_SINUSOIDAL: u16 = 24;
pub const LINEAR_METER: u16 = 9001;
pub const ANGULAR_DEGREE: u16 = 9102;

/// Value of one GeoKey.
#[derive(Debug, Clone, PartialEq)]
pub enum GeoKeyValue {
    Short(u16),
    Double(Vec<f64>),
    Ascii(String),
}

/// Parsed GeoKey directory.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GeoKeyDirectory {
    keys: BTreeMap<u16, GeoKeyValue>,
}

impl GeoKeyDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Standard keys describing `crs`.
    pub fn for_crs(crs: Crs) -> Self {
        let mut dir = Self::new();
        dir.set_short(GT_RASTER_TYPE, RASTER_PIXEL_IS_AREA);

        match crs {
            Crs::Geographic => {
                dir.set_short(GT_MODEL_TYPE, MODEL_GEOGRAPHIC);
                dir.set_short(GEOGRAPHIC_TYPE, 4326);
                dir.set_short(GEOG_ANGULAR_UNITS, ANGULAR_DEGREE);
            }
            Crs::WebMercator | Crs::Utm { .. } => {
                dir.set_short(GT_MODEL_TYPE, MODEL_PROJECTED);
                // epsg() is always Some for these variants
                dir.set_short(PROJECTED_CS_TYPE, crs.epsg().unwrap_or(0) as u16);
                dir.set_short(PROJ_LINEAR_UNITS, LINEAR_METER);
            }
            Crs::Sinusoidal => {
                dir.set_short(GT_MODEL_TYPE, MODEL_PROJECTED);
                dir.set_short(PROJECTED_CS_TYPE, USER_DEFINED);
                dir.set_short(PROJECTION, USER_DEFINED);
                dir.set_short(PROJ_COORD_TRANS, CT_SINUSOIDAL);
                dir.set_short(PROJ_LINEAR_UNITS, LINEAR_METER);
                dir.set_double(PROJ_FALSE_EASTING, 0.0);
                dir.set_double(PROJ_FALSE_NORTHING, 0.0);
                dir.set_double(PROJ_CENTER_LONG, 0.0);
                dir.set_sphere(MODIS_SPHERE_RADIUS);
            }
        }
        dir
    }

    /// Parses the raw tag contents.
    pub fn parse(directory: &[u16], doubles: &[f64], ascii: &str) -> Result<Self, GeoTiffError> {
        if directory.len() < 4 {
            return Err(GeoTiffError::InvalidGeoKeys(format!(
                "directory header has {} values",
                directory.len()
            )));
        }

        let count = directory[3] as usize;
        let entries = &directory[4..];
        if entries.len() < count * 4 {
            return Err(GeoTiffError::InvalidGeoKeys(format!(
                "directory declares {} keys but holds {}",
                count,
                entries.len() / 4
            )));
        }

        let mut keys = BTreeMap::new();
        for entry in entries.chunks_exact(4).take(count) {
            let (id, location, n, offset) = (
                entry[0],
                entry[1],
                entry[2] as usize,
                entry[3] as usize,
            );

            let value = match location {
                0 => GeoKeyValue::Short(entry[3]),
                TAG_GEO_DOUBLE_PARAMS => GeoKeyValue::Double(
                    doubles
                        .get(offset..offset + n)
                        .ok_or_else(|| out_of_range(id, "double"))?
                        .to_vec(),
                ),
                TAG_GEO_ASCII_PARAMS => {
                    let text = ascii
                        .get(offset..offset + n)
                        .ok_or_else(|| out_of_range(id, "ascii"))?;
                    GeoKeyValue::Ascii(text.trim_end_matches(['|', '\0']).to_string())
                }
                TAG_GEO_KEY_DIRECTORY => GeoKeyValue::Short(
                    *directory
                        .get(offset)
                        .ok_or_else(|| out_of_range(id, "short"))?,
                ),
                other => {
                    return Err(GeoTiffError::InvalidGeoKeys(format!(
                        "key {} stored in unsupported tag {}",
                        id, other
                    )))
                }
            };
            keys.insert(id, value);
        }

        Ok(Self { keys })
    }

    /// Serializes into `(directory, doubles, ascii)` tag contents.
    pub fn serialize(&self) -> (Vec<u16>, Vec<f64>, String) {
        let mut directory = vec![1, 1, 0, self.keys.len() as u16];
        let mut doubles = Vec::new();
        let mut ascii = String::new();

        for (&id, value) in &self.keys {
            match value {
                GeoKeyValue::Short(v) => directory.extend_from_slice(&[id, 0, 1, *v]),
                GeoKeyValue::Double(values) => {
                    directory.extend_from_slice(&[
                        id,
                        TAG_GEO_DOUBLE_PARAMS,
                        values.len() as u16,
                        doubles.len() as u16,
                    ]);
                    doubles.extend_from_slice(values);
                }
                GeoKeyValue::Ascii(text) => {
                    let entry = format!("{}|", text);
                    directory.extend_from_slice(&[
                        id,
                        TAG_GEO_ASCII_PARAMS,
                        entry.len() as u16,
                        ascii.len() as u16,
                    ]);
                    ascii.push_str(&entry);
                }
            }
        }

        (directory, doubles, ascii)
    }

    pub fn get(&self, id: u16) -> Option<&GeoKeyValue> {
        self.keys.get(&id)
    }

    pub fn get_short(&self, id: u16) -> Option<u16> {
        match self.keys.get(&id)? {
            GeoKeyValue::Short(v) => Some(*v),
            _ => None,
        }
    }

    pub fn get_double(&self, id: u16) -> Option<f64> {
        match self.keys.get(&id)? {
            GeoKeyValue::Double(v) => v.first().copied(),
            _ => None,
        }
    }

    pub fn get_ascii(&self, id: u16) -> Option<&str> {
        match self.keys.get(&id)? {
            GeoKeyValue::Ascii(s) => Some(s),
            _ => None,
        }
    }

    pub fn set_short(&mut self, id: u16, value: u16) {
        self.keys.insert(id, GeoKeyValue::Short(value));
    }

    pub fn set_double(&mut self, id: u16, value: f64) {
        self.keys.insert(id, GeoKeyValue::Double(vec![value]));
    }

    pub fn set_ascii(&mut self, id: u16, value: impl Into<String>) {
        self.keys.insert(id, GeoKeyValue::Ascii(value.into()));
    }

    pub fn remove(&mut self, id: u16) -> Option<GeoKeyValue> {
        self.keys.remove(&id)
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Replaces the geographic model with a user-defined sphere of `radius`.
    pub fn set_sphere(&mut self, radius: f64) {
        self.set_short(GEOGRAPHIC_TYPE, USER_DEFINED);
        self.set_short(GEOG_GEODETIC_DATUM, USER_DEFINED);
        self.set_short(GEOG_ELLIPSOID, USER_DEFINED);
        self.set_short(GEOG_ANGULAR_UNITS, ANGULAR_DEGREE);
        self.set_double(GEOG_SEMI_MAJOR_AXIS, radius);
        self.set_double(GEOG_SEMI_MINOR_AXIS, radius);
        self.remove(GEOG_INV_FLATTENING);
    }

    /// True if the geographic model is a sphere of `radius` meters.
    pub fn is_sphere(&self, radius: f64) -> bool {
        let close = |v: Option<f64>| v.is_some_and(|v| (v - radius).abs() < 1e-3);
        close(self.get_double(GEOG_SEMI_MAJOR_AXIS))
            && close(self.get_double(GEOG_SEMI_MINOR_AXIS))
            && self.get_double(GEOG_INV_FLATTENING).map_or(true, |f| f == 0.0)
    }

    /// The CRS these keys describe, if it is one this crate knows.
    pub fn crs(&self) -> Option<Crs> {
        if self.get_short(PROJ_COORD_TRANS) == Some(CT_SINUSOIDAL) {
            return Some(Crs::Sinusoidal);
        }
        match self.get_short(GT_MODEL_TYPE)? {
            MODEL_GEOGRAPHIC if self.get_short(GEOGRAPHIC_TYPE) == Some(4326) => {
                Some(Crs::Geographic)
            }
            MODEL_PROJECTED => {
                let code = self.get_short(PROJECTED_CS_TYPE)?;
                format!("EPSG:{}", code).parse().ok()
            }
            _ => None,
        }
    }
}

fn out_of_range(id: u16, kind: &str) -> GeoTiffError {
    GeoTiffError::InvalidGeoKeys(format!("key {} points outside the {} params", id, kind))
}
