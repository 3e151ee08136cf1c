//! Product families and their calibration and cloud-mask rules.

use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use super::cloud_mask::{CloudMask, CloudMaskRule};

/// Sensor family a product identifier belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductFamily {
    Sentinel2,
    LandsatC2L2,
    ModisSurfaceReflectance,
    ModisLst,
    Unrecognized,
}

fn landsat_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"LANDSAT/L[CTE]0\d/C02/T[12]_L2").unwrap())
}

fn sentinel2_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"COPERNICUS/S2(_SR)?(_HARMONIZED)?$").unwrap())
}

fn modis_pattern() -> &'static Regex {
    // Group 1: product number (09 = surface reflectance, 11 = LST)
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"MODIS/\d{3}/M[OY]D(09|11)[A-Z0-9]*$").unwrap())
}

impl ProductFamily {
    /// Classifies a product identifier.
    pub fn detect(product: &str) -> Self {
        let product = product.trim();

        if sentinel2_pattern().is_match(product) {
            return ProductFamily::Sentinel2;
        }
        if landsat_pattern().is_match(product) {
            return ProductFamily::LandsatC2L2;
        }
        if let Some(caps) = modis_pattern().captures(product) {
            return match caps.get(1).map(|m| m.as_str()) {
                Some("09") => ProductFamily::ModisSurfaceReflectance,
                Some("11") => ProductFamily::ModisLst,
                _ => ProductFamily::Unrecognized,
            };
        }
        ProductFamily::Unrecognized
    }

    pub fn name(&self) -> &'static str {
        match self {
            ProductFamily::Sentinel2 => "sentinel2",
            ProductFamily::LandsatC2L2 => "landsat_c2_l2",
            ProductFamily::ModisSurfaceReflectance => "modis_sr",
            ProductFamily::ModisLst => "modis_lst",
            ProductFamily::Unrecognized => "unrecognized",
        }
    }
}

impl fmt::Display for ProductFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Linear calibration for every band whose name starts with `prefix`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BandRule {
    pub prefix: &'static str,
    pub scale: f64,
    pub offset: f64,
}

impl BandRule {
    pub const fn new(prefix: &'static str, scale: f64, offset: f64) -> Self {
        Self {
            prefix,
            scale,
            offset,
        }
    }
}

/// Calibration table plus cloud-mask rule for one family.
#[derive(Debug, Clone, PartialEq)]
pub struct FamilyRules {
    pub family: ProductFamily,
    pub calibration: Vec<BandRule>,
    pub cloud_mask: Option<CloudMaskRule>,
}

impl FamilyRules {
    /// Rules for an unrecognized product: no scaling, no masking.
    pub fn passthrough() -> Self {
        Self {
            family: ProductFamily::Unrecognized,
            calibration: Vec::new(),
            cloud_mask: None,
        }
    }

    /// `(scale, offset)` from the table, `(1.0, 0.0)` when no rule matches.
    pub fn table_scale_offset(&self, band: &str) -> (f64, f64) {
        self.calibration
            .iter()
            .find(|rule| band.starts_with(rule.prefix))
            .map(|rule| (rule.scale, rule.offset))
            .unwrap_or((1.0, 0.0))
    }
}

/// Lookup from product family to its rules.
#[derive(Debug, Clone)]
pub struct FamilyRegistry {
    rules: HashMap<ProductFamily, FamilyRules>,
}

impl Default for FamilyRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl FamilyRegistry {
    /// Empty registry: every product passes through.
    pub fn empty() -> Self {
        Self {
            rules: HashMap::new(),
        }
    }

    /// Documented rules for the supported families.
    pub fn standard() -> Self {
        Self::empty()
            .with(FamilyRules {
                family: ProductFamily::Sentinel2,
                calibration: vec![BandRule::new("B", 0.0001, 0.0)],
                cloud_mask: Some(
                    CloudMaskRule::new(CloudMask::sentinel2_scl())
                        .with_fallback(CloudMask::sentinel2_qa60()),
                ),
            })
            .with(FamilyRules {
                family: ProductFamily::LandsatC2L2,
                calibration: vec![
                    BandRule::new("SR_B", 0.0000275, -0.2),
                    BandRule::new("ST_B", 0.00341802, 149.0),
                ],
                cloud_mask: Some(CloudMaskRule::new(CloudMask::landsat_qa_pixel())),
            })
            .with(FamilyRules {
                family: ProductFamily::ModisSurfaceReflectance,
                calibration: vec![BandRule::new("sur_refl_b", 0.0001, 0.0)],
                cloud_mask: Some(CloudMaskRule::new(CloudMask::modis_state())),
            })
            .with(FamilyRules {
                family: ProductFamily::ModisLst,
                calibration: vec![
                    BandRule::new("LST_", 0.02, 0.0),
                    BandRule::new("Emis_", 0.002, 0.49),
                ],
                cloud_mask: None,
            })
    }

    pub fn with(mut self, rules: FamilyRules) -> Self {
        self.rules.insert(rules.family, rules);
        self
    }

    /// Resolves the rules for a product once per request.
    pub fn resolve(&self, product: &str) -> FamilyRules {
        let family = ProductFamily::detect(product);
        self.rules
            .get(&family)
            .cloned()
            .unwrap_or_else(|| FamilyRules {
                family,
                ..FamilyRules::passthrough()
            })
    }
}
