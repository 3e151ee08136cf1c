//! Per-sensor cloud-mask predicates over a quality or classification band.

use serde::Serialize;

use crate::backend::AssetInfo;

/// A pixel predicate evaluated on one quality band.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CloudMask {
    /// Reject pixels whose class value is in `reject_classes`.
    SceneClassification {
        band: String,
        reject_classes: Vec<u32>,
    },
    /// Reject pixels with any `reject_bits` set; require every `require_bits`.
    QaBits {
        band: String,
        reject_bits: Vec<u8>,
        require_bits: Vec<u8>,
    },
    /// MODIS `state_1km` soft mask: rejects definite cloud and cloud shadow only.
    ModisState { band: String },
}

/// Cloud state field (bits 0-1) value meaning "cloudy".
const MODIS_CLOUDY: u32 = 0b01;
const MODIS_SHADOW_BIT: u32 = 2;

impl CloudMask {
    /// Sentinel-2 scene classification: shadow, cloud (medium/high), cirrus, snow.
    pub fn sentinel2_scl() -> Self {
        CloudMask::SceneClassification {
            band: "SCL".to_string(),
            reject_classes: vec![3, 8, 9, 10, 11],
        }
    }

    /// Sentinel-2 `QA60`: opaque cloud (bit 10) and cirrus (bit 11).
    pub fn sentinel2_qa60() -> Self {
        CloudMask::QaBits {
            band: "QA60".to_string(),
            reject_bits: vec![10, 11],
            require_bits: vec![],
        }
    }

    /// Landsat Collection 2 `QA_PIXEL`: dilated cloud, cloud, shadow, snow; requires clear.
    pub fn landsat_qa_pixel() -> Self {
        CloudMask::QaBits {
            band: "QA_PIXEL".to_string(),
            reject_bits: vec![1, 3, 4, 5],
            require_bits: vec![6],
        }
    }

    pub fn modis_state() -> Self {
        CloudMask::ModisState {
            band: "state_1km".to_string(),
        }
    }

    /// Name of the band the predicate reads.
    pub fn band(&self) -> &str {
        match self {
            CloudMask::SceneClassification { band, .. }
            | CloudMask::QaBits { band, .. }
            | CloudMask::ModisState { band } => band,
        }
    }

    /// True if a pixel with quality value `value` survives the mask.
    pub fn keeps(&self, value: u32) -> bool {
        match self {
            CloudMask::SceneClassification { reject_classes, .. } => {
                !reject_classes.contains(&value)
            }
            CloudMask::QaBits {
                reject_bits,
                require_bits,
                ..
            } => {
                let set = |bit: &u8| value & (1 << *bit) != 0;
                !reject_bits.iter().any(set) && require_bits.iter().all(set)
            }
            CloudMask::ModisState { .. } => {
                let cloud_state = value & 0b11;
                let shadow = value & (1 << MODIS_SHADOW_BIT) != 0;
                cloud_state != MODIS_CLOUDY && !shadow
            }
        }
    }
}

/// Preferred mask plus an optional fallback for assets without its band.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudMaskRule {
    pub primary: CloudMask,
    pub fallback: Option<CloudMask>,
}

impl CloudMaskRule {
    pub fn new(primary: CloudMask) -> Self {
        Self {
            primary,
            fallback: None,
        }
    }

    pub fn with_fallback(mut self, fallback: CloudMask) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Picks the mask whose band the asset actually carries.
    ///
    /// Without an asset the primary mask is assumed. Returns `None` when the
    /// asset has neither band.
    pub fn resolve(&self, asset: Option<&AssetInfo>) -> Option<CloudMask> {
        let Some(asset) = asset else {
            return Some(self.primary.clone());
        };

        if asset.has_band(self.primary.band()) {
            return Some(self.primary.clone());
        }
        self.fallback
            .as_ref()
            .filter(|fallback| asset.has_band(fallback.band()))
            .cloned()
    }
}
