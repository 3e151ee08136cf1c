//! geomosaic - tiled raster acquisition and seamless mosaicking
//!
//! This library turns a (product, bounding box, date/range, resolution,
//! projection) request into a batch of pixel-aligned export requests against
//! a remote geospatial compute backend, downloads the resulting tiles and
//! merges them into a single gapless GeoTIFF.
//!
//! # Pipeline
//!
//! ```text
//! Region::parse ──► NativeProjectionResolver ──► GridPlanner
//!                                                   │
//!                         RadiometricCalibrator ──► ExportRequestBuilder
//!                                                   │
//!                    TileFetcher (N requests) ◄─────┘
//!                         │
//!                    TileDownloader (N files) ──► MosaicMerger (1 file)
//! ```
//!
//! The [`executor::Executor`] wraps the pipeline behind the action-descriptor
//! contract used by the job-execution layer: it always returns either a local
//! merged raster path or a human-readable failure string.

pub mod backend;
pub mod calibration;
pub mod config;
pub mod crs;
pub mod download;
pub mod error;
pub mod executor;
pub mod export;
pub mod fetch;
pub mod geotiff;
pub mod grid;
pub mod logging;
pub mod mosaic;
pub mod pipeline;
pub mod projection;
pub mod region;
pub mod request;

pub use error::{PipelineError, PipelineResult};
pub use executor::{ActionDescriptor, ActionOutcome, Executor};
pub use region::Region;
