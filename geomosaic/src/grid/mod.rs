//! Pixel-aligned tile grids.
//!
//! A request's region is reprojected into the target CRS and covered by a
//! grid whose origin sits on a multiple of the pixel scale. Every tile of the
//! grid shares one affine transform, which is what lets independently
//! exported tiles merge without seams.
//!
//! ```text
//!  origin (x0, y0)
//!     ┌────────┬────────┬────────┐
//!     │ (0,0)  │ (0,1)  │ (0,2)  │   row 0
//!     ├────────┼────────┼────────┤
//!     │ (1,0)  │ (1,1)  │ (1,2)  │   row 1
//!     └────────┴────────┴────────┘
//!      tile edge = tile_size_px * scale
//! ```
//!
//! Tiles are the full grid rectangles. They are never intersected with the
//! region; the region clip is applied once to the image before export.

mod planner;
mod types;

pub use planner::{GridPlanner, DEFAULT_MAX_TILES, DEFAULT_TILE_SIZE_PX};
pub use types::{GeoTransform, Tile, TileGrid};

use thiserror::Error;

/// Errors produced while planning a grid.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GridError {
    #[error("invalid pixel scale {0}: must be a positive finite number")]
    InvalidScale(f64),

    #[error("invalid tile size {0} px: must be at least 1")]
    InvalidTileSize(u32),

    #[error("grid of {rows} x {cols} tiles exceeds the limit of {max} tiles")]
    TooManyTiles { rows: u64, cols: u64, max: usize },
}
