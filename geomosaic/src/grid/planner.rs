//! Grid planning from a region, CRS and scale.

use tracing::debug;

use super::types::TileGrid;
use super::GridError;
use crate::crs::Crs;
use crate::region::Region;

/// Default tile edge in pixels.
pub const DEFAULT_TILE_SIZE_PX: u32 = 1024;

/// Default ceiling on the number of tiles in one batch.
pub const DEFAULT_MAX_TILES: usize = 64;

/// Plans pixel-aligned tile grids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridPlanner {
    tile_size_px: u32,
    max_tiles: usize,
}

impl Default for GridPlanner {
    fn default() -> Self {
        Self {
            tile_size_px: DEFAULT_TILE_SIZE_PX,
            max_tiles: DEFAULT_MAX_TILES,
        }
    }
}

impl GridPlanner {
    pub fn new(tile_size_px: u32, max_tiles: usize) -> Self {
        Self {
            tile_size_px,
            max_tiles,
        }
    }

    pub fn with_tile_size(mut self, tile_size_px: u32) -> Self {
        self.tile_size_px = tile_size_px;
        self
    }

    pub fn with_max_tiles(mut self, max_tiles: usize) -> Self {
        self.max_tiles = max_tiles;
        self
    }

    pub fn tile_size_px(&self) -> u32 {
        self.tile_size_px
    }

    pub fn max_tiles(&self) -> usize {
        self.max_tiles
    }

    /// Computes the grid for `region` in `crs` at `scale` CRS units per pixel.
    ///
    /// The origin depends only on the region and the scale, never on the tile
    /// size. Fails before any network call if the grid exceeds `max_tiles`.
    pub fn plan(&self, region: &Region, crs: Crs, scale: f64) -> Result<TileGrid, GridError> {
        if !scale.is_finite() || scale <= 0.0 {
            return Err(GridError::InvalidScale(scale));
        }
        if self.tile_size_px == 0 {
            return Err(GridError::InvalidTileSize(self.tile_size_px));
        }

        let bounds = crs.project_region(region);

        // Pixel indices of the aligned grid edges.
        let px_min_x = (bounds.min_x / scale).floor();
        let px_max_x = (bounds.max_x / scale).ceil();
        let px_min_y = (bounds.min_y / scale).floor();
        let px_max_y = (bounds.max_y / scale).ceil();

        let width_px = (px_max_x - px_min_x).max(1.0) as u64;
        let height_px = (px_max_y - px_min_y).max(1.0) as u64;
        let tile = self.tile_size_px as u64;

        let cols = width_px.div_ceil(tile).max(1);
        let rows = height_px.div_ceil(tile).max(1);

        if rows.saturating_mul(cols) > self.max_tiles as u64 {
            return Err(GridError::TooManyTiles {
                rows,
                cols,
                max: self.max_tiles,
            });
        }

        let grid = TileGrid {
            crs,
            scale,
            origin_x: px_min_x * scale,
            origin_y: px_max_y * scale,
            rows: rows as u32,
            cols: cols as u32,
            tile_size_px: self.tile_size_px,
            region_bounds: bounds,
        };

        debug!(
            crs = %crs,
            scale,
            origin_x = grid.origin_x,
            origin_y = grid.origin_y,
            rows = grid.rows,
            cols = grid.cols,
            "Planned tile grid"
        );

        Ok(grid)
    }
}
