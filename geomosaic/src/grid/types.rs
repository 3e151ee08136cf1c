//! Grid value types.

use serde::Serialize;

use crate::crs::{Bounds, Crs};

/// North-up affine transform: `x = origin_x + col*scale`, `y = origin_y - row*scale`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GeoTransform {
    pub scale: f64,
    pub origin_x: f64,
    pub origin_y: f64,
}

impl GeoTransform {
    pub fn new(scale: f64, origin_x: f64, origin_y: f64) -> Self {
        Self {
            scale,
            origin_x,
            origin_y,
        }
    }

    /// Backend order: `[scale, 0, origin_x, 0, -scale, origin_y]`.
    pub fn to_array(&self) -> [f64; 6] {
        [self.scale, 0.0, self.origin_x, 0.0, -self.scale, self.origin_y]
    }

    /// GDAL order: `[origin_x, scale, 0, origin_y, 0, -scale]`.
    pub fn to_gdal(&self) -> [f64; 6] {
        [self.origin_x, self.scale, 0.0, self.origin_y, 0.0, -self.scale]
    }

    /// Parses the backend order, accepting only north-up unrotated transforms.
    pub fn from_array(values: &[f64]) -> Option<Self> {
        match values {
            [sx, rx, ox, ry, sy, oy]
                if *rx == 0.0 && *ry == 0.0 && *sx > 0.0 && (*sx + *sy).abs() < 1e-9 =>
            {
                Some(Self::new(*sx, *ox, *oy))
            }
            _ => None,
        }
    }

    /// CRS coordinate of a pixel corner.
    pub fn pixel_to_world(&self, col: f64, row: f64) -> (f64, f64) {
        (
            self.origin_x + col * self.scale,
            self.origin_y - row * self.scale,
        )
    }
}

/// One cell of a [`TileGrid`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Tile {
    /// Row-major index, starting at 0 in the north-west corner.
    pub index: usize,
    pub row: u32,
    pub col: u32,
    /// Full grid rectangle in target CRS units (never clipped to the region).
    pub bounds: Bounds,
}

/// Pixel-aligned tiling of a region in one CRS.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TileGrid {
    pub crs: Crs,
    pub scale: f64,
    pub origin_x: f64,
    pub origin_y: f64,
    pub rows: u32,
    pub cols: u32,
    pub tile_size_px: u32,
    /// Region envelope in target CRS units before alignment.
    pub region_bounds: Bounds,
}

impl TileGrid {
    /// Transform shared by every tile in the grid.
    pub fn transform(&self) -> GeoTransform {
        GeoTransform::new(self.scale, self.origin_x, self.origin_y)
    }

    pub fn tile_count(&self) -> usize {
        self.rows as usize * self.cols as usize
    }

    /// Edge length of a tile in CRS units.
    pub fn tile_span(&self) -> f64 {
        self.tile_size_px as f64 * self.scale
    }

    /// Tile at `(row, col)`.
    ///
    /// Edges are computed from pixel counts so neighbouring tiles share
    /// bit-identical coordinates.
    pub fn tile(&self, row: u32, col: u32) -> Tile {
        let px = self.tile_size_px as f64;
        let (left, top) = self.transform().pixel_to_world(col as f64 * px, row as f64 * px);
        let (right, bottom) = self
            .transform()
            .pixel_to_world((col + 1) as f64 * px, (row + 1) as f64 * px);

        Tile {
            index: row as usize * self.cols as usize + col as usize,
            row,
            col,
            bounds: Bounds::new(left, bottom, right, top),
        }
    }

    /// All tiles, row-major from north-west to south-east.
    pub fn tiles(&self) -> Vec<Tile> {
        (0..self.rows)
            .flat_map(|row| (0..self.cols).map(move |col| (row, col)))
            .map(|(row, col)| self.tile(row, col))
            .collect()
    }

    /// Rectangle covered by the whole grid.
    pub fn extent(&self) -> Bounds {
        let px = self.tile_size_px as f64;
        let (left, top) = self.transform().pixel_to_world(0.0, 0.0);
        let (right, bottom) = self
            .transform()
            .pixel_to_world(self.cols as f64 * px, self.rows as f64 * px);
        Bounds::new(left, bottom, right, top)
    }
}
