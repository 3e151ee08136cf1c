//! Plan command - show the tile grid for a region without touching the network.

use clap::Args;
use geomosaic::crs::Crs;
use geomosaic::export::PayloadPolicy;
use geomosaic::grid::TileGrid;
use geomosaic::Region;

use super::common::{format_bytes, load_config};
use crate::error::CliError;

#[derive(Debug, Args)]
pub struct PlanArgs {
    /// Bounding box in degrees: min_lon,min_lat,max_lon,max_lat
    #[arg(long, allow_hyphen_values = true)]
    pub bbox: String,

    /// Target CRS (e.g., EPSG:32720, EPSG:4326)
    #[arg(long)]
    pub crs: String,

    /// Pixel size in meters
    #[arg(long)]
    pub scale: f64,

    /// Tile edge in pixels (default from config)
    #[arg(long)]
    pub tile_size: Option<u32>,

    /// Tile ceiling (default from config)
    #[arg(long)]
    pub max_tiles: Option<usize>,

    /// Bands per pixel, used for the payload estimate
    #[arg(long, default_value_t = 3)]
    pub bands: usize,

    /// Print the grid as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: PlanArgs) -> Result<(), CliError> {
    let config = load_config()?;
    let region: Region = args
        .bbox
        .parse()
        .map_err(|e| CliError::Usage(format!("--bbox: {}", e)))?;
    let crs: Crs = args
        .crs
        .parse()
        .map_err(|e| CliError::Usage(format!("--crs: {}", e)))?;
    if !(args.scale.is_finite() && args.scale > 0.0) {
        return Err(CliError::Usage("--scale must be a positive number of meters".to_string()));
    }

    let mut planner = config.grid_planner();
    if let Some(size) = args.tile_size {
        planner = planner.with_tile_size(size);
    }
    if let Some(max) = args.max_tiles {
        planner = planner.with_max_tiles(max);
    }

    let grid = planner
        .plan(&region, crs, crs.meters_to_units(args.scale))
        .map_err(|e| CliError::Pipeline(e.into()))?;

    if args.json {
        let text = serde_json::to_string_pretty(&grid)
            .map_err(|e| CliError::Usage(format!("cannot encode grid: {}", e)))?;
        println!("{}", text);
    } else {
        print!("{}", describe(&grid, &config.payload_policy(), args.bands));
    }
    Ok(())
}

/// Grid summary followed by one line per tile.
fn describe(grid: &TileGrid, policy: &PayloadPolicy, bands: usize) -> String {
    let mut out = String::new();
    out.push_str(&format!("CRS:        {}\n", grid.crs));
    out.push_str(&format!("Scale:      {}\n", grid.scale));
    out.push_str(&format!("Origin:     ({}, {})\n", grid.origin_x, grid.origin_y));
    out.push_str(&format!(
        "Grid:       {} rows x {} cols ({} tiles of {} px)\n",
        grid.rows,
        grid.cols,
        grid.tile_count(),
        grid.tile_size_px
    ));
    out.push('\n');

    for tile in grid.tiles() {
        let estimate = policy.estimate_bounds(&tile.bounds, grid.scale, bands);
        let mode = if policy.decide(&estimate, grid.scale).is_scale() {
            "scale"
        } else {
            "dimensions"
        };
        out.push_str(&format!(
            "  [{:>3}] row {:>2} col {:>2}  ({:.3}, {:.3}) - ({:.3}, {:.3})  {} {}\n",
            tile.index,
            tile.row,
            tile.col,
            tile.bounds.min_x,
            tile.bounds.min_y,
            tile.bounds.max_x,
            tile.bounds.max_y,
            format_bytes(estimate.bytes()),
            mode
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use geomosaic::grid::GridPlanner;

    #[test]
    fn test_describe_lists_every_tile() {
        let region: Region = "-64.30,-31.52,-64.05,-31.30".parse().unwrap();
        let crs: Crs = "EPSG:32720".parse().unwrap();
        let grid = GridPlanner::new(1024, 64).plan(&region, crs, 10.0).unwrap();

        let text = describe(&grid, &PayloadPolicy::default(), 3);
        let tile_lines = text.lines().filter(|l| l.trim_start().starts_with('[')).count();

        assert_eq!(tile_lines, grid.tile_count());
        assert!(text.contains("EPSG:32720"));
        assert!(text
            .lines()
            .filter(|l| l.trim_start().starts_with('['))
            .all(|l| l.ends_with("MiB scale")));
    }
}
