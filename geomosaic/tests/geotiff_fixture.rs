//! Reading GeoTIFFs that were not produced by this crate.
//!
//! The fixtures are assembled byte by byte the way the backend's exporter
//! lays them out: little-endian, one strip, pixel-interleaved UInt16 bands
//! with PhotometricInterpretation=MinIsBlack, and the GeoTIFF tags written
//! by number.
//!
//! Run with: `cargo test --test geotiff_fixture`

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use geomosaic::crs::Crs;
use geomosaic::download::{DownloadedTile, RunTag};
use geomosaic::geotiff::{read_geotiff, read_header, RasterTransform};
use geomosaic::mosaic::MosaicMerger;

// ============================================================================
// Fixture builder
// ============================================================================

const SHORT: u16 = 3;
const LONG: u16 = 4;
const ASCII: u16 = 2;
const DOUBLE: u16 = 12;

const WIDTH: u32 = 4;
const HEIGHT: u32 = 3;
const BANDS: usize = 3;
const PIXEL: f64 = 10.0;

struct Entry {
    tag: u16,
    kind: u16,
    count: u32,
    data: Vec<u8>,
}

fn shorts(tag: u16, values: &[u16]) -> Entry {
    Entry {
        tag,
        kind: SHORT,
        count: values.len() as u32,
        data: values.iter().flat_map(|v| v.to_le_bytes()).collect(),
    }
}

fn longs(tag: u16, values: &[u32]) -> Entry {
    Entry {
        tag,
        kind: LONG,
        count: values.len() as u32,
        data: values.iter().flat_map(|v| v.to_le_bytes()).collect(),
    }
}

fn doubles(tag: u16, values: &[f64]) -> Entry {
    Entry {
        tag,
        kind: DOUBLE,
        count: values.len() as u32,
        data: values.iter().flat_map(|v| v.to_le_bytes()).collect(),
    }
}

fn ascii(tag: u16, text: &str) -> Entry {
    let mut data = text.as_bytes().to_vec();
    data.push(0);
    Entry {
        tag,
        kind: ASCII,
        count: data.len() as u32,
        data,
    }
}

/// Sample value of band `band` at pixel `(col, row)` of a tile whose
/// samples start at `base`.
fn sample(base: u16, col: u32, row: u32, band: usize) -> u16 {
    base + (row * WIDTH + col) as u16 * 10 + band as u16 * 1000
}

/// A UTM 20S tile whose upper-left corner is `(origin_x, origin_y)`.
fn utm_tile(origin_x: f64, origin_y: f64, base: u16) -> Vec<u8> {
    let mut pixels = Vec::new();
    for row in 0..HEIGHT {
        for col in 0..WIDTH {
            for band in 0..BANDS {
                pixels.extend_from_slice(&sample(base, col, row, band).to_le_bytes());
            }
        }
    }

    let entries = vec![
        longs(256, &[WIDTH]),
        longs(257, &[HEIGHT]),
        shorts(258, &[16; BANDS]),
        shorts(259, &[1]),
        shorts(262, &[1]),
        longs(273, &[8]),
        shorts(277, &[BANDS as u16]),
        longs(278, &[HEIGHT]),
        longs(279, &[pixels.len() as u32]),
        shorts(284, &[1]),
        shorts(339, &[1; BANDS]),
        doubles(33550, &[PIXEL, PIXEL, 0.0]),
        doubles(33922, &[0.0, 0.0, 0.0, origin_x, origin_y, 0.0]),
        // ModelType=Projected, RasterType=PixelIsArea, EPSG:32720, metre
        shorts(
            34735,
            &[
                1, 1, 0, 4, //
                1024, 0, 1, 1, //
                1025, 0, 1, 1, //
                3072, 0, 1, 32720, //
                3076, 0, 1, 9001,
            ],
        ),
        ascii(42113, "0"),
    ];

    let ifd_offset = 8 + pixels.len();
    let mut out_of_line = ifd_offset + 2 + entries.len() * 12 + 4;

    let mut bytes = Vec::new();
    bytes.extend_from_slice(b"II");
    bytes.extend_from_slice(&42u16.to_le_bytes());
    bytes.extend_from_slice(&(ifd_offset as u32).to_le_bytes());
    bytes.extend_from_slice(&pixels);

    let mut extra = Vec::new();
    bytes.extend_from_slice(&(entries.len() as u16).to_le_bytes());
    for entry in &entries {
        bytes.extend_from_slice(&entry.tag.to_le_bytes());
        bytes.extend_from_slice(&entry.kind.to_le_bytes());
        bytes.extend_from_slice(&entry.count.to_le_bytes());
        if entry.data.len() <= 4 {
            let mut inline = entry.data.clone();
            inline.resize(4, 0);
            bytes.extend_from_slice(&inline);
        } else {
            bytes.extend_from_slice(&(out_of_line as u32).to_le_bytes());
            extra.extend_from_slice(&entry.data);
            if extra.len() % 2 == 1 {
                extra.push(0);
            }
            out_of_line = ifd_offset + 2 + entries.len() * 12 + 4 + extra.len();
        }
    }
    bytes.extend_from_slice(&0u32.to_le_bytes());
    bytes.extend_from_slice(&extra);
    bytes
}

fn write_fixture(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, bytes).unwrap();
    path
}

fn staged(index: usize, col: u32, path: PathBuf) -> DownloadedTile {
    DownloadedTile {
        index,
        row: 0,
        col,
        bytes: fs::metadata(&path).unwrap().len(),
        path,
        sha256: String::new(),
    }
}

const UTM_20S: Crs = Crs::Utm {
    zone: 20,
    north: false,
};

// ============================================================================
// Tests
// ============================================================================

#[test]
fn test_header_of_external_multiband_tile() {
    let temp = TempDir::new().unwrap();
    let path = write_fixture(temp.path(), "a.tif", &utm_tile(370_000.0, 6_530_000.0, 100));

    let header = read_header(&path).unwrap();

    assert_eq!((header.width, header.height, header.bands), (WIDTH, HEIGHT, BANDS));
    assert_eq!(
        header.transform,
        RasterTransform::new(370_000.0, 6_530_000.0, PIXEL, PIXEL)
    );
    assert_eq!(header.crs(), Some(UTM_20S));
    assert_eq!(header.nodata, Some(0.0));
}

#[test]
fn test_pixels_of_external_multiband_tile() {
    let temp = TempDir::new().unwrap();
    let path = write_fixture(temp.path(), "a.tif", &utm_tile(370_000.0, 6_530_000.0, 100));

    let raster = read_geotiff(&path).unwrap();

    assert_eq!(raster.pixels.len(), (WIDTH * HEIGHT) as usize * BANDS);
    for row in 0..HEIGHT {
        for col in 0..WIDTH {
            for band in 0..BANDS {
                assert_eq!(
                    raster.get(col, row, band),
                    sample(100, col, row, band) as f32,
                    "({col}, {row}) band {band}"
                );
            }
        }
    }
}

/// Two side-by-side external tiles merge into one 8x3 raster with every
/// UInt16 sample carried over exactly.
#[test]
fn test_merge_external_tiles() {
    let temp = TempDir::new().unwrap();
    let west = write_fixture(temp.path(), "west.tif", &utm_tile(370_000.0, 6_530_000.0, 100));
    let east_x = 370_000.0 + WIDTH as f64 * PIXEL;
    let east = write_fixture(temp.path(), "east.tif", &utm_tile(east_x, 6_530_000.0, 60_000));

    let merger = MosaicMerger::new(temp.path().join("merged"));
    let merged = merger
        .merge(
            "external",
            &RunTag::new("20240105_120000"),
            &[staged(0, 0, west), staged(1, 1, east)],
        )
        .unwrap();

    assert_eq!((merged.width, merged.height, merged.bands), (2 * WIDTH, HEIGHT, BANDS));

    let raster = read_geotiff(&merged.path).unwrap();
    assert_eq!(raster.keys.crs(), Some(UTM_20S));
    assert_eq!(
        raster.transform,
        RasterTransform::new(370_000.0, 6_530_000.0, PIXEL, PIXEL)
    );
    for row in 0..HEIGHT {
        for col in 0..WIDTH {
            for band in 0..BANDS {
                assert_eq!(raster.get(col, row, band), sample(100, col, row, band) as f32);
                assert_eq!(
                    raster.get(WIDTH + col, row, band),
                    sample(60_000, col, row, band) as f32
                );
            }
        }
    }
}

#[test]
fn test_external_tile_without_georeferencing_is_rejected() {
    let temp = TempDir::new().unwrap();
    let mut bytes = utm_tile(370_000.0, 6_530_000.0, 100);
    // Renumber ModelPixelScale (33550) to a private tag the reader ignores.
    let needle = [0x0E, 0x83, 0x0C, 0x00];
    let at = bytes
        .windows(4)
        .position(|w| w == needle)
        .expect("pixel scale entry present");
    bytes[at..at + 2].copy_from_slice(&65000u16.to_le_bytes());
    let path = write_fixture(temp.path(), "bare.tif", &bytes);

    assert!(read_header(&path).is_err());
}
