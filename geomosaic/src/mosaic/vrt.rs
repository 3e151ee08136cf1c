//! Virtual mosaic descriptor.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use crate::crs::Bounds;
use crate::geotiff::{read_geotiff, GeoKeyDirectory, GeoRaster, RasterHeader, RasterTransform};

use super::MergeError;

/// Tolerance, in pixels, for a tile offset to count as integral.
const OFFSET_TOLERANCE: f64 = 1e-6;

/// One source raster placed in the mosaic.
#[derive(Debug, Clone, PartialEq)]
pub struct MosaicSource {
    pub path: PathBuf,
    pub x_off: u32,
    pub y_off: u32,
    pub width: u32,
    pub height: u32,
}

/// Several aligned rasters presented as one.
#[derive(Debug, Clone, PartialEq)]
pub struct VirtualMosaic {
    width: u32,
    height: u32,
    bands: usize,
    transform: RasterTransform,
    keys: GeoKeyDirectory,
    sources: Vec<MosaicSource>,
}

impl VirtualMosaic {
    /// Builds the mosaic from tile headers, checking that every tile shares
    /// CRS keys, pixel size and band count, and sits on whole-pixel offsets
    /// of a common grid.
    pub fn from_headers(tiles: &[(PathBuf, RasterHeader)]) -> Result<Self, MergeError> {
        let (first_path, first) = tiles.first().ok_or(MergeError::NoTiles)?;
        let pw = first.transform.pixel_width;
        let ph = first.transform.pixel_height;

        if !(pw > 0.0 && ph > 0.0) {
            return Err(incompatible(first_path, "pixel size must be positive"));
        }

        let mut extent = first.bounds();
        for (path, header) in &tiles[1..] {
            if header.keys != first.keys {
                return Err(incompatible(path, "spatial reference differs"));
            }
            if !same(header.transform.pixel_width, pw) || !same(header.transform.pixel_height, ph) {
                return Err(incompatible(
                    path,
                    &format!(
                        "pixel size {}x{} differs from {}x{}",
                        header.transform.pixel_width, header.transform.pixel_height, pw, ph
                    ),
                ));
            }
            if header.bands != first.bands {
                return Err(incompatible(
                    path,
                    &format!("{} bands, expected {}", header.bands, first.bands),
                ));
            }
            extent = extent.union(&header.bounds());
        }

        let width = pixel_count(extent.width() / pw);
        let height = pixel_count(extent.height() / ph);

        let mut sources = Vec::with_capacity(tiles.len());
        for (path, header) in tiles {
            let x = (header.transform.origin_x - extent.min_x) / pw;
            let y = (extent.max_y - header.transform.origin_y) / ph;
            let (x_off, y_off) = match (whole(x), whole(y)) {
                (Some(x), Some(y)) => (x, y),
                _ => {
                    return Err(incompatible(
                        path,
                        &format!("offset ({:.6}, {:.6}) px is not on the shared grid", x, y),
                    ))
                }
            };
            sources.push(MosaicSource {
                path: path.clone(),
                x_off,
                y_off,
                width: header.width,
                height: header.height,
            });
        }

        Ok(Self {
            width,
            height,
            bands: first.bands,
            transform: RasterTransform::new(extent.min_x, extent.max_y, pw, ph),
            keys: first.keys.clone(),
            sources,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn bands(&self) -> usize {
        self.bands
    }

    pub fn transform(&self) -> RasterTransform {
        self.transform
    }

    pub fn sources(&self) -> &[MosaicSource] {
        &self.sources
    }

    pub fn bounds(&self) -> Bounds {
        let t = &self.transform;
        Bounds::new(
            t.origin_x,
            t.origin_y - self.height as f64 * t.pixel_height,
            t.origin_x + self.width as f64 * t.pixel_width,
            t.origin_y,
        )
    }

    /// GDAL VRT XML for this mosaic.
    pub fn to_xml(&self) -> String {
        let mut xml = String::new();
        let gt = self.transform.to_gdal();

        let _ = writeln!(
            xml,
            r#"<VRTDataset rasterXSize="{}" rasterYSize="{}">"#,
            self.width, self.height
        );
        if let Some(epsg) = self.keys.crs().and_then(|c| c.epsg()) {
            let _ = writeln!(xml, "  <SRS>EPSG:{}</SRS>", epsg);
        }
        let _ = writeln!(
            xml,
            "  <GeoTransform>{:e}, {:e}, {:e}, {:e}, {:e}, {:e}</GeoTransform>",
            gt[0], gt[1], gt[2], gt[3], gt[4], gt[5]
        );

        for band in 1..=self.bands {
            let _ = writeln!(
                xml,
                r#"  <VRTRasterBand dataType="Float32" band="{}">"#,
                band
            );
            xml.push_str("    <NoDataValue>nan</NoDataValue>\n");
            for source in &self.sources {
                xml.push_str("    <SimpleSource>\n");
                let _ = writeln!(
                    xml,
                    r#"      <SourceFilename relativeToVRT="0">{}</SourceFilename>"#,
                    escape_xml(&source.path.to_string_lossy())
                );
                let _ = writeln!(xml, "      <SourceBand>{}</SourceBand>", band);
                let _ = writeln!(
                    xml,
                    r#"      <SrcRect xOff="0" yOff="0" xSize="{}" ySize="{}"/>"#,
                    source.width, source.height
                );
                let _ = writeln!(
                    xml,
                    r#"      <DstRect xOff="{}" yOff="{}" xSize="{}" ySize="{}"/>"#,
                    source.x_off, source.y_off, source.width, source.height
                );
                xml.push_str("    </SimpleSource>\n");
            }
            xml.push_str("  </VRTRasterBand>\n");
        }

        xml.push_str("</VRTDataset>\n");
        xml
    }

    pub fn write(&self, path: &Path) -> Result<(), MergeError> {
        fs::write(path, self.to_xml()).map_err(|e| MergeError::Io {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Reads every source into one Float32 raster. Uncovered pixels are NaN;
    /// where sources overlap, later ones win.
    pub fn materialize(&self) -> Result<GeoRaster, MergeError> {
        let mut out = GeoRaster::filled(
            self.width,
            self.height,
            self.bands,
            f32::NAN,
            self.transform,
            self.keys.clone(),
        );
        out.nodata = Some(f64::NAN);

        for source in &self.sources {
            let tile = read_geotiff(&source.path).map_err(|e| MergeError::GeoTiff {
                path: source.path.clone(),
                source: e,
            })?;
            if tile.width != source.width || tile.height != source.height {
                return Err(incompatible(&source.path, "size changed since header read"));
            }
            if source.x_off + tile.width > self.width || source.y_off + tile.height > self.height {
                return Err(incompatible(&source.path, "extends past the mosaic"));
            }

            let row_len = tile.width as usize * self.bands;
            for row in 0..tile.height {
                let src = tile.sample_index(0, row, 0);
                let dst = out.sample_index(source.x_off, source.y_off + row, 0);
                out.pixels[dst..dst + row_len].copy_from_slice(&tile.pixels[src..src + row_len]);
            }
        }

        Ok(out)
    }
}

fn incompatible(path: &Path, reason: &str) -> MergeError {
    MergeError::Incompatible {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

fn same(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-9 * a.abs().max(b.abs())
}

fn whole(v: f64) -> Option<u32> {
    let r = v.round();
    ((v - r).abs() < OFFSET_TOLERANCE && r >= 0.0 && r <= u32::MAX as f64).then_some(r as u32)
}

fn pixel_count(v: f64) -> u32 {
    v.round().max(0.0) as u32
}

fn escape_xml(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crs::Crs;
    use crate::geotiff::write_geotiff;
    use tempfile::TempDir;

    fn utm() -> GeoKeyDirectory {
        GeoKeyDirectory::for_crs(Crs::Utm {
            zone: 20,
            north: false,
        })
    }

    fn header(origin_x: f64, origin_y: f64, width: u32, height: u32) -> RasterHeader {
        RasterHeader {
            width,
            height,
            bands: 1,
            transform: RasterTransform::new(origin_x, origin_y, 10.0, 10.0),
            keys: utm(),
            nodata: None,
        }
    }

    #[test]
    fn test_offsets_and_extent() {
        let tiles = vec![
            (PathBuf::from("a.tif"), header(1000.0, 5000.0, 4, 3)),
            (PathBuf::from("b.tif"), header(1040.0, 5000.0, 2, 3)),
            (PathBuf::from("c.tif"), header(1000.0, 4970.0, 4, 2)),
        ];
        let vrt = VirtualMosaic::from_headers(&tiles).unwrap();

        assert_eq!((vrt.width(), vrt.height()), (6, 5));
        assert_eq!(vrt.bounds(), Bounds::new(1000.0, 4950.0, 1060.0, 5000.0));
        assert_eq!(vrt.transform(), RasterTransform::new(1000.0, 5000.0, 10.0, 10.0));
        assert_eq!((vrt.sources()[1].x_off, vrt.sources()[1].y_off), (4, 0));
        assert_eq!((vrt.sources()[2].x_off, vrt.sources()[2].y_off), (0, 3));
    }

    #[test]
    fn test_rejects_misaligned_and_mismatched() {
        let base = (PathBuf::from("a.tif"), header(1000.0, 5000.0, 4, 4));

        let shifted = (PathBuf::from("b.tif"), header(1045.0, 5000.0, 4, 4));
        assert!(matches!(
            VirtualMosaic::from_headers(&[base.clone(), shifted]),
            Err(MergeError::Incompatible { .. })
        ));

        let mut coarse = header(1040.0, 5000.0, 4, 4);
        coarse.transform.pixel_width = 20.0;
        assert!(VirtualMosaic::from_headers(&[base.clone(), (PathBuf::from("c"), coarse)]).is_err());

        let mut other_crs = header(1040.0, 5000.0, 4, 4);
        other_crs.keys = GeoKeyDirectory::for_crs(Crs::WebMercator);
        assert!(VirtualMosaic::from_headers(&[base.clone(), (PathBuf::from("d"), other_crs)]).is_err());

        let mut rgb = header(1040.0, 5000.0, 4, 4);
        rgb.bands = 3;
        assert!(VirtualMosaic::from_headers(&[base, (PathBuf::from("e"), rgb)]).is_err());

        assert!(matches!(
            VirtualMosaic::from_headers(&[]),
            Err(MergeError::NoTiles)
        ));
    }

    #[test]
    fn test_xml_references_every_source() {
        let tiles = vec![
            (PathBuf::from("/t/a&b.tif"), header(1000.0, 5000.0, 4, 3)),
            (PathBuf::from("/t/c.tif"), header(1040.0, 5000.0, 2, 3)),
        ];
        let xml = VirtualMosaic::from_headers(&tiles).unwrap().to_xml();

        assert!(xml.starts_with(r#"<VRTDataset rasterXSize="6" rasterYSize="3">"#));
        assert!(xml.contains("<SRS>EPSG:32720</SRS>"));
        assert!(xml.contains("/t/a&amp;b.tif"));
        assert!(xml.contains(r#"<DstRect xOff="4" yOff="0" xSize="2" ySize="3"/>"#));
        assert_eq!(xml.matches("<SimpleSource>").count(), 2);
        assert!(xml.trim_end().ends_with("</VRTDataset>"));
    }

    #[test]
    fn test_materialize_places_pixels_and_fills_gaps() {
        let temp = TempDir::new().unwrap();
        let a = temp.path().join("a.tif");
        let b = temp.path().join("b.tif");

        let tile_a = GeoRaster::filled(2, 2, 1, 1.0, RasterTransform::new(0.0, 40.0, 10.0, 10.0), utm());
        // Diagonal neighbour; the other two quadrants stay uncovered.
        let tile_b = GeoRaster::filled(2, 2, 1, 2.0, RasterTransform::new(20.0, 20.0, 10.0, 10.0), utm());
        write_geotiff(&tile_a, &a).unwrap();
        write_geotiff(&tile_b, &b).unwrap();

        let vrt = VirtualMosaic::from_headers(&[
            (a.clone(), tile_a.header()),
            (b.clone(), tile_b.header()),
        ])
        .unwrap();
        let merged = vrt.materialize().unwrap();

        assert_eq!((merged.width, merged.height), (4, 4));
        assert_eq!(merged.get(0, 0, 0), 1.0);
        assert_eq!(merged.get(3, 3, 0), 2.0);
        assert!(merged.get(3, 0, 0).is_nan());
        assert!(merged.get(0, 3, 0).is_nan());
        assert_eq!(merged.transform, tile_a.transform);
    }
}
