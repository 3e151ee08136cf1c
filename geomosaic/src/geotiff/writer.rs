//! GeoTIFF encoding.

use std::fs::File;
use std::io::{BufWriter, Seek, Write};
use std::path::Path;

use tiff::encoder::TiffEncoder;
use tiff::tags::Tag;

use super::{GeoRaster, GeoTiffError};

/// Writes `raster` to `path`, replacing any existing file.
pub fn write_geotiff(raster: &GeoRaster, path: &Path) -> Result<(), GeoTiffError> {
    let io_err = |e| GeoTiffError::Io {
        path: path.to_path_buf(),
        source: e,
    };

    let file = File::create(path).map_err(io_err)?;
    let mut writer = BufWriter::new(file);
    write_geotiff_to(raster, &mut writer)?;
    writer.flush().map_err(io_err)?;
    Ok(())
}

/// Writes `raster` as a single-strip, pixel-interleaved Float32 GeoTIFF.
pub fn write_geotiff_to<W: Write + Seek>(raster: &GeoRaster, writer: W) -> Result<(), GeoTiffError> {
    raster.check_len()?;
    if raster.bands == 0 || raster.bands > u16::MAX as usize {
        return Err(GeoTiffError::Unsupported(format!("{} bands", raster.bands)));
    }

    let mut encoder = TiffEncoder::new(writer)?;
    let mut dir = encoder.image_directory()?;

    dir.write_tag(Tag::ImageWidth, raster.width)?;
    dir.write_tag(Tag::ImageLength, raster.height)?;
    dir.write_tag(Tag::BitsPerSample, vec![32u16; raster.bands].as_slice())?;
    dir.write_tag(Tag::Compression, 1u16)?;
    dir.write_tag(Tag::PhotometricInterpretation, 1u16)?;
    dir.write_tag(Tag::SamplesPerPixel, raster.bands as u16)?;
    dir.write_tag(Tag::SampleFormat, vec![3u16; raster.bands].as_slice())?;
    dir.write_tag(Tag::PlanarConfiguration, 1u16)?;
    dir.write_tag(Tag::RowsPerStrip, raster.height)?;
    if raster.bands > 1 {
        dir.write_tag(Tag::ExtraSamples, vec![0u16; raster.bands - 1].as_slice())?;
    }

    let t = &raster.transform;
    dir.write_tag(
        Tag::ModelPixelScaleTag,
        [t.pixel_width, t.pixel_height, 0.0].as_slice(),
    )?;
    dir.write_tag(
        Tag::ModelTiepointTag,
        [0.0, 0.0, 0.0, t.origin_x, t.origin_y, 0.0].as_slice(),
    )?;

    if !raster.keys.is_empty() {
        let (directory, doubles, ascii) = raster.keys.serialize();
        dir.write_tag(Tag::GeoKeyDirectoryTag, directory.as_slice())?;
        if !doubles.is_empty() {
            dir.write_tag(Tag::GeoDoubleParamsTag, doubles.as_slice())?;
        }
        if !ascii.is_empty() {
            dir.write_tag(Tag::GeoAsciiParamsTag, ascii.as_str())?;
        }
    }

    if let Some(nodata) = raster.nodata {
        let text = if nodata.is_nan() {
            "nan".to_string()
        } else {
            nodata.to_string()
        };
        dir.write_tag(Tag::GdalNodata, text.as_str())?;
    }

    let byte_count = u32::try_from(raster.pixels.len() * 4)
        .map_err(|_| GeoTiffError::Unsupported("raster larger than 4 GiB".to_string()))?;

    // Samples go out in the encoder's byte order, which the header declares.
    let offset = dir.write_data(raster.pixels.as_slice())?;
    let offset = u32::try_from(offset)
        .map_err(|_| GeoTiffError::Unsupported("strip offset beyond 4 GiB".to_string()))?;
    dir.write_tag(Tag::StripOffsets, offset)?;
    dir.write_tag(Tag::StripByteCounts, byte_count)?;
    dir.finish()?;

    Ok(())
}
