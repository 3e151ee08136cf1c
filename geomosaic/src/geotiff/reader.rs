//! GeoTIFF decoding.

use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::tags::Tag;

use super::keys::GeoKeyDirectory;
use super::{GeoRaster, GeoTiffError, RasterHeader, RasterTransform};

/// Exports are capped well below this, but merged outputs can be larger.
const MAX_BUFFER_BYTES: usize = 2 * 1024 * 1024 * 1024;

fn open(path: &Path) -> Result<Decoder<BufReader<File>>, GeoTiffError> {
    let file = File::open(path).map_err(|e| GeoTiffError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    decoder(BufReader::new(file))
}

fn decoder<R: Read + Seek>(reader: R) -> Result<Decoder<R>, GeoTiffError> {
    let mut limits = Limits::default();
    limits.decoding_buffer_size = MAX_BUFFER_BYTES;
    limits.intermediate_buffer_size = MAX_BUFFER_BYTES;
    limits.ifd_value_size = 64 * 1024 * 1024;
    Ok(Decoder::new(reader)?.with_limits(limits))
}

/// Reads only the header tags of a GeoTIFF.
pub fn read_header(path: &Path) -> Result<RasterHeader, GeoTiffError> {
    read_header_from(&mut open(path)?)
}

/// Reads a whole GeoTIFF file.
pub fn read_geotiff(path: &Path) -> Result<GeoRaster, GeoTiffError> {
    read_raster(&mut open(path)?)
}

/// Reads a GeoTIFF from any seekable reader.
pub fn read_geotiff_from<R: Read + Seek>(reader: R) -> Result<GeoRaster, GeoTiffError> {
    read_raster(&mut decoder(reader)?)
}

fn read_raster<R: Read + Seek>(decoder: &mut Decoder<R>) -> Result<GeoRaster, GeoTiffError> {
    let header = read_header_from(decoder)?;
    // Separate planes decode as the first band only.
    if header.bands > 1 && decoder.get_tag_u32(Tag::PlanarConfiguration).unwrap_or(1) == 2 {
        return Err(GeoTiffError::Unsupported(
            "band-sequential (planar) layout".to_string(),
        ));
    }
    let pixels = decode_samples(decoder.read_image()?);

    let raster = GeoRaster {
        width: header.width,
        height: header.height,
        bands: header.bands,
        pixels,
        transform: header.transform,
        keys: header.keys,
        nodata: header.nodata,
    };
    raster.check_len()?;
    Ok(raster)
}

fn read_header_from<R: Read + Seek>(decoder: &mut Decoder<R>) -> Result<RasterHeader, GeoTiffError> {
    let (width, height) = decoder.dimensions()?;
    let bands = decoder.get_tag_u32(Tag::SamplesPerPixel).unwrap_or(1) as usize;

    let scale = decoder
        .get_tag_f64_vec(Tag::ModelPixelScaleTag)
        .map_err(|_| GeoTiffError::MissingTag("ModelPixelScale"))?;
    let tiepoint = decoder
        .get_tag_f64_vec(Tag::ModelTiepointTag)
        .map_err(|_| GeoTiffError::MissingTag("ModelTiepoint"))?;

    if scale.len() < 2 || tiepoint.len() < 6 {
        return Err(GeoTiffError::Unsupported(format!(
            "pixel scale has {} values and tiepoint {}",
            scale.len(),
            tiepoint.len()
        )));
    }

    // Tiepoint [i, j, k, x, y, z] ties pixel (i, j) to world (x, y).
    let transform = RasterTransform::new(
        tiepoint[3] - tiepoint[0] * scale[0],
        tiepoint[4] + tiepoint[1] * scale[1],
        scale[0],
        scale[1],
    );

    let keys = match decoder.get_tag_u16_vec(Tag::GeoKeyDirectoryTag) {
        Ok(directory) => {
            let doubles = decoder
                .get_tag_f64_vec(Tag::GeoDoubleParamsTag)
                .unwrap_or_default();
            let ascii = decoder
                .get_tag_ascii_string(Tag::GeoAsciiParamsTag)
                .unwrap_or_default();
            GeoKeyDirectory::parse(&directory, &doubles, &ascii)?
        }
        Err(_) => GeoKeyDirectory::new(),
    };

    let nodata = decoder
        .get_tag_ascii_string(Tag::GdalNodata)
        .ok()
        .and_then(|s| s.trim().trim_end_matches('\0').parse::<f64>().ok());

    Ok(RasterHeader {
        width,
        height,
        bands,
        transform,
        keys,
        nodata,
    })
}

fn decode_samples(result: DecodingResult) -> Vec<f32> {
    match result {
        DecodingResult::F32(data) => data,
        DecodingResult::F16(data) => data.into_iter().map(f32::from).collect(),
        DecodingResult::F64(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::U8(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::U16(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::U32(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::U64(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::I8(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::I16(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::I32(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::I64(data) => data.into_iter().map(|v| v as f32).collect(),
    }
}
