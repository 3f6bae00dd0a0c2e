//! Native GeoTIFF reading/writing
//!
//! Uses the `tiff` crate. Georeference comes from ModelPixelScale +
//! ModelTiepoint, the CRS from the GeoKey directory and the no-data value
//! from the GDAL_NODATA ascii tag.

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::raster::{FeatureGrid, GeoTransform, Raster};
use ndarray::Array3;
use std::fs::File;
use std::io::{BufWriter, Read, Seek, Write};
use std::path::Path;
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::encoder::colortype::Gray32Float;
use tiff::encoder::compression::{Compression as TiffCompression, Deflate, Uncompressed};
use tiff::encoder::{ImageEncoder, TiffEncoder, TiffKindStandard};
use tiff::tags::Tag;

const KEY_MODEL_TYPE: u32 = 1024;
const KEY_RASTER_TYPE: u32 = 1025;
const KEY_GEOGRAPHIC_TYPE: u32 = 2048;
const KEY_PROJECTED_CS_TYPE: u32 = 3072;

/// Compression of written rasters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    None,
    #[default]
    Deflate,
}

/// Options for writing GeoTIFF files
#[derive(Debug, Clone)]
pub struct GeoTiffOptions {
    pub compression: Compression,
    /// Value written into invalid cells and the GDAL_NODATA tag
    pub nodata: f64,
}

impl Default for GeoTiffOptions {
    fn default() -> Self {
        Self {
            compression: Compression::Deflate,
            nodata: f64::NAN,
        }
    }
}

/// Read every band of a GeoTIFF into a [`FeatureGrid`].
///
/// Samples of a multi-sample image become bands in order, followed by any
/// further pages. Cells equal to `nodata`, to the file's GDAL_NODATA value,
/// or non-finite in any band are invalid.
pub fn read_feature_grid<P: AsRef<Path>>(path: P, nodata: Option<f64>) -> Result<FeatureGrid> {
    let file = File::open(path.as_ref())?;
    decode_feature_grid(file, nodata)
}

/// Read the first band of a GeoTIFF into a [`Raster`].
pub fn read_raster<P: AsRef<Path>>(path: P, nodata: Option<f64>) -> Result<Raster> {
    let grid = read_feature_grid(path, nodata)?;
    let band = grid.band(0).to_owned();
    Ok(Raster::from_parts(band, grid.validity().to_owned())?
        .with_transform(*grid.transform())
        .with_crs(grid.crs().cloned()))
}

fn decode_feature_grid<R: Read + Seek>(reader: R, nodata: Option<f64>) -> Result<FeatureGrid> {
    let mut decoder = Decoder::new(reader)?.with_limits(Limits::unlimited());

    let (width, height) = decoder.dimensions()?;
    let rows = height as usize;
    let cols = width as usize;

    let transform = read_geotransform(&mut decoder)?;
    let crs = read_crs(&mut decoder);
    let file_nodata = decoder
        .get_tag_ascii_string(Tag::GdalNodata)
        .ok()
        .and_then(|s| s.trim().trim_end_matches('\0').parse::<f64>().ok());

    let mut bands: Vec<f64> = Vec::new();
    let mut n_bands = 0usize;
    loop {
        let (w, h) = decoder.dimensions()?;
        if (w as usize, h as usize) != (cols, rows) {
            return Err(Error::SizeMismatch {
                er: rows,
                ec: cols,
                ar: h as usize,
                ac: w as usize,
            });
        }
        let samples = decoder.get_tag_u32(Tag::SamplesPerPixel).unwrap_or(1) as usize;
        let pixels = to_f64_vec(decoder.read_image()?)?;
        if pixels.len() != rows * cols * samples {
            return Err(Error::InvalidDimensions { width: cols, height: rows });
        }
        // Chunky layout: sample index varies fastest
        for s in 0..samples {
            bands.extend(pixels.iter().skip(s).step_by(samples).copied());
        }
        n_bands += samples;

        if !decoder.more_images() {
            break;
        }
        decoder.next_image()?;
    }

    let mut array = Array3::from_shape_vec((n_bands, rows, cols), bands)?;
    if let Some(nd) = file_nodata.filter(|v| !v.is_nan()) {
        array.mapv_inplace(|v| if v == nd { f64::NAN } else { v });
    }

    Ok(FeatureGrid::from_bands(array, nodata)?
        .with_transform(transform)
        .with_crs(crs))
}

fn to_f64_vec(result: DecodingResult) -> Result<Vec<f64>> {
    fn cast<V: num_traits::ToPrimitive>(buf: Vec<V>) -> Vec<f64> {
        buf.into_iter()
            .map(|v| v.to_f64().unwrap_or(f64::NAN))
            .collect()
    }

    Ok(match result {
        DecodingResult::F32(buf) => cast(buf),
        DecodingResult::F64(buf) => buf,
        DecodingResult::U8(buf) => cast(buf),
        DecodingResult::U16(buf) => cast(buf),
        DecodingResult::U32(buf) => cast(buf),
        DecodingResult::U64(buf) => cast(buf),
        DecodingResult::I8(buf) => cast(buf),
        DecodingResult::I16(buf) => cast(buf),
        DecodingResult::I32(buf) => cast(buf),
        DecodingResult::I64(buf) => cast(buf),
        #[allow(unreachable_patterns)]
        _ => return Err(Error::UnsupportedDataType("Unsupported TIFF pixel format".into())),
    })
}

fn read_geotransform<R: Read + Seek>(decoder: &mut Decoder<R>) -> Result<GeoTransform> {
    let scale = decoder
        .get_tag_f64_vec(Tag::ModelPixelScaleTag)
        .map_err(|_| Error::InvalidInput("raster has no ModelPixelScale tag".into()))?;
    let tiepoint = decoder
        .get_tag_f64_vec(Tag::ModelTiepointTag)
        .map_err(|_| Error::InvalidInput("raster has no ModelTiepoint tag".into()))?;

    if scale.len() < 2 || tiepoint.len() < 6 {
        return Err(Error::InvalidInput("Cannot determine geotransform".into()));
    }

    // tiepoint: [I, J, K, X, Y, Z], scale: [ScaleX, ScaleY, ScaleZ]
    let origin_x = tiepoint[3] - tiepoint[0] * scale[0];
    let origin_y = tiepoint[4] + tiepoint[1] * scale[1];
    Ok(GeoTransform::new(origin_x, origin_y, scale[0], -scale[1]))
}

fn read_crs<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<CRS> {
    let keys = decoder.get_tag_u32_vec(Tag::GeoKeyDirectoryTag).ok()?;
    // Header [version, revision, minor, n_keys] then 4-tuples
    // [key_id, tiff_tag_location, count, value_offset].
    keys.get(4..)?
        .chunks_exact(4)
        .filter(|entry| entry[1] == 0)
        .find(|entry| entry[0] == KEY_PROJECTED_CS_TYPE)
        .or_else(|| {
            keys[4..]
                .chunks_exact(4)
                .find(|entry| entry[0] == KEY_GEOGRAPHIC_TYPE && entry[1] == 0)
        })
        .map(|entry| CRS::from_epsg(entry[3]))
}

/// Write a [`Raster`] as a single-band float32 GeoTIFF.
///
/// Invalid cells are written as `options.nodata`.
pub fn write_raster<P: AsRef<Path>>(
    raster: &Raster,
    path: P,
    options: Option<GeoTiffOptions>,
) -> Result<()> {
    let options = options.unwrap_or_default();
    let file = BufWriter::new(File::create(path.as_ref())?);
    encode_raster(raster, file, &options)
}

fn encode_raster<W: Write + Seek>(raster: &Raster, writer: W, options: &GeoTiffOptions) -> Result<()> {
    let mut encoder = TiffEncoder::new(writer)?;
    let (rows, cols) = raster.shape();

    let data: Vec<f32> = raster
        .filled(options.nodata)
        .iter()
        .map(|&v| v as f32)
        .collect();

    match options.compression {
        Compression::None => {
            let image = encoder.new_image_with_compression::<Gray32Float, _>(
                cols as u32,
                rows as u32,
                Uncompressed,
            )?;
            finish_image(image, raster, options, &data)
        }
        Compression::Deflate => {
            let image = encoder.new_image_with_compression::<Gray32Float, _>(
                cols as u32,
                rows as u32,
                Deflate::default(),
            )?;
            finish_image(image, raster, options, &data)
        }
    }
}

fn finish_image<W: Write + Seek, D: TiffCompression>(
    mut image: ImageEncoder<'_, W, Gray32Float, TiffKindStandard, D>,
    raster: &Raster,
    options: &GeoTiffOptions,
    data: &[f32],
) -> Result<()> {
    let gt = raster.transform();

    let scale = [gt.pixel_width, gt.pixel_height.abs(), 0.0];
    image
        .encoder()
        .write_tag(Tag::ModelPixelScaleTag, &scale[..])?;

    let tiepoint = [0.0, 0.0, 0.0, gt.origin_x, gt.origin_y, 0.0];
    image
        .encoder()
        .write_tag(Tag::ModelTiepointTag, &tiepoint[..])?;

    // GTModelTypeGeoKey = projected, GTRasterTypeGeoKey = PixelIsArea,
    // plus the projected CS code when the CRS is an EPSG code.
    let mut entries: Vec<[u16; 4]> = vec![
        [KEY_MODEL_TYPE as u16, 0, 1, 1],
        [KEY_RASTER_TYPE as u16, 0, 1, 1],
    ];
    if let Some(code) = raster.crs().and_then(CRS::epsg).and_then(|c| u16::try_from(c).ok()) {
        entries.push([KEY_PROJECTED_CS_TYPE as u16, 0, 1, code]);
    }
    let mut geokeys: Vec<u16> = vec![1, 1, 0, entries.len() as u16];
    geokeys.extend(entries.iter().flatten());
    image
        .encoder()
        .write_tag(Tag::GeoKeyDirectoryTag, geokeys.as_slice())?;

    let nodata = if options.nodata.is_nan() {
        "nan".to_string()
    } else {
        format!("{}", options.nodata)
    };
    image
        .encoder()
        .write_tag(Tag::GdalNodata, nodata.as_str())?;

    image.write_data(data)?;
    Ok(())
}
