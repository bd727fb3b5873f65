//! Per-element file encoders.

use crate::core::error::{ExportError, ExportResult};
use image::{ImageBuffer, ImageFormat, Luma, Rgb};
use ndarray::ArrayViewD;
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Metadata written next to raw binary elements.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BinaryConf {
    /// Element dims.
    pub shape: Vec<usize>,
    /// Value type name.
    pub dtype: &'static str,
}

/// Whether `dims` is a gray `(h, w)` or RGB `(h, w, 3)` image.
pub fn is_raster(dims: &[usize]) -> bool {
    dims.len() == 2 || (dims.len() == 3 && dims[2] == 3)
}

/// 8-bit PNG, gray or RGB, values clamped to `[0, 255]`.
pub fn write_png(element: ArrayViewD<'_, f64>, path: &Path) -> ExportResult<()> {
    let pixels: Vec<u8> = element.iter().map(|v| v.clamp(0.0, 255.0) as u8).collect();
    write_raster(element.shape(), pixels, path, ImageFormat::Png, "png")
}

/// 16-bit TIFF, gray or RGB, values clamped to `[0, 65535]`.
pub fn write_tiff(element: ArrayViewD<'_, f64>, path: &Path) -> ExportResult<()> {
    let pixels: Vec<u16> = element
        .iter()
        .map(|v| v.clamp(0.0, 65535.0) as u16)
        .collect();
    write_raster(element.shape(), pixels, path, ImageFormat::Tiff, "tiff")
}

fn write_raster<P>(
    dims: &[usize],
    pixels: Vec<P>,
    path: &Path,
    format: ImageFormat,
    name: &'static str,
) -> ExportResult<()>
where
    P: image::Primitive + 'static,
    [P]: image::EncodableLayout,
    Luma<P>: image::Pixel<Subpixel = P> + image::PixelWithColorType,
    Rgb<P>: image::Pixel<Subpixel = P> + image::PixelWithColorType,
{
    let unsupported = || ExportError::UnsupportedDims {
        dims: dims.to_vec(),
        format: name,
    };
    if !is_raster(dims) {
        return Err(unsupported());
    }
    let height = u32::try_from(dims[0]).map_err(|_| unsupported())?;
    let width = u32::try_from(dims[1]).map_err(|_| unsupported())?;

    if dims.len() == 2 {
        let buffer = ImageBuffer::<Luma<P>, Vec<P>>::from_raw(width, height, pixels)
            .ok_or_else(unsupported)?;
        buffer.save_with_format(path, format)?;
    } else {
        let buffer = ImageBuffer::<Rgb<P>, Vec<P>>::from_raw(width, height, pixels)
            .ok_or_else(unsupported)?;
        buffer.save_with_format(path, format)?;
    }
    Ok(())
}

/// Raw little-endian `f64` in C order.
pub fn write_binary(element: ArrayViewD<'_, f64>, path: &Path) -> ExportResult<()> {
    let words: Vec<u64> = element.iter().map(|v| v.to_bits().to_le()).collect();
    let mut file = BufWriter::new(File::create(path)?);
    file.write_all(bytemuck::cast_slice(&words))?;
    file.flush()?;
    Ok(())
}

/// `conf.json` describing the binary elements, plus the `SUCCESS` marker.
pub fn write_binary_conf(directory: &Path, dims: &[usize]) -> ExportResult<()> {
    let conf = BinaryConf {
        shape: dims.to_vec(),
        dtype: "float64",
    };
    let file = BufWriter::new(File::create(directory.join("conf.json"))?);
    serde_json::to_writer(file, &conf)?;
    File::create(directory.join("SUCCESS"))?;
    Ok(())
}
