use anyhow::{Context, Result};
use image::DynamicImage;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

const METERS_PER_INCH: f64 = 0.0254;

/// Dots per inch to the pixels-per-metre stored in a pHYs chunk
pub fn dpi_to_ppm(dpi: u32) -> u32 {
    (dpi as f64 / METERS_PER_INCH + 0.5) as u32
}

pub fn ppm_to_dpi(ppm: u32) -> u32 {
    (ppm as f64 * METERS_PER_INCH).round() as u32
}

/// Encode as 8-bit PNG, RGB when the image has no alpha and RGBA otherwise
pub fn encode_png<W: Write>(writer: W, image: &DynamicImage, dpi: Option<(u32, u32)>) -> Result<()> {
    let (color, data) = match image {
        DynamicImage::ImageRgb8(rgb) => (png::ColorType::Rgb, rgb.as_raw().as_slice()),
        DynamicImage::ImageRgba8(rgba) => (png::ColorType::Rgba, rgba.as_raw().as_slice()),
        other => {
            let rgba = other.to_rgba8();
            return encode_png(writer, &DynamicImage::ImageRgba8(rgba), dpi);
        }
    };

    let mut encoder = png::Encoder::new(writer, image.width(), image.height());
    encoder.set_color(color);
    encoder.set_depth(png::BitDepth::Eight);
    if let Some((x, y)) = dpi {
        encoder.set_pixel_dims(Some(png::PixelDimensions {
            xppu: dpi_to_ppm(x),
            yppu: dpi_to_ppm(y),
            unit: png::Unit::Meter,
        }));
    }

    let mut writer = encoder.write_header().context("Failed to write PNG header")?;
    writer
        .write_image_data(data)
        .context("Failed to write PNG data")?;
    writer.finish().context("Failed to finish PNG")?;
    Ok(())
}

pub fn write_png(path: &Path, image: &DynamicImage, dpi: Option<(u32, u32)>) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    encode_png(BufWriter::new(file), image, dpi)
        .with_context(|| format!("Failed to encode {}", path.display()))
}

/// Read the DPI pair back from a PNG's pHYs chunk
///
/// `None` when the file has no physical dimensions or they are unitless.
pub fn read_png_dpi(path: &Path) -> Result<Option<(u32, u32)>> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let reader = png::Decoder::new(BufReader::new(file))
        .read_info()
        .with_context(|| format!("Failed to read PNG header of {}", path.display()))?;

    Ok(reader.info().pixel_dims.and_then(|dims| match dims.unit {
        png::Unit::Meter => Some((ppm_to_dpi(dims.xppu), ppm_to_dpi(dims.yppu))),
        png::Unit::Unspecified => None,
    }))
}
