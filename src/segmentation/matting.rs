use anyhow::{Context, Result};
use image::{GrayImage, Rgba, RgbaImage, RgbImage};
use opencv::core::{self, Mat, Point, Scalar, Size, VecN, Vec4f, CV_32FC4, CV_8UC1};
use opencv::imgproc;
use opencv::prelude::*;

const TRIMAP_BACKGROUND: u8 = 0;
const TRIMAP_UNKNOWN: u8 = 128;
const TRIMAP_FOREGROUND: u8 = 255;

/// Mask values below this become background after post-processing
const MASK_THRESHOLD: u8 = 127;

/// Tunables for the alpha-matting cutout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MattingParams {
    /// Mask values strictly above this are certain foreground
    pub foreground_threshold: u8,
    /// Mask values strictly below this are certain background
    pub background_threshold: u8,
    /// Side of the square erosion element; 0 uses a 3x3 cross
    pub erode_size: u32,
}

impl Default for MattingParams {
    fn default() -> Self {
        Self {
            foreground_threshold: 240,
            background_threshold: 10,
            erode_size: 10,
        }
    }
}

/// Morphological opening, 5x5 Gaussian blur, then a hard threshold
///
/// Removes speckles and leaves a strictly binary (0/255) mask.
pub fn post_process_mask(mask: &GrayImage) -> Result<GrayImage> {
    let _span = tracing::debug_span!("post_process_mask").entered();

    let src = gray_to_mat(mask)?;
    let kernel =
        imgproc::get_structuring_element(imgproc::MORPH_ELLIPSE, Size::new(3, 3), Point::new(-1, -1))?;

    let mut opened = Mat::default();
    imgproc::morphology_ex_def(&src, &mut opened, imgproc::MORPH_OPEN, &kernel)
        .context("Failed to open mask")?;

    let mut blurred = Mat::default();
    imgproc::gaussian_blur_def(&opened, &mut blurred, Size::new(5, 5), 2.0)
        .context("Failed to blur mask")?;

    // THRESH_BINARY keeps values strictly above the threshold
    let mut binary = Mat::default();
    imgproc::threshold(
        &blurred,
        &mut binary,
        f64::from(MASK_THRESHOLD) - 1.0,
        255.0,
        imgproc::THRESH_BINARY,
    )?;

    mat_to_gray(&binary)
}

/// Classify every pixel as background (0), unknown (128) or foreground (255)
///
/// Both certain regions are eroded; outside the image counts as background,
/// never as foreground.
pub fn build_trimap(mask: &GrayImage, params: &MattingParams) -> Result<GrayImage> {
    let src = gray_to_mat(mask)?;

    let mut foreground = Mat::default();
    imgproc::threshold(
        &src,
        &mut foreground,
        f64::from(params.foreground_threshold),
        255.0,
        imgproc::THRESH_BINARY,
    )?;
    let mut background = Mat::default();
    imgproc::threshold(
        &src,
        &mut background,
        f64::from(params.background_threshold) - 1.0,
        255.0,
        imgproc::THRESH_BINARY_INV,
    )?;

    let kernel = if params.erode_size > 0 {
        let side = params.erode_size as i32;
        imgproc::get_structuring_element(imgproc::MORPH_RECT, Size::new(side, side), Point::new(-1, -1))?
    } else {
        imgproc::get_structuring_element(imgproc::MORPH_CROSS, Size::new(3, 3), Point::new(-1, -1))?
    };

    let foreground = erode(&foreground, &kernel, 0.0)?;
    let background = erode(&background, &kernel, 255.0)?;

    let (width, height) = mask.dimensions();
    let trimap: Vec<u8> = foreground
        .data_bytes()?
        .iter()
        .zip(background.data_bytes()?)
        .map(|(&fg, &bg)| {
            if fg > 0 {
                TRIMAP_FOREGROUND
            } else if bg > 0 {
                TRIMAP_BACKGROUND
            } else {
                TRIMAP_UNKNOWN
            }
        })
        .collect();

    GrayImage::from_raw(width, height, trimap).context("Trimap does not match mask dimensions")
}

/// Cut the foreground out of `image` using `mask`, refining edges with alpha matting
///
/// Unknown trimap pixels are resolved with a local colour-line estimate: the
/// pixel colour is projected onto the segment between the mean known
/// background and mean known foreground colour in a window around it.
pub fn alpha_matting_cutout(
    image: &RgbImage,
    mask: &GrayImage,
    params: &MattingParams,
) -> Result<RgbaImage> {
    let _span = tracing::debug_span!("alpha_matting").entered();

    let trimap = build_trimap(mask, params)?;
    let has_unknown = trimap.pixels().any(|p| p[0] == TRIMAP_UNKNOWN);

    let radius = 2 * params.erode_size.max(1) + 8;
    let (foreground, background) = if has_unknown {
        (
            WindowSums::new(image, &trimap, TRIMAP_FOREGROUND, radius)?,
            WindowSums::new(image, &trimap, TRIMAP_BACKGROUND, radius)?,
        )
    } else {
        (None, None)
    };
    let foreground = foreground.as_ref().map(WindowSums::sums).transpose()?;
    let background = background.as_ref().map(WindowSums::sums).transpose()?;

    let width = image.width() as usize;
    Ok(RgbaImage::from_fn(image.width(), image.height(), |x, y| {
        let pixel = image.get_pixel(x, y);
        match trimap.get_pixel(x, y)[0] {
            TRIMAP_FOREGROUND => Rgba([pixel[0], pixel[1], pixel[2], 255]),
            TRIMAP_BACKGROUND => Rgba([0, 0, 0, 0]),
            _ => {
                let idx = y as usize * width + x as usize;
                let fallback = mask.get_pixel(x, y)[0] as f32 / 255.0;
                estimate_pixel(
                    [pixel[0], pixel[1], pixel[2]],
                    foreground.and_then(|s| window_mean(&s[idx])),
                    background.and_then(|s| window_mean(&s[idx])),
                    fallback,
                )
            }
        }
    }))
}

fn estimate_pixel(
    color: [u8; 3],
    foreground: Option<[f32; 3]>,
    background: Option<[f32; 3]>,
    fallback: f32,
) -> Rgba<u8> {
    let i = color.map(f32::from);

    let alpha = match (foreground, background) {
        (Some(f), Some(b)) => {
            let d = [f[0] - b[0], f[1] - b[1], f[2] - b[2]];
            let denom = d[0] * d[0] + d[1] * d[1] + d[2] * d[2];
            if denom < 1.0 {
                fallback
            } else {
                let dot = (i[0] - b[0]) * d[0] + (i[1] - b[1]) * d[1] + (i[2] - b[2]) * d[2];
                (dot / denom).clamp(0.0, 1.0)
            }
        }
        _ => fallback,
    };

    let alpha_u8 = (alpha * 255.0).round() as u8;
    if alpha_u8 == 0 {
        return Rgba([0, 0, 0, 0]);
    }

    // Undo the blend I = aF + (1 - a)B to strip background colour spill
    let rgb = match background {
        Some(b) => {
            let mut out = [0u8; 3];
            for c in 0..3 {
                let f = (i[c] - (1.0 - alpha) * b[c]) / alpha;
                out[c] = f.round().clamp(0.0, 255.0) as u8;
            }
            out
        }
        None => color,
    };

    Rgba([rgb[0], rgb[1], rgb[2], alpha_u8])
}

/// Per-pixel (r, g, b, count) sums of one trimap class over a square window
///
/// Sums never exceed one window's worth of pixels, whatever the frame size.
struct WindowSums {
    sums: Mat,
}

impl WindowSums {
    /// `None` when no pixel belongs to `class`
    fn new(image: &RgbImage, trimap: &GrayImage, class: u8, radius: u32) -> Result<Option<Self>> {
        if !trimap.pixels().any(|p| p[0] == class) {
            return Ok(None);
        }

        let (width, height) = image.dimensions();
        let mut weighted = Mat::new_rows_cols_with_default(
            height as i32,
            width as i32,
            CV_32FC4,
            Scalar::all(0.0),
        )?;

        for ((dst, pixel), label) in weighted
            .data_typed_mut::<Vec4f>()?
            .iter_mut()
            .zip(image.pixels())
            .zip(trimap.pixels())
        {
            if label[0] == class {
                *dst = VecN([pixel[0] as f32, pixel[1] as f32, pixel[2] as f32, 1.0]);
            }
        }

        let side = 2 * radius as i32 + 1;
        let mut sums = Mat::default();
        imgproc::box_filter(
            &weighted,
            &mut sums,
            -1,
            Size::new(side, side),
            Point::new(-1, -1),
            false,
            core::BORDER_CONSTANT,
        )
        .context("Failed to sum colour windows")?;

        Ok(Some(Self { sums }))
    }

    fn sums(&self) -> Result<&[Vec4f]> {
        Ok(self.sums.data_typed::<Vec4f>()?)
    }
}

/// Mean colour of a window, if it holds any pixel of the class
fn window_mean(sum: &Vec4f) -> Option<[f32; 3]> {
    let [r, g, b, count] = sum.0;
    // Box sums of 0/1 weights can carry float noise
    if count < 0.5 {
        return None;
    }
    Some([r / count, g / count, b / count])
}

fn erode(mask: &Mat, kernel: &Mat, border: f64) -> Result<Mat> {
    let mut out = Mat::default();
    imgproc::erode(
        mask,
        &mut out,
        kernel,
        Point::new(-1, -1),
        1,
        core::BORDER_CONSTANT,
        Scalar::all(border),
    )
    .context("Failed to erode mask")?;
    Ok(out)
}

fn gray_to_mat(image: &GrayImage) -> Result<Mat> {
    let (width, height) = image.dimensions();
    let mut mat =
        Mat::new_rows_cols_with_default(height as i32, width as i32, CV_8UC1, Scalar::all(0.0))?;
    mat.data_bytes_mut()?.copy_from_slice(image.as_raw());
    Ok(mat)
}

fn mat_to_gray(mat: &Mat) -> Result<GrayImage> {
    let bytes = mat.data_bytes()?.to_vec();
    GrayImage::from_raw(mat.cols() as u32, mat.rows() as u32, bytes)
        .context("Mask buffer does not match its dimensions")
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn square_mask(size: u32, lo: u32, hi: u32) -> GrayImage {
        GrayImage::from_fn(size, size, |x, y| {
            Luma([if (lo..hi).contains(&x) && (lo..hi).contains(&y) { 255 } else { 0 }])
        })
    }

    #[test]
    fn post_processing_drops_speckles() {
        let mut mask = square_mask(24, 6, 18);
        mask.put_pixel(1, 1, Luma([255]));
        mask.put_pixel(22, 3, Luma([200]));

        let cleaned = post_process_mask(&mask).unwrap();

        assert_eq!(cleaned.dimensions(), (24, 24));
        assert_eq!(cleaned.get_pixel(1, 1)[0], 0);
        assert_eq!(cleaned.get_pixel(22, 3)[0], 0);
        assert_eq!(cleaned.get_pixel(12, 12)[0], 255);
        assert!(cleaned.pixels().all(|p| p[0] == 0 || p[0] == 255));
    }

    #[test]
    fn post_processing_keeps_full_mask() {
        let mask = GrayImage::from_pixel(10, 7, Luma([255]));
        let cleaned = post_process_mask(&mask).unwrap();
        assert!(cleaned.pixels().all(|p| p[0] == 255));
    }

    #[test]
    fn trimap_marks_band_around_edge_unknown() {
        let mask = square_mask(20, 5, 15);
        let trimap = build_trimap(&mask, &MattingParams { erode_size: 0, ..Default::default() }).unwrap();

        assert_eq!(trimap.get_pixel(10, 10)[0], TRIMAP_FOREGROUND);
        assert_eq!(trimap.get_pixel(1, 1)[0], TRIMAP_BACKGROUND);
        // Cross erosion peels one pixel off each side of the edge
        assert_eq!(trimap.get_pixel(5, 10)[0], TRIMAP_UNKNOWN);
        assert_eq!(trimap.get_pixel(4, 10)[0], TRIMAP_UNKNOWN);
        assert_eq!(trimap.get_pixel(6, 10)[0], TRIMAP_FOREGROUND);
        assert_eq!(trimap.get_pixel(3, 10)[0], TRIMAP_BACKGROUND);
    }

    #[test]
    fn trimap_respects_thresholds() {
        let mask = GrayImage::from_pixel(9, 9, Luma([200]));
        let trimap = build_trimap(&mask, &MattingParams::default()).unwrap();
        assert!(trimap.pixels().all(|p| p[0] == TRIMAP_UNKNOWN));

        let mask = GrayImage::from_pixel(9, 9, Luma([5]));
        let trimap = build_trimap(&mask, &MattingParams::default()).unwrap();
        // Background erosion treats the outside as background
        assert!(trimap.pixels().all(|p| p[0] == TRIMAP_BACKGROUND));

        let zero = MattingParams {
            background_threshold: 0,
            ..Default::default()
        };
        let trimap = build_trimap(&GrayImage::new(4, 4), &zero).unwrap();
        assert!(trimap.pixels().all(|p| p[0] == TRIMAP_UNKNOWN));
    }

    #[test]
    fn square_erosion_anchors_at_half_size() {
        // Foreground columns 2..8 over the full height
        let mask = GrayImage::from_fn(10, 10, |x, _| Luma([if (2..8).contains(&x) { 255 } else { 0 }]));
        let params = MattingParams {
            erode_size: 2,
            ..Default::default()
        };

        let trimap = build_trimap(&mask, &params).unwrap();
        let row: Vec<u8> = (0..10).map(|x| trimap.get_pixel(x, 5)[0]).collect();

        // A 2x2 square covers offsets -1..=0 on both axes
        assert_eq!(
            row,
            vec![
                TRIMAP_BACKGROUND,
                TRIMAP_BACKGROUND,
                TRIMAP_UNKNOWN,
                TRIMAP_FOREGROUND,
                TRIMAP_FOREGROUND,
                TRIMAP_FOREGROUND,
                TRIMAP_FOREGROUND,
                TRIMAP_FOREGROUND,
                TRIMAP_UNKNOWN,
                TRIMAP_BACKGROUND,
            ]
        );
        // Above the top row counts as not-foreground
        assert_eq!(trimap.get_pixel(5, 0)[0], TRIMAP_UNKNOWN);
        assert_eq!(trimap.get_pixel(5, 1)[0], TRIMAP_FOREGROUND);
    }

    #[test]
    fn cutout_resolves_mixed_edge_pixels() {
        // Red subject on the left, blue background on the right, purple seam
        let image = RgbImage::from_fn(20, 10, |x, _| match x {
            0..=9 => image::Rgb([255, 0, 0]),
            10 => image::Rgb([128, 0, 128]),
            _ => image::Rgb([0, 0, 255]),
        });
        let mask = GrayImage::from_fn(20, 10, |x, _| match x {
            0..=9 => Luma([255]),
            10 => Luma([128]),
            _ => Luma([0]),
        });
        let params = MattingParams {
            erode_size: 2,
            ..Default::default()
        };

        let cutout = alpha_matting_cutout(&image, &mask, &params).unwrap();

        assert_eq!(cutout.get_pixel(5, 5), &Rgba([255, 0, 0, 255]));
        assert_eq!(cutout.get_pixel(15, 5), &Rgba([0, 0, 0, 0]));
        assert_eq!(cutout.get_pixel(11, 5)[3], 0);

        let seam = cutout.get_pixel(10, 5);
        assert!((120..=136).contains(&seam[3]), "seam alpha {}", seam[3]);
        assert!(seam[0] > 240 && seam[2] < 20, "seam colour {:?}", seam);
    }

    #[test]
    fn cutout_of_empty_mask_is_transparent() {
        let image = RgbImage::from_pixel(6, 6, image::Rgb([10, 20, 30]));
        let mask = GrayImage::new(6, 6);
        let cutout = alpha_matting_cutout(&image, &mask, &MattingParams::default()).unwrap();
        assert!(cutout.pixels().all(|p| p[3] == 0));
    }

    #[test]
    fn cutout_handles_frames_larger_than_u32_colour_totals() {
        // 17.2 Mpx of white foreground: the frame-wide colour total exceeds u32
        let (width, height) = (4200, 4100);
        let image = RgbImage::from_pixel(width, height, image::Rgb([255, 255, 255]));
        let mask = GrayImage::from_fn(width, height, |x, _| {
            Luma([if (2000..2040).contains(&x) { 128 } else { 255 }])
        });

        let cutout = alpha_matting_cutout(&image, &mask, &MattingParams::default()).unwrap();

        assert_eq!(cutout.get_pixel(100, 100), &Rgba([255, 255, 255, 255]));
        // The unknown band only sees white foreground around it
        let band = cutout.get_pixel(2020, 2000);
        assert!(band[3] > 0, "band alpha {}", band[3]);
    }
}
