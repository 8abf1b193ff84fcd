//! Source image → fixed landscape canvas.
//!
//! The panel is mounted in portrait with the controller board at the bottom,
//! so pictures are composed on a portrait canvas and then turned a quarter
//! clockwise into the 1600x1200 buffer the controller scans out.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::{Context, Result};
use fast_image_resize as fir;
use image::{DynamicImage, ImageReader, RgbImage, imageops};
use tracing::debug;

use crate::processing::layout::fit_crop_box;

/// Width of the packed frame buffer (landscape).
pub const FRAME_WIDTH: u32 = 1600;
/// Height of the packed frame buffer (landscape).
pub const FRAME_HEIGHT: u32 = 1200;

// Crop anchor for the portrait fit: centred horizontally, top edge kept.
const FIT_CENTERING: (f64, f64) = (0.5, 0.0);

/// Decode `path`, upright it, and produce the `FRAME_WIDTH x FRAME_HEIGHT`
/// RGB buffer.
pub fn normalize(path: &Path) -> Result<RgbImage> {
    let upright = decode_oriented(path)?;
    let rgb = upright.to_rgb8();
    let portrait = fit_lanczos(&rgb, FRAME_HEIGHT, FRAME_WIDTH)?;
    Ok(imageops::rotate90(&portrait))
}

/// Decodes an image and applies its EXIF orientation if one is present.
pub fn decode_oriented(path: &Path) -> Result<DynamicImage> {
    let img = ImageReader::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?
        .with_guessed_format()
        .with_context(|| format!("failed to sniff format of {}", path.display()))?
        .decode()
        .with_context(|| format!("failed to decode {}", path.display()))?;

    let orientation = read_orientation(path).unwrap_or(1);
    Ok(match orientation {
        2 => img.fliph(),
        3 => img.rotate180(),
        4 => img.flipv(),
        // transpose
        5 => img.rotate90().fliph(),
        6 => img.rotate90(),
        // transverse
        7 => img.rotate270().fliph(),
        8 => img.rotate270(),
        _ => img,
    })
}

fn read_orientation(path: &Path) -> Option<u16> {
    let file = File::open(path).ok()?;
    let mut buf = BufReader::new(file);
    let exif = exif::Reader::new().read_from_container(&mut buf).ok()?;
    let field = exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)?;
    let o = field.value.get_uint(0)? as u16;
    debug!(orientation = o, path = %path.display(), "exif orientation");
    Some(o)
}

/// Scale-and-crop `source` to exactly `target_w x target_h` with Lanczos3.
pub fn fit_lanczos(source: &RgbImage, target_w: u32, target_h: u32) -> Result<RgbImage> {
    anyhow::ensure!(
        target_w > 0 && target_h > 0,
        "fit dimensions must be positive"
    );
    let (src_w, src_h) = source.dimensions();
    anyhow::ensure!(src_w > 0 && src_h > 0, "source image is empty");

    let crop = fit_crop_box(src_w, src_h, target_w, target_h, FIT_CENTERING);

    // The resizer is built for 4-channel pixels only; alpha is constant.
    let mut rgba = Vec::with_capacity(source.as_raw().len() / 3 * 4);
    for px in source.as_raw().chunks_exact(3) {
        rgba.extend_from_slice(&[px[0], px[1], px[2], 255]);
    }
    let src_view = fir::images::ImageRef::new(src_w, src_h, &rgba, fir::PixelType::U8x4)
        .context("failed to create source view for fit resize")?;
    let mut dst_image = fir::images::Image::new(target_w, target_h, fir::PixelType::U8x4);
    let options = fir::ResizeOptions::new()
        .resize_alg(fir::ResizeAlg::Convolution(fir::FilterType::Lanczos3))
        .crop(crop.left, crop.top, crop.width, crop.height)
        .use_alpha(false);
    let mut resizer = fir::Resizer::new();
    resizer
        .resize(&src_view, &mut dst_image, Some(&options))
        .context("fit resize failed")?;

    let resized = dst_image.into_vec();
    let mut rgb = Vec::with_capacity((target_w as usize) * (target_h as usize) * 3);
    for px in resized.chunks_exact(4) {
        rgb.extend_from_slice(&px[..3]);
    }
    RgbImage::from_raw(target_w, target_h, rgb)
        .ok_or_else(|| anyhow::anyhow!("failed to construct resized RGB image"))
}
