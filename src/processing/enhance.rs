use image::RgbImage;

use crate::config::EnhanceOptions;

/// Apply brightness, contrast and saturation, in that order.
///
/// Each pass interpolates between the image and a degenerate version of it
/// (black, mean grey, per-pixel grey). A factor of exactly `1.0` skips the pass.
pub fn apply(image: &mut RgbImage, options: &EnhanceOptions) {
    if image.width() == 0 || image.height() == 0 {
        return;
    }
    if options.brightness != 1.0 {
        brightness(image, options.brightness);
    }
    if options.contrast != 1.0 {
        contrast(image, options.contrast);
    }
    if options.saturation != 1.0 {
        saturation(image, options.saturation);
    }
}

fn brightness(image: &mut RgbImage, factor: f32) {
    for value in image.iter_mut() {
        *value = blend(0.0, f32::from(*value), factor);
    }
}

fn contrast(image: &mut RgbImage, factor: f32) {
    let mut total: u64 = 0;
    for px in image.pixels() {
        total += u64::from(luma(px.0));
    }
    let count = u64::from(image.width()) * u64::from(image.height());
    let mean = ((total as f64 / count as f64) + 0.5).floor() as f32;
    for value in image.iter_mut() {
        *value = blend(mean, f32::from(*value), factor);
    }
}

fn saturation(image: &mut RgbImage, factor: f32) {
    for px in image.pixels_mut() {
        let grey = f32::from(luma(px.0));
        for channel in px.0.iter_mut() {
            *channel = blend(grey, f32::from(*channel), factor);
        }
    }
}

/// ITU-R 601-2 luma in 16.16 fixed point.
#[inline]
pub fn luma(rgb: [u8; 3]) -> u8 {
    let [r, g, b] = rgb.map(u32::from);
    ((r * 19595 + g * 38470 + b * 7471 + 0x8000) >> 16) as u8
}

#[inline]
fn blend(degenerate: f32, value: f32, factor: f32) -> u8 {
    (degenerate + factor * (value - degenerate))
        .round()
        .clamp(0.0, 255.0) as u8
}
