//! 4-bit packing of palette indices into the controller's wire format.
//!
//! Byte `i` carries pixels `2i` (high nibble) and `2i + 1` (low nibble).

use anyhow::{Result, ensure};
use image::RgbImage;

use crate::processing::geometry::{FRAME_HEIGHT, FRAME_WIDTH};
use crate::processing::palette::{WHITE_INDEX, WHITE_NIBBLE, color_for_nibble, hardware_nibble};

/// Size of a packed full-panel frame in bytes.
pub const PACKED_FRAME_LEN: usize = (FRAME_WIDTH as usize) * (FRAME_HEIGHT as usize) / 2;

/// Pack palette indices two per byte. An odd trailing pixel is paired with white.
pub fn pack_indices(indices: &[u8]) -> Vec<u8> {
    indices
        .chunks(2)
        .map(|pair| {
            let hi = hardware_nibble(pair[0]);
            let lo = hardware_nibble(pair.get(1).copied().unwrap_or(WHITE_INDEX));
            (hi << 4) | lo
        })
        .collect()
}

/// Split packed bytes back into hardware nibbles, high nibble first.
pub fn unpack_nibbles(packed: &[u8]) -> Vec<u8> {
    packed
        .iter()
        .flat_map(|byte| [byte >> 4, byte & 0x0F])
        .collect()
}

/// Render a packed full frame as an RGB picture of what the panel will show.
pub fn preview_image(packed: &[u8]) -> Result<RgbImage> {
    ensure!(
        packed.len() == PACKED_FRAME_LEN,
        "packed frame must be {} bytes, got {}",
        PACKED_FRAME_LEN,
        packed.len()
    );
    let white = color_for_nibble(WHITE_NIBBLE).map_or([255, 255, 255], |c| c.rgb);
    let mut raw = Vec::with_capacity(PACKED_FRAME_LEN * 2 * 3);
    for nibble in unpack_nibbles(packed) {
        let rgb = color_for_nibble(nibble).map_or(white, |c| c.rgb);
        raw.extend_from_slice(&rgb);
    }
    RgbImage::from_raw(FRAME_WIDTH, FRAME_HEIGHT, raw)
        .ok_or_else(|| anyhow::anyhow!("failed to build preview image"))
}
