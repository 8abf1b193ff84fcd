use image::RgbImage;

use crate::processing::palette::PaletteTable;

/// An 8-bit index plane, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedImage {
    pub width: u32,
    pub height: u32,
    pub indices: Vec<u8>,
}

/// Floyd–Steinberg error diffusion against `table`.
///
/// Scans rows left to right. Error is carried in sixteenths so the result is
/// exact integer arithmetic and identical across runs and platforms.
pub fn dither(image: &RgbImage, table: &PaletteTable) -> IndexedImage {
    let (width, height) = image.dimensions();
    let w = width as usize;
    let mut indices = Vec::with_capacity(w * height as usize);

    // One slot of padding on each side so neighbours never need bounds checks.
    let mut current = vec![[0i32; 3]; w + 2];
    let mut next = vec![[0i32; 3]; w + 2];

    for y in 0..height {
        for x in 0..w {
            let px = image.get_pixel(x as u32, y).0;
            let carried = current[x + 1];
            let mut want = [0i32; 3];
            for c in 0..3 {
                let adjusted = i32::from(px[c]) + (carried[c] + 8).div_euclid(16);
                want[c] = adjusted.clamp(0, 255);
            }

            let idx = table.nearest(want);
            indices.push(idx);

            let chosen = table.entries()[usize::from(idx)];
            for c in 0..3 {
                let err = want[c] - i32::from(chosen[c]);
                current[x + 2][c] += err * 7;
                next[x][c] += err * 3;
                next[x + 1][c] += err * 5;
                next[x + 2][c] += err;
            }
        }
        std::mem::swap(&mut current, &mut next);
        next.iter_mut().for_each(|slot| *slot = [0; 3]);
    }

    IndexedImage {
        width,
        height,
        indices,
    }
}
