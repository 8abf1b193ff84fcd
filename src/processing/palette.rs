//! The six inks of the Spectra 6 panel and their wire codes.

/// One ink: its logical index, the RGB it is matched against, and the
/// 4-bit code the panel controller expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaletteColor {
    pub index: u8,
    pub rgb: [u8; 3],
    pub nibble: u8,
}

// Nibbles 0x04 and 0x07 are not inks on this controller; the gap is real.
pub const PALETTE: [PaletteColor; 6] = [
    PaletteColor { index: 0, rgb: [0, 0, 0], nibble: 0x00 },
    PaletteColor { index: 1, rgb: [255, 255, 255], nibble: 0x01 },
    PaletteColor { index: 2, rgb: [255, 255, 0], nibble: 0x02 },
    PaletteColor { index: 3, rgb: [255, 0, 0], nibble: 0x03 },
    PaletteColor { index: 4, rgb: [0, 0, 255], nibble: 0x05 },
    PaletteColor { index: 5, rgb: [41, 204, 20], nibble: 0x06 },
];

pub const WHITE_INDEX: u8 = 1;
pub const WHITE_NIBBLE: u8 = 0x01;

/// Hardware code for a palette index. Unknown indices render as white.
#[inline]
pub fn hardware_nibble(index: u8) -> u8 {
    PALETTE
        .get(usize::from(index))
        .map_or(WHITE_NIBBLE, |color| color.nibble)
}

/// Reverse of [`hardware_nibble`] for the six real inks.
pub fn color_for_nibble(nibble: u8) -> Option<&'static PaletteColor> {
    PALETTE.iter().find(|color| color.nibble == nibble)
}

/// A 256-entry RGB table for 8-bit index planes.
///
/// Only the first `active` entries are real inks; the remainder is black
/// filler and can never win a nearest-colour search because index 0 is
/// already black and ties resolve to the lower index.
#[derive(Debug, Clone)]
pub struct PaletteTable {
    entries: [[u8; 3]; 256],
    active: usize,
}

impl PaletteTable {
    pub fn spectra6() -> Self {
        let mut entries = [[0u8; 3]; 256];
        for color in &PALETTE {
            entries[usize::from(color.index)] = color.rgb;
        }
        Self {
            entries,
            active: PALETTE.len(),
        }
    }

    pub fn entries(&self) -> &[[u8; 3]; 256] {
        &self.entries
    }

    pub fn active(&self) -> &[[u8; 3]] {
        &self.entries[..self.active]
    }

    /// Index of the closest active entry by squared RGB distance.
    #[inline]
    pub fn nearest(&self, rgb: [i32; 3]) -> u8 {
        let mut best = 0usize;
        let mut best_dist = i32::MAX;
        for (idx, entry) in self.active().iter().enumerate() {
            let dr = rgb[0] - i32::from(entry[0]);
            let dg = rgb[1] - i32::from(entry[1]);
            let db = rgb[2] - i32::from(entry[2]);
            let dist = dr * dr + dg * dg + db * db;
            if dist < best_dist {
                best_dist = dist;
                best = idx;
            }
        }
        best as u8
    }
}
