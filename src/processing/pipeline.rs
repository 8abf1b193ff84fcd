use std::path::Path;
use std::time::Instant;

use anyhow::{Result, ensure};
use md5::{Digest, Md5};
use tracing::debug;

use crate::config::EnhanceOptions;
use crate::processing::pack::{PACKED_FRAME_LEN, pack_indices};
use crate::processing::palette::PaletteTable;
use crate::processing::{enhance, geometry, quantize};

/// Length of the content hash handed to devices.
pub const HASH_LEN: usize = 16;

/// Run the whole pipeline on `path` and return the packed frame.
///
/// Nothing is returned unless every stage succeeds and the output has the
/// exact panel size.
pub fn render_packed(path: &Path, options: &EnhanceOptions) -> Result<Vec<u8>> {
    let started = Instant::now();
    let mut canvas = geometry::normalize(path)?;
    enhance::apply(&mut canvas, options);
    let indexed = quantize::dither(&canvas, &PaletteTable::spectra6());
    let packed = pack_indices(&indexed.indices);
    ensure!(
        packed.len() == PACKED_FRAME_LEN,
        "pipeline produced {} bytes, expected {}",
        packed.len(),
        PACKED_FRAME_LEN
    );
    debug!(
        path = %path.display(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "rendered packed frame"
    );
    Ok(packed)
}

/// First 16 lowercase hex digits of the MD5 of `bytes`.
pub fn content_hash(bytes: &[u8]) -> String {
    let digest = Md5::digest(bytes);
    let mut hex = format!("{digest:x}");
    hex.truncate(HASH_LEN);
    hex
}
