use image::{Rgb, RgbImage};
use spectra_frame_server::cache::{FrameCache, PipelineRenderer};
use spectra_frame_server::config::EnhanceOptions;
use spectra_frame_server::processing::pack::{PACKED_FRAME_LEN, unpack_nibbles};
use spectra_frame_server::processing::palette::PALETTE;
use spectra_frame_server::processing::pipeline::{content_hash, render_packed};
use std::path::Path;
use tempfile::tempdir;

fn gradient(path: &Path, w: u32, h: u32) {
    RgbImage::from_fn(w, h, |x, y| {
        Rgb([
            (x * 255 / w.max(1)) as u8,
            (y * 255 / h.max(1)) as u8,
            ((x + y) % 256) as u8,
        ])
    })
    .save(path)
    .unwrap();
}

#[test]
fn single_pixel_source_fills_the_panel() {
    let tmp = tempdir().unwrap();
    let path = tmp.path().join("dot.png");
    RgbImage::from_pixel(1, 1, Rgb([255, 255, 255])).save(&path).unwrap();

    let packed = render_packed(&path, &EnhanceOptions::IDENTITY).unwrap();
    assert_eq!(packed.len(), PACKED_FRAME_LEN);
    assert_eq!(packed.len(), 960_000);
    // pure white stays white everywhere
    assert!(packed.iter().all(|&b| b == 0x11));
}

#[test]
fn identical_input_gives_identical_frame_and_hash() {
    let tmp = tempdir().unwrap();
    let path = tmp.path().join("gradient.png");
    gradient(&path, 64, 48);
    let options = EnhanceOptions::default();

    let first = render_packed(&path, &options).unwrap();
    let second = render_packed(&path, &options).unwrap();
    assert!(first == second);
    assert_eq!(content_hash(&first), content_hash(&second));

    let plain = render_packed(&path, &EnhanceOptions::IDENTITY).unwrap();
    assert_ne!(content_hash(&first), content_hash(&plain));
}

#[test]
fn output_only_uses_hardware_codes() {
    let tmp = tempdir().unwrap();
    let path = tmp.path().join("gradient.png");
    gradient(&path, 40, 30);

    let packed = render_packed(&path, &EnhanceOptions::default()).unwrap();
    let allowed: Vec<u8> = PALETTE.iter().map(|c| c.nibble).collect();
    assert!(unpack_nibbles(&packed).iter().all(|n| allowed.contains(n)));
}

#[test]
fn corrupt_source_is_a_processing_error() {
    let tmp = tempdir().unwrap();
    let path = tmp.path().join("broken.jpg");
    std::fs::write(&path, b"definitely not a jpeg").unwrap();

    let cache = FrameCache::new(PipelineRenderer::new(EnhanceOptions::default()));
    let err = cache.get_frame(&path).unwrap_err();
    assert!(!err.is_unavailable());
    assert!(cache.cached().is_none());
}
