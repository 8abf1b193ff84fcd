/// Source-space rectangle to sample from, in (possibly fractional) pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CropBox {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

/// Largest box with the target aspect ratio that fits inside the source,
/// positioned by `centering` (`(0.5, 0.5)` is centred, `(0.5, 0.0)` keeps the
/// top edge and crops only from the bottom).
pub fn fit_crop_box(
    src_w: u32,
    src_h: u32,
    target_w: u32,
    target_h: u32,
    centering: (f64, f64),
) -> CropBox {
    let iw = f64::from(src_w.max(1));
    let ih = f64::from(src_h.max(1));
    let target_ratio = f64::from(target_w.max(1)) / f64::from(target_h.max(1));
    let source_ratio = iw / ih;

    let (crop_w, crop_h) = if source_ratio > target_ratio {
        ((ih * target_ratio).round().clamp(1.0, iw), ih)
    } else if source_ratio < target_ratio {
        (iw, (iw / target_ratio).round().clamp(1.0, ih))
    } else {
        (iw, ih)
    };

    let cx = centering.0.clamp(0.0, 1.0);
    let cy = centering.1.clamp(0.0, 1.0);
    CropBox {
        left: (iw - crop_w) * cx,
        top: (ih - crop_h) * cy,
        width: crop_w,
        height: crop_h,
    }
}
