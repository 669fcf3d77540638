use kurbo::Rect;

use crate::{
    core::LayerConfig,
    error::{AvatarfitError, AvatarfitResult},
};

/// Resolve a layer's absolute pixel rectangle on a square canvas of edge
/// `canvas_size`.
///
/// The horizontal position is center-anchored (`position.x` marks the
/// rectangle's center) while the vertical position is top-anchored
/// (`position.y` marks the top edge). Callers rely on this asymmetry to
/// keep layers visually anchored from the top of the canvas.
pub fn resolve_layer_rect(canvas_size: u32, layer: &LayerConfig) -> Rect {
    let s = f64::from(canvas_size);
    let w = s * layer.size.width;
    let h = s * layer.size.height;
    let x = s * layer.position.x - w / 2.0;
    let y = s * layer.position.y;
    Rect::new(x, y, x + w, y + h)
}

/// Compute the "contain" draw rectangle for an image inside `dest`: the
/// largest centered rectangle that preserves the image's aspect ratio and
/// fits entirely within the box. No cropping, no distortion.
pub fn contain_rect(image_w: u32, image_h: u32, dest: Rect) -> AvatarfitResult<Rect> {
    if image_w == 0 || image_h == 0 {
        return Err(AvatarfitError::invalid_image_dimensions(format!(
            "contain fit requires a non-empty source image, got {image_w}x{image_h}"
        )));
    }

    let scale = (dest.width() / f64::from(image_w)).min(dest.height() / f64::from(image_h));
    let w = f64::from(image_w) * scale;
    let h = f64::from(image_h) * scale;
    let x = dest.x0 + (dest.width() - w) / 2.0;
    let y = dest.y0 + (dest.height() - h) / 2.0;
    Ok(Rect::new(x, y, x + w, y + h))
}
