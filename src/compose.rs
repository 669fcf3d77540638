use std::io::Cursor;

use anyhow::Context as _;
use base64::Engine as _;
use kurbo::Rect;

use crate::{
    blur::blur_mask,
    core::LayerConfig,
    error::{AvatarfitError, AvatarfitResult},
    layout::{contain_rect, resolve_layer_rect},
    raster::RasterImage,
};

pub type PremulRgba8 = [u8; 4];

/// Source-over blend of premultiplied RGBA8 pixels with an extra coverage
/// factor in `[0, 1]` (used for antialiased clip edges).
pub fn over(dst: PremulRgba8, src: PremulRgba8, coverage: f32) -> PremulRgba8 {
    let coverage = coverage.clamp(0.0, 1.0);
    if coverage <= 0.0 || src[3] == 0 {
        return dst;
    }

    let cov = ((coverage * 255.0).round() as i32).clamp(0, 255) as u16;
    let sa = mul_div255(u16::from(src[3]), cov);
    if sa == 0 {
        return dst;
    }

    let inv = 255u16 - u16::from(sa);

    let mut out = [0u8; 4];
    out[3] = add_sat_u8(sa, mul_div255(u16::from(dst[3]), inv));

    for i in 0..3 {
        let sc = mul_div255(u16::from(src[i]), cov);
        let dc = mul_div255(u16::from(dst[i]), inv);
        out[i] = add_sat_u8(sc, dc);
    }
    out
}

fn mul_div255(x: u16, y: u16) -> u8 {
    (((u32::from(x) * u32::from(y)) + 127) / 255) as u8
}

fn add_sat_u8(a: u8, b: u8) -> u8 {
    a.saturating_add(b)
}

/// Drop shadow rendered beneath the circularly clipped base layer.
///
/// `color` is straight-alpha RGBA; the default matches a soft dark shadow
/// with a small blur and a small downward offset.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ShadowSpec {
    pub color: [u8; 4],
    pub blur_radius: u32,
    pub offset_y: i32,
}

impl Default for ShadowSpec {
    fn default() -> Self {
        Self {
            // rgba(0,0,0,0.08)
            color: [0, 0, 0, 20],
            blur_radius: 8,
            offset_y: 2,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ComposeSettings {
    /// Straight-alpha canvas fill, applied before any layer is drawn.
    pub background: [u8; 4],
    /// Shadow for the base layer; `None` disables it.
    pub shadow: Option<ShadowSpec>,
}

impl Default for ComposeSettings {
    fn default() -> Self {
        Self {
            background: [255, 255, 255, 255],
            shadow: Some(ShadowSpec::default()),
        }
    }
}

/// Square working canvas, premultiplied RGBA8.
#[derive(Clone, Debug)]
pub struct Surface {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl Surface {
    pub fn new_filled(width: u32, height: u32, background: [u8; 4]) -> Self {
        let premul = premul_rgba8(background);
        let mut data = Vec::with_capacity((width as usize) * (height as usize) * 4);
        for _ in 0..(width as usize) * (height as usize) {
            data.extend_from_slice(&premul);
        }
        Self {
            width,
            height,
            data,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixel(&self, x: u32, y: u32) -> PremulRgba8 {
        let idx = ((y * self.width + x) as usize) * 4;
        let px = &self.data[idx..idx + 4];
        [px[0], px[1], px[2], px[3]]
    }

    fn blend_pixel(&mut self, x: u32, y: u32, src: PremulRgba8, coverage: f32) {
        let idx = ((y * self.width + x) as usize) * 4;
        let dst = [
            self.data[idx],
            self.data[idx + 1],
            self.data[idx + 2],
            self.data[idx + 3],
        ];
        let out = over(dst, src, coverage);
        self.data[idx..idx + 4].copy_from_slice(&out);
    }

    pub fn as_premul_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Encode to PNG with straight alpha.
    pub fn encode_png(&self) -> AvatarfitResult<Vec<u8>> {
        let mut rgba = self.data.clone();
        unpremultiply_rgba8_in_place(&mut rgba);
        let img = image::RgbaImage::from_raw(self.width, self.height, rgba)
            .ok_or_else(|| AvatarfitError::validation("surface buffer does not match dimensions"))?;

        let mut buf = Vec::new();
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .context("encode composite png")?;
        Ok(buf)
    }
}

/// Encoded composite produced by one compose call.
#[derive(Clone, Debug)]
pub struct CompositeResult {
    pub width: u32,
    pub height: u32,
    pub png: Vec<u8>,
}

impl CompositeResult {
    /// Base64 of the PNG bytes, the shape the generation API expects.
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.png)
    }
}

/// Draw `image` contain-fitted into `dest`: scaled uniformly to the largest
/// centered rectangle that fits, then blended onto the surface. Returns the
/// drawn rectangle.
pub fn draw_contained(
    surface: &mut Surface,
    image: &RasterImage,
    dest: Rect,
) -> AvatarfitResult<Rect> {
    let drawn = contain_rect(image.width(), image.height(), dest)?;

    let ix = drawn.x0.round() as i64;
    let iy = drawn.y0.round() as i64;
    let iw = (drawn.width().round() as i64).max(1) as u32;
    let ih = (drawn.height().round() as i64).max(1) as u32;

    let scaled = image.resized(iw, ih)?;
    for sy in 0..ih {
        let Some(ty) = surface_coord(iy + i64::from(sy), surface.height) else {
            continue;
        };
        for sx in 0..iw {
            let Some(tx) = surface_coord(ix + i64::from(sx), surface.width) else {
                continue;
            };
            surface.blend_pixel(tx, ty, scaled.pixel(sx, sy), 1.0);
        }
    }
    Ok(drawn)
}

/// Draw `image` clipped to the circle inscribed in `dest`, with an optional
/// drop shadow beneath the clipped region.
///
/// The source is first cropped to its largest centered square, then scaled
/// to fill `dest` exactly. The circle's radius is taken from the width;
/// callers keep `dest` square so the clip matches the box.
pub fn draw_circle_clipped(
    surface: &mut Surface,
    image: &RasterImage,
    dest: Rect,
    shadow: Option<&ShadowSpec>,
) -> AvatarfitResult<()> {
    if image.width() == 0 || image.height() == 0 {
        return Err(AvatarfitError::invalid_image_dimensions(
            "circular clip requires a non-empty source image",
        ));
    }

    let cx = dest.x0 + dest.width() / 2.0;
    let cy = dest.y0 + dest.height() / 2.0;
    let radius = dest.width() / 2.0;

    if let Some(spec) = shadow {
        draw_circle_shadow(surface, cx, cy, radius, spec)?;
    }

    let crop = image.center_square_crop();

    let ix = dest.x0.round() as i64;
    let iy = dest.y0.round() as i64;
    let iw = (dest.width().round() as i64).max(1) as u32;
    let ih = (dest.height().round() as i64).max(1) as u32;
    let scaled = crop.resized(iw, ih)?;

    for sy in 0..ih {
        let py = iy + i64::from(sy);
        let Some(ty) = surface_coord(py, surface.height) else {
            continue;
        };
        for sx in 0..iw {
            let px = ix + i64::from(sx);
            let Some(tx) = surface_coord(px, surface.width) else {
                continue;
            };
            let cov = circle_coverage(px as f64 + 0.5, py as f64 + 0.5, cx, cy, radius);
            if cov > 0.0 {
                surface.blend_pixel(tx, ty, scaled.pixel(sx, sy), cov);
            }
        }
    }
    Ok(())
}

/// Compose the final canvas: opaque background, overlay contain-fitted
/// first, base circularly clipped on top so it occludes the overlay where
/// they intersect. Layer placements are not mutated; identical inputs yield
/// identical pixels.
#[tracing::instrument(skip(base, overlay, base_layer, overlay_layer, settings))]
pub fn compose_surface(
    base: &RasterImage,
    overlay: &RasterImage,
    base_layer: &LayerConfig,
    overlay_layer: &LayerConfig,
    canvas_size: u32,
    settings: &ComposeSettings,
) -> AvatarfitResult<Surface> {
    if canvas_size == 0 {
        return Err(AvatarfitError::validation("canvas size must be > 0"));
    }
    base_layer.validate()?;
    overlay_layer.validate()?;

    let mut surface = Surface::new_filled(canvas_size, canvas_size, settings.background);

    let overlay_rect = resolve_layer_rect(canvas_size, overlay_layer);
    let drawn = draw_contained(&mut surface, overlay, overlay_rect)?;
    tracing::debug!(?overlay_rect, ?drawn, "overlay drawn");

    let base_rect = resolve_layer_rect(canvas_size, base_layer);
    draw_circle_clipped(&mut surface, base, base_rect, settings.shadow.as_ref())?;
    tracing::debug!(?base_rect, "base drawn");

    Ok(surface)
}

/// [`compose_surface`] plus PNG encoding. Pixel content is deterministic
/// for identical inputs; encoder bytes are not guaranteed stable.
pub fn compose(
    base: &RasterImage,
    overlay: &RasterImage,
    base_layer: &LayerConfig,
    overlay_layer: &LayerConfig,
    canvas_size: u32,
    settings: &ComposeSettings,
) -> AvatarfitResult<CompositeResult> {
    let surface = compose_surface(base, overlay, base_layer, overlay_layer, canvas_size, settings)?;
    let png = surface.encode_png()?;
    tracing::info!(canvas_size, png_len = png.len(), "composite encoded");
    Ok(CompositeResult {
        width: canvas_size,
        height: canvas_size,
        png,
    })
}

fn draw_circle_shadow(
    surface: &mut Surface,
    cx: f64,
    cy: f64,
    radius: f64,
    spec: &ShadowSpec,
) -> AvatarfitResult<()> {
    if spec.color[3] == 0 || radius <= 0.0 {
        return Ok(());
    }

    let scy = cy + f64::from(spec.offset_y);
    let pad = i64::from(spec.blur_radius) + 1;
    let mx0 = ((cx - radius).floor() as i64) - pad;
    let my0 = ((scy - radius).floor() as i64) - pad;
    let mw = ((radius * 2.0).ceil() as i64 + 2 * pad).max(1) as u32;
    let mh = mw;

    let mut mask = vec![0u8; (mw as usize) * (mh as usize)];
    for my in 0..mh {
        let py = (my0 + i64::from(my)) as f64 + 0.5;
        for mx in 0..mw {
            let px = (mx0 + i64::from(mx)) as f64 + 0.5;
            let cov = circle_coverage(px, py, cx, scy, radius);
            mask[(my * mw + mx) as usize] = (cov * 255.0).round() as u8;
        }
    }

    let sigma = (spec.blur_radius as f32 / 2.0).max(0.5);
    let blurred = blur_mask(&mask, mw, mh, spec.blur_radius, sigma)?;

    for my in 0..mh {
        let Some(ty) = surface_coord(my0 + i64::from(my), surface.height) else {
            continue;
        };
        for mx in 0..mw {
            let Some(tx) = surface_coord(mx0 + i64::from(mx), surface.width) else {
                continue;
            };
            let m = blurred[(my * mw + mx) as usize];
            if m == 0 {
                continue;
            }
            let alpha = mul_div255(u16::from(m), u16::from(spec.color[3]));
            if alpha == 0 {
                continue;
            }
            let src = premul_rgba8([spec.color[0], spec.color[1], spec.color[2], alpha]);
            surface.blend_pixel(tx, ty, src, 1.0);
        }
    }
    Ok(())
}

/// Antialiased coverage of the point `(px, py)` by the circle centered at
/// `(cx, cy)`: 1 inside, 0 outside, a linear ramp across the boundary
/// pixel.
fn circle_coverage(px: f64, py: f64, cx: f64, cy: f64, radius: f64) -> f32 {
    let dist = ((px - cx).powi(2) + (py - cy).powi(2)).sqrt();
    (radius - dist + 0.5).clamp(0.0, 1.0) as f32
}

fn premul_rgba8(straight: [u8; 4]) -> PremulRgba8 {
    let a = u16::from(straight[3]);
    [
        ((u16::from(straight[0]) * a + 127) / 255) as u8,
        ((u16::from(straight[1]) * a + 127) / 255) as u8,
        ((u16::from(straight[2]) * a + 127) / 255) as u8,
        straight[3],
    ]
}

fn unpremultiply_rgba8_in_place(rgba: &mut [u8]) {
    for px in rgba.chunks_exact_mut(4) {
        let a = px[3] as u32;
        if a == 0 || a == 255 {
            continue;
        }
        for c in 0..3 {
            px[c] = ((u32::from(px[c]) * 255 + a / 2) / a).min(255) as u8;
        }
    }
}

fn surface_coord(v: i64, limit: u32) -> Option<u32> {
    if v < 0 || v >= i64::from(limit) {
        None
    } else {
        Some(v as u32)
    }
}
