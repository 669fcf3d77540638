use std::path::Path;

use image::{RgbaImage, imageops};

use crate::error::{AvatarfitError, AvatarfitResult};

/// Decoded bitmap held as premultiplied RGBA8, row-major, tightly packed.
///
/// Immutable once loaded; owned transiently by the compositor for the
/// duration of one compose call.
#[derive(Clone, Debug)]
pub struct RasterImage {
    width: u32,
    height: u32,
    rgba8_premul: Vec<u8>,
}

impl RasterImage {
    /// Decode an encoded image (PNG, JPEG, ...) from memory.
    pub fn decode(bytes: &[u8]) -> AvatarfitResult<Self> {
        let dyn_img = image::load_from_memory(bytes)
            .map_err(|e| AvatarfitError::image_load(format!("decode image from memory: {e}")))?;
        let rgba = dyn_img.to_rgba8();
        let (width, height) = rgba.dimensions();

        let mut rgba8_premul = rgba.into_raw();
        premultiply_rgba8_in_place(&mut rgba8_premul);

        Ok(Self {
            width,
            height,
            rgba8_premul,
        })
    }

    /// Read and decode an image file.
    pub fn from_path(path: &Path) -> AvatarfitResult<Self> {
        let bytes = std::fs::read(path)
            .map_err(|e| AvatarfitError::image_load(format!("read '{}': {e}", path.display())))?;
        Self::decode(&bytes)
    }

    /// Build from straight-alpha RGBA8 pixels.
    pub fn from_rgba8(width: u32, height: u32, mut rgba: Vec<u8>) -> AvatarfitResult<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(4))
            .ok_or_else(|| AvatarfitError::validation("raster buffer size overflow"))?;
        if rgba.len() != expected {
            return Err(AvatarfitError::validation(
                "from_rgba8 expects rgba matching width*height*4",
            ));
        }
        premultiply_rgba8_in_place(&mut rgba);
        Ok(Self {
            width,
            height,
            rgba8_premul: rgba,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Premultiplied RGBA8 pixel at `(x, y)`. Out-of-bounds reads are a
    /// caller bug and panic in debug via the slice index.
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let idx = ((y * self.width + x) as usize) * 4;
        let px = &self.rgba8_premul[idx..idx + 4];
        [px[0], px[1], px[2], px[3]]
    }

    pub fn as_premul_bytes(&self) -> &[u8] {
        &self.rgba8_premul
    }

    /// Largest centered square crop of the image (`s = min(width, height)`).
    pub fn center_square_crop(&self) -> Self {
        let s = self.width.min(self.height);
        let sx = (self.width - s) / 2;
        let sy = (self.height - s) / 2;

        let mut out = Vec::with_capacity((s as usize) * (s as usize) * 4);
        for y in sy..sy + s {
            let row = ((y * self.width + sx) as usize) * 4;
            out.extend_from_slice(&self.rgba8_premul[row..row + (s as usize) * 4]);
        }
        Self {
            width: s,
            height: s,
            rgba8_premul: out,
        }
    }

    /// Uniformly resample to `width x height`.
    pub fn resized(&self, width: u32, height: u32) -> AvatarfitResult<Self> {
        if self.width == 0 || self.height == 0 {
            return Err(AvatarfitError::invalid_image_dimensions(
                "cannot resize an empty source image",
            ));
        }
        if width == 0 || height == 0 {
            return Err(AvatarfitError::invalid_image_dimensions(
                "resize target must be non-empty",
            ));
        }
        if width == self.width && height == self.height {
            return Ok(self.clone());
        }

        let src = RgbaImage::from_raw(self.width, self.height, self.rgba8_premul.clone())
            .ok_or_else(|| AvatarfitError::validation("raster buffer does not match dimensions"))?;
        let resized = imageops::resize(&src, width, height, imageops::FilterType::Lanczos3);
        Ok(Self {
            width,
            height,
            rgba8_premul: resized.into_raw(),
        })
    }
}

fn premultiply_rgba8_in_place(rgba: &mut [u8]) {
    for px in rgba.chunks_exact_mut(4) {
        let a = px[3] as u16;
        if a == 0 {
            px[0] = 0;
            px[1] = 0;
            px[2] = 0;
            continue;
        }
        px[0] = ((px[0] as u16 * a + 127) / 255) as u8;
        px[1] = ((px[1] as u16 * a + 127) / 255) as u8;
        px[2] = ((px[2] as u16 * a + 127) / 255) as u8;
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn decode_png_dimensions_and_premul() {
        let src_rgba = vec![100u8, 50u8, 200u8, 128u8];
        let img = RgbaImage::from_raw(1, 1, src_rgba).unwrap();

        let mut buf = Vec::new();
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();

        let decoded = RasterImage::decode(&buf).unwrap();
        assert_eq!(decoded.width(), 1);
        assert_eq!(decoded.height(), 1);
        assert_eq!(
            decoded.pixel(0, 0),
            [
                ((100u16 * 128 + 127) / 255) as u8,
                ((50u16 * 128 + 127) / 255) as u8,
                ((200u16 * 128 + 127) / 255) as u8,
                128u8
            ]
        );
    }

    #[test]
    fn decode_garbage_is_image_load_error() {
        let err = RasterImage::decode(b"definitely not an image").unwrap_err();
        assert!(matches!(err, AvatarfitError::ImageLoad(_)));
    }

    #[test]
    fn from_rgba8_rejects_wrong_length() {
        assert!(RasterImage::from_rgba8(2, 2, vec![0u8; 4]).is_err());
    }

    #[test]
    fn center_square_crop_takes_the_middle() {
        // 4x2: columns 0..4, crop should keep columns 1..3.
        let mut rgba = Vec::new();
        for y in 0..2u8 {
            for x in 0..4u8 {
                rgba.extend_from_slice(&[x * 10, y * 10, 0, 255]);
            }
        }
        let img = RasterImage::from_rgba8(4, 2, rgba).unwrap();
        let crop = img.center_square_crop();

        assert_eq!(crop.width(), 2);
        assert_eq!(crop.height(), 2);
        assert_eq!(crop.pixel(0, 0)[0], 10);
        assert_eq!(crop.pixel(1, 0)[0], 20);
        assert_eq!(crop.pixel(0, 1)[1], 10);
    }

    #[test]
    fn center_square_crop_of_square_is_identity() {
        let img = RasterImage::from_rgba8(3, 3, vec![7u8; 3 * 3 * 4]).unwrap();
        let crop = img.center_square_crop();
        assert_eq!(crop.width(), 3);
        assert_eq!(crop.as_premul_bytes(), img.as_premul_bytes());
    }

    #[test]
    fn resized_changes_dimensions_and_rejects_empty_targets() {
        let img = RasterImage::from_rgba8(4, 4, vec![255u8; 4 * 4 * 4]).unwrap();
        let small = img.resized(2, 2).unwrap();
        assert_eq!(small.width(), 2);
        assert_eq!(small.height(), 2);
        assert_eq!(small.pixel(0, 0), [255, 255, 255, 255]);

        assert!(img.resized(0, 2).is_err());
    }
}
