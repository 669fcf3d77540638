use avatarfit::{
    ComposeSettings, LayerConfig, NormalizedPosition, NormalizedSize, RasterImage, Surface,
    compose, compose_surface,
};
use kurbo::Rect;

fn mix64(mut z: u64) -> u64 {
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

fn digest_u64(bytes: &[u8]) -> u64 {
    let mut state = 0x9E37_79B9_7F4A_7C15u64;
    for chunk in bytes.chunks(8) {
        let mut v = 0u64;
        for (i, &b) in chunk.iter().enumerate() {
            v |= (b as u64) << (i * 8);
        }
        state = mix64(state ^ v);
    }
    state
}

fn solid(width: u32, height: u32, rgba: [u8; 4]) -> RasterImage {
    let mut data = Vec::with_capacity((width as usize) * (height as usize) * 4);
    for _ in 0..(width as usize) * (height as usize) {
        data.extend_from_slice(&rgba);
    }
    RasterImage::from_rgba8(width, height, data).unwrap()
}

fn gradient(width: u32, height: u32) -> RasterImage {
    let mut data = Vec::with_capacity((width as usize) * (height as usize) * 4);
    for y in 0..height {
        for x in 0..width {
            data.extend_from_slice(&[
                (x * 255 / width.max(1)) as u8,
                (y * 255 / height.max(1)) as u8,
                128,
                255,
            ]);
        }
    }
    RasterImage::from_rgba8(width, height, data).unwrap()
}

fn layer(px: f64, py: f64, sw: f64, sh: f64) -> LayerConfig {
    LayerConfig::new(NormalizedPosition::new(px, py), NormalizedSize::new(sw, sh))
}

#[test]
fn compose_is_deterministic_for_identical_inputs() {
    let base = gradient(37, 53);
    let overlay = gradient(64, 48);
    let base_layer = layer(0.5, 0.06, 0.28, 0.28);
    let overlay_layer = layer(0.5, 0.4, 0.72, 0.72);
    let settings = ComposeSettings::default();

    let a = compose_surface(&base, &overlay, &base_layer, &overlay_layer, 128, &settings).unwrap();
    let b = compose_surface(&base, &overlay, &base_layer, &overlay_layer, 128, &settings).unwrap();

    assert_eq!(a.width(), 128);
    assert_eq!(digest_u64(a.as_premul_bytes()), digest_u64(b.as_premul_bytes()));
    assert!(a.as_premul_bytes().iter().any(|&x| x != 0));
}

#[test]
fn base_occludes_overlay_where_they_intersect() {
    let base = solid(40, 40, [255, 0, 0, 255]);
    let overlay = solid(40, 40, [0, 0, 255, 255]);

    // Overlay spans the middle of the canvas; the base circle lands inside it.
    let base_layer = layer(0.5, 0.4, 0.3, 0.3);
    let overlay_layer = layer(0.5, 0.3, 0.6, 0.6);
    let settings = ComposeSettings {
        shadow: None,
        ..ComposeSettings::default()
    };

    let surface =
        compose_surface(&base, &overlay, &base_layer, &overlay_layer, 200, &settings).unwrap();

    // Base circle center: rect (70, 80)..(130, 140), center (100, 110).
    assert_eq!(surface.pixel(100, 110), [255, 0, 0, 255]);

    // Inside the overlay but below the base circle: overlay wins.
    assert_eq!(surface.pixel(100, 160), [0, 0, 255, 255]);
}

#[test]
fn circular_clip_leaves_pixels_outside_the_circle_untouched() {
    let base = solid(16, 16, [255, 0, 0, 255]);
    let mut surface = Surface::new_filled(100, 100, [255, 255, 255, 255]);

    // Circle inscribed in (30, 10)..(70, 50): center (50, 30), radius 20.
    let dest = Rect::new(30.0, 10.0, 70.0, 50.0);
    avatarfit::compose::draw_circle_clipped(&mut surface, &base, dest, None).unwrap();

    let (cx, cy, radius) = (50.0, 30.0, 20.0);
    for y in 0..100u32 {
        for x in 0..100u32 {
            let dist =
                ((f64::from(x) + 0.5 - cx).powi(2) + (f64::from(y) + 0.5 - cy).powi(2)).sqrt();
            if dist > radius + 0.5 {
                assert_eq!(
                    surface.pixel(x, y),
                    [255, 255, 255, 255],
                    "pixel ({x},{y}) outside the circle was modified"
                );
            }
        }
    }

    // And the center is the clipped image.
    assert_eq!(surface.pixel(50, 30), [255, 0, 0, 255]);
}

#[test]
fn shadow_darkens_below_the_circle() {
    let base = solid(16, 16, [255, 0, 0, 255]);
    let overlay = solid(8, 8, [255, 255, 255, 255]);

    // Overlay far from the base so the region below the circle is plain
    // background.
    let base_layer = layer(0.3, 0.1, 0.2, 0.2);
    let overlay_layer = layer(0.8, 0.8, 0.1, 0.1);

    let with_shadow = ComposeSettings::default();
    let surface =
        compose_surface(&base, &overlay, &base_layer, &overlay_layer, 200, &with_shadow).unwrap();

    // Base rect (40, 20)..(80, 60); just below the circle's bottom edge.
    let below = surface.pixel(60, 63);
    assert!(below[3] == 255);
    assert!(
        below[0] < 255,
        "expected shadow to darken the background, got {below:?}"
    );
}

#[test]
fn compose_encodes_a_decodable_png_with_white_background() {
    let base = gradient(20, 20);
    let overlay = gradient(30, 30);
    let result = compose(
        &base,
        &overlay,
        &layer(0.5, 0.06, 0.28, 0.28),
        &layer(0.5, 0.4, 0.72, 0.72),
        64,
        &ComposeSettings::default(),
    )
    .unwrap();

    assert_eq!(result.width, 64);
    assert_eq!(result.height, 64);

    let decoded = image::load_from_memory(&result.png).unwrap().to_rgba8();
    assert_eq!(decoded.dimensions(), (64, 64));
    // Canvas corners are untouched background.
    assert_eq!(decoded.get_pixel(0, 0).0, [255, 255, 255, 255]);
    assert_eq!(decoded.get_pixel(63, 63).0, [255, 255, 255, 255]);

    assert!(!result.to_base64().is_empty());
}

#[test]
fn overlay_is_contain_fitted_inside_its_rect() {
    let overlay = solid(100, 50, [0, 255, 0, 255]);
    let base = solid(8, 8, [255, 0, 0, 255]);

    // Overlay rect (20, 40)..(180, 200); a 2:1 source leaves horizontal
    // bands of background inside the box.
    let base_layer = layer(0.5, 0.0, 0.05, 0.05);
    let overlay_layer = layer(0.5, 0.2, 0.8, 0.8);
    let settings = ComposeSettings {
        shadow: None,
        ..ComposeSettings::default()
    };

    let surface =
        compose_surface(&base, &overlay, &base_layer, &overlay_layer, 200, &settings).unwrap();

    // Drawn rect: 160x80 centered vertically in the box, y in (80, 160).
    assert_eq!(surface.pixel(100, 120), [0, 255, 0, 255]);
    // Above and below the drawn band the background shows through.
    assert_eq!(surface.pixel(100, 50), [255, 255, 255, 255]);
    assert_eq!(surface.pixel(100, 180), [255, 255, 255, 255]);
}
