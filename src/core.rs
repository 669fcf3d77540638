use crate::error::{AvatarfitError, AvatarfitResult};

pub use kurbo::{Point, Rect};

/// Fractional coordinate of the canvas, each axis in `[0, 1]`.
///
/// `x` marks the horizontal center of a layer; `y` marks its top edge.
/// The anchoring itself is applied by the layout resolver.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct NormalizedPosition {
    pub x: f64,
    pub y: f64,
}

impl NormalizedPosition {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Layer extent as a fraction of the canvas edge, each axis in `(0, 1]`.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct NormalizedSize {
    pub width: f64,
    pub height: f64,
}

impl NormalizedSize {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// The two layer roles of a composition session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum LayerRole {
    /// The avatar subject, drawn on top with circular clipping.
    Base,
    /// The outfit backdrop, contain-fitted beneath the base.
    Overlay,
}

/// Placement of one layer: normalized position plus normalized size.
///
/// Positions are clamped by drag handling in the session layer; sizes are
/// not clamped, callers own keeping them within canvas bounds.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LayerConfig {
    pub position: NormalizedPosition,
    pub size: NormalizedSize,
}

impl LayerConfig {
    pub fn new(position: NormalizedPosition, size: NormalizedSize) -> Self {
        Self { position, size }
    }

    pub fn validate(&self) -> AvatarfitResult<()> {
        for (name, v) in [("position.x", self.position.x), ("position.y", self.position.y)] {
            if !v.is_finite() || !(0.0..=1.0).contains(&v) {
                return Err(AvatarfitError::validation(format!(
                    "layer {name} must be finite and within [0, 1], got {v}"
                )));
            }
        }
        for (name, v) in [("size.width", self.size.width), ("size.height", self.size.height)] {
            if !v.is_finite() || v <= 0.0 {
                return Err(AvatarfitError::validation(format!(
                    "layer {name} must be finite and > 0, got {v}"
                )));
            }
        }
        Ok(())
    }
}
