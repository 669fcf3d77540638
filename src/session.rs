use chrono::{DateTime, Utc};

use crate::{
    core::{LayerConfig, LayerRole, NormalizedPosition, NormalizedSize},
    error::{AvatarfitError, AvatarfitResult},
    store::{KeyValueStore, get_fresh, put_timestamped},
};

/// Storage key for the generation API key. No expiry.
pub const API_KEY_STORAGE_KEY: &str = "BFL_API_KEY";
/// Storage key for layer placement state. No expiry.
pub const POSITION_STORAGE_KEY: &str = "avatar_outfit_position_state";
/// Storage key for selected source image references. 24-hour expiry.
pub const IMAGE_URL_STORAGE_KEY: &str = "avatar_outfit_image_urls";
/// Storage key for the last generation session. 24-hour expiry.
pub const GENERATION_CACHE_KEY: &str = "generation_session_cache";

const DRAG_MIN_X: f64 = 0.1;
const DRAG_MAX_X: f64 = 0.9;
const DRAG_MIN_Y: f64 = 0.05;
const DRAG_MAX_Y: f64 = 0.9;

/// Clamp a raw drag coordinate into the allowed placement region.
pub fn clamp_drag_position(raw: NormalizedPosition) -> NormalizedPosition {
    NormalizedPosition::new(
        raw.x.clamp(DRAG_MIN_X, DRAG_MAX_X),
        raw.y.clamp(DRAG_MIN_Y, DRAG_MAX_Y),
    )
}

/// Placement of both layers. Serialized with the original camelCase field
/// names so existing persisted state keeps loading.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacementState {
    pub avatar_position: NormalizedPosition,
    pub outfit_position: NormalizedPosition,
    pub avatar_size: NormalizedSize,
    pub outfit_size: NormalizedSize,
}

impl Default for PlacementState {
    fn default() -> Self {
        Self {
            avatar_position: NormalizedPosition::new(0.5, 0.06),
            outfit_position: NormalizedPosition::new(0.5, 0.4),
            avatar_size: NormalizedSize::new(0.28, 0.28),
            outfit_size: NormalizedSize::new(0.72, 0.72),
        }
    }
}

impl PlacementState {
    pub fn layer(&self, role: LayerRole) -> LayerConfig {
        match role {
            LayerRole::Base => LayerConfig::new(self.avatar_position, self.avatar_size),
            LayerRole::Overlay => LayerConfig::new(self.outfit_position, self.outfit_size),
        }
    }
}

/// References to the currently selected source images.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageSelection {
    pub avatar_url: Option<String>,
    pub outfit_url: Option<String>,
}

/// Cached outcome of one generation session.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationCache {
    pub input_image_base64: String,
    pub generated_image_url: String,
    pub prompt: String,
}

/// One composition session: owns the mutable placement state and persists
/// it (plus the image selection and generation caches) through an injected
/// store. Placement survives recompose calls; compose itself never mutates
/// it.
pub struct Session<S: KeyValueStore> {
    store: S,
    placement: PlacementState,
}

impl<S: KeyValueStore> Session<S> {
    /// Load persisted placement, falling back to the defaults.
    pub fn load(store: S) -> AvatarfitResult<Self> {
        let placement = match store.get(POSITION_STORAGE_KEY) {
            Some(raw) => serde_json::from_str(&raw)
                .map_err(|e| AvatarfitError::store(format!("parse placement state: {e}")))?,
            None => PlacementState::default(),
        };
        Ok(Self { store, placement })
    }

    pub fn placement(&self) -> &PlacementState {
        &self.placement
    }

    pub fn layer(&self, role: LayerRole) -> LayerConfig {
        self.placement.layer(role)
    }

    /// Drag-style reposition: clamp the raw coordinate, apply it to the
    /// layer and persist. Returns the clamped position.
    pub fn move_layer(
        &mut self,
        role: LayerRole,
        raw: NormalizedPosition,
    ) -> AvatarfitResult<NormalizedPosition> {
        let clamped = clamp_drag_position(raw);
        match role {
            LayerRole::Base => self.placement.avatar_position = clamped,
            LayerRole::Overlay => self.placement.outfit_position = clamped,
        }
        self.save_placement()?;
        Ok(clamped)
    }

    /// Resize a layer. Sizes are not clamped; callers own keeping them
    /// within canvas bounds.
    pub fn set_layer_size(&mut self, role: LayerRole, size: NormalizedSize) -> AvatarfitResult<()> {
        match role {
            LayerRole::Base => self.placement.avatar_size = size,
            LayerRole::Overlay => self.placement.outfit_size = size,
        }
        self.save_placement()
    }

    /// Restore the default placement for both layers and persist it.
    pub fn reset_positions(&mut self) -> AvatarfitResult<()> {
        self.placement = PlacementState::default();
        self.save_placement()
    }

    fn save_placement(&mut self) -> AvatarfitResult<()> {
        let json = serde_json::to_string(&self.placement)
            .map_err(|e| AvatarfitError::store(format!("serialize placement state: {e}")))?;
        self.store.set(POSITION_STORAGE_KEY, json)
    }

    pub fn api_key(&self) -> Option<String> {
        self.store.get(API_KEY_STORAGE_KEY).filter(|k| !k.is_empty())
    }

    pub fn set_api_key(&mut self, key: &str) -> AvatarfitResult<()> {
        self.store.set(API_KEY_STORAGE_KEY, key.to_string())
    }

    pub fn save_image_selection(
        &mut self,
        selection: &ImageSelection,
        now: DateTime<Utc>,
    ) -> AvatarfitResult<()> {
        put_timestamped(&mut self.store, IMAGE_URL_STORAGE_KEY, selection.clone(), now)
    }

    pub fn load_image_selection(
        &mut self,
        now: DateTime<Utc>,
    ) -> AvatarfitResult<Option<ImageSelection>> {
        get_fresh(&mut self.store, IMAGE_URL_STORAGE_KEY, now)
    }

    pub fn save_generation_cache(
        &mut self,
        cache: &GenerationCache,
        now: DateTime<Utc>,
    ) -> AvatarfitResult<()> {
        put_timestamped(&mut self.store, GENERATION_CACHE_KEY, cache.clone(), now)
    }

    pub fn load_generation_cache(
        &mut self,
        now: DateTime<Utc>,
    ) -> AvatarfitResult<Option<GenerationCache>> {
        get_fresh(&mut self.store, GENERATION_CACHE_KEY, now)
    }

    /// Drop the image selection and restore default placement.
    pub fn clear_all(&mut self) -> AvatarfitResult<()> {
        self.store.remove(IMAGE_URL_STORAGE_KEY)?;
        self.reset_positions()
    }
}
