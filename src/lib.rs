#![forbid(unsafe_code)]

pub mod blur;
pub mod compose;
pub mod core;
pub mod error;
pub mod generate;
pub mod layout;
pub mod raster;
pub mod session;
pub mod store;

pub use compose::{ComposeSettings, CompositeResult, ShadowSpec, Surface, compose, compose_surface};
pub use core::{LayerConfig, LayerRole, NormalizedPosition, NormalizedSize};
pub use error::{AvatarfitError, AvatarfitResult};
pub use generate::{
    GenerationClient, GenerationHandle, GenerationRequest, GenerationTransport, HttpTransport,
    PollConfig, PollResponse, PollResult, PollStatus,
};
pub use layout::{contain_rect, resolve_layer_rect};
pub use raster::RasterImage;
pub use session::{GenerationCache, ImageSelection, PlacementState, Session, clamp_drag_position};
pub use store::{JsonFileStore, KeyValueStore, MemoryStore};
