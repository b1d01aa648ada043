//! Shared types for the spraywall service: the wall data model, tool
//! parameters, and the validation/normalization rules applied before
//! anything reaches the store.

mod item;
mod params;

pub use item::{
    Dimensions, GraffitiItem, ImageBody, ImageSource, ItemBody, NewGraffiti, Position, TextBody,
};
pub use params::{
    DEFAULT_COLOR, DEFAULT_FONT, DEFAULT_SIZE, ImageInput, SprayImageParams, SprayTextParams,
    ValidatedSprayImage, ValidationError,
};

use serde::{Deserialize, Serialize};

/// Items listing returned by the HTTP API and the `wall_items` tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WallItemsResponse {
    /// Number of items on the wall.
    pub item_count: usize,
    /// Every item, in render (ascending creation) order.
    pub items: Vec<GraffitiItem>,
}

/// Metadata for one rendered wall snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotResponse {
    /// Cache key derived from the wall state this snapshot rendered.
    pub fingerprint: String,
    /// Output width in pixels (matches the background).
    pub width: u32,
    /// Output height in pixels (matches the background).
    pub height: u32,
    /// Items composited into this snapshot.
    pub item_count: usize,
    /// Image items skipped because their source could not be resolved.
    pub skipped_images: usize,
}

/// Error envelope for HTTP API responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub error: String,
}
