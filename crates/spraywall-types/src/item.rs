use serde::{Deserialize, Serialize};

/// A point on the wall, in percent of canvas width/height.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Horizontal position, `0..=100`.
    pub x: f64,
    /// Vertical position, `0..=100`.
    pub y: f64,
}

/// A target box on the wall, in percent of canvas width/height.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Box width, `0..=100`.
    pub width: f64,
    /// Box height, `0..=100`.
    pub height: f64,
}

/// One entry on the wall. Never mutated or deleted after append.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraffitiItem {
    /// Opaque unique identifier, assigned at append time.
    pub id: String,
    /// Anchor point the item is centered on.
    pub position: Position,
    /// Rotation about the item's own center, degrees, `-360..=360`.
    pub rotation: f64,
    /// Group opacity, `0..=1`.
    pub opacity: f64,
    /// Creation timestamp in unix milliseconds; strictly increasing
    /// across appends, assigned once by the store.
    pub created_at: i64,
    /// Variant payload.
    #[serde(flatten)]
    pub body: ItemBody,
}

/// Fields of an item before the store assigns `id` and `created_at`.
#[derive(Debug, Clone)]
pub struct NewGraffiti {
    pub position: Position,
    pub rotation: f64,
    pub opacity: f64,
    pub body: ItemBody,
}

/// Variant payload of a wall item.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ItemBody {
    Text(TextBody),
    Image(ImageBody),
}

/// A styled text tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextBody {
    /// Tag content; non-empty, may contain line breaks.
    pub text: String,
    /// CSS-style font descriptor, e.g. `"Impact, sans-serif"`.
    pub font: String,
    /// CSS-style color descriptor, e.g. `"#111111"`.
    pub color: String,
    /// Font size in pixels, `8..=300`.
    pub size: f64,
}

/// An image sticker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageBody {
    /// Target box the image is fitted into, aspect ratio preserved.
    pub dimensions: Dimensions,
    /// Where the pixels come from.
    pub source: ImageSource,
}

/// An image reference, resolved at render time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageSource {
    /// Remote HTTP(S) URL, fetched with a bounded timeout.
    Url(String),
    /// Path relative to the managed asset root; escapes are rejected.
    Asset(String),
    /// Embedded payload: a data URL or raw base64.
    Data(String),
}

impl GraffitiItem {
    pub fn is_image(&self) -> bool {
        matches!(self.body, ItemBody::Image(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_json_carries_kind_tag() {
        let item = GraffitiItem {
            id: "g-1".into(),
            position: Position { x: 10.0, y: 20.0 },
            rotation: -15.0,
            opacity: 0.8,
            created_at: 1_700_000_000_000,
            body: ItemBody::Text(TextBody {
                text: "hi".into(),
                font: "Impact, sans-serif".into(),
                color: "#111111".into(),
                size: 42.0,
            }),
        };
        let json = serde_json::to_value(&item).expect("serialize item");
        assert_eq!(json["kind"], "text");
        assert_eq!(json["text"], "hi");
        assert_eq!(json["position"]["x"], 10.0);

        let back: GraffitiItem = serde_json::from_value(json).expect("deserialize item");
        assert_eq!(back.id, "g-1");
        assert!(matches!(back.body, ItemBody::Text(ref t) if t.text == "hi"));
    }

    #[test]
    fn image_source_variants_stay_readable() {
        let source = ImageSource::Asset("stickers/cat.png".into());
        let json = serde_json::to_string(&source).expect("serialize source");
        assert_eq!(json, r#"{"asset":"stickers/cat.png"}"#);
    }
}
