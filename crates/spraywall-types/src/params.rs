use serde::{Deserialize, Serialize};

use crate::item::{Dimensions, ItemBody, NewGraffiti, Position, TextBody};

pub const DEFAULT_FONT: &str = "Impact, sans-serif";
pub const DEFAULT_COLOR: &str = "#111111";
pub const DEFAULT_SIZE: f64 = 42.0;

/// Caller-supplied parameters violate range or shape constraints.
///
/// Surfaced synchronously as a tool-level error; never persisted.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("`{field}` must not be empty")]
    Empty { field: &'static str },
    #[error("`{field}` must be a number in [{min}, {max}], got {value}")]
    OutOfRange {
        field: &'static str,
        min: f64,
        max: f64,
        value: f64,
    },
    #[error("exactly one of `image_url` and `image_blob` must be provided")]
    AmbiguousImageSource,
    #[error("`image_url` must be an http(s) URL")]
    UrlScheme,
}

/// Arguments of the `spray_text` tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SprayTextParams {
    pub text: String,
    #[serde(default = "default_font")]
    pub font: String,
    #[serde(default = "default_color")]
    pub color: String,
    pub position: Position,
    #[serde(default = "default_size")]
    pub size: f64,
    #[serde(default)]
    pub rotation: f64,
    #[serde(default = "default_opacity")]
    pub opacity: f64,
}

/// Arguments of the `spray_image` tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SprayImageParams {
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub image_blob: Option<String>,
    pub position: Position,
    pub dimensions: Dimensions,
    #[serde(default)]
    pub rotation: f64,
    #[serde(default = "default_opacity")]
    pub opacity: f64,
}

/// `spray_image` arguments after validation and normalization, before the
/// blob (if any) has been written to the asset directory.
#[derive(Debug, Clone)]
pub struct ValidatedSprayImage {
    pub input: ImageInput,
    pub position: Position,
    pub dimensions: Dimensions,
    pub rotation: f64,
    pub opacity: f64,
}

/// The one image alternative the caller provided.
#[derive(Debug, Clone)]
pub enum ImageInput {
    Url(String),
    Blob(String),
}

fn default_font() -> String {
    DEFAULT_FONT.to_string()
}

fn default_color() -> String {
    DEFAULT_COLOR.to_string()
}

fn default_size() -> f64 {
    DEFAULT_SIZE
}

fn default_opacity() -> f64 {
    1.0
}

impl Position {
    /// Fraction-to-percent heuristic: if both components are in `[0, 1)`,
    /// the pair is treated as fractions and scaled by 100. Ambiguous for
    /// legitimately tiny percentages; documented in the tool descriptions.
    pub fn normalized(self) -> Self {
        let (x, y) = normalize_pair(self.x, self.y);
        Self { x, y }
    }
}

impl Dimensions {
    /// Same heuristic as [`Position::normalized`].
    pub fn normalized(self) -> Self {
        let (width, height) = normalize_pair(self.width, self.height);
        Self { width, height }
    }
}

fn normalize_pair(a: f64, b: f64) -> (f64, f64) {
    if (0.0..1.0).contains(&a) && (0.0..1.0).contains(&b) {
        (a * 100.0, b * 100.0)
    } else {
        (a, b)
    }
}

fn check_range(field: &'static str, value: f64, min: f64, max: f64) -> Result<(), ValidationError> {
    // The negated comparison also rejects NaN.
    if !(value >= min && value <= max) {
        return Err(ValidationError::OutOfRange {
            field,
            min,
            max,
            value,
        });
    }
    Ok(())
}

fn check_position(position: Position) -> Result<Position, ValidationError> {
    let position = position.normalized();
    check_range("position.x", position.x, 0.0, 100.0)?;
    check_range("position.y", position.y, 0.0, 100.0)?;
    Ok(position)
}

fn check_common(rotation: f64, opacity: f64) -> Result<(), ValidationError> {
    check_range("rotation", rotation, -360.0, 360.0)?;
    check_range("opacity", opacity, 0.0, 1.0)
}

impl SprayTextParams {
    /// Validates ranges, applies the normalization heuristic, and produces
    /// the fields the store will stamp with an id and timestamp.
    pub fn into_new_item(self) -> Result<NewGraffiti, ValidationError> {
        if self.text.trim().is_empty() {
            return Err(ValidationError::Empty { field: "text" });
        }
        let position = check_position(self.position)?;
        check_range("size", self.size, 8.0, 300.0)?;
        check_common(self.rotation, self.opacity)?;
        let font = if self.font.trim().is_empty() {
            default_font()
        } else {
            self.font
        };
        let color = if self.color.trim().is_empty() {
            default_color()
        } else {
            self.color
        };
        Ok(NewGraffiti {
            position,
            rotation: self.rotation,
            opacity: self.opacity,
            body: ItemBody::Text(TextBody {
                text: self.text,
                font,
                color,
                size: self.size,
            }),
        })
    }
}

impl SprayImageParams {
    /// Validates ranges and the url/blob alternative, applying the
    /// normalization heuristic to both the position and the target box.
    pub fn validated(self) -> Result<ValidatedSprayImage, ValidationError> {
        let input = match (self.image_url, self.image_blob) {
            (Some(url), None) => {
                if url.trim().is_empty() {
                    return Err(ValidationError::Empty { field: "image_url" });
                }
                if !(url.starts_with("http://") || url.starts_with("https://")) {
                    return Err(ValidationError::UrlScheme);
                }
                ImageInput::Url(url)
            }
            (None, Some(blob)) => {
                if blob.trim().is_empty() {
                    return Err(ValidationError::Empty { field: "image_blob" });
                }
                ImageInput::Blob(blob)
            }
            _ => return Err(ValidationError::AmbiguousImageSource),
        };
        let position = check_position(self.position)?;
        let dimensions = self.dimensions.normalized();
        check_range("dimensions.width", dimensions.width, 0.0, 100.0)?;
        check_range("dimensions.height", dimensions.height, 0.0, 100.0)?;
        check_common(self.rotation, self.opacity)?;
        Ok(ValidatedSprayImage {
            input,
            position,
            dimensions,
            rotation: self.rotation,
            opacity: self.opacity,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_params() -> SprayTextParams {
        SprayTextParams {
            text: "hi".into(),
            font: default_font(),
            color: default_color(),
            position: Position { x: 10.0, y: 10.0 },
            size: 20.0,
            rotation: 0.0,
            opacity: 1.0,
        }
    }

    #[test]
    fn defaults_fill_in_from_json() {
        let params: SprayTextParams =
            serde_json::from_str(r#"{"text":"yo","position":{"x":5,"y":5}}"#)
                .expect("parse spray_text args");
        assert_eq!(params.font, DEFAULT_FONT);
        assert_eq!(params.color, DEFAULT_COLOR);
        assert_eq!(params.size, DEFAULT_SIZE);
        assert_eq!(params.rotation, 0.0);
        assert_eq!(params.opacity, 1.0);
    }

    #[test]
    fn fractional_pair_becomes_percent() {
        let params = SprayImageParams {
            image_url: Some("https://example.com/cat.png".into()),
            image_blob: None,
            position: Position { x: 0.5, y: 0.5 },
            dimensions: Dimensions {
                width: 0.25,
                height: 0.125,
            },
            rotation: 0.0,
            opacity: 1.0,
        };
        let validated = params.validated().expect("valid params");
        assert_eq!(validated.position.x, 50.0);
        assert_eq!(validated.position.y, 50.0);
        assert_eq!(validated.dimensions.width, 25.0);
        assert_eq!(validated.dimensions.height, 12.5);
    }

    #[test]
    fn mixed_pair_is_used_as_is() {
        // One component >= 1 means the pair is already percent.
        let position = Position { x: 0.5, y: 40.0 }.normalized();
        assert_eq!(position.x, 0.5);
        assert_eq!(position.y, 40.0);
    }

    #[test]
    fn empty_text_is_rejected() {
        let mut params = text_params();
        params.text = "   ".into();
        assert_eq!(
            params.into_new_item().unwrap_err(),
            ValidationError::Empty { field: "text" }
        );
    }

    #[test]
    fn out_of_range_position_is_rejected() {
        let mut params = text_params();
        params.position = Position { x: 101.0, y: 10.0 };
        assert!(matches!(
            params.into_new_item().unwrap_err(),
            ValidationError::OutOfRange {
                field: "position.x",
                ..
            }
        ));
    }

    #[test]
    fn nan_opacity_is_rejected() {
        let mut params = text_params();
        params.opacity = f64::NAN;
        assert!(matches!(
            params.into_new_item().unwrap_err(),
            ValidationError::OutOfRange { field: "opacity", .. }
        ));
    }

    #[test]
    fn image_requires_exactly_one_source() {
        let both = SprayImageParams {
            image_url: Some("https://example.com/a.png".into()),
            image_blob: Some("aGk=".into()),
            position: Position { x: 1.0, y: 1.0 },
            dimensions: Dimensions {
                width: 10.0,
                height: 10.0,
            },
            rotation: 0.0,
            opacity: 1.0,
        };
        assert_eq!(
            both.validated().unwrap_err(),
            ValidationError::AmbiguousImageSource
        );

        let neither = SprayImageParams {
            image_url: None,
            image_blob: None,
            position: Position { x: 1.0, y: 1.0 },
            dimensions: Dimensions {
                width: 10.0,
                height: 10.0,
            },
            rotation: 0.0,
            opacity: 1.0,
        };
        assert_eq!(
            neither.validated().unwrap_err(),
            ValidationError::AmbiguousImageSource
        );
    }

    #[test]
    fn non_http_url_is_rejected() {
        let params = SprayImageParams {
            image_url: Some("file:///etc/passwd".into()),
            image_blob: None,
            position: Position { x: 1.0, y: 1.0 },
            dimensions: Dimensions {
                width: 10.0,
                height: 10.0,
            },
            rotation: 0.0,
            opacity: 1.0,
        };
        assert_eq!(params.validated().unwrap_err(), ValidationError::UrlScheme);
    }
}
