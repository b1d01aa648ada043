use image::RgbaImage;
use spraywall_types::{GraffitiItem, ImageBody, ItemBody};
use tiny_skia::{
    BlendMode, FilterQuality, IntSize, Pixmap, PixmapPaint, Transform,
};
use tracing::warn;

use crate::source::{ResolutionError, resolve_bytes};
use crate::{CompositorConfig, RenderError, RenderedSnapshot, text};

/// Composites every item onto the background, ascending creation order.
/// Items whose image source cannot be resolved or decoded are skipped and
/// counted; a bad background is fatal.
pub(crate) fn composite(
    config: &CompositorConfig,
    agent: &ureq::Agent,
    fonts: &fontdb::Database,
    fingerprint: &str,
    items: &[GraffitiItem],
) -> Result<RenderedSnapshot, RenderError> {
    let background = image::open(&config.background_path)
        .map_err(|error| RenderError::Configuration {
            path: config.background_path.clone(),
            message: format!("decode: {error}"),
        })?
        .into_rgba8();
    let (width, height) = background.dimensions();
    if width == 0 || height == 0 {
        return Err(RenderError::Configuration {
            path: config.background_path.clone(),
            message: "background has no pixels".to_string(),
        });
    }
    let mut canvas =
        premultiplied_pixmap(background).ok_or_else(|| RenderError::Configuration {
            path: config.background_path.clone(),
            message: "background dimensions exceed raster limits".to_string(),
        })?;

    let mut skipped_images = 0usize;
    for item in items {
        let center = (
            (item.position.x / 100.0 * f64::from(width)) as f32,
            (item.position.y / 100.0 * f64::from(height)) as f32,
        );
        let rotation = item.rotation as f32;
        let opacity = item.opacity as f32;
        match &item.body {
            ItemBody::Text(body) => {
                text::draw_text(&mut canvas, fonts, body, center, rotation, opacity);
            }
            ItemBody::Image(body) => {
                match resolve_sticker(config, agent, body) {
                    Ok(sticker) => {
                        let box_w = (body.dimensions.width / 100.0 * f64::from(width)) as f32;
                        let box_h = (body.dimensions.height / 100.0 * f64::from(height)) as f32;
                        draw_sticker(&mut canvas, &sticker, center, box_w, box_h, rotation, opacity);
                    }
                    Err(error) => {
                        warn!(item = %item.id, %error, "skipping unresolvable image item");
                        skipped_images += 1;
                    }
                }
            }
        }
    }

    let png = canvas
        .encode_png()
        .map_err(|error| RenderError::Internal(format!("encode png: {error}")))?;
    Ok(RenderedSnapshot {
        fingerprint: fingerprint.to_string(),
        width,
        height,
        item_count: items.len(),
        skipped_images,
        png,
    })
}

fn resolve_sticker(
    config: &CompositorConfig,
    agent: &ureq::Agent,
    body: &ImageBody,
) -> Result<Pixmap, ResolutionError> {
    let bytes = resolve_bytes(&body.source, &config.asset_root, agent, config.max_fetch_bytes)?;
    let decoded = image::load_from_memory(&bytes)
        .map_err(|error| ResolutionError::Decode(error.to_string()))?;
    premultiplied_pixmap(decoded.into_rgba8())
        .ok_or_else(|| ResolutionError::Decode("image dimensions exceed raster limits".to_string()))
}

/// Straight-alpha RGBA8 into a premultiplied pixmap; the compositing and
/// PNG-encode paths both assume the premultiplied contract.
fn premultiplied_pixmap(image: RgbaImage) -> Option<Pixmap> {
    let (width, height) = image.dimensions();
    let mut data = image.into_raw();
    for px in data.chunks_exact_mut(4) {
        let a = u16::from(px[3]);
        if a < 255 {
            px[0] = (u16::from(px[0]) * a / 255) as u8;
            px[1] = (u16::from(px[1]) * a / 255) as u8;
            px[2] = (u16::from(px[2]) * a / 255) as u8;
        }
    }
    Pixmap::from_vec(data, IntSize::from_wh(width, height)?)
}

/// Scales the sticker into the target box (aspect preserved, no crop),
/// rotates it about its own center, applies group opacity, and draws it
/// centered on the anchor point.
fn draw_sticker(
    canvas: &mut Pixmap,
    sticker: &Pixmap,
    center: (f32, f32),
    box_w: f32,
    box_h: f32,
    rotation_deg: f32,
    opacity: f32,
) {
    let (w, h) = (sticker.width() as f32, sticker.height() as f32);
    if w <= 0.0 || h <= 0.0 || box_w <= 0.0 || box_h <= 0.0 {
        return;
    }
    let scale = (box_w / w).min(box_h / h);
    let transform = Transform::from_translate(-w / 2.0, -h / 2.0)
        .post_scale(scale, scale)
        .post_concat(Transform::from_rotate(rotation_deg))
        .post_translate(center.0, center.1);
    let paint = PixmapPaint {
        opacity: opacity.clamp(0.0, 1.0),
        blend_mode: BlendMode::SourceOver,
        quality: FilterQuality::Bilinear,
    };
    canvas.draw_pixmap(0, 0, sticker.as_ref(), &paint, transform, None);
}
