use std::path::Path;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use spraywall_types::{
    Dimensions, GraffitiItem, ImageBody, ImageSource, ItemBody, Position, TextBody,
};
use tempfile::TempDir;

use crate::{CompositorConfig, SnapshotCompositor, fingerprint};

fn write_png(path: &Path, width: u32, height: u32) {
    let mut pixmap = tiny_skia::Pixmap::new(width, height).expect("pixmap");
    pixmap.fill(tiny_skia::Color::from_rgba8(200, 200, 190, 255));
    let png = pixmap.encode_png().expect("encode fixture png");
    std::fs::write(path, png).expect("write fixture png");
}

fn compositor(dir: &TempDir, width: u32, height: u32) -> SnapshotCompositor {
    let background = dir.path().join("background.png");
    write_png(&background, width, height);
    let config = CompositorConfig::for_data_dir(dir.path(), background);
    SnapshotCompositor::new(config).expect("build compositor")
}

fn text_item(id: &str, created_at: i64) -> GraffitiItem {
    GraffitiItem {
        id: id.to_string(),
        position: Position { x: 10.0, y: 10.0 },
        rotation: 0.0,
        opacity: 1.0,
        created_at,
        body: ItemBody::Text(TextBody {
            text: "hi".to_string(),
            font: "Impact, sans-serif".to_string(),
            color: "#111111".to_string(),
            size: 20.0,
        }),
    }
}

fn image_item(id: &str, created_at: i64, source: ImageSource) -> GraffitiItem {
    GraffitiItem {
        id: id.to_string(),
        position: Position { x: 50.0, y: 50.0 },
        rotation: 15.0,
        opacity: 0.9,
        created_at,
        body: ItemBody::Image(ImageBody {
            dimensions: Dimensions {
                width: 20.0,
                height: 20.0,
            },
            source,
        }),
    }
}

fn data_sticker() -> ImageSource {
    let mut pixmap = tiny_skia::Pixmap::new(8, 8).expect("sticker pixmap");
    pixmap.fill(tiny_skia::Color::from_rgba8(255, 0, 0, 255));
    let png = pixmap.encode_png().expect("encode sticker");
    ImageSource::Data(format!("data:image/png;base64,{}", BASE64.encode(png)))
}

#[test]
fn fingerprint_uses_max_created_at_and_count() {
    assert_eq!(fingerprint(&[]), "empty");
    let items = vec![text_item("a", 10), text_item("b", 30), text_item("c", 20)];
    assert_eq!(fingerprint(&items), "30-3");
}

#[tokio::test]
async fn text_item_renders_at_background_size() {
    let dir = tempfile::tempdir().expect("tempdir");
    let compositor = compositor(&dir, 1000, 800);

    let snapshot = compositor
        .render(vec![text_item("g-1", 1_000)])
        .await
        .expect("render");
    assert_eq!(snapshot.width, 1000);
    assert_eq!(snapshot.height, 800);
    assert_eq!(snapshot.item_count, 1);
    assert_eq!(snapshot.skipped_images, 0);
    assert!(!snapshot.png.is_empty());
    assert!(dir.path().join("assets/snapshots/1000-1.png").is_file());
}

#[tokio::test]
async fn second_render_is_a_cache_hit() {
    let dir = tempfile::tempdir().expect("tempdir");
    let compositor = compositor(&dir, 64, 48);
    let items = vec![text_item("g-1", 5)];

    let first = compositor.render(items.clone()).await.expect("first render");
    let second = compositor.render(items).await.expect("second render");
    assert_eq!(first.fingerprint, second.fingerprint);
    assert!(Arc::ptr_eq(&first, &second));
}

#[tokio::test]
async fn appending_an_item_misses_the_cache() {
    let dir = tempfile::tempdir().expect("tempdir");
    let compositor = compositor(&dir, 64, 48);

    let before = compositor
        .render(vec![text_item("g-1", 5)])
        .await
        .expect("render before");
    let after = compositor
        .render(vec![text_item("g-1", 5), text_item("g-2", 6)])
        .await
        .expect("render after");
    assert_ne!(before.fingerprint, after.fingerprint);
    assert!(!Arc::ptr_eq(&before, &after));
    assert_eq!(after.item_count, 2);
}

#[tokio::test]
async fn unresolvable_image_is_skipped_not_fatal() {
    let dir = tempfile::tempdir().expect("tempdir");
    let compositor = compositor(&dir, 64, 48);

    let items = vec![
        image_item("g-1", 1, ImageSource::Asset("missing/sticker.png".into())),
        image_item("g-2", 2, data_sticker()),
        text_item("g-3", 3),
    ];
    let snapshot = compositor.render(items).await.expect("render");
    assert_eq!(snapshot.item_count, 3);
    assert_eq!(snapshot.skipped_images, 1);
}

#[tokio::test]
async fn missing_background_is_a_configuration_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config =
        CompositorConfig::for_data_dir(dir.path(), dir.path().join("no-such-background.png"));
    let compositor = SnapshotCompositor::new(config).expect("build compositor");

    let error = compositor
        .render(vec![text_item("g-1", 1)])
        .await
        .expect_err("render must fail");
    assert!(matches!(error, crate::RenderError::Configuration { .. }));
}

#[tokio::test]
async fn concurrent_renders_share_one_artifact() {
    let dir = tempfile::tempdir().expect("tempdir");
    let compositor = Arc::new(compositor(&dir, 64, 48));
    let items = vec![text_item("g-1", 9)];

    let a = {
        let compositor = compositor.clone();
        let items = items.clone();
        tokio::spawn(async move { compositor.render(items).await })
    };
    let b = {
        let compositor = compositor.clone();
        let items = items.clone();
        tokio::spawn(async move { compositor.render(items).await })
    };
    let first = a.await.expect("join a").expect("render a");
    let second = b.await.expect("join b").expect("render b");
    assert!(Arc::ptr_eq(&first, &second));
}

#[tokio::test]
async fn cache_retention_is_bounded() {
    let dir = tempfile::tempdir().expect("tempdir");
    let compositor = compositor(&dir, 20, 16);

    let oldest = compositor
        .render(vec![text_item("g-0", 100)])
        .await
        .expect("render oldest");
    for n in 1..=crate::CACHE_CAPACITY as i64 {
        compositor
            .render(vec![text_item("g", 100 + n)])
            .await
            .expect("render churn");
    }

    // The oldest fingerprint fell out of the cache, so rendering its state
    // again produces a fresh artifact.
    let again = compositor
        .render(vec![text_item("g-0", 100)])
        .await
        .expect("render again");
    assert_eq!(oldest.fingerprint, again.fingerprint);
    assert!(!Arc::ptr_eq(&oldest, &again));
}
