//! Snapshot compositor: renders the current wall state onto the background
//! image and caches the result by a fingerprint of that state.
//!
//! Rendering is a pure function of the ordered item sequence plus the
//! background asset, so a fingerprint hit returns the previously rendered
//! artifact without recomputation, and concurrent requests for the same
//! fingerprint share one in-flight render.

mod compose;
mod source;
mod text;

pub use source::ResolutionError;

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use spraywall_types::GraffitiItem;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info, warn};

/// How many distinct fingerprints keep their rendered artifact around.
///
/// Old fingerprints describe superseded wall states that the polling
/// front-end never asks for again, so retention stays small and FIFO.
const CACHE_CAPACITY: usize = 16;

const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_FETCH_BYTES: u64 = 16 * 1024 * 1024;

/// Everything the compositor needs to know about its surroundings.
#[derive(Debug, Clone)]
pub struct CompositorConfig {
    /// Background image the wall is composited onto; its pixel dimensions
    /// define the output size.
    pub background_path: PathBuf,
    /// Managed directory `ImageSource::Asset` paths are confined to.
    pub asset_root: PathBuf,
    /// Where rendered artifacts are written, `<fingerprint>.png` each.
    pub snapshot_dir: PathBuf,
    /// Bound on any single remote image fetch.
    pub fetch_timeout: Duration,
    /// Bound on remote response size.
    pub max_fetch_bytes: u64,
}

impl CompositorConfig {
    /// Conventional layout under one data directory: assets live in
    /// `assets/`, rendered snapshots in `assets/snapshots/`.
    pub fn for_data_dir(data_dir: &std::path::Path, background_path: PathBuf) -> Self {
        let asset_root = data_dir.join("assets");
        let snapshot_dir = asset_root.join("snapshots");
        Self {
            background_path,
            asset_root,
            snapshot_dir,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            max_fetch_bytes: MAX_FETCH_BYTES,
        }
    }
}

/// A rendered wall artifact plus the metadata recorded with it.
#[derive(Debug)]
pub struct RenderedSnapshot {
    /// Fingerprint of the wall state this was rendered from.
    pub fingerprint: String,
    /// Output width in pixels.
    pub width: u32,
    /// Output height in pixels.
    pub height: u32,
    /// Items composited (skipped ones included).
    pub item_count: usize,
    /// Image items whose source could not be resolved or decoded.
    pub skipped_images: usize,
    /// PNG-encoded pixels.
    pub png: Vec<u8>,
}

/// Fatal render failures. Per-item image problems are not here: those are
/// tolerated as skips (see [`ResolutionError`]).
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    /// The background asset is missing, unreadable, or has no determinable
    /// pixel size. Operator intervention required; not retried.
    #[error("background {path:?}: {message}")]
    Configuration { path: PathBuf, message: String },
    /// Encoding or worker plumbing failed.
    #[error("compositor: {0}")]
    Internal(String),
}

/// Deterministic cache key for a wall state: the maximum `created_at`
/// across all items plus the item count, or a sentinel when empty. The
/// store assigns strictly increasing timestamps, so distinct states map to
/// distinct keys.
pub fn fingerprint(items: &[GraffitiItem]) -> String {
    match items.iter().map(|item| item.created_at).max() {
        Some(max) => format!("{max}-{}", items.len()),
        None => "empty".to_string(),
    }
}

struct CacheState {
    entries: HashMap<String, Arc<RenderedSnapshot>>,
    order: VecDeque<String>,
    in_flight: HashMap<String, Arc<OnceCell<Arc<RenderedSnapshot>>>>,
}

pub struct SnapshotCompositor {
    config: CompositorConfig,
    agent: ureq::Agent,
    fonts: Arc<fontdb::Database>,
    cache: Mutex<CacheState>,
}

impl SnapshotCompositor {
    /// Builds the compositor, creating the asset and snapshot directories
    /// and loading the system font database once.
    pub fn new(config: CompositorConfig) -> Result<Self, RenderError> {
        for dir in [&config.asset_root, &config.snapshot_dir] {
            std::fs::create_dir_all(dir).map_err(|error| RenderError::Internal(format!(
                "create {}: {error}",
                dir.display()
            )))?;
        }
        let agent = ureq::AgentBuilder::new()
            .timeout(config.fetch_timeout)
            .build();
        let mut fonts = fontdb::Database::new();
        fonts.load_system_fonts();
        info!(faces = fonts.len(), "font database loaded");
        Ok(Self {
            config,
            agent,
            fonts: Arc::new(fonts),
            cache: Mutex::new(CacheState {
                entries: HashMap::new(),
                order: VecDeque::new(),
                in_flight: HashMap::new(),
            }),
        })
    }

    pub fn asset_root(&self) -> &std::path::Path {
        &self.config.asset_root
    }

    /// Renders the given wall state, or returns the cached artifact if this
    /// state was rendered before. Concurrent callers asking for the same
    /// fingerprint share a single render.
    pub async fn render(
        &self,
        items: Vec<GraffitiItem>,
    ) -> Result<Arc<RenderedSnapshot>, RenderError> {
        let key = fingerprint(&items);

        let cell = {
            let mut cache = self.cache.lock().await;
            if let Some(hit) = cache.entries.get(&key) {
                debug!(fingerprint = %key, "snapshot cache hit");
                return Ok(hit.clone());
            }
            cache
                .in_flight
                .entry(key.clone())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };

        let result = cell
            .get_or_try_init(|| self.render_uncached(key.clone(), items))
            .await
            .cloned();

        let evicted = {
            let mut cache = self.cache.lock().await;
            cache.in_flight.remove(&key);
            match &result {
                Ok(snapshot) => self.remember(&mut cache, &key, snapshot.clone()),
                Err(_) => Vec::new(),
            }
        };
        for stale in evicted {
            let path = self.config.snapshot_dir.join(format!("{stale}.png"));
            if let Err(error) = tokio::fs::remove_file(&path).await {
                debug!(%stale, %error, "evicted snapshot file was already gone");
            }
        }

        result
    }

    /// Inserts into the fingerprint cache and returns the fingerprints
    /// evicted to stay under capacity.
    fn remember(
        &self,
        cache: &mut CacheState,
        key: &str,
        snapshot: Arc<RenderedSnapshot>,
    ) -> Vec<String> {
        if cache.entries.contains_key(key) {
            return Vec::new();
        }
        cache.entries.insert(key.to_string(), snapshot);
        cache.order.push_back(key.to_string());
        let mut evicted = Vec::new();
        while cache.entries.len() > CACHE_CAPACITY {
            let Some(stale) = cache.order.pop_front() else {
                break;
            };
            cache.entries.remove(&stale);
            evicted.push(stale);
        }
        evicted
    }

    async fn render_uncached(
        &self,
        key: String,
        mut items: Vec<GraffitiItem>,
    ) -> Result<Arc<RenderedSnapshot>, RenderError> {
        // Ascending creation order defines z-order; the store already hands
        // items out sorted, sorting again keeps render pure in its input.
        items.sort_by_key(|item| item.created_at);

        let config = self.config.clone();
        let agent = self.agent.clone();
        let fonts = self.fonts.clone();
        let snapshot = tokio::task::spawn_blocking(move || {
            let snapshot = compose::composite(&config, &agent, &fonts, &key, &items)?;
            let artifact = config.snapshot_dir.join(format!("{key}.png"));
            if let Err(error) = std::fs::write(&artifact, &snapshot.png) {
                warn!(path = %artifact.display(), %error, "failed to persist snapshot artifact");
            }
            Ok::<_, RenderError>(snapshot)
        })
        .await
        .map_err(|error| RenderError::Internal(format!("render worker join: {error}")))??;

        info!(
            fingerprint = %snapshot.fingerprint,
            width = snapshot.width,
            height = snapshot.height,
            items = snapshot.item_count,
            skipped = snapshot.skipped_images,
            "rendered wall snapshot"
        );
        Ok(Arc::new(snapshot))
    }
}

#[cfg(test)]
mod tests;
