//! The wall store: a durable, append-only, ordered sequence of graffiti
//! items. All mutation is funneled through one async mutex so concurrent
//! appends linearize instead of overwriting each other, and every append
//! persists before it returns.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use spraywall_types::{GraffitiItem, NewGraffiti};
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

use crate::util::time::now_ms;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Persisted state exists but cannot be read or parsed. Fatal to the
    /// triggering operation; in-memory state of other operations is fine.
    #[error("wall store {path:?} is corrupt: {message}")]
    Corrupt { path: PathBuf, message: String },
    #[error("wall store write: {0}")]
    Io(#[from] std::io::Error),
    #[error("wall store: {0}")]
    Internal(String),
}

/// On-disk layout: one human-readable JSON document holding the whole
/// ordered sequence, one record per item.
#[derive(Debug, Default, Serialize, Deserialize)]
struct WallDocument {
    items: Vec<GraffitiItem>,
}

#[derive(Debug)]
struct WallState {
    items: Vec<GraffitiItem>,
    last_created_at: i64,
}

#[derive(Debug)]
pub struct WallStore {
    path: PathBuf,
    inner: Mutex<WallState>,
}

impl WallStore {
    /// Loads the persisted wall. A missing file is an empty wall, not an
    /// error; an unreadable or malformed file is [`StoreError::Corrupt`].
    pub async fn open(path: PathBuf) -> Result<Self, StoreError> {
        let load_path = path.clone();
        let document = tokio::task::spawn_blocking(move || read_document(&load_path))
            .await
            .map_err(|error| StoreError::Internal(format!("load worker join: {error}")))??;

        let mut items = document.items;
        // Render/iteration order is ascending creation time; stable sort
        // keeps original append order for any legacy equal timestamps.
        items.sort_by_key(|item| item.created_at);
        let last_created_at = items.last().map(|item| item.created_at).unwrap_or(0);
        info!(path = %path.display(), items = items.len(), "wall store loaded");
        Ok(Self {
            path,
            inner: Mutex::new(WallState {
                items,
                last_created_at,
            }),
        })
    }

    /// Full current state, in render order. Never a partial write: the
    /// snapshot is taken under the same lock appends hold.
    pub async fn list(&self) -> Vec<GraffitiItem> {
        self.inner.lock().await.items.clone()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.items.len()
    }

    /// Assigns id and creation timestamp, persists durably, and returns
    /// the stored record. Linearizable: the whole read-modify-write runs
    /// under the state lock, so N concurrent appends yield exactly N items.
    pub async fn append(&self, new_item: NewGraffiti) -> Result<GraffitiItem, StoreError> {
        let mut state = self.inner.lock().await;
        // Strictly increasing even when two appends land in the same
        // millisecond; keeps the creation order total.
        let created_at = now_ms().max(state.last_created_at + 1);
        let item = GraffitiItem {
            id: Uuid::new_v4().to_string(),
            position: new_item.position,
            rotation: new_item.rotation,
            opacity: new_item.opacity,
            created_at,
            body: new_item.body,
        };
        state.items.push(item.clone());

        let document = WallDocument {
            items: state.items.clone(),
        };
        let path = self.path.clone();
        let written = tokio::task::spawn_blocking(move || write_document(&path, &document))
            .await
            .map_err(|error| StoreError::Internal(format!("write worker join: {error}")))
            .and_then(|result| result);
        if let Err(error) = written {
            // Keep memory consistent with disk: the failed append is not
            // observable through list().
            state.items.pop();
            return Err(error);
        }
        state.last_created_at = created_at;
        Ok(item)
    }
}

fn read_document(path: &PathBuf) -> Result<WallDocument, StoreError> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
            return Ok(WallDocument::default());
        }
        Err(error) => {
            return Err(StoreError::Corrupt {
                path: path.clone(),
                message: format!("unreadable: {error}"),
            });
        }
    };
    serde_json::from_slice(&bytes).map_err(|error| StoreError::Corrupt {
        path: path.clone(),
        message: format!("invalid document: {error}"),
    })
}

/// Atomic replace: write a sibling temp file, then rename over the
/// document so readers never observe a partial write.
fn write_document(path: &PathBuf, document: &WallDocument) -> Result<(), StoreError> {
    let json = serde_json::to_vec_pretty(document)
        .map_err(|error| StoreError::Internal(format!("encode document: {error}")))?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, &json)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}
