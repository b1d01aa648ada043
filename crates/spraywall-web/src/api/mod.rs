//! Thin HTTP surface for the polling front-end: the wall as JSON and the
//! rendered snapshot as PNG. No invariants live here; the store and
//! compositor enforce their own.

use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use spraywall_types::WallItemsResponse;
use tracing::error;

use crate::app::AppState;
use crate::util::http::{json_error, json_ok};

pub async fn api_wall(State(state): State<AppState>) -> Response {
    let items = state.store.list().await;
    json_ok(&WallItemsResponse {
        item_count: items.len(),
        items,
    })
}

pub async fn wall_png(State(state): State<AppState>) -> Response {
    let items = state.store.list().await;
    match state.compositor.render(items).await {
        Ok(snapshot) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE.as_str(), "image/png"),
                // The artifact changes fingerprint whenever the wall grows.
                (header::CACHE_CONTROL.as_str(), "no-cache"),
            ],
            snapshot.png.clone(),
        )
            .into_response(),
        Err(error) => {
            error!(%error, "wall render failed");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, error.to_string())
        }
    }
}

pub async fn healthz() -> &'static str {
    "ok"
}
