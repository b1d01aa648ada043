use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use spraywall_render::SnapshotCompositor;

use crate::session::SessionRegistry;
use crate::store::WallStore;
use crate::{api, mcp};

/// Shared handles injected into every request handler. The store and the
/// compositor own their own concurrency safety; the registry owns session
/// lifecycles. Nothing here is process-global.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<WallStore>,
    pub compositor: Arc<SnapshotCompositor>,
    pub registry: Arc<SessionRegistry>,
}

impl AppState {
    pub fn new(
        store: Arc<WallStore>,
        compositor: Arc<SnapshotCompositor>,
        registry: Arc<SessionRegistry>,
    ) -> Self {
        Self {
            store,
            compositor,
            registry,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/mcp",
            get(mcp::handle_mcp_get)
                .post(mcp::handle_mcp_post)
                .delete(mcp::handle_mcp_delete),
        )
        .route("/api/wall", get(api::api_wall))
        .route("/wall.png", get(api::wall_png))
        .route("/healthz", get(api::healthz))
        .with_state(state)
}
