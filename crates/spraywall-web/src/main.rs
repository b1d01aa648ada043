use std::path::PathBuf;
use std::sync::Arc;

use spraywall_render::{CompositorConfig, SnapshotCompositor};
use spraywall_web::app::{AppState, build_router};
use spraywall_web::session::SessionRegistry;
use spraywall_web::store::WallStore;
use tokio::net::TcpListener;
use tracing::info;

fn main() {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("failed to build tokio runtime")
        .block_on(async {
            if let Err(err) = run_server().await {
                eprintln!("{err}");
                std::process::exit(1);
            }
        });
}

async fn run_server() -> Result<(), String> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let http_addr = std::env::var("SPRAYWALL_LISTEN").unwrap_or_else(|_| "127.0.0.1:8930".into());
    let data_dir =
        PathBuf::from(std::env::var("SPRAYWALL_DATA").unwrap_or_else(|_| "spraywall-data".into()));
    let background_path = std::env::var("SPRAYWALL_BACKGROUND")
        .map(PathBuf::from)
        .unwrap_or_else(|_| data_dir.join("background.png"));

    std::fs::create_dir_all(&data_dir)
        .map_err(|e| format!("failed to create data dir {}: {e}", data_dir.display()))?;

    let store = WallStore::open(data_dir.join("wall.json"))
        .await
        .map_err(|e| format!("failed to open wall store in {}: {e}", data_dir.display()))?;
    let compositor =
        SnapshotCompositor::new(CompositorConfig::for_data_dir(&data_dir, background_path.clone()))
            .map_err(|e| format!("failed to set up compositor: {e}"))?;
    let state = AppState::new(
        Arc::new(store),
        Arc::new(compositor),
        Arc::new(SessionRegistry::new()),
    );

    let listener = TcpListener::bind(&http_addr)
        .await
        .map_err(|e| format!("failed to bind HTTP on {http_addr}: {e}"))?;
    let wall_items = state.store.len().await;
    info!(%http_addr, wall_items, "spraywall listener ready");
    print_startup_hints(&http_addr, &background_path);

    let app = build_router(state);
    axum::serve(listener, app)
        .await
        .map_err(|e| format!("HTTP server error: {e}"))
}

fn print_startup_hints(http_addr: &str, background_path: &std::path::Path) {
    println!();
    println!("  spraywall ready");
    println!();
    println!("  MCP endpoint: \x1b[32mhttp://{http_addr}/mcp\x1b[0m");
    println!("  Wall snapshot: \x1b[32mhttp://{http_addr}/wall.png\x1b[0m");
    println!("  Wall items: http://{http_addr}/api/wall");
    println!();
    println!("  Background: {}", background_path.display());
    println!();
}
