use crate::manifest::GALLERY_FILE;

use anyhow::{Context, Result};
use axum::Router;
use std::net::SocketAddr;
use std::path::Path;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Serves `root` verbatim. Nothing but static files.
pub fn router(root: &Path) -> Router {
    Router::new()
        .fallback_service(ServeDir::new(root))
        .layer(TraceLayer::new_for_http())
}

pub async fn serve(root: &Path, port: u16) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    info!(
        "Serving {} on HTTP port: http://{}/{}",
        root.display(),
        addr,
        GALLERY_FILE
    );
    axum::serve(listener, router(root))
        .await
        .context("http server stopped")
}
