use axum::{
    http::HeaderName,
    middleware,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;

use crate::core::config;
use crate::web::handlers;
use crate::web::session::session_layer;
use crate::web::state::AppState;

/// Builds the full application router.
///
/// Everything except `/health` runs behind `session_layer`. When a static
/// directory is configured and exists it answers every unmatched path.
pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/probe", post(handlers::probe))
        .route("/add", post(handlers::add))
        .route("/cancel-add", post(handlers::cancel_add))
        .route("/add-progress/{token}", get(handlers::add_progress))
        .route("/list", get(handlers::list))
        .route("/remove/{id}", post(handlers::remove))
        .route("/reorder", post(handlers::reorder))
        .route("/clear", post(handlers::clear))
        .route("/convert", post(handlers::convert))
        .route("/export", post(handlers::export));

    let mut router = Router::new()
        .nest("/api", api)
        .route("/downloads/{token}", get(handlers::download));

    match state.static_dir.as_ref() {
        Some(dir) if dir.is_dir() => {
            log::info!("Serving front end from {}", dir.display());
            router = router.fallback_service(ServeDir::new(dir).append_index_html_on_directories(true));
        }
        Some(dir) => log::warn!("STATIC_DIR {} is not a directory; front end disabled", dir.display()),
        None => {}
    }

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers([HeaderName::from_static(config::session::HEADER_NAME)]);

    router
        .layer(middleware::from_fn_with_state(state.clone(), session_layer))
        .route("/health", get(handlers::health))
        .layer(cors)
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to install Ctrl+C handler: {}", e);
    }
    log::info!("Shutdown requested");
}

/// Binds `host:port` and serves until Ctrl+C.
pub async fn serve(state: AppState, host: &str, port: u16) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    let app = build_router(state);

    log::info!("Starting cdmix on http://{}", addr);
    log::info!("  /api/*            - Playlist and conversion API");
    log::info!("  /downloads/:token - Prepared file downloads");
    log::info!("  /health           - Health check");

    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;
    Ok(())
}
