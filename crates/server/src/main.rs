mod api;
mod config;
mod error;
mod state;
mod ws;

use anyhow::Context;
use axum::{extract::DefaultBodyLimit, http::StatusCode, routing::get, Router};
use coscribe_engine::config::EngineConfig;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::config::ServerConfig;
use crate::state::AppState;

const MAX_REQUEST_BODY_BYTES: usize = 1024 * 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let server_config = ServerConfig::from_env();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_new(&server_config.log_filter)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let engine_config = EngineConfig::load();
    let state = AppState::new(engine_config);
    let app = build_router(state, &server_config);

    let listener = TcpListener::bind(server_config.listen_addr)
        .await
        .with_context(|| format!("failed to bind listener on {}", server_config.listen_addr))?;

    info!(listen_addr = %server_config.listen_addr, "starting coscribe server");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server exited unexpectedly")
}

fn build_router(state: AppState, config: &ServerConfig) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .merge(api::router(state.clone()))
        .merge(ws::router(state))
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(cors_layer(config))
}

fn cors_layer(config: &ServerConfig) -> CorsLayer {
    match config.cors_origins.as_deref() {
        None | Some("*") => CorsLayer::permissive(),
        Some(origins) => {
            let parsed: Vec<axum::http::HeaderValue> =
                origins.split(',').filter_map(|origin| origin.trim().parse().ok()).collect();
            CorsLayer::new().allow_origin(parsed).allow_methods(Any).allow_headers(Any)
        }
    }
}

async fn healthz() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown signal received");
}
