//! plt-api entry point.
//!
//! Thin: load config, set up tracing, build the shared state, wire
//! middleware and background tasks, and serve until a shutdown signal.

use std::{sync::Arc, time::Duration};

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use plt_api::{bootstrap, routes, state};
use plt_config::{AppConfig, UnusedKeyPolicy};
use tokio::signal;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, warn, Level};

const ENV_CONFIG_PATHS: &str = "PLT_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/base.yaml";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env.local if present. Production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let paths_raw =
        std::env::var(ENV_CONFIG_PATHS).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let paths: Vec<&str> = paths_raw
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();

    let loaded = plt_config::load_layered_yaml(&paths)?;
    let unused = plt_config::report_unused_keys(&loaded.config_json, UnusedKeyPolicy::Warn)?;
    for ptr in &unused.unused_leaf_pointers {
        warn!(pointer = %ptr, "unused config key");
    }
    let cfg = AppConfig::from_json(&loaded.config_json)?;
    let secrets = plt_config::secrets::resolve_secrets(&cfg)?;
    info!(
        config_hash = %loaded.config_hash,
        environment = ?cfg.app.environment,
        storage = ?cfg.storage.backend,
        gateway = ?cfg.payments.gateway,
        "config loaded"
    );

    let shared = Arc::new(bootstrap::build_state(&cfg, &secrets).await?);

    state::spawn_heartbeat(
        shared.bus.clone(),
        Duration::from_secs(cfg.dashboard.heartbeat_secs),
    );
    state::spawn_metrics_refresh(
        Arc::clone(&shared),
        Duration::from_secs(cfg.dashboard.refresh_secs),
    );

    let app = routes::build_router(Arc::clone(&shared))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors(&cfg.server.cors_origins));

    let addr = cfg.bind_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("plt-api listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server crashed")?;

    info!("plt-api stopped");
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

/// CORS: only the configured storefront / back-office origins.
fn cors(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                warn!(origin = %o, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers(tower_http::cors::Any)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
        info!("received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
                info!("received terminate signal, shutting down");
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
