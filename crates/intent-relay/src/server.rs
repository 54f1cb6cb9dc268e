//! Server startup
//!
//! Opens the configured store, starts the expiry sweep and serves the
//! attribution endpoints. All handlers share one [`AppState`].

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{debug, info, warn};

use crate::{
    api,
    clock::SystemClock,
    config::Config,
    metrics,
    shared_state::AppState,
    store::KeyValueStore,
};

pub async fn run_server(cfg: Config) -> anyhow::Result<()> {
    crate::telemetry::init_tracing();
    metrics::init_metrics()?;
    cfg.print_config();

    let kv = cfg.store_backend.open(Arc::new(SystemClock))?;
    info!("Intent store ready ({:?})", cfg.store_backend);

    spawn_purge_sweep(kv.clone(), Duration::from_secs(cfg.purge_interval_seconds));

    let state = AppState::from_config(&cfg, kv);
    let app = build_router(state, Duration::from_secs(cfg.request_timeout_seconds));

    let addr = cfg.api_addr()?;
    info!("Starting HTTP server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

/// Periodically removes expired entries the read path never touched.
pub fn spawn_purge_sweep(
    kv: Arc<dyn KeyValueStore>,
    every: Duration,
) -> Option<tokio::task::JoinHandle<()>> {
    if every.is_zero() {
        info!("Expiry sweep disabled");
        return None;
    }
    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match kv.purge_expired().await {
                Ok(removed) => debug!("Expiry sweep removed {} entries", removed),
                Err(e) => warn!("Expiry sweep failed: {:#}", e),
            }
        }
    }))
}

pub fn build_router(state: AppState, request_timeout: Duration) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/link/:link_id", get(api::follow_link))
        .route("/api/deferred-deeplink", post(api::deferred_deeplink))
        .route("/api/stats", get(api::stats))
        .route("/health", get(api::health))
        .route("/metrics", get(metrics::get_metrics))
        .route("/healthz", get(|| async { "OK" }))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(request_timeout))
        .with_state(state)
}
