//! Admin API endpoints
//!
//! Store health and attribution counters.
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use tracing::{error, warn};

use super::ApiError;
use crate::store::CounterKind;
use crate::shared_state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub active_pending_links: usize,
    pub success_today: i64,
    pub error_today: i64,
    pub timestamp: String,
}

/// Round-trips a throwaway key through the store.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let timestamp = state.service.clock().now().to_rfc3339();
    match state.service.store().health_check().await {
        Ok(()) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "healthy",
                version: env!("CARGO_PKG_VERSION"),
                timestamp,
                store: Some("connected"),
                error: None,
            }),
        ),
        Err(e) => {
            warn!("Health check failed: {:#}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "unhealthy",
                    version: env!("CARGO_PKG_VERSION"),
                    timestamp,
                    store: None,
                    error: Some(e.to_string()),
                }),
            )
        }
    }
}

pub async fn stats(State(state): State<AppState>) -> Result<Json<StatsResponse>, ApiError> {
    let store = state.service.store();
    let now = state.service.clock().now();
    let today = now.date_naive();

    let collected = async {
        Ok::<_, anyhow::Error>(StatsResponse {
            active_pending_links: store.pending_count().await?,
            success_today: store.counter(CounterKind::Success, today).await?,
            error_today: store.counter(CounterKind::Error, today).await?,
            timestamp: now.to_rfc3339(),
        })
    }
    .await;

    collected.map(Json).map_err(|e| {
        error!("Stats error: {:#}", e);
        ApiError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "Internal server error".to_string(),
        }
    })
}
