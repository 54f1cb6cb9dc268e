use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use super::user_agent::signals_from_request;
use super::ApiError;
use crate::attribution::ClickRequest;
use crate::metrics;
use crate::redirect::{AppRedirect, MobilePlatform};
use crate::shared_state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct LinkQuery {
    pub content: Option<String>,
    pub campaign: Option<String>,
    pub source: Option<String>,
}

/// Body returned to mobile browsers; the landing page drives the app switch.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MobileLinkResponse {
    pub mobile: bool,
    pub record_written: bool,
    #[serde(flatten)]
    pub redirect: AppRedirect,
}

/// `GET /link/:link_id`
pub async fn follow_link(
    State(state): State<AppState>,
    Path(link_id): Path<String>,
    Query(query): Query<LinkQuery>,
    headers: HeaderMap,
    connect_info: Option<ConnectInfo<SocketAddr>>,
) -> Result<Response, ApiError> {
    let peer = connect_info.map(|ConnectInfo(addr)| addr);
    let signals = signals_from_request(&headers, peer, state.trust_proxy_headers);
    let platform = MobilePlatform::from_platform_name(signals.platform_name.as_deref());

    let click = ClickRequest {
        link_id,
        content: query.content,
        campaign: query.campaign,
        source: query.source,
        mobile: platform.is_some(),
        signals,
    };

    let outcome = match state.service.record_click(click).await {
        Ok(outcome) => outcome,
        Err(e) => {
            metrics::inc_request("link", "error");
            return Err(e.into());
        }
    };

    match platform {
        Some(platform) => {
            let redirect = state
                .presentation
                .app_redirect(platform, &outcome.intent)
                .map_err(redirect_failed)?;
            metrics::inc_request("link", "mobile");
            Ok(Json(MobileLinkResponse {
                mobile: true,
                record_written: outcome.record_written,
                redirect,
            })
            .into_response())
        }
        None => {
            let target = state
                .presentation
                .content_url(&outcome.intent)
                .map_err(redirect_failed)?;
            metrics::inc_request("link", "desktop");
            info!("Desktop click, redirecting to {}", target);
            Ok((StatusCode::FOUND, [(header::LOCATION, target)]).into_response())
        }
    }
}

fn redirect_failed(e: anyhow::Error) -> ApiError {
    error!("Failed to build redirect URL: {:#}", e);
    metrics::inc_request("link", "error");
    ApiError::internal()
}
