// intent-relay/crates/intent-relay/src/api/deeplink_api.rs
//! `POST /api/deferred-deeplink`: the installed app asks for its pending intent

use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, State},
    http::HeaderMap,
    Json,
};
use serde::{Deserialize, Serialize};

use super::user_agent::client_address;
use super::ApiError;
use crate::attribution::{MatchedIntent, Resolution};
use crate::metrics;
use crate::shared_state::AppState;
use crate::signals::{AppInfo, SignalTuple};

/// Device fields as reported by the app SDK.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    pub ip: Option<String>,
    pub browser: Option<String>,
    pub browser_version: Option<String>,
    pub os: Option<String>,
    pub os_version: Option<String>,
    pub device_model: Option<String>,
    pub language: Option<String>,
    pub encoding: Option<String>,
}

impl DeviceInfo {
    /// Converts to a signal tuple, taking the address from the request when the body has none.
    pub fn into_signals(self, fallback_address: Option<String>) -> SignalTuple {
        SignalTuple {
            network_address: self.ip.filter(|ip| !ip.is_empty()).or(fallback_address),
            client_name: self.browser,
            client_version: self.browser_version,
            platform_name: self.os,
            platform_version: self.os_version,
            device_model: self.device_model,
            locale: self.language,
            encoding: self.encoding,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeferredDeeplinkRequest {
    pub device_info: Option<DeviceInfo>,
    pub app_info: Option<AppInfo>,
}

#[derive(Debug, Serialize)]
pub struct DeferredDeeplinkResponse {
    pub found: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<MatchedIntent>,
}

impl From<Resolution> for DeferredDeeplinkResponse {
    fn from(resolution: Resolution) -> Self {
        let found = resolution.found();
        let reason = resolution.reason();
        match resolution {
            Resolution::Matched(intent) => Self {
                found,
                reason,
                score: None,
                record: Some(intent),
            },
            Resolution::Mismatch { score } => Self {
                found,
                reason,
                score: Some(score),
                record: None,
            },
            Resolution::NotFound | Resolution::Expired => Self {
                found,
                reason,
                score: None,
                record: None,
            },
        }
    }
}

pub async fn deferred_deeplink(
    State(state): State<AppState>,
    headers: HeaderMap,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    Json(request): Json<DeferredDeeplinkRequest>,
) -> Result<Json<DeferredDeeplinkResponse>, ApiError> {
    let peer = connect_info.map(|ConnectInfo(addr)| addr);
    let signals = request.device_info.map(|info| {
        info.into_signals(client_address(&headers, peer, state.trust_proxy_headers))
    });

    match state.service.resolve_query(signals, request.app_info).await {
        Ok(resolution) => {
            metrics::inc_request("deferred_deeplink", "ok");
            Ok(Json(resolution.into()))
        }
        Err(e) => {
            metrics::inc_request("deferred_deeplink", "error");
            Err(e.into())
        }
    }
}
