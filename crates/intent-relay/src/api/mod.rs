// intent-relay/crates/intent-relay/src/api/mod.rs
//! HTTP boundary: link clicks, post-install queries and operational endpoints

pub mod admin_api;
pub mod deeplink_api;
pub mod link_api;
pub mod user_agent;

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use tracing::error;

use crate::error::AttributionError;

pub use admin_api::{health, stats};
pub use deeplink_api::deferred_deeplink;
pub use link_api::follow_link;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    /// 500 with a fixed message; the cause is logged by the caller.
    pub fn internal() -> Self {
        ApiError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "Internal server error".to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (
            self.status,
            Json(json!({
                "error": self.message,
                "code": self.status.as_u16(),
            })),
        )
            .into_response()
    }
}

impl From<AttributionError> for ApiError {
    fn from(err: AttributionError) -> Self {
        match err {
            AttributionError::Validation(message) => ApiError {
                status: StatusCode::BAD_REQUEST,
                message,
            },
            AttributionError::Store(e) => {
                error!("Store failure: {:#}", e);
                ApiError::internal()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_maps_to_bad_request() {
        let api: ApiError = AttributionError::Validation("deviceInfo is required".into()).into();
        assert_eq!(api.status, StatusCode::BAD_REQUEST);
        assert_eq!(api.message, "deviceInfo is required");
    }

    #[test]
    fn test_store_failure_hides_details() {
        let api: ApiError = AttributionError::Store(anyhow::anyhow!("disk I/O error")).into();
        assert_eq!(api.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(api.message, "Internal server error");
    }
}
