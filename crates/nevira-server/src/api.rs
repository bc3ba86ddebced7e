//! API handlers for the Nevira token server.

use crate::AppState;
use axum::{
    extract::{Extension, Json},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{SecondsFormat, Utc};
use nevira_types::{HealthResponse, TokenRequest, TokenResponse};
use nevira_voice::VoiceError;
use std::sync::Arc;
use thiserror::Error;

/// Message returned for any failure that is not the caller's fault.
const TOKEN_FAILURE_MESSAGE: &str = "Failed to generate token";

/// API error type mapping to HTTP status codes.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid input: {0}")]
    BadRequest(String),
    #[error("internal server error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(serde_json::json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

impl From<VoiceError> for ApiError {
    fn from(err: VoiceError) -> Self {
        match err {
            VoiceError::Validation(e) => ApiError::BadRequest(e.to_string()),
            other => {
                tracing::error!(error = %other, "token generation failed");
                ApiError::Internal(TOKEN_FAILURE_MESSAGE.to_string())
            }
        }
    }
}

/// Handler for `POST /token`.
///
/// Issues a LiveKit join token for `identity` in `roomName`, or in the
/// configured default room when the request leaves it out.
pub async fn token_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<TokenRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let grant = state
        .issuer
        .issue(&payload.identity, payload.room_name.as_deref())?;

    Ok(Json(TokenResponse {
        token: grant.token,
        room_name: grant.room,
    }))
}

/// Handler for `GET /health`.
///
/// Reports liveness and whether signing credentials are present. Used by
/// load balancers and the client to probe the server.
pub async fn health_handler(Extension(state): Extension<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        configured: state.issuer.is_configured(),
    })
}
