//! HTTP responses for flow outcomes and errors.
//!
//! Hosts built on axum can return a [`FlowOutcome`] or a [`LinkError`]
//! straight from a handler. Redirects become `303 See Other`; render states
//! become a JSON body tagged by `state` for the host's templates.

use axum::{
    Json,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::error::LinkError;
use crate::outcome::{FlowOutcome, RenderState};

/// Header carrying a redirect's flash notice.
pub const NOTICE_HEADER: &str = "x-sociallink-notice";

// =============================================================================
// IntoResponse Implementations
// =============================================================================

impl IntoResponse for FlowOutcome {
    fn into_response(self) -> Response {
        match self {
            Self::Redirect { location, notice } => {
                let mut headers = HeaderMap::new();
                match HeaderValue::from_str(&location) {
                    Ok(value) => {
                        headers.insert(header::LOCATION, value);
                    }
                    Err(_) => {
                        tracing::error!(location = %location, "Redirect location is not a valid header value");
                        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
                    }
                }
                if let Some(value) = notice.and_then(|n| HeaderValue::from_str(&n).ok()) {
                    headers.insert(NOTICE_HEADER, value);
                }
                headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
                (StatusCode::SEE_OTHER, headers).into_response()
            }
            Self::Render(state) => {
                let status = render_status(&state);
                (status, [(header::CACHE_CONTROL, "no-store")], Json(state)).into_response()
            }
        }
    }
}

impl IntoResponse for LinkError {
    fn into_response(self) -> Response {
        let (status, code) = error_details(&self);
        if status.is_server_error() {
            tracing::error!(error = %self, category = %self.category(), "Identity linking failed");
        }
        let body = json!({
            "error": code,
            "message": self.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

/// Status code for a rendered state.
fn render_status(state: &RenderState) -> StatusCode {
    match state {
        RenderState::SessionExpired => StatusCode::GONE,
        RenderState::AccountInactive => StatusCode::FORBIDDEN,
        RenderState::AlreadyLinked { .. } => StatusCode::CONFLICT,
        _ => StatusCode::OK,
    }
}

/// Extracts (HTTP status, error code) from a LinkError.
fn error_details(error: &LinkError) -> (StatusCode, &'static str) {
    match error {
        LinkError::VerificationFailed { .. } => (StatusCode::UNAUTHORIZED, "verification_failed"),
        LinkError::DiscoveryFailure { .. } => (StatusCode::BAD_GATEWAY, "discovery_failure"),
        LinkError::ConstraintViolation { .. } => (StatusCode::CONFLICT, "conflict"),
        LinkError::MissingPendingRegistration => (StatusCode::GONE, "session_expired"),
        LinkError::UsernameCollisionWithoutClaimableAccount { .. } => {
            (StatusCode::CONFLICT, "username_unavailable")
        }
        LinkError::TargetNotFound { .. } => (StatusCode::NOT_FOUND, "target_not_found"),
        LinkError::InvalidRequest { .. } => (StatusCode::BAD_REQUEST, "invalid_request"),
        LinkError::Storage { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "storage_error"),
        LinkError::Configuration { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "configuration_error"),
        LinkError::Internal { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
    }
}
