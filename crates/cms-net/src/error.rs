//! ---
//! cms_section: "05-networking-external-interfaces"
//! cms_subsection: "module"
//! cms_type: "source"
//! cms_scope: "code"
//! cms_description: "HTTP error mapping for API handlers."
//! cms_version: "v0.0.0-prealpha"
//! cms_owner: "tbd"
//! ---
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use cms_security::{Permission, RoleStoreError, ROLE_SELECTION_PATH};
use serde_json::json;
use tracing::error;

use crate::inference::InferenceError;

/// Errors returned by API handlers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("missing x-user-id header")]
    Unauthenticated,
    #[error("no role assigned; select a role first")]
    RoleSelectionRequired,
    #[error("permission {0} required")]
    Forbidden(Permission),
    #[error("{0}")]
    BadRequest(String),
    #[error("no inference endpoint configured")]
    InferenceUnavailable,
    #[error(transparent)]
    Inference(#[from] InferenceError),
    #[error("role store unavailable: {0}")]
    Store(#[from] RoleStoreError),
    #[error("failed to render report: {0}")]
    Report(#[from] csv::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ApiError::RoleSelectionRequired | ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::InferenceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Inference(_) => StatusCode::BAD_GATEWAY,
            ApiError::Store(_) | ApiError::Report(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "request failed");
        }
        let body = match &self {
            ApiError::RoleSelectionRequired => json!({
                "error": self.to_string(),
                "redirect": ROLE_SELECTION_PATH,
            }),
            _ => json!({ "error": self.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}
