//! API error taxonomy and HTTP mapping.
//!
//! Handlers propagate `ApiError`; the [`axum::response::IntoResponse`] impl
//! maps each variant to a status code and a short, non-technical `detail`
//! message. Missing and foreign entities both map to 404 so that existence is
//! never leaked across actors.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::llm::LlmError;
use crate::supabase::SupabaseError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Internal(String),

    /// An external dependency (model API, registry lookup) failed
    #[error("{0}")]
    Upstream(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(json!({ "detail": self.to_string() }));
        (status, body).into_response()
    }
}

impl From<SupabaseError> for ApiError {
    fn from(err: SupabaseError) -> Self {
        error!("database error: {}", err);
        ApiError::Internal("Erro interno".to_string())
    }
}

impl From<LlmError> for ApiError {
    fn from(err: LlmError) -> Self {
        error!("model API error: {}", err);
        ApiError::Upstream("Erro ao consultar o modelo".to_string())
    }
}
