//! Error responses.
//!
//! Failures are rendered as JSON problem documents:
//!
//! ```json
//! { "type": "before_history", "title": "Gone", "status": 410, "detail": "..." }
//! ```
//!
//! `type` is stable and meant for clients to branch on.

use axum::Json;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tracing::{debug, error, warn};

use annals_core::error::DomainError;

/// Problem type for query strings that do not deserialize at all.
pub const INVALID_REQUEST: &str = "invalid_request";

#[derive(Debug, Serialize)]
pub struct Problem {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub title: &'static str,
    pub status: u16,
    pub detail: String,
}

/// Anything a handler can fail with.
#[derive(Debug)]
pub enum ApiError {
    Domain(DomainError),
    /// The query string could not be read into paging parameters.
    BadRequest(String),
}

impl From<DomainError> for ApiError {
    fn from(e: DomainError) -> Self {
        ApiError::Domain(e)
    }
}

/// HTTP status for a domain error.
pub fn status_of(e: &DomainError) -> StatusCode {
    match e {
        DomainError::MalformedCursor(_)
        | DomainError::InvalidOrder(_)
        | DomainError::InvalidLimit { .. } => StatusCode::BAD_REQUEST,
        DomainError::Gone { .. } => StatusCode::GONE,
        DomainError::NotFound(_) => StatusCode::NOT_FOUND,
        DomainError::StorageUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        DomainError::EncodingOverflow(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl ApiError {
    fn problem(&self) -> (StatusCode, Problem) {
        let (status, kind, detail) = match self {
            ApiError::Domain(e) => (status_of(e), e.code(), e.to_string()),
            ApiError::BadRequest(detail) => {
                (StatusCode::BAD_REQUEST, INVALID_REQUEST, detail.clone())
            }
        };
        let problem = Problem {
            kind,
            title: status.canonical_reason().unwrap_or("Error"),
            status: status.as_u16(),
            detail,
        };
        (status, problem)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match &self {
            ApiError::Domain(e @ DomainError::EncodingOverflow(_)) => {
                error!(error = %e, "❌ Id encoding overflow");
            }
            ApiError::Domain(e @ DomainError::StorageUnavailable(_)) => {
                warn!(error = %e, "⚠️  Storage unavailable");
            }
            other => debug!(error = ?other, "Request rejected"),
        }

        let (status, problem) = self.problem();
        let retryable = matches!(&self, ApiError::Domain(e) if e.is_retryable());

        let mut response = (status, Json(problem)).into_response();
        if retryable {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from_static("1"));
        }
        response
    }
}
