//! Failure taxonomy and the JSON failure envelope.
//!
//! # Responsibilities
//! - Tag every failure with an explicit HTTP status
//! - Render failures as `{success: false, error, path?}`
//! - Carry an [`ErrorReport`] on the response so the error boundary can
//!   forward it to the process-local [`ErrorSink`]
//!
//! # Design Decisions
//! - Internal details (panic payloads, upstream errors) are reported to the
//!   sink but never rendered to the caller
//! - The terminal 404 is a response, not a failure: it is not reported

use std::time::Duration;

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::http::request::ClientIdentity;

/// Failures raised by middleware stages and collaborator routers.
#[derive(Debug, Error)]
pub enum AppError {
    /// Application failure with an explicit status.
    #[error("{message}")]
    Declared { status: StatusCode, message: String },

    /// Decoded body exceeded its ceiling.
    #[error("Payload Too Large")]
    PayloadTooLarge,

    /// Per-client budget exhausted for the current window.
    #[error("Rate limit exceeded")]
    RateLimited { retry_after: Duration },

    /// Nothing claimed the request.
    #[error("Not Found")]
    RouteNotFound { path: String },

    /// Undeclared failure. `detail` goes to the log only.
    #[error("Internal Server Error")]
    Internal { detail: String },
}

impl AppError {
    pub fn declared(status: StatusCode, message: impl Into<String>) -> Self {
        AppError::Declared {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::declared(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::declared(StatusCode::NOT_FOUND, message)
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        AppError::Internal {
            detail: detail.into(),
        }
    }

    /// HTTP status of this failure.
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Declared { status, .. } => *status,
            AppError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::RouteNotFound { .. } => StatusCode::NOT_FOUND,
            AppError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn report(&self) -> ErrorReport {
        let message = match self {
            AppError::Internal { detail } => detail.clone(),
            other => other.to_string(),
        };
        ErrorReport {
            status: self.status(),
            message,
            reportable: !matches!(self, AppError::RouteNotFound { .. }),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let report = self.report();
        let envelope = ErrorEnvelope {
            success: false,
            error: self.to_string(),
            path: match &self {
                AppError::RouteNotFound { path } => Some(path.clone()),
                _ => None,
            },
        };

        let mut response = (report.status, Json(envelope)).into_response();
        if let AppError::RateLimited { retry_after } = &self {
            let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response.extensions_mut().insert(report);
        response
    }
}

/// The uniform failure body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub success: bool,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub path: Option<String>,
}

impl ErrorEnvelope {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
            path: None,
        }
    }
}

/// Response extension describing the failure that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorReport {
    pub status: StatusCode,
    pub message: String,
    pub reportable: bool,
}

/// Response extension marking a body relayed untouched from a collaborator.
#[derive(Debug, Clone, Copy)]
pub struct Relayed;

/// Everything the sink learns about a failed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureRecord {
    pub message: String,
    pub status: u16,
    pub path: String,
    pub method: String,
    pub client: ClientIdentity,
}

/// Process-local destination for request failures.
pub trait ErrorSink: Send + Sync + 'static {
    fn report(&self, failure: &FailureRecord);
}

/// Default sink: one structured `error` event per failure.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl ErrorSink for TracingSink {
    fn report(&self, failure: &FailureRecord) {
        tracing::error!(
            pid = std::process::id(),
            message = %failure.message,
            status = failure.status,
            path = %failure.path,
            method = %failure.method,
            client = %failure.client,
            "Server error"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn envelope_of(response: Response) -> ErrorEnvelope {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn declared_failure_keeps_status_and_message() {
        let response = AppError::declared(StatusCode::UNPROCESSABLE_ENTITY, "bad style").into_response();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let report = response.extensions().get::<ErrorReport>().cloned().unwrap();
        assert!(report.reportable);
        assert_eq!(report.message, "bad style");

        let envelope = envelope_of(response).await;
        assert_eq!(envelope, ErrorEnvelope::new("bad style"));
    }

    #[tokio::test]
    async fn internal_detail_is_not_rendered() {
        let response = AppError::internal("index out of bounds at src/x.rs:10").into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let report = response.extensions().get::<ErrorReport>().cloned().unwrap();
        assert!(report.message.contains("index out of bounds"));

        let envelope = envelope_of(response).await;
        assert_eq!(envelope.error, "Internal Server Error");
    }

    #[tokio::test]
    async fn route_not_found_echoes_path_and_is_not_reported() {
        let response = AppError::RouteNotFound { path: "/nope".into() }.into_response();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(!response.extensions().get::<ErrorReport>().unwrap().reportable);

        let envelope = envelope_of(response).await;
        assert_eq!(envelope.error, "Not Found");
        assert_eq!(envelope.path.as_deref(), Some("/nope"));
    }

    #[test]
    fn rate_limited_sets_retry_after() {
        let response = AppError::RateLimited {
            retry_after: Duration::from_millis(12_500),
        }
        .into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "13");
    }

    #[test]
    fn envelope_omits_absent_path() {
        let json = serde_json::to_value(ErrorEnvelope::new("boom")).unwrap();
        assert_eq!(json, serde_json::json!({"success": false, "error": "boom"}));
    }
}
