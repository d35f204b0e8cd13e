//! Error boundary: the outermost stage of the chain.
//!
//! Every response leaving the chain with an error status is either an
//! envelope built by [`AppError`], a relayed collaborator response, or a raw
//! response produced by a tower layer (timeout, panic, method not allowed).
//! Raw responses are rewritten into envelopes here. Each failure is reported
//! to the sink exactly once.

use std::any::Any;
use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};

use crate::http::error::{AppError, ErrorEnvelope, ErrorReport, ErrorSink, FailureRecord, Relayed};
use crate::http::request::RequestContext;

/// State for the boundary stage.
#[derive(Clone)]
pub struct Boundary {
    pub sink: Arc<dyn ErrorSink>,
    pub trust_proxy: bool,
}

pub async fn error_boundary(
    State(boundary): State<Boundary>,
    mut request: Request,
    next: Next,
) -> Response {
    let ctx = RequestContext::capture(&request, boundary.trust_proxy);
    request.extensions_mut().insert(ctx.clone());

    let response = next.run(request).await;
    let status = response.status();
    if !(status.is_client_error() || status.is_server_error()) {
        return response;
    }
    if response.extensions().get::<Relayed>().is_some() {
        return response;
    }

    let (report, response) = match response.extensions().get::<ErrorReport>().cloned() {
        Some(report) => (report, response),
        None => normalize(response),
    };

    if report.reportable {
        boundary.sink.report(&FailureRecord {
            message: report.message,
            status: report.status.as_u16(),
            path: ctx.path,
            method: ctx.method.to_string(),
            client: ctx.client,
        });
    }
    tracing::debug!(
        status = status.as_u16(),
        elapsed_ms = ctx.started.elapsed().as_millis() as u64,
        "Request failed"
    );

    response
}

/// Replace the body of a raw error response with an envelope, keeping the
/// headers set by inner stages.
fn normalize(response: Response) -> (ErrorReport, Response) {
    let (mut parts, _) = response.into_parts();
    let message = parts
        .status
        .canonical_reason()
        .unwrap_or("Internal Server Error")
        .to_string();
    let report = ErrorReport {
        status: parts.status,
        message: message.clone(),
        reportable: true,
    };

    for name in [header::CONTENT_TYPE, header::CONTENT_LENGTH, header::CONTENT_ENCODING] {
        parts.headers.remove(name);
    }

    let mut envelope = (parts.status, Json(ErrorEnvelope::new(message))).into_response();
    envelope.headers_mut().extend(parts.headers);
    envelope.extensions_mut().insert(report.clone());
    (report, envelope)
}

/// Panic handler for `CatchPanicLayer`.
pub fn panic_response(payload: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic payload".to_string()
    };
    AppError::internal(format!("panic: {detail}")).into_response()
}
