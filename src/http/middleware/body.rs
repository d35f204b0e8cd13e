//! Request body decoding with hard ceilings.
//!
//! # Responsibilities
//! - Buffer JSON, form and plain-text bodies up to their ceiling
//! - Reject oversized bodies with 413 before any later stage runs
//! - Attach the decoded form to the request; forward the raw bytes unchanged
//!
//! # Design Decisions
//! - Runs behind request inflation, so ceilings apply to the decoded size
//!   whatever the transport encoding
//! - A declared `Content-Length` above the ceiling fails without reading the
//!   body, unless the body is still encoded
//! - Other content types (multipart, binary) stream through undecoded

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use serde_json::Value;

use crate::config::BodyLimitConfig;
use crate::http::error::AppError;
use crate::http::request::RequestContext;

/// Body families the decoder understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    Json,
    Form,
    Text,
}

impl BodyKind {
    /// Classify by `Content-Type`, ignoring parameters such as `charset`.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let content_type = headers.get(header::CONTENT_TYPE)?.to_str().ok()?;
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        match essence.as_str() {
            "application/json" | "application/csp-report" => Some(BodyKind::Json),
            "application/x-www-form-urlencoded" => Some(BodyKind::Form),
            "text/plain" => Some(BodyKind::Text),
            other if other.ends_with("+json") => Some(BodyKind::Json),
            _ => None,
        }
    }
}

/// Decoded request body, stored in request extensions and in the
/// [`RequestContext`].
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedBody {
    Empty,
    Json(Value),
    Form(Vec<(String, String)>),
    Text(String),
}

/// Ceilings per body family.
#[derive(Debug, Clone, Copy)]
pub struct BodyLimits {
    pub json: usize,
    pub form: usize,
    pub text: usize,
}

impl BodyLimits {
    pub fn limit_for(&self, kind: BodyKind) -> usize {
        match kind {
            BodyKind::Json => self.json,
            BodyKind::Form => self.form,
            BodyKind::Text => self.text,
        }
    }
}

impl From<&BodyLimitConfig> for BodyLimits {
    fn from(config: &BodyLimitConfig) -> Self {
        Self {
            json: config.json_bytes,
            form: config.form_bytes,
            text: config.text_bytes,
        }
    }
}

pub async fn decode_body(
    State(limits): State<BodyLimits>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let Some(kind) = BodyKind::from_headers(request.headers()) else {
        return Ok(next.run(request).await);
    };
    let limit = limits.limit_for(kind);

    if exceeds_declared_length(request.headers(), limit) {
        return Err(AppError::PayloadTooLarge);
    }

    let (mut parts, body) = request.into_parts();
    let bytes = match Limited::new(body, limit).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(err) if err.downcast_ref::<LengthLimitError>().is_some() => {
            return Err(AppError::PayloadTooLarge);
        }
        Err(err) => {
            tracing::debug!(error = %err, "Failed to read request body");
            return Err(AppError::bad_request("Invalid request body"));
        }
    };

    let decoded = decode(kind, &bytes)?;
    if let Some(ctx) = parts.extensions.get_mut::<RequestContext>() {
        ctx.decoded_body = Some(decoded.clone());
    }
    parts.extensions.insert(decoded);

    Ok(next.run(Request::from_parts(parts, Body::from(bytes))).await)
}

/// `Content-Length` counts encoded bytes while a `Content-Encoding` is set,
/// so it says nothing about the decoded size.
fn exceeds_declared_length(headers: &HeaderMap, limit: usize) -> bool {
    if headers.contains_key(header::CONTENT_ENCODING) {
        return false;
    }
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .is_some_and(|len| len > limit as u64)
}

/// Decode a buffered body of the given family.
pub fn decode(kind: BodyKind, bytes: &[u8]) -> Result<DecodedBody, AppError> {
    if bytes.is_empty() {
        return Ok(DecodedBody::Empty);
    }

    match kind {
        BodyKind::Json => serde_json::from_slice(bytes)
            .map(DecodedBody::Json)
            .map_err(|_| AppError::bad_request("Invalid JSON body")),
        BodyKind::Form => Ok(DecodedBody::Form(
            url::form_urlencoded::parse(bytes).into_owned().collect(),
        )),
        BodyKind::Text => std::str::from_utf8(bytes)
            .map(|text| DecodedBody::Text(text.to_string()))
            .map_err(|_| AppError::bad_request("Invalid text body")),
    }
}
