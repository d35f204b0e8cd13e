//! Forwarding to out-of-process collaborators.
//!
//! # Responsibilities
//! - Rebuild the request against the upstream base URL, keeping the
//!   original path and query
//! - Preserve method, end-to-end headers and body
//! - Relay the upstream response unchanged
//!
//! # Design Decisions
//! - Hop-by-hop headers are stripped in both directions; `Host` is rewritten
//!   to the upstream by the client
//! - Relayed responses are marked so the error boundary leaves upstream
//!   error bodies alone
//! - Connection failures and timeouts become 502 / 504 declared failures

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{OriginalUri, Request, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode, Uri},
    response::Response,
    routing::any,
    Router,
};
use hyper::body::Incoming;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};

use crate::http::error::{AppError, Relayed};
use crate::http::request::ClientIdentity;

const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
    "transfer-encoding",
    "upgrade",
];

/// Shared HTTP client for all upstreams of a worker.
pub type UpstreamClient = Client<HttpConnector, Body>;

pub fn build_client() -> UpstreamClient {
    Client::builder(TokioExecutor::new()).build(HttpConnector::new())
}

/// One collaborator reachable over HTTP.
#[derive(Clone)]
pub struct Upstream {
    name: &'static str,
    base: String,
    client: UpstreamClient,
    timeout: Duration,
}

impl Upstream {
    pub fn new(name: &'static str, base: &str, client: UpstreamClient, timeout: Duration) -> Self {
        Self {
            name,
            base: base.trim_end_matches('/').to_string(),
            client,
            timeout,
        }
    }

    /// Router forwarding everything under its mount point.
    pub fn router(self) -> Router {
        Router::new()
            .route("/", any(forward))
            .route("/{*rest}", any(forward))
            .with_state(Arc::new(self))
    }

    fn target(&self, original: &Uri) -> Result<Uri, AppError> {
        let path_and_query = original
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        format!("{}{}", self.base, path_and_query)
            .parse()
            .map_err(|e| AppError::internal(format!("{} upstream URI: {e}", self.name)))
    }
}

async fn forward(
    State(upstream): State<Arc<Upstream>>,
    OriginalUri(original): OriginalUri,
    client: ClientIdentity,
    request: Request,
) -> Result<Response, AppError> {
    let (parts, body) = request.into_parts();
    let uri = upstream.target(&original)?;

    let mut outbound = Request::builder()
        .method(parts.method.clone())
        .uri(uri)
        .body(body)
        .map_err(|e| AppError::internal(format!("{} request: {e}", upstream.name)))?;
    *outbound.headers_mut() = end_to_end(&parts.headers);
    if let Ok(value) = HeaderValue::from_str(client.as_str()) {
        outbound.headers_mut().append(HeaderName::from_static("x-forwarded-for"), value);
    }

    tracing::debug!(
        upstream = upstream.name,
        method = %parts.method,
        path = %original.path(),
        "Forwarding to collaborator"
    );

    let response = match tokio::time::timeout(upstream.timeout, upstream.client.request(outbound)).await {
        Ok(Ok(response)) => response,
        Ok(Err(e)) => {
            tracing::warn!(upstream = upstream.name, error = %e, "Upstream error");
            return Err(AppError::declared(
                StatusCode::BAD_GATEWAY,
                format!("{} service unreachable", upstream.name),
            ));
        }
        Err(_) => {
            tracing::warn!(upstream = upstream.name, "Upstream timed out");
            return Err(AppError::declared(
                StatusCode::GATEWAY_TIMEOUT,
                format!("{} service timed out", upstream.name),
            ));
        }
    };

    let (mut parts, body): (_, Incoming) = response.into_parts();
    parts.headers = end_to_end(&parts.headers);
    parts.extensions.insert(Relayed);
    Ok(Response::from_parts(parts, Body::new(body)))
}

fn end_to_end(headers: &HeaderMap) -> HeaderMap {
    let mut out = headers.clone();
    for name in HOP_BY_HOP {
        out.remove(name);
    }
    out.remove(header::HOST);
    out
}

/// Router for a collaborator with no configured upstream.
pub fn unavailable(name: &'static str) -> Router {
    let handler = move || async move {
        AppError::declared(
            StatusCode::SERVICE_UNAVAILABLE,
            format!("{name} service unavailable"),
        )
    };
    Router::new()
        .route("/", any(handler))
        .route("/{*rest}", any(handler))
}
