//! Static asset serving with differentiated caching.
//!
//! GET and HEAD requests are first offered to the bundled UI directory. A
//! hit short-circuits the chain; a miss falls through to API dispatch and the
//! terminal 404. A missing directory behaves like an empty one.

use std::path::Path;

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, HeaderValue, Method, StatusCode},
    middleware::Next,
    response::Response,
};
use tower::ServiceExt;
use tower_http::services::ServeDir;

const NO_CACHE: &str = "no-cache";
const SCRIPT_STYLE_CACHE: &str = "public, max-age=86400, immutable";
const ASSET_CACHE: &str = "max-age=86400, immutable";

/// The bundled UI directory.
#[derive(Clone)]
pub struct StaticAssets {
    dir: ServeDir,
}

impl StaticAssets {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            dir: ServeDir::new(root).append_index_html_on_directories(true),
        }
    }
}

pub async fn serve_static(
    State(assets): State<StaticAssets>,
    request: Request,
    next: Next,
) -> Response {
    if !matches!(*request.method(), Method::GET | Method::HEAD) {
        return next.run(request).await;
    }

    let mut probe = Request::builder()
        .method(request.method().clone())
        .uri(request.uri().clone())
        .version(request.version())
        .body(Body::empty())
        .unwrap_or_default();
    *probe.headers_mut() = request.headers().clone();

    let response = match assets.dir.oneshot(probe).await {
        Ok(response) => response,
        Err(err) => {
            tracing::warn!(error = %err, "Static lookup failed");
            return next.run(request).await;
        }
    };
    if response.status() == StatusCode::NOT_FOUND {
        return next.run(request).await;
    }

    let mut response = response.map(Body::new);
    if response.status().is_success() || response.status() == StatusCode::NOT_MODIFIED {
        let policy = cache_policy(response.headers().get(header::CONTENT_TYPE));
        response
            .headers_mut()
            .insert(header::CACHE_CONTROL, HeaderValue::from_static(policy));
    }
    response
}

/// `Cache-Control` for a served asset, keyed by its content type.
pub fn cache_policy(content_type: Option<&HeaderValue>) -> &'static str {
    let content_type = content_type
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase();

    if content_type.starts_with("text/html") {
        NO_CACHE
    } else if content_type.contains("javascript") || content_type.starts_with("text/css") {
        SCRIPT_STYLE_CACHE
    } else {
        ASSET_CACHE
    }
}
