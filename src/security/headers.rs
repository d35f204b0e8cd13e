//! Security response headers.
//!
//! # Responsibilities
//! - Add the hardening headers a browser-facing service should send
//! - Leave `Content-Security-Policy`, `X-Frame-Options` and the
//!   cross-origin embedder/opener policies unset: the UI embeds the service
//!   in iframes
//!
//! # Design Decisions
//! - Headers already set by a downstream stage are left alone
//! - Cross-origin resource policy is `cross-origin` so assets load from
//!   embedding pages

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};

/// The header set applied to every response.
#[derive(Debug, Clone)]
pub struct SecurityHeaders {
    headers: Vec<(HeaderName, HeaderValue)>,
}

impl SecurityHeaders {
    /// Header set permitting iframe embedding.
    pub fn embeddable() -> Self {
        let headers = [
            ("cross-origin-resource-policy", "cross-origin"),
            ("origin-agent-cluster", "?1"),
            ("referrer-policy", "no-referrer"),
            ("strict-transport-security", "max-age=31536000; includeSubDomains"),
            ("x-content-type-options", "nosniff"),
            ("x-dns-prefetch-control", "off"),
            ("x-download-options", "noopen"),
            ("x-permitted-cross-domain-policies", "none"),
            ("x-xss-protection", "0"),
        ]
        .into_iter()
        .map(|(name, value)| (HeaderName::from_static(name), HeaderValue::from_static(value)))
        .collect();

        Self { headers }
    }

    pub fn apply(&self, headers: &mut HeaderMap) {
        for (name, value) in &self.headers {
            if !headers.contains_key(name) {
                headers.insert(name.clone(), value.clone());
            }
        }
    }
}

impl Default for SecurityHeaders {
    fn default() -> Self {
        Self::embeddable()
    }
}

pub async fn security_headers(
    State(policy): State<Arc<SecurityHeaders>>,
    request: Request,
    next: Next,
) -> Response {
    let mut response = next.run(request).await;
    policy.apply(response.headers_mut());
    response
}
