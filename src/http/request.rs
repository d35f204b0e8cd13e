//! Per-request context.
//!
//! # Responsibilities
//! - Resolve the client identity (peer address, or `X-Forwarded-For` when
//!   the server sits behind a trusted proxy)
//! - Capture method, path and start time once, at the error boundary
//!
//! # Design Decisions
//! - The context lives in request extensions and dies with the request
//! - Headers stay on the request itself rather than being copied here

use std::convert::Infallible;
use std::fmt;
use std::net::SocketAddr;

use axum::{
    extract::{connect_info::MockConnectInfo, ConnectInfo, FromRequestParts},
    http::{request::Parts, Extensions, HeaderMap, Method, Request},
};
use tokio::time::Instant;

use crate::http::middleware::body::DecodedBody;

/// Identity used for rate limiting and failure reports.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientIdentity(String);

impl ClientIdentity {
    pub fn new(identity: impl Into<String>) -> Self {
        Self(identity.into())
    }

    pub fn unknown() -> Self {
        Self("unknown".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Resolve the identity from the peer address and headers.
    pub fn resolve(peer: Option<SocketAddr>, headers: &HeaderMap, trust_proxy: bool) -> Self {
        if trust_proxy {
            let forwarded = headers
                .get("x-forwarded-for")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.split(',').next())
                .map(str::trim)
                .filter(|v| !v.is_empty());
            if let Some(client) = forwarded {
                return Self::new(client);
            }
        }

        peer.map(|addr| Self::new(addr.ip().to_string()))
            .unwrap_or_else(Self::unknown)
    }
}

impl fmt::Display for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<S> FromRequestParts<S> for ClientIdentity
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(ctx) = parts.extensions.get::<RequestContext>() {
            return Ok(ctx.client.clone());
        }
        Ok(Self::resolve(peer_address(&parts.extensions), &parts.headers, false))
    }
}

/// Peer address recorded by the listener, or injected with
/// [`MockConnectInfo`] when the router is driven without a socket.
pub fn peer_address(extensions: &Extensions) -> Option<SocketAddr> {
    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr)
        .or_else(|| {
            extensions
                .get::<MockConnectInfo<SocketAddr>>()
                .map(|MockConnectInfo(addr)| *addr)
        })
}

/// Metadata captured when a request enters the chain.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub client: ClientIdentity,
    pub method: Method,
    pub path: String,
    pub started: Instant,
    /// Filled in by the body decoding stage.
    pub decoded_body: Option<DecodedBody>,
}

impl RequestContext {
    pub fn capture<B>(request: &Request<B>, trust_proxy: bool) -> Self {
        let peer = peer_address(request.extensions());

        Self {
            client: ClientIdentity::resolve(peer, request.headers(), trust_proxy),
            method: request.method().clone(),
            path: request.uri().path().to_string(),
            started: Instant::now(),
            decoded_body: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn peer() -> Option<SocketAddr> {
        Some("10.1.2.3:55000".parse().unwrap())
    }

    #[test]
    fn peer_address_is_default_identity() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.9"));

        let identity = ClientIdentity::resolve(peer(), &headers, false);
        assert_eq!(identity.as_str(), "10.1.2.3");
    }

    #[test]
    fn forwarded_for_used_behind_trusted_proxy() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.9, 10.0.0.1"),
        );

        let identity = ClientIdentity::resolve(peer(), &headers, true);
        assert_eq!(identity.as_str(), "203.0.113.9");
    }

    #[test]
    fn missing_peer_is_unknown() {
        let identity = ClientIdentity::resolve(None, &HeaderMap::new(), true);
        assert_eq!(identity, ClientIdentity::unknown());
    }

    #[test]
    fn capture_reads_method_and_path() {
        let mut request = Request::builder()
            .method(Method::POST)
            .uri("/api/format/cpp?style=llvm")
            .body(())
            .unwrap();
        request.extensions_mut().insert(ConnectInfo(peer().unwrap()));

        let ctx = RequestContext::capture(&request, false);
        assert_eq!(ctx.method, Method::POST);
        assert_eq!(ctx.path, "/api/format/cpp");
        assert_eq!(ctx.client.as_str(), "10.1.2.3");
        assert!(ctx.decoded_body.is_none());
    }

    #[test]
    fn capture_falls_back_to_mock_connect_info() {
        let mut request = Request::builder().uri("/health").body(()).unwrap();
        request.extensions_mut().insert(MockConnectInfo(peer().unwrap()));

        let ctx = RequestContext::capture(&request, false);
        assert_eq!(ctx.client.as_str(), "10.1.2.3");
    }
}
