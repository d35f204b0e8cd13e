//! Response compression negotiation.
//!
//! Two tower-http compression layers share one predicate: brotli at a
//! quality/speed tradeoff for clients that accept it, gzip at a fast level
//! for everyone else. Brotli sits innermost, so a client accepting both gets
//! brotli and the outer gzip layer sees the `Content-Encoding` and skips.

use axum::{
    body::HttpBody,
    http::{header, Response},
};
use tower_http::compression::{CompressionLayer, CompressionLevel, Predicate};

use crate::config::CompressionConfig;

/// Compress text, script and JSON bodies at or above a size threshold.
#[derive(Debug, Clone, Copy)]
pub struct Compressible {
    enabled: bool,
    threshold: u64,
}

impl Compressible {
    pub fn new(config: &CompressionConfig) -> Self {
        Self {
            enabled: config.enabled,
            threshold: config.threshold_bytes,
        }
    }
}

impl Predicate for Compressible {
    fn should_compress<B>(&self, response: &Response<B>) -> bool
    where
        B: HttpBody,
    {
        if !self.enabled || response.headers().contains_key(header::CONTENT_ENCODING) {
            return false;
        }
        if !is_compressible_type(response.headers().get(header::CONTENT_TYPE)) {
            return false;
        }

        let length = response
            .headers()
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .or_else(|| response.body().size_hint().exact());

        match length {
            Some(length) => length >= self.threshold,
            // Streaming body of unknown size
            None => true,
        }
    }
}

fn is_compressible_type(content_type: Option<&header::HeaderValue>) -> bool {
    let Some(content_type) = content_type.and_then(|v| v.to_str().ok()) else {
        return false;
    };
    let content_type = content_type.to_ascii_lowercase();
    ["text", "javascript", "json"]
        .iter()
        .any(|needle| content_type.contains(needle))
}

/// Outer layer: gzip only.
pub fn gzip_layer(config: &CompressionConfig) -> CompressionLayer<Compressible> {
    CompressionLayer::new()
        .no_br()
        .quality(CompressionLevel::Precise(config.gzip_level))
        .compress_when(Compressible::new(config))
}

/// Inner layer: brotli only.
pub fn brotli_layer(config: &CompressionConfig) -> CompressionLayer<Compressible> {
    CompressionLayer::new()
        .no_gzip()
        .quality(CompressionLevel::Precise(config.brotli_quality))
        .compress_when(Compressible::new(config))
}
