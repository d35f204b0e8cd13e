//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (windows > 0, compression levels in range)
//! - Check collaborator upstreams are usable HTTP URLs
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: CincoutConfig → Result<(), Vec<ValidationError>>

use thiserror::Error;
use url::Url;

use crate::config::schema::CincoutConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Check a parsed configuration, collecting every error.
pub fn validate_config(config: &CincoutConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.server.request_timeout_secs == 0 {
        errors.push(ValidationError::new("server.request_timeout_secs", "must be greater than 0"));
    }
    if !config.server.realtime_path.starts_with('/') {
        errors.push(ValidationError::new("server.realtime_path", "must start with '/'"));
    }
    if config.server.realtime_path.starts_with("/api") {
        errors.push(ValidationError::new("server.realtime_path", "must not live under /api"));
    }

    if config.supervisor.workers == Some(0) {
        errors.push(ValidationError::new("supervisor.workers", "must be at least 1"));
    }
    let backoff = &config.supervisor.restart_backoff;
    if backoff.enabled && backoff.base_delay_ms > backoff.max_delay_ms {
        errors.push(ValidationError::new(
            "supervisor.restart_backoff",
            "base_delay_ms must not exceed max_delay_ms",
        ));
    }

    if config.rate_limit.window_secs == 0 {
        errors.push(ValidationError::new("rate_limit.window_secs", "must be greater than 0"));
    }
    if config.rate_limit.max_requests == 0 {
        errors.push(ValidationError::new("rate_limit.max_requests", "must be greater than 0"));
    }

    let limits = &config.limits;
    if limits.json_bytes == 0 || limits.form_bytes == 0 || limits.text_bytes == 0 {
        errors.push(ValidationError::new("limits", "body ceilings must be greater than 0"));
    }

    if !(0..=9).contains(&config.compression.gzip_level) {
        errors.push(ValidationError::new("compression.gzip_level", "must be between 0 and 9"));
    }
    if !(0..=11).contains(&config.compression.brotli_quality) {
        errors.push(ValidationError::new("compression.brotli_quality", "must be between 0 and 11"));
    }

    if config.watchdog.interval_secs == 0 {
        errors.push(ValidationError::new("watchdog.interval_secs", "must be greater than 0"));
    }
    if config.watchdog.max_rss_mb == 0 {
        errors.push(ValidationError::new("watchdog.max_rss_mb", "must be greater than 0"));
    }

    let upstreams = [
        ("collaborators.format_url", &config.collaborators.format_url),
        ("collaborators.lint_url", &config.collaborators.lint_url),
        ("collaborators.assembly_url", &config.collaborators.assembly_url),
    ];
    for (field, value) in upstreams {
        if let Some(raw) = value {
            match Url::parse(raw) {
                Ok(url) if url.scheme() == "http" && url.host().is_some() => {}
                Ok(_) => errors.push(ValidationError::new(field, "must be an http:// URL with a host")),
                Err(e) => errors.push(ValidationError::new(field, e.to_string())),
            }
        }
    }
    if config.collaborators.upstream_timeout_secs == 0 {
        errors.push(ValidationError::new(
            "collaborators.upstream_timeout_secs",
            "must be greater than 0",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
