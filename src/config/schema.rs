//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the server.
//! All types derive Serde traits for deserialization from config files, and
//! every section falls back to the production defaults when omitted.

use serde::{Deserialize, Serialize};

/// Root configuration shared by the supervisor and every worker.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct CincoutConfig {
    /// Listener and request-handling settings.
    pub server: ServerConfig,

    /// Worker pool settings.
    pub supervisor: SupervisorConfig,

    /// Per-client request budget.
    pub rate_limit: RateLimitConfig,

    /// Request body ceilings.
    pub limits: BodyLimitConfig,

    /// Response compression negotiation.
    pub compression: CompressionConfig,

    /// Memory self-eviction.
    pub watchdog: WatchdogConfig,

    /// Sub-routers mounted under `/api`.
    pub collaborators: CollaboratorConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to bind.
    pub host: String,

    /// Port shared by every worker (env `PORT`).
    pub port: u16,

    /// Take the client identity from `X-Forwarded-For` instead of the peer.
    pub trust_proxy: bool,

    /// Total time allowed for a single request.
    pub request_timeout_secs: u64,

    /// Directory holding the bundled UI.
    pub static_dir: String,

    /// Path of the real-time upgrade endpoint.
    pub realtime_path: String,

    /// Origins allowed by the CORS stage. Empty means any origin.
    pub cors_allowed_origins: Vec<String>,
}

impl ServerConfig {
    /// `host:port` string suitable for binding.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 9527,
            trust_proxy: false,
            request_timeout_secs: 30,
            static_dir: "frontend/dist".to_string(),
            realtime_path: "/socket".to_string(),
            cors_allowed_origins: Vec::new(),
        }
    }
}

/// Worker pool configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Number of workers. Defaults to the available parallelism.
    pub workers: Option<usize>,

    /// Optional delay between crash-looping restarts.
    pub restart_backoff: RestartBackoffConfig,
}

impl SupervisorConfig {
    /// Resolve the pool size, falling back to the host's processing units.
    pub fn pool_size(&self) -> usize {
        self.workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }
}

/// Restart backoff for workers that die shortly after starting.
///
/// Disabled by default: a dead worker is replaced immediately, however often
/// it dies.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RestartBackoffConfig {
    pub enabled: bool,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,

    /// A worker that lived at least this long resets its lineage's backoff.
    pub min_uptime_secs: u64,
}

impl Default for RestartBackoffConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_delay_ms: 500,
            max_delay_ms: 30_000,
            min_uptime_secs: 5,
        }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Fixed window length in seconds.
    pub window_secs: u64,

    /// Maximum requests per identity per window.
    pub max_requests: u32,

    /// Identities that are never limited.
    pub whitelist: Vec<String>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window_secs: 60,
            max_requests: 30,
            whitelist: Vec::new(),
        }
    }
}

/// Decoded body ceilings in bytes.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct BodyLimitConfig {
    pub json_bytes: usize,
    pub form_bytes: usize,
    pub text_bytes: usize,
}

impl Default for BodyLimitConfig {
    fn default() -> Self {
        Self {
            json_bytes: 1024 * 1024,
            form_bytes: 1024 * 1024,
            text_bytes: 1024 * 1024,
        }
    }
}

/// Compression negotiation configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct CompressionConfig {
    pub enabled: bool,

    /// Bodies smaller than this are sent uncompressed.
    pub threshold_bytes: u64,

    /// gzip level (0-9).
    pub gzip_level: i32,

    /// brotli quality (0-11).
    pub brotli_quality: i32,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold_bytes: 1024,
            gzip_level: 6,
            brotli_quality: 5,
        }
    }
}

/// Memory watchdog configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct WatchdogConfig {
    pub enabled: bool,

    /// Seconds between two measurements.
    pub interval_secs: u64,

    /// Resident memory ceiling in MiB.
    pub max_rss_mb: u64,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 30,
            max_rss_mb: 800,
        }
    }
}

/// Collaborating sub-routers.
///
/// Formatting, linting and assembly generation live in separate services;
/// when no upstream is configured their prefix answers 503.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct CollaboratorConfig {
    pub format_url: Option<String>,
    pub lint_url: Option<String>,
    pub assembly_url: Option<String>,

    /// Root of the `<language>/<name>.<ext>` template catalog.
    pub templates_dir: String,

    /// Timeout for a forwarded request in seconds.
    pub upstream_timeout_secs: u64,
}

impl Default for CollaboratorConfig {
    fn default() -> Self {
        Self {
            format_url: None,
            lint_url: None,
            assembly_url: None,
            templates_dir: "templates".to_string(),
            upstream_timeout_secs: 20,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit JSON lines instead of the human readable format.
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}
