//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize)
//!     → environment overrides (PORT, WORKERS, ...)
//!     → validation.rs (semantic checks)
//!     → CincoutConfig (validated, immutable)
//!     → supervisor passes the same file path to every worker
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; workers pick up changes on restart
//! - All fields have defaults to allow running without a file
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{resolve_config, ConfigError};
pub use schema::{
    BodyLimitConfig, CincoutConfig, CollaboratorConfig, CompressionConfig, ObservabilityConfig,
    RateLimitConfig, RestartBackoffConfig, ServerConfig, SupervisorConfig, WatchdogConfig,
};
