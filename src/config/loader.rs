//! Configuration loading from disk and environment.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::schema::CincoutConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value {value:?} for environment variable {var}")]
    Env { var: &'static str, value: String },

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<CincoutConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let config: CincoutConfig = toml::from_str(&content)?;

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Resolve the effective configuration: optional file, then process
/// environment, then validation.
pub fn resolve_config(path: Option<&Path>) -> Result<CincoutConfig, ConfigError> {
    let mut config = match path {
        Some(path) => load_config(path)?,
        None => CincoutConfig::default(),
    };

    apply_env_overrides(&mut config, |var| std::env::var(var).ok())?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Apply environment overrides using `lookup` to read variables.
///
/// Recognized variables: `PORT`, `WORKERS`, `CINCOUT_STATIC_DIR`,
/// `CINCOUT_TEMPLATES_DIR`, `CINCOUT_FORMAT_URL`, `CINCOUT_LINT_URL`,
/// `CINCOUT_ASSEMBLY_URL`.
pub fn apply_env_overrides<F>(config: &mut CincoutConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&'static str) -> Option<String>,
{
    if let Some(value) = lookup("PORT") {
        config.server.port = value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Env { var: "PORT", value })?;
    }
    if let Some(value) = lookup("WORKERS") {
        let workers: usize = value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Env { var: "WORKERS", value })?;
        config.supervisor.workers = Some(workers);
    }
    if let Some(dir) = lookup("CINCOUT_STATIC_DIR") {
        config.server.static_dir = dir;
    }
    if let Some(dir) = lookup("CINCOUT_TEMPLATES_DIR") {
        config.collaborators.templates_dir = dir;
    }
    if let Some(url) = lookup("CINCOUT_FORMAT_URL") {
        config.collaborators.format_url = Some(url);
    }
    if let Some(url) = lookup("CINCOUT_LINT_URL") {
        config.collaborators.lint_url = Some(url);
    }
    if let Some(url) = lookup("CINCOUT_ASSEMBLY_URL") {
        config.collaborators.assembly_url = Some(url);
    }
    Ok(())
}
