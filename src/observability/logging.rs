//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the global subscriber once per process
//! - Tag every line with the process role and pid
//! - Route panics through the log
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging
//! - JSON format for production, pretty format for development
//! - `RUST_LOG` wins over the configured level

use tracing::Span;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::ObservabilityConfig;

/// Which half of the process model is logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Supervisor,
    Worker,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Supervisor => "supervisor",
            Role::Worker => "worker",
        }
    }
}

/// Filter used when `RUST_LOG` is unset.
pub fn default_directives(level: &str) -> String {
    format!("cincout_server={level},tower_http={level}")
}

/// Install the global subscriber. Calling it twice is a no-op.
pub fn init(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(&config.log_level)));
    let registry = tracing_subscriber::registry().with(filter);

    let installed = if config.json_logs {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer()).try_init()
    };
    if installed.is_ok() {
        install_panic_hook();
    }
}

/// Root span carrying role and pid; enter it around the role's main future.
pub fn role_span(role: Role) -> Span {
    tracing::info_span!("cincout", role = role.as_str(), pid = std::process::id())
}

fn install_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        tracing::error!(pid = std::process::id(), panic = %info, "Uncaught panic");
    }));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directives_cover_crate_and_http_layer() {
        assert_eq!(default_directives("info"), "cincout_server=info,tower_http=info");
        assert!(EnvFilter::try_new(default_directives("debug")).is_ok());
    }

    #[test]
    fn roles_render_lowercase() {
        assert_eq!(Role::Supervisor.as_str(), "supervisor");
        assert_eq!(Role::Worker.as_str(), "worker");
    }
}
