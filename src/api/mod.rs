//! Collaborator dispatch.
//!
//! Requests that survive the middleware chain are routed by path prefix:
//!
//! ```text
//! /api/format     → formatting service (upstream)
//! /api/lintCode   → lint service (upstream)
//! /api/templates  → template catalog (in-process)
//! /api/assembly   → assembly service (upstream)
//! /health         → liveness
//! ```
//!
//! A collaborator without a configured upstream answers 503.

pub mod templates;
pub mod upstream;

use std::time::Duration;

use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::config::CollaboratorConfig;

pub use templates::TemplateCatalog;
pub use upstream::{Upstream, UpstreamClient};

/// One router per collaborator, mounted under a fixed prefix.
#[derive(Clone)]
pub struct Collaborators {
    pub format: Router,
    pub lint: Router,
    pub templates: Router,
    pub assembly: Router,
}

impl Collaborators {
    pub fn from_config(config: &CollaboratorConfig) -> Self {
        let client = upstream::build_client();
        let timeout = Duration::from_secs(config.upstream_timeout_secs);
        let mount = |name: &'static str, url: &Option<String>| match url {
            Some(base) => Upstream::new(name, base, client.clone(), timeout).router(),
            None => upstream::unavailable(name),
        };

        Self {
            format: mount("format", &config.format_url),
            lint: mount("lint", &config.lint_url),
            templates: TemplateCatalog::new(&config.templates_dir).router(),
            assembly: mount("assembly", &config.assembly_url),
        }
    }

    pub fn into_router(self) -> Router {
        Router::new()
            .nest("/api/format", self.format)
            .nest("/api/lintCode", self.lint)
            .nest("/api/templates", self.templates)
            .nest("/api/assembly", self.assembly)
            .route("/health", get(health))
    }
}

#[derive(Debug, Serialize)]
struct Health {
    status: &'static str,
    pid: u32,
}

async fn health() -> Json<Health> {
    Json(Health {
        status: "ok",
        pid: std::process::id(),
    })
}
