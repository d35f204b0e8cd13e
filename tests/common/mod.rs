//! Shared utilities for integration tests.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use axum::{
    body::{Body, Bytes},
    extract::Request,
    http::{HeaderMap, Method, Uri},
    response::Response,
    routing::any,
    Json, Router,
};
use cincout_server::api::Collaborators;
use cincout_server::config::CincoutConfig;
use cincout_server::http::{ErrorSink, FailureRecord, Worker};
use cincout_server::lifecycle::Shutdown;
use serde_json::{json, Value};
use tokio::net::TcpListener;

/// Config with every file-system dependency pointed at nothing.
pub fn test_config() -> CincoutConfig {
    let mut config = CincoutConfig::default();
    config.server.static_dir = "/nonexistent/static".into();
    config.collaborators.templates_dir = "/nonexistent/templates".into();
    config.watchdog.enabled = false;
    config
}

/// Start an upstream that echoes what it received as JSON.
pub async fn start_echo_upstream() -> SocketAddr {
    async fn echo(method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> Json<Value> {
        let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_string);
        Json(json!({
            "method": method.as_str(),
            "path": uri.path(),
            "query": uri.query(),
            "body": String::from_utf8_lossy(&body),
            "content_type": header("content-type"),
            "forwarded_for": header("x-forwarded-for"),
            "host": header("host"),
        }))
    }

    let app = Router::new().fallback(echo);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr
}

/// A collaborator that counts how often it was reached.
#[derive(Clone, Default)]
pub struct Probe {
    hits: Arc<AtomicU32>,
}

impl Probe {
    pub fn hits(&self) -> u32 {
        self.hits.load(Ordering::SeqCst)
    }

    /// Router answering every request with `{"ok": true}` after counting it.
    pub fn router(&self) -> Router {
        let hits = self.hits.clone();
        let handler = move |_request: Request| {
            let hits = hits.clone();
            async move {
                hits.fetch_add(1, Ordering::SeqCst);
                Json(json!({ "ok": true }))
            }
        };
        Router::new()
            .route("/", any(handler.clone()))
            .route("/{*rest}", any(handler))
    }
}

/// Default collaborators with `/api/format` replaced by `format`.
pub fn collaborators_with_format(config: &CincoutConfig, format: Router) -> Collaborators {
    let mut collaborators = Collaborators::from_config(&config.collaborators);
    collaborators.format = format;
    collaborators
}

/// Error sink remembering every record.
#[derive(Default)]
pub struct CollectingSink {
    records: Mutex<Vec<FailureRecord>>,
}

impl CollectingSink {
    pub fn records(&self) -> Vec<FailureRecord> {
        self.records.lock().unwrap().clone()
    }
}

impl ErrorSink for CollectingSink {
    fn report(&self, failure: &FailureRecord) {
        self.records.lock().unwrap().push(failure.clone());
    }
}

/// Serve `worker` on an ephemeral port.
pub async fn spawn_worker(worker: Worker) -> (SocketAddr, Shutdown) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let stopped = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = worker.run(listener, stopped).await;
    });
    (addr, shutdown)
}

pub async fn body_bytes(response: Response) -> Bytes {
    axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap()
}

pub async fn body_json(response: Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

pub fn get(uri: &str) -> Request {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}
