//! Worker HTTP server.
//!
//! # Responsibilities
//! - Compose the request chain in its fixed order
//! - Attach the real-time endpoint next to the chain
//! - Serve until shutdown or until the memory watchdog fires
//!
//! # Chain order
//! Layers are added innermost first; a request traverses them bottom-up:
//!
//! ```text
//! request id → trace → error boundary → panic catch → timeout → cors
//!   → gzip → brotli → request inflation → body decoding → security headers
//!   → rate limit
//!   → static assets → API dispatch → 404
//! ```

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::Request,
    http::Uri,
    middleware::from_fn_with_state,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::Span;
use tower_http::{
    catch_panic::CatchPanicLayer,
    decompression::RequestDecompressionLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::api::Collaborators;
use crate::config::CincoutConfig;
use crate::http::error::{AppError, ErrorSink, TracingSink};
use crate::http::middleware::{
    body::{decode_body, BodyLimits},
    boundary::{error_boundary, panic_response, Boundary},
    compression::{brotli_layer, gzip_layer},
    static_files::{serve_static, StaticAssets},
};
use crate::http::realtime::{self, LoggingHandler, RealtimeHandler};
use crate::lifecycle::shutdown;
use crate::lifecycle::watchdog::{MemoryBreach, MemoryProbe, MemoryWatchdog, SysinfoProbe};
use crate::net::{bind_shared, parse_address, ListenerError};
use crate::observability::Role;
use crate::security::{
    cors::cors_layer,
    headers::security_headers,
    rate_limit::rate_limit,
    RateLimiter, SecurityHeaders,
};

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error(transparent)]
    Listener(#[from] ListenerError),
    #[error("server error: {0}")]
    Io(#[from] std::io::Error),
}

/// Why a worker stopped serving.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerOutcome {
    /// Graceful shutdown completed.
    Stopped,
    /// The watchdog fired; the process must exit with status 1.
    MemoryExceeded(MemoryBreach),
}

/// One worker: a chain, a listener and a watchdog.
pub struct Worker {
    config: CincoutConfig,
    collaborators: Collaborators,
    error_sink: Arc<dyn ErrorSink>,
    realtime: Arc<dyn RealtimeHandler>,
    rate_limiter: Arc<RateLimiter>,
    probe: Option<Box<dyn MemoryProbe>>,
}

impl Worker {
    pub fn new(config: CincoutConfig) -> Self {
        let collaborators = Collaborators::from_config(&config.collaborators);
        let rate_limiter = Arc::new(RateLimiter::new(&config.rate_limit));
        Self {
            config,
            collaborators,
            error_sink: Arc::new(TracingSink),
            realtime: Arc::new(LoggingHandler),
            rate_limiter,
            probe: None,
        }
    }

    pub fn with_collaborators(mut self, collaborators: Collaborators) -> Self {
        self.collaborators = collaborators;
        self
    }

    pub fn with_error_sink(mut self, sink: Arc<dyn ErrorSink>) -> Self {
        self.error_sink = sink;
        self
    }

    pub fn with_realtime_handler(mut self, handler: Arc<dyn RealtimeHandler>) -> Self {
        self.realtime = handler;
        self
    }

    pub fn with_rate_limiter(mut self, limiter: RateLimiter) -> Self {
        self.rate_limiter = Arc::new(limiter);
        self
    }

    pub fn with_memory_probe(mut self, probe: Box<dyn MemoryProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn config(&self) -> &CincoutConfig {
        &self.config
    }

    /// The rate limiter shared by every request this worker serves.
    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.rate_limiter
    }

    /// Build the complete router: the layered chain plus the real-time route.
    #[allow(deprecated)]
    pub fn router(&self) -> Router {
        let server = &self.config.server;
        let boundary = Boundary {
            sink: self.error_sink.clone(),
            trust_proxy: server.trust_proxy,
        };

        let chain = self
            .collaborators
            .clone()
            .into_router()
            .fallback(not_found)
            .layer(from_fn_with_state(StaticAssets::new(&server.static_dir), serve_static))
            .layer(from_fn_with_state(self.rate_limiter.clone(), rate_limit))
            .layer(from_fn_with_state(Arc::new(SecurityHeaders::embeddable()), security_headers))
            .layer(from_fn_with_state(BodyLimits::from(&self.config.limits), decode_body))
            .layer(RequestDecompressionLayer::new())
            .layer(brotli_layer(&self.config.compression))
            .layer(gzip_layer(&self.config.compression))
            .layer(cors_layer(&server.cors_allowed_origins))
            .layer(TimeoutLayer::new(Duration::from_secs(server.request_timeout_secs)))
            .layer(CatchPanicLayer::custom(panic_response))
            .layer(from_fn_with_state(boundary, error_boundary))
            .layer(TraceLayer::new_for_http().make_span_with(request_span))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid));

        realtime::attach(chain, &server.realtime_path, self.realtime.clone())
    }

    /// Bind the configured address, sharing the port with sibling workers.
    pub fn bind(&self) -> Result<TcpListener, ServerError> {
        let addr = parse_address(&self.config.server.bind_address())?;
        Ok(bind_shared(addr)?)
    }

    /// Serve on `listener` until `shutdown` fires or memory runs over.
    pub async fn run(
        mut self,
        listener: TcpListener,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<WorkerOutcome, ServerError> {
        let addr = listener.local_addr()?;
        let app = self.router().into_make_service_with_connect_info::<SocketAddr>();

        let watchdog = match self.probe.take().map(Ok).unwrap_or_else(default_probe) {
            Ok(probe) => Some(MemoryWatchdog::new(&self.config.watchdog, probe)),
            Err(e) => {
                tracing::warn!(error = %e, "Memory watchdog unavailable");
                None
            }
        };
        let watch = async move {
            match watchdog {
                Some(watchdog) => watchdog.watch().await,
                None => std::future::pending().await,
            }
        };

        tracing::info!(address = %addr, pid = std::process::id(), "Worker listening");
        let serve = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown::recv(shutdown))
            .into_future();

        tokio::select! {
            result = serve => {
                result?;
                tracing::info!("Worker stopped");
                Ok(WorkerOutcome::Stopped)
            }
            breach = watch => Ok(WorkerOutcome::MemoryExceeded(breach)),
        }
    }
}

fn default_probe() -> Result<Box<dyn MemoryProbe>, crate::lifecycle::watchdog::ProbeError> {
    Ok(Box::new(SysinfoProbe::current()?))
}

/// Connections are spawned outside the worker's root span, so each request
/// span carries role and pid itself.
fn request_span(request: &Request) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-");
    tracing::info_span!(
        "request",
        role = Role::Worker.as_str(),
        pid = std::process::id(),
        method = %request.method(),
        uri = %request.uri(),
        request_id = %request_id,
    )
}

async fn not_found(uri: Uri) -> AppError {
    AppError::RouteNotFound {
        path: uri.path().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::StatusCode;
    use tower::ServiceExt;

    #[tokio::test]
    async fn unmatched_path_echoes_path() {
        let router = Worker::new(CincoutConfig::default()).router();
        let response = router
            .oneshot(Request::builder().uri("/nowhere/at/all").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.headers().contains_key("x-request-id"));
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body, serde_json::json!({
            "success": false,
            "error": "Not Found",
            "path": "/nowhere/at/all",
        }));
    }

    #[tokio::test]
    async fn health_reports_pid() {
        let router = Worker::new(CincoutConfig::default()).router();
        let response = router
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["pid"], std::process::id());
    }

    #[tokio::test(start_paused = true)]
    async fn watchdog_breach_ends_run() {
        struct Bloated;
        impl MemoryProbe for Bloated {
            fn resident_bytes(&mut self) -> Result<u64, crate::lifecycle::watchdog::ProbeError> {
                Ok(4 * 1024 * 1024 * 1024)
            }
        }

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let shutdown = crate::lifecycle::Shutdown::new();
        let worker = Worker::new(CincoutConfig::default()).with_memory_probe(Box::new(Bloated));

        let outcome = worker.run(listener, shutdown.subscribe()).await.unwrap();
        assert!(matches!(outcome, WorkerOutcome::MemoryExceeded(b) if b.limit_bytes == 800 * 1024 * 1024));
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn request_events_carry_role_and_pid() {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();

        let request = Request::builder()
            .uri("/api/format/cpp")
            .header("x-request-id", "abc-123")
            .body(Body::empty())
            .unwrap();
        tracing::subscriber::with_default(subscriber, || {
            let _entered = request_span(&request).entered();
            tracing::warn!("Rate limit exceeded");
        });

        let output = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("Rate limit exceeded"));
        assert!(output.contains("role="));
        assert!(output.contains("worker"));
        assert!(output.contains(&format!("pid={}", std::process::id())));
        assert!(output.contains("abc-123"));
    }

    #[tokio::test]
    async fn shutdown_stops_worker() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let shutdown = crate::lifecycle::Shutdown::new();
        let rx = shutdown.subscribe();
        shutdown.trigger();

        let outcome = Worker::new(CincoutConfig::default()).run(listener, rx).await.unwrap();
        assert_eq!(outcome, WorkerOutcome::Stopped);
    }
}
