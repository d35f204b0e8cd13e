//! Real-time channel attachment point.
//!
//! # Responsibilities
//! - Accept WebSocket upgrades on the worker's HTTP listener
//! - Hand each connection to the collaborating [`RealtimeHandler`]
//!
//! # Data Flow
//! ```text
//! Client ←──── WebSocket frames ────→ Worker ──→ RealtimeHandler
//! ```
//!
//! # Design Decisions
//! - The upgrade route is attached next to the middleware chain, not inside
//!   it: message semantics and abuse control belong to the handler
//! - Attaching is a plain route registration; it never delays the listener
//! - Ping/pong handled transparently by the upgrade layer

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
    routing::get,
    Router,
};
use futures_util::future::BoxFuture;

use crate::http::request::ClientIdentity;

/// Collaborator owning the real-time protocol.
pub trait RealtimeHandler: Send + Sync + 'static {
    /// Drive one upgraded connection until it closes.
    fn on_connect(&self, socket: WebSocket, client: ClientIdentity) -> BoxFuture<'static, ()>;
}

/// Default handler: drains messages and logs them.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingHandler;

impl RealtimeHandler for LoggingHandler {
    fn on_connect(&self, mut socket: WebSocket, client: ClientIdentity) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            tracing::debug!(client = %client, "Real-time client connected");
            while let Some(message) = socket.recv().await {
                match message {
                    Ok(Message::Text(text)) => {
                        tracing::debug!(client = %client, len = text.len(), "Real-time message");
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        tracing::debug!(client = %client, error = %e, "Real-time connection error");
                        break;
                    }
                }
            }
            tracing::debug!(client = %client, "Real-time client disconnected");
        })
    }
}

/// Register the upgrade route on `router`.
pub fn attach(router: Router, path: &str, handler: Arc<dyn RealtimeHandler>) -> Router {
    let endpoint = Router::new()
        .route(path, get(upgrade))
        .with_state(handler);
    router.merge(endpoint)
}

async fn upgrade(
    State(handler): State<Arc<dyn RealtimeHandler>>,
    client: ClientIdentity,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| handler.on_connect(socket, client))
}
