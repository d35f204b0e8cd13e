//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (chain composition, serve loop)
//!     → request.rs (client identity, per-request context)
//!     → middleware/ (boundary, compression, body, static assets)
//!     → api collaborators or 404
//!     → error.rs (uniform failure envelope)
//!
//! WebSocket upgrade
//!     → realtime.rs (handed to the real-time handler)
//! ```

pub mod error;
pub mod middleware;
pub mod realtime;
pub mod request;
pub mod server;

pub use error::{AppError, ErrorEnvelope, ErrorSink, FailureRecord, TracingSink};
pub use request::{ClientIdentity, RequestContext};
pub use server::{ServerError, Worker, WorkerOutcome};
