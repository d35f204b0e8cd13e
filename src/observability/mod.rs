//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events, role/pid root span)
//!     → tower_http TraceLayer (one span per request, with request id)
//!     → http::error::ErrorSink (one record per failed request)
//!
//! Consumers:
//!     → stdout (fmt or JSON)
//! ```

pub mod logging;

pub use logging::{init, role_span, Role};
