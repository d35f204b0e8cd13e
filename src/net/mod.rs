//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Worker start
//!     → listener.rs (shared bind, one port for every worker)
//!     → Hand off to the HTTP layer
//! ```
//!
//! # Design Decisions
//! - The kernel balances connections across worker processes
//! - TLS terminates in front of the service, not here

pub mod listener;

pub use listener::{bind_shared, parse_address, ListenerError};
