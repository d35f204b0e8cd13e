//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → cors.rs (cross-origin policy, preflight answers)
//!     → headers.rs (hardening headers on the way out)
//!     → rate_limit.rs (per-identity fixed window)
//!     → Pass to static assets / API dispatch
//! ```
//!
//! # Design Decisions
//! - Fail closed: a limited client never reaches static or API stages
//! - No trust in client input: `X-Forwarded-For` only with `trust_proxy`

pub mod cors;
pub mod headers;
pub mod rate_limit;

pub use headers::SecurityHeaders;
pub use rate_limit::{RateLimitStore, RateLimiter};
