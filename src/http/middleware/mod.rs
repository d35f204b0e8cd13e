//! Request-processing stages.
//!
//! Each stage either passes the request on or short-circuits with a
//! response. The stages are composed in [`crate::http::server`]; their order
//! is part of the contract, not a detail:
//!
//! ```text
//! 1. boundary.rs       error normalization + failure reporting
//! 2. security::cors    cross-origin policy
//! 3. compression.rs    gzip / brotli negotiation
//! 4. body.rs           request inflation, then decoding with hard ceilings
//! 5. security::headers hardening headers
//! 6. security::rate_limit
//! 7. static_files.rs   bundled UI
//! 8. api               collaborator dispatch
//! 9. fallback          404 envelope
//! ```

pub mod body;
pub mod boundary;
pub mod compression;
pub mod static_files;
