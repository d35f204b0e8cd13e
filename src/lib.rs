//! CinCout server library.
//!
//! A supervised pool of worker processes, each serving the same ordered
//! middleware chain in front of the code tooling collaborators.

pub mod api;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod resilience;
pub mod security;

pub use config::schema::CincoutConfig;
pub use http::Worker;
pub use lifecycle::{Shutdown, Supervisor};
