//! Resilience helpers.
//!
//! # Design Decisions
//! - Restarts and launch retries share one backoff curve
//! - Jitter keeps sibling workers from restarting in lockstep

pub mod backoff;
