//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Supervisor (supervisor.rs):
//!     Launch N workers (launcher.rs) → Watch exits → Fork one replacement per exit
//!
//! Worker:
//!     Bind listener → Serve chain → Memory watchdog (watchdog.rs) → Exit 1 on breach
//!
//! Shutdown (shutdown.rs, signals.rs):
//!     SIGTERM/SIGINT → Broadcast → Supervisor terminates pool / worker drains
//! ```
//!
//! # Design Decisions
//! - Workers are OS processes; a crash never takes down its siblings
//! - Replacement is unconditional; restart backoff is opt-in
//! - The watchdog exits without draining; the supervisor restores capacity

pub mod launcher;
pub mod shutdown;
pub mod signals;
pub mod supervisor;
pub mod watchdog;

pub use launcher::{LaunchedWorker, ProcessLauncher, WorkerExit, WorkerLauncher};
pub use shutdown::Shutdown;
pub use supervisor::{LifecycleEvent, Supervisor, SupervisorError, WorkerHandle};
pub use watchdog::{MemoryBreach, MemoryProbe, MemoryWatchdog, SysinfoProbe};
