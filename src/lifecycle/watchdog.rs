//! Worker memory watchdog.
//!
//! # Responsibilities
//! - Sample the worker's resident memory on a fixed interval
//! - Resolve with a [`MemoryBreach`] once the ceiling is exceeded
//!
//! # Design Decisions
//! - Started only after the listener is bound
//! - No graceful drain: the caller exits with status 1 and the supervisor
//!   forks a replacement
//! - A failed sample is logged and skipped

use std::time::Duration;

use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::config::WatchdogConfig;

const MIB: u64 = 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("process {0} not found")]
    ProcessNotFound(u32),
    #[error("cannot determine current pid: {0}")]
    CurrentPid(&'static str),
}

/// Source of the resident set size of the current process.
pub trait MemoryProbe: Send + 'static {
    fn resident_bytes(&mut self) -> Result<u64, ProbeError>;
}

/// Production probe backed by `sysinfo`.
pub struct SysinfoProbe {
    system: System,
    pid: Pid,
}

impl SysinfoProbe {
    pub fn current() -> Result<Self, ProbeError> {
        let pid = sysinfo::get_current_pid().map_err(ProbeError::CurrentPid)?;
        Ok(Self {
            system: System::new(),
            pid,
        })
    }
}

impl MemoryProbe for SysinfoProbe {
    fn resident_bytes(&mut self) -> Result<u64, ProbeError> {
        self.system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[self.pid]),
            true,
            ProcessRefreshKind::new().with_memory(),
        );
        self.system
            .process(self.pid)
            .map(|process| process.memory())
            .ok_or(ProbeError::ProcessNotFound(self.pid.as_u32()))
    }
}

/// The sample that crossed the ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryBreach {
    pub pid: u32,
    pub resident_bytes: u64,
    pub limit_bytes: u64,
}

impl MemoryBreach {
    pub fn resident_mb(&self) -> f64 {
        (self.resident_bytes as f64 / MIB as f64 * 100.0).round() / 100.0
    }
}

impl std::fmt::Display for MemoryBreach {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Worker {} memory usage critical ({} MB), exiting for restart",
            self.pid,
            self.resident_mb()
        )
    }
}

pub struct MemoryWatchdog {
    probe: Box<dyn MemoryProbe>,
    interval: Duration,
    limit_bytes: u64,
    enabled: bool,
}

impl MemoryWatchdog {
    pub fn new(config: &WatchdogConfig, probe: Box<dyn MemoryProbe>) -> Self {
        Self {
            probe,
            interval: Duration::from_secs(config.interval_secs),
            limit_bytes: config.max_rss_mb.saturating_mul(MIB),
            enabled: config.enabled,
        }
    }

    /// Sample until the ceiling is exceeded. Never resolves when disabled.
    pub async fn watch(mut self) -> MemoryBreach {
        if !self.enabled {
            return std::future::pending().await;
        }

        let pid = std::process::id();
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let resident_bytes = match self.probe.resident_bytes() {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::warn!(error = %e, "Memory sample failed");
                    continue;
                }
            };
            tracing::trace!(resident_bytes, "Memory sample");

            if resident_bytes > self.limit_bytes {
                let breach = MemoryBreach {
                    pid,
                    resident_bytes,
                    limit_bytes: self.limit_bytes,
                };
                tracing::error!(
                    resident_mb = breach.resident_mb(),
                    limit_mb = self.limit_bytes / MIB,
                    "{breach}"
                );
                return breach;
            }
        }
    }
}
