//! Worker pool supervision.
//!
//! # Responsibilities
//! - Launch exactly N workers
//! - Replace every terminated worker with exactly one new worker
//! - Publish lifecycle events and the live worker count
//! - Terminate the pool on shutdown
//!
//! # Data Flow
//! ```text
//! launch ──→ WorkerHandle ──→ exit watcher task ──┐
//!    ▲                                            │ Message::Exited
//!    └──── relaunch (now, or after backoff) ◀─────┘
//! ```
//!
//! # Design Decisions
//! - A single event loop owns the pool; exit watchers only send messages
//! - Worker termination is never fatal to the supervisor
//! - Crash loops refork without limit unless restart backoff is enabled

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::Instant;

use crate::config::{RestartBackoffConfig, SupervisorConfig};
use crate::lifecycle::launcher::{WorkerExit, WorkerLauncher};
use crate::resilience::backoff::calculate_backoff;

/// Delay before retrying a failed launch when backoff is disabled.
const LAUNCH_RETRY: Duration = Duration::from_secs(1);

#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("worker pool size must be at least 1")]
    EmptyPool,
}

/// Supervisor-side record of one live worker.
#[derive(Debug)]
pub struct WorkerHandle {
    pub process_id: u32,
    pub live_since: Instant,
    /// Number of predecessors in this worker's restart lineage.
    pub exit_count: u32,
    rapid_exits: u32,
    terminate: Option<tokio::sync::oneshot::Sender<()>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    Online { pid: u32, exit_count: u32 },
    Exited { pid: u32, exit: WorkerExit },
    LaunchFailed { error: String },
}

/// Restart lineage carried from a dead worker to its replacement.
#[derive(Debug, Clone, Copy, Default)]
struct Lineage {
    exit_count: u32,
    rapid_exits: u32,
}

enum Message {
    Exited { pid: u32, exit: WorkerExit },
    Relaunch(Lineage),
}

pub struct Supervisor {
    launcher: Box<dyn WorkerLauncher>,
    pool_size: usize,
    backoff: RestartBackoffConfig,
    workers: HashMap<u32, WorkerHandle>,
    tx: mpsc::UnboundedSender<Message>,
    rx: mpsc::UnboundedReceiver<Message>,
    events: broadcast::Sender<LifecycleEvent>,
    live: watch::Sender<usize>,
}

impl Supervisor {
    pub fn new(config: &SupervisorConfig, launcher: impl WorkerLauncher) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(256);
        let (live, _) = watch::channel(0);
        Self {
            launcher: Box::new(launcher),
            pool_size: config.pool_size(),
            backoff: config.restart_backoff.clone(),
            workers: HashMap::new(),
            tx,
            rx,
            events,
            live,
        }
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.events.subscribe()
    }

    pub fn live_workers(&self) -> watch::Receiver<usize> {
        self.live.subscribe()
    }

    /// Run until `shutdown` fires, then terminate every worker and wait for
    /// their exits.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) -> Result<(), SupervisorError> {
        if self.pool_size == 0 {
            return Err(SupervisorError::EmptyPool);
        }

        tracing::info!(pid = std::process::id(), workers = self.pool_size, "Supervisor is running");
        for _ in 0..self.pool_size {
            self.fork(Lineage::default());
        }

        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                Some(message) = self.rx.recv() => match message {
                    Message::Exited { pid, exit } => self.on_exit(pid, exit),
                    Message::Relaunch(lineage) => self.fork(lineage),
                },
            }
        }

        self.terminate_all().await;
        tracing::info!("Supervisor stopped");
        Ok(())
    }

    fn fork(&mut self, lineage: Lineage) {
        let worker = match self.launcher.launch() {
            Ok(worker) => worker,
            Err(e) => {
                tracing::error!(error = %e, "Failed to launch worker");
                let _ = self.events.send(LifecycleEvent::LaunchFailed { error: e.to_string() });
                let delay = if self.backoff.enabled {
                    self.restart_delay(lineage.rapid_exits + 1)
                } else {
                    LAUNCH_RETRY
                };
                self.relaunch_after(lineage, delay);
                return;
            }
        };

        let pid = worker.pid;
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let exit = worker.exited.await;
            let _ = tx.send(Message::Exited { pid, exit });
        });

        self.workers.insert(
            pid,
            WorkerHandle {
                process_id: pid,
                live_since: Instant::now(),
                exit_count: lineage.exit_count,
                rapid_exits: lineage.rapid_exits,
                terminate: Some(worker.terminate),
            },
        );
        tracing::info!(pid, exit_count = lineage.exit_count, "Worker {pid} is online");
        let _ = self.events.send(LifecycleEvent::Online {
            pid,
            exit_count: lineage.exit_count,
        });
        self.publish_live();
    }

    fn on_exit(&mut self, pid: u32, exit: WorkerExit) {
        let Some(handle) = self.workers.remove(&pid) else {
            return;
        };
        self.publish_live();
        let _ = self.events.send(LifecycleEvent::Exited { pid, exit });
        tracing::warn!(pid, %exit, "Worker {pid} died ({exit}), forking a new one");

        let rapid = handle.live_since.elapsed() < Duration::from_secs(self.backoff.min_uptime_secs);
        let lineage = Lineage {
            exit_count: handle.exit_count.saturating_add(1),
            rapid_exits: if rapid { handle.rapid_exits.saturating_add(1) } else { 0 },
        };

        if self.backoff.enabled && lineage.rapid_exits > 0 {
            let delay = self.restart_delay(lineage.rapid_exits);
            tracing::info!(delay_ms = delay.as_millis() as u64, "Delaying worker restart");
            self.relaunch_after(lineage, delay);
        } else {
            self.fork(lineage);
        }
    }

    fn restart_delay(&self, attempt: u32) -> Duration {
        calculate_backoff(attempt, self.backoff.base_delay_ms, self.backoff.max_delay_ms)
    }

    fn relaunch_after(&self, lineage: Lineage, delay: Duration) {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(Message::Relaunch(lineage));
        });
    }

    async fn terminate_all(&mut self) {
        tracing::info!(workers = self.workers.len(), "Terminating workers");
        for handle in self.workers.values_mut() {
            if let Some(terminate) = handle.terminate.take() {
                let _ = terminate.send(());
            }
        }

        while !self.workers.is_empty() {
            match self.rx.recv().await {
                Some(Message::Exited { pid, exit }) => {
                    if self.workers.remove(&pid).is_some() {
                        tracing::debug!(pid, %exit, "Worker stopped");
                        let _ = self.events.send(LifecycleEvent::Exited { pid, exit });
                        self.publish_live();
                    }
                }
                Some(Message::Relaunch(_)) => {}
                None => break,
            }
        }
    }

    fn publish_live(&self) {
        self.live.send_replace(self.workers.len());
    }
}
