//! Worker process spawning.
//!
//! The supervisor only sees the [`WorkerLauncher`] seam: a launched worker is
//! a pid, a future resolving when it terminates, and a terminate switch.

use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};

use futures_util::future::{BoxFuture, FutureExt};
use tokio::process::Command;
use tokio::sync::oneshot;

/// How a worker terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WorkerExit {
    pub code: Option<i32>,
    pub signal: Option<i32>,
}

impl WorkerExit {
    pub fn code(code: i32) -> Self {
        Self {
            code: Some(code),
            signal: None,
        }
    }

    pub fn signal(signal: i32) -> Self {
        Self {
            code: None,
            signal: Some(signal),
        }
    }

    pub fn from_status(status: ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = std::os::unix::process::ExitStatusExt::signal(&status);
        #[cfg(not(unix))]
        let signal = None;

        Self {
            code: status.code(),
            signal,
        }
    }
}

impl fmt::Display for WorkerExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.signal, self.code) {
            (Some(signal), _) => write!(f, "signal {signal}"),
            (None, Some(code)) => write!(f, "code {code}"),
            (None, None) => f.write_str("unknown"),
        }
    }
}

/// A running worker as seen by the supervisor.
pub struct LaunchedWorker {
    pub pid: u32,
    /// Resolves once the worker has terminated, for whatever reason.
    pub exited: BoxFuture<'static, WorkerExit>,
    /// Sending (or dropping) asks the worker to stop.
    pub terminate: oneshot::Sender<()>,
}

#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("failed to spawn worker: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("worker exited before reporting a pid")]
    NoPid,
}

pub trait WorkerLauncher: Send + 'static {
    fn launch(&self) -> Result<LaunchedWorker, LaunchError>;
}

/// Re-invokes the current executable with the `worker` subcommand.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    program: PathBuf,
    args: Vec<OsString>,
}

impl ProcessLauncher {
    pub fn new(program: impl Into<PathBuf>, args: Vec<OsString>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Launcher for this executable, forwarding the config file if any.
    pub fn current_exe(config_path: Option<&Path>) -> std::io::Result<Self> {
        let mut args: Vec<OsString> = vec!["worker".into()];
        if let Some(path) = config_path {
            args.push("--config".into());
            args.push(path.as_os_str().to_owned());
        }
        Ok(Self::new(std::env::current_exe()?, args))
    }
}

impl WorkerLauncher for ProcessLauncher {
    fn launch(&self) -> Result<LaunchedWorker, LaunchError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;
        let pid = child.id().ok_or(LaunchError::NoPid)?;
        let (terminate, stop) = oneshot::channel::<()>();

        let exited = async move {
            let status = tokio::select! {
                status = child.wait() => status,
                _ = stop => {
                    if let Err(e) = child.start_kill() {
                        tracing::debug!(pid, error = %e, "Worker already gone");
                    }
                    child.wait().await
                }
            };
            match status {
                Ok(status) => WorkerExit::from_status(status),
                Err(e) => {
                    tracing::warn!(pid, error = %e, "Failed to reap worker");
                    WorkerExit::default()
                }
            }
        }
        .boxed();

        Ok(LaunchedWorker {
            pid,
            exited,
            terminate,
        })
    }
}
