//! A worker over its memory ceiling exits with status 1 and is replaced.
#![cfg(unix)]

use std::path::{Path, PathBuf};
use std::time::Duration;

use cincout_server::config::SupervisorConfig;
use cincout_server::lifecycle::{
    LifecycleEvent, ProcessLauncher, Shutdown, Supervisor, WorkerExit, WorkerLauncher,
};
use tokio::sync::broadcast;

/// Config whose ceiling any live process is already above.
fn tiny_ceiling_config(dir: &Path) -> PathBuf {
    let path = dir.join("cincout.toml");
    std::fs::write(
        &path,
        r#"
[server]
host = "127.0.0.1"
port = 0
static_dir = "/nonexistent/static"

[collaborators]
templates_dir = "/nonexistent/templates"

[watchdog]
enabled = true
interval_secs = 1
max_rss_mb = 1
"#,
    )
    .unwrap();
    path
}

fn worker_binary(config: &Path) -> ProcessLauncher {
    ProcessLauncher::new(
        env!("CARGO_BIN_EXE_cincout-server"),
        vec!["worker".into(), "--config".into(), config.as_os_str().to_owned()],
    )
}

async fn next(events: &mut broadcast::Receiver<LifecycleEvent>) -> LifecycleEvent {
    tokio::time::timeout(Duration::from_secs(30), events.recv())
        .await
        .expect("supervisor stalled")
        .unwrap()
}

#[tokio::test]
async fn worker_over_ceiling_exits_with_status_one() {
    let dir = tempfile::tempdir().unwrap();
    let launcher = worker_binary(&tiny_ceiling_config(dir.path()));

    let worker = launcher.launch().unwrap();
    let exit = tokio::time::timeout(Duration::from_secs(30), worker.exited)
        .await
        .expect("worker kept running above its ceiling");

    assert_eq!(exit, WorkerExit::code(1));
}

#[tokio::test]
async fn supervisor_forks_one_replacement_after_memory_exit() {
    let dir = tempfile::tempdir().unwrap();
    let config = SupervisorConfig {
        workers: Some(1),
        ..SupervisorConfig::default()
    };
    let supervisor = Supervisor::new(&config, worker_binary(&tiny_ceiling_config(dir.path())));
    let mut events = supervisor.subscribe();
    let shutdown = Shutdown::new();
    let task = tokio::spawn(supervisor.run(shutdown.subscribe()));

    let first = match next(&mut events).await {
        LifecycleEvent::Online { pid, exit_count: 0 } => pid,
        other => panic!("expected first worker online, got {other:?}"),
    };
    match next(&mut events).await {
        LifecycleEvent::Exited { pid, exit } => {
            assert_eq!(pid, first);
            assert_eq!(exit, WorkerExit::code(1));
        }
        other => panic!("expected memory exit, got {other:?}"),
    }
    match next(&mut events).await {
        LifecycleEvent::Online { pid, exit_count } => {
            assert_ne!(pid, first);
            assert_eq!(exit_count, 1);
        }
        other => panic!("expected one replacement, got {other:?}"),
    }

    shutdown.trigger();
    tokio::time::timeout(Duration::from_secs(30), task)
        .await
        .expect("supervisor did not stop")
        .unwrap()
        .unwrap();
}
