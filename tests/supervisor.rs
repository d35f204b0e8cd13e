//! Supervisor driving real worker processes.
#![cfg(unix)]

use std::time::Duration;

use cincout_server::config::SupervisorConfig;
use cincout_server::lifecycle::{LifecycleEvent, ProcessLauncher, Shutdown, Supervisor, WorkerExit};

fn launcher(script: &str) -> ProcessLauncher {
    ProcessLauncher::new("sh", vec!["-c".into(), script.into()])
}

fn pool(workers: usize) -> SupervisorConfig {
    SupervisorConfig {
        workers: Some(workers),
        ..SupervisorConfig::default()
    }
}

#[tokio::test]
async fn crashing_workers_are_replaced_one_for_one() {
    let supervisor = Supervisor::new(&pool(2), launcher("sleep 0.2; exit 1"));
    let mut events = supervisor.subscribe();
    let shutdown = Shutdown::new();
    let task = tokio::spawn(supervisor.run(shutdown.subscribe()));

    let mut online = 0;
    let mut exited = 0;
    while exited < 4 {
        let event = tokio::time::timeout(Duration::from_secs(10), events.recv())
            .await
            .expect("supervisor stalled")
            .unwrap();
        match event {
            LifecycleEvent::Online { .. } => online += 1,
            LifecycleEvent::Exited { exit, .. } => {
                assert_eq!(exit, WorkerExit::code(1));
                exited += 1;
                // Each exit is answered by exactly one new worker.
                assert!(online <= exited + 2);
            }
            LifecycleEvent::LaunchFailed { error } => panic!("launch failed: {error}"),
        }
    }

    shutdown.trigger();
    task.await.unwrap().unwrap();
    assert!(online >= exited + 1);
}

#[tokio::test]
async fn shutdown_kills_long_running_workers() {
    let supervisor = Supervisor::new(&pool(3), launcher("sleep 60"));
    let mut live = supervisor.live_workers();
    let shutdown = Shutdown::new();
    let task = tokio::spawn(supervisor.run(shutdown.subscribe()));

    live.wait_for(|n| *n == 3).await.unwrap();
    shutdown.trigger();

    tokio::time::timeout(Duration::from_secs(10), task)
        .await
        .expect("workers were not terminated")
        .unwrap()
        .unwrap();
    assert_eq!(*live.borrow(), 0);
}
