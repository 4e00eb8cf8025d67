// tests/supervisor_loop.rs
mod common;
use crate::common::{init_tracing, name};

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;

use shepherd::config::ConfigFile;
use shepherd::engine::SupervisorState;
use shepherd::fs::mock::MockFileSystem;
use shepherd::process::ProcessStatus;
use shepherd::status::FileOutbox;
use shepherd::command::FileInbox;
use shepherd::supervisor::Supervisor;
use shepherd_test_utils::builders::{ConfigBuilder, ServiceBuilder};
use shepherd_test_utils::fake_backend::{FakeBackend, FakeProgram};
use shepherd_test_utils::{wait_until, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

const INBOX: &str = "/run/commands.json";
const STATUS: &str = "/run/status.json";

fn config() -> ConfigFile {
    ConfigBuilder::new()
        .startup_stagger("30ms")
        .service("koboldcpp")
        .service("comfyui")
        .with_service(ServiceBuilder::new("observer", "observer.py").autostart(false).build())
        .build()
}

fn supervisor(cfg: &ConfigFile, backend: &FakeBackend, fs: &MockFileSystem) -> Supervisor {
    Supervisor::new(
        cfg,
        backend.clone(),
        Arc::new(FileInbox::new(fs.clone(), INBOX)),
        Arc::new(FileOutbox::new(fs.clone(), STATUS)),
    )
}

fn status_doc(fs: &MockFileSystem) -> Option<serde_json::Value> {
    fs.contents(STATUS).and_then(|raw| serde_json::from_str(&raw).ok())
}

fn service_status(fs: &MockFileSystem, service: &str) -> Option<String> {
    status_doc(fs).and_then(|doc| doc[service]["status"].as_str().map(str::to_string))
}

#[tokio::test]
async fn autostart_is_staggered_in_config_order() -> TestResult {
    init_tracing();
    let cfg = config();
    let backend = FakeBackend::new();
    let fs = MockFileSystem::new();
    let sup = supervisor(&cfg, &backend, &fs);

    let started = tokio::time::Instant::now();
    with_timeout(sup.start_all()).await;
    assert!(started.elapsed() >= Duration::from_millis(30));

    let events = backend.events();
    let order: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            shepherd_test_utils::fake_backend::FakeEvent::Spawned { service, .. } => {
                Some(service.as_str().to_string())
            }
            _ => None,
        })
        .collect();
    assert_eq!(order, vec!["koboldcpp", "comfyui"]);
    assert_eq!(
        sup.registry().record(&name("observer")).map(|r| r.status),
        Some(ProcessStatus::Stopped)
    );
    Ok(())
}

#[tokio::test]
async fn one_failing_service_does_not_block_the_others() -> TestResult {
    init_tracing();
    let cfg = config();
    let backend = FakeBackend::new().with_program("koboldcpp", FakeProgram::NotFound);
    let fs = MockFileSystem::new();
    let sup = supervisor(&cfg, &backend, &fs);

    with_timeout(sup.start_all()).await;

    let registry = sup.registry();
    assert_eq!(
        registry.record(&name("koboldcpp")).map(|r| r.status),
        Some(ProcessStatus::ErrorNotFound)
    );
    assert_eq!(backend.spawn_count("comfyui"), 1);
    Ok(())
}

#[tokio::test]
async fn full_run_publishes_handles_commands_and_shuts_down() -> TestResult {
    init_tracing();
    let cfg = config();
    let backend = FakeBackend::new();
    let fs = MockFileSystem::new();
    let sup = supervisor(&cfg, &backend, &fs);
    let registry = Arc::clone(sup.registry());

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let run = tokio::spawn(sup.run_until(async {
        let _ = stop_rx.await;
    }));

    // Both autostart services come up and the publisher reports them.
    wait_until(|| service_status(&fs, "koboldcpp").as_deref() == Some("running")).await;
    wait_until(|| service_status(&fs, "comfyui").as_deref() == Some("running")).await;
    assert_eq!(service_status(&fs, "observer").as_deref(), Some("stopped"));

    // Commands arrive through the inbox.
    fs.add_file(INBOX, r#"{"command": "start_observer"}"#);
    wait_until(|| backend.spawn_count("observer") == 1).await;
    fs.add_file(INBOX, r#"{"command": "stop_comfyui"}"#);
    wait_until(|| {
        registry.record(&name("comfyui")).map(|r| r.status) == Some(ProcessStatus::Stopped)
    })
    .await;

    let _ = stop_tx.send(());
    with_timeout(run).await?;

    assert_eq!(registry.supervisor_state(), SupervisorState::Stopped);
    let doc = status_doc(&fs).ok_or("no status published")?;
    assert_eq!(doc["supervisor"]["status"], "stopped");
    for svc in ["koboldcpp", "comfyui", "observer"] {
        assert_eq!(doc[svc]["status"], "stopped", "{svc}");
        assert!(doc[svc]["pid"].is_null(), "{svc}");
    }
    for pid in backend.spawned_pids("koboldcpp") {
        assert!(!backend.is_alive(pid));
    }
    Ok(())
}

#[tokio::test]
async fn shutdown_during_startup_still_stops_everything() -> TestResult {
    init_tracing();
    let cfg = ConfigBuilder::new()
        .startup_stagger("1s")
        .service("koboldcpp")
        .service("comfyui")
        .build();
    let backend = FakeBackend::new();
    let fs = MockFileSystem::new();
    let sup = supervisor(&cfg, &backend, &fs);
    let registry = Arc::clone(sup.registry());

    let run = tokio::spawn(sup.run_until(tokio::time::sleep(Duration::from_millis(100))));
    with_timeout(run).await?;

    // The second service was never reached.
    assert_eq!(backend.spawn_count("koboldcpp"), 1);
    assert_eq!(backend.spawn_count("comfyui"), 0);
    for svc in ["koboldcpp", "comfyui"] {
        let rec = registry.record(&name(svc)).ok_or("missing record")?;
        assert_eq!(rec.status, ProcessStatus::Stopped);
        assert_eq!(rec.pid, None);
    }
    assert_eq!(
        status_doc(&fs).ok_or("no status")?["supervisor"]["status"],
        "stopped"
    );
    Ok(())
}

#[tokio::test]
async fn status_file_failures_do_not_stop_the_loop() -> TestResult {
    init_tracing();
    let cfg = config();
    let backend = FakeBackend::new();
    let fs = MockFileSystem::new();
    fs.set_fail_writes(true);
    let sup = supervisor(&cfg, &backend, &fs);
    let registry = Arc::clone(sup.registry());

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let run = tokio::spawn(sup.run_until(async {
        let _ = stop_rx.await;
    }));

    wait_until(|| {
        registry.record(&name("comfyui")).map(|r| r.status) == Some(ProcessStatus::Running)
    })
    .await;
    assert!(fs.contents(STATUS).is_none());

    fs.set_fail_writes(false);
    wait_until(|| service_status(&fs, "comfyui").as_deref() == Some("running")).await;

    let _ = stop_tx.send(());
    with_timeout(run).await?;
    Ok(())
}
