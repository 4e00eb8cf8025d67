// tests/status_publisher.rs
mod common;
use crate::common::{Harness, init_tracing, name};

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local};
use tokio_util::sync::CancellationToken;

use shepherd::engine::SupervisorState;
use shepherd::fs::RealFileSystem;
use shepherd::fs::mock::MockFileSystem;
use shepherd::process::ProcessStatus;
use shepherd::status::{FileOutbox, StatusOutbox, StatusPublisher, SupervisorStatus};
use shepherd_test_utils::builders::ConfigBuilder;
use shepherd_test_utils::fake_backend::FakeBackend;
use shepherd_test_utils::{wait_until, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

const STATUS: &str = "/run/status.json";

fn harness() -> Harness {
    Harness::new(
        ConfigBuilder::new().service("koboldcpp").service("observer").build(),
        FakeBackend::new(),
    )
}

fn publisher(h: &Harness, fs: &MockFileSystem) -> StatusPublisher {
    StatusPublisher::new(
        Arc::clone(&h.registry),
        Arc::new(FileOutbox::new(fs.clone(), STATUS)),
        Duration::from_millis(20),
    )
}

fn read_doc(fs: &MockFileSystem) -> Result<serde_json::Value, Box<dyn Error>> {
    let raw = fs.contents(STATUS).ok_or("status file missing")?;
    Ok(serde_json::from_str(&raw)?)
}

#[test]
fn snapshot_has_meta_record_and_one_entry_per_service() -> TestResult {
    let h = harness();
    let now = Local::now();
    let snapshot = h.registry.snapshot(now);

    assert_eq!(snapshot.supervisor.status, SupervisorState::Running);
    assert_eq!(snapshot.supervisor.pid, std::process::id());
    assert_eq!(snapshot.supervisor.last_update, now);
    assert_eq!(snapshot.services.len(), 2);
    assert_eq!(
        snapshot.service(&name("observer")).map(|r| r.status),
        Some(ProcessStatus::Stopped)
    );
    Ok(())
}

#[tokio::test]
async fn published_document_shape() -> TestResult {
    init_tracing();
    let h = harness();
    let fs = MockFileSystem::new();

    let pid = match h.controller.start(&name("koboldcpp"))? {
        shepherd::engine::StartOutcome::Started { pid } => pid,
        other => return Err(format!("unexpected {other:?}").into()),
    };
    h.backend.write_stdout(pid, "Please connect to custom endpoint at http://localhost:5001");
    wait_until(|| !h.record("koboldcpp").last_output.is_empty()).await;

    assert!(publisher(&h, &fs).publish_now());
    let doc = read_doc(&fs)?;

    let meta = &doc["supervisor"];
    assert_eq!(meta["status"], "running");
    assert_eq!(meta["pid"], std::process::id());
    let last_update = meta["last_update"].as_str().ok_or("last_update missing")?;
    DateTime::parse_from_rfc3339(last_update)?;

    let kobold = &doc["koboldcpp"];
    assert_eq!(kobold["pid"], pid);
    assert_eq!(
        kobold["last_output"],
        "Please connect to custom endpoint at http://localhost:5001"
    );
    assert!(kobold["start_time"].is_string());
    assert!(kobold["last_output_time"].is_string());
    assert!(kobold["exit_code"].is_null());

    let observer = &doc["observer"];
    assert_eq!(observer["status"], "stopped");
    assert!(observer["pid"].is_null());
    assert!(observer["start_time"].is_null());
    assert_eq!(observer["last_output"], "");

    // Round-trips into the typed aggregate.
    let typed: SupervisorStatus = serde_json::from_value(doc)?;
    assert_eq!(typed.services.len(), 2);
    Ok(())
}

#[tokio::test]
async fn error_statuses_use_snake_case() -> TestResult {
    init_tracing();
    let h = Harness::new(
        ConfigBuilder::new().service("koboldcpp").build(),
        FakeBackend::new().with_program("koboldcpp", shepherd_test_utils::fake_backend::FakeProgram::NotFound),
    );
    let fs = MockFileSystem::new();

    h.controller.start(&name("koboldcpp"))?;
    publisher(&h, &fs).publish_now();
    assert_eq!(read_doc(&fs)?["koboldcpp"]["status"], "error_not_found");
    Ok(())
}

#[test]
fn file_outbox_replaces_the_file_atomically() -> TestResult {
    let h = harness();
    let fs = MockFileSystem::new();
    let outbox = FileOutbox::new(fs.clone(), STATUS);

    outbox.publish(&h.registry.snapshot(Local::now()))?;
    assert!(fs.contents(STATUS).is_some());
    assert!(fs.contents("/run/status.json.tmp").is_none());
    Ok(())
}

#[test]
fn concurrent_publishes_through_one_outbox_do_not_collide() -> TestResult {
    let h = harness();
    let fs = MockFileSystem::new();
    let outbox = FileOutbox::new(fs.clone(), STATUS);
    let snapshot = h.registry.snapshot(Local::now());

    std::thread::scope(|scope| {
        let workers: Vec<_> = (0..2)
            .map(|_| {
                let outbox = outbox.clone();
                let snapshot = &snapshot;
                scope.spawn(move || {
                    (0..200)
                        .map(|_| outbox.publish(snapshot).map_err(|e| e.to_string()))
                        .collect::<Result<Vec<_>, _>>()
                })
            })
            .collect();
        for worker in workers {
            let published = worker.join().expect("publisher thread panicked");
            assert!(published.is_ok(), "{published:?}");
        }
    });

    assert_eq!(fs.write_count(), 400);
    assert!(fs.contents("/run/status.json.tmp").is_none());
    read_doc(&fs)?;
    Ok(())
}

#[test]
fn file_outbox_on_real_filesystem() -> TestResult {
    let h = harness();
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("state").join("status.json");
    let outbox = FileOutbox::new(RealFileSystem, &path);

    outbox.publish(&h.registry.snapshot(Local::now()))?;
    outbox.publish(&h.registry.snapshot(Local::now()))?;

    let doc: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
    assert_eq!(doc["supervisor"]["status"], "running");
    assert!(!dir.path().join("state").join("status.json.tmp").exists());
    Ok(())
}

#[test]
fn write_failure_is_logged_and_swallowed() -> TestResult {
    let h = harness();
    let fs = MockFileSystem::new();
    let publisher = publisher(&h, &fs);

    fs.set_fail_writes(true);
    assert!(!publisher.publish_now());
    assert!(fs.contents(STATUS).is_none());

    fs.set_fail_writes(false);
    assert!(publisher.publish_now());
    assert!(fs.contents(STATUS).is_some());
    Ok(())
}

#[tokio::test]
async fn run_loop_republishes_and_survives_failures() -> TestResult {
    init_tracing();
    let h = harness();
    let fs = MockFileSystem::new();
    let cancel = CancellationToken::new();

    fs.set_fail_writes(true);
    let handle = tokio::spawn(publisher(&h, &fs).run(cancel.clone()));
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert!(!handle.is_finished());

    fs.set_fail_writes(false);
    wait_until(|| fs.write_count() >= 2).await;

    h.registry.set_supervisor_state(SupervisorState::Stopping);
    wait_until(|| {
        read_doc(&fs)
            .map(|doc| doc["supervisor"]["status"] == "stopping")
            .unwrap_or(false)
    })
    .await;

    cancel.cancel();
    with_timeout(handle).await?;
    Ok(())
}
