// tests/lifecycle_properties.rs
mod common;
use crate::common::{Harness, name};

use proptest::prelude::*;

use shepherd::engine::{StartOutcome, StopOutcome};
use shepherd::process::{ProcessRecord, ProcessStatus};
use shepherd_test_utils::builders::ConfigBuilder;
use shepherd_test_utils::fake_backend::FakeBackend;
use shepherd_test_utils::wait_until;

const SERVICES: [&str; 2] = ["alpha", "beta"];

#[derive(Debug, Clone, Copy)]
enum Step {
    Start(usize),
    Stop(usize),
    Restart(usize),
    /// Make the live process (if any) exit on its own.
    Crash(usize, i32),
    /// Let monitors and verifiers make progress.
    Settle(u64),
}

fn step_strategy() -> impl Strategy<Value = Step> {
    let svc = 0..SERVICES.len();
    prop_oneof![
        3 => svc.clone().prop_map(Step::Start),
        2 => svc.clone().prop_map(Step::Stop),
        1 => svc.clone().prop_map(Step::Restart),
        2 => (svc, 1..128i32).prop_map(|(s, code)| Step::Crash(s, code)),
        2 => (0..150u64).prop_map(Step::Settle),
    ]
}

fn check_record(rec: &ProcessRecord) -> Result<(), TestCaseError> {
    prop_assert_eq!(rec.pid.is_some(), rec.status.is_live(), "pid/status mismatch: {:?}", rec);
    if rec.exit_code.is_some() {
        prop_assert!(
            matches!(
                rec.status,
                ProcessStatus::Stopped | ProcessStatus::Crashed | ProcessStatus::ErrorStartup
            ),
            "exit code with status {:?}",
            rec.status
        );
    }
    Ok(())
}

fn check_invariants(h: &Harness) -> Result<(), TestCaseError> {
    for svc in SERVICES {
        check_record(&h.record(svc))?;

        let alive = h
            .backend
            .spawned_pids(svc)
            .into_iter()
            .filter(|pid| h.backend.is_alive(*pid))
            .count();
        prop_assert!(alive <= 1, "{} has {} live processes", svc, alive);
    }
    Ok(())
}

async fn run_steps(steps: Vec<Step>) -> Result<(), TestCaseError> {
    let h = Harness::new(
        ConfigBuilder::new()
            .startup_window("10ms", 5)
            .stop_grace("100ms")
            .restart_settle("1ms")
            .service(SERVICES[0])
            .service(SERVICES[1])
            .build(),
        FakeBackend::new(),
    );

    for step in steps {
        match step {
            Step::Start(i) => {
                let svc = SERVICES[i];
                let was_live = h.status(svc).is_live();
                let before = h.backend.spawn_count(svc);
                let outcome = h.controller.start(&name(svc)).map_err(|e| TestCaseError::fail(e.to_string()))?;
                if was_live {
                    prop_assert_eq!(outcome, StartOutcome::AlreadyActive);
                    prop_assert_eq!(h.backend.spawn_count(svc), before);
                } else {
                    let started = matches!(outcome, StartOutcome::Started { .. });
                    prop_assert!(started);
                    prop_assert_eq!(h.status(svc), ProcessStatus::Starting);
                }
            }
            Step::Stop(i) => {
                let svc = SERVICES[i];
                let before = h.record(svc);
                let outcome = h.controller.stop(&name(svc)).await.map_err(|e| TestCaseError::fail(e.to_string()))?;
                let after = h.record(svc);
                prop_assert_eq!(after.status, ProcessStatus::Stopped);
                prop_assert_eq!(after.pid, None);
                prop_assert_eq!(after.exit_code, None);
                if before.status == ProcessStatus::Stopped && outcome == StopOutcome::NotRunning {
                    prop_assert_eq!(after, before);
                }
            }
            Step::Restart(i) => {
                let svc = SERVICES[i];
                let old_pid = h.record(svc).pid;
                let outcome = h.controller.restart(&name(svc)).await.map_err(|e| TestCaseError::fail(e.to_string()))?;
                match outcome {
                    StartOutcome::Started { pid } => prop_assert_ne!(Some(pid), old_pid),
                    other => prop_assert!(false, "restart did not start: {:?}", other),
                }
            }
            Step::Crash(i, code) => {
                let svc = SERVICES[i];
                if let Some(pid) = h.record(svc).pid {
                    h.backend.exit(pid, code);
                    wait_until(|| !h.status(svc).is_live()).await;
                    let rec = h.record(svc);
                    prop_assert!(
                        matches!(rec.status, ProcessStatus::Crashed | ProcessStatus::ErrorStartup),
                        "unexpected status after crash: {:?}",
                        rec.status
                    );
                    prop_assert_eq!(rec.exit_code, Some(code));
                }
            }
            Step::Settle(ms) => {
                tokio::time::sleep(std::time::Duration::from_millis(ms)).await;
            }
        }
        check_invariants(&h)?;
    }

    // Everything can always be brought down cleanly.
    for svc in SERVICES {
        h.controller.stop(&name(svc)).await.map_err(|e| TestCaseError::fail(e.to_string()))?;
        prop_assert_eq!(h.status(svc), ProcessStatus::Stopped);
    }
    check_invariants(&h)?;
    for svc in SERVICES {
        for pid in h.backend.spawned_pids(svc) {
            prop_assert!(!h.backend.is_alive(pid), "{} pid {} still alive", svc, pid);
        }
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn lifecycle_invariants_hold_for_any_command_sequence(
        steps in proptest::collection::vec(step_strategy(), 1..16)
    ) {
        let rt = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(run_steps(steps))?;
    }
}
