// src/exec/startup_verifier.rs

use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::WorkerContext;
use crate::process::ProcessStatus;

/// Startup Verifier: one per spawned instance.
///
/// Polls every `interval`, `polls` times, whether the process has exited.
/// An exit inside that window is a startup failure (`error_startup`),
/// whichever of the two workers sees it first. If the window
/// passes with the process alive and the record still `starting`, the
/// record becomes `running`. A record that has moved on (stopped, replaced)
/// is never touched.
pub async fn verify_startup(ctx: WorkerContext, interval: Duration, polls: u32) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    for _ in 0..polls {
        if let Some(code) = ctx.control.exit_code() {
            report_startup_failure(&ctx, code);
            return;
        }
        ticker.tick().await;
    }

    let mut slot = ctx.slot.lock();
    if slot.generation != ctx.generation {
        return;
    }

    // Exited during the last interval but not yet classified by the monitor.
    if let Some(code) = ctx.control.exit_code() {
        drop(slot);
        report_startup_failure(&ctx, code);
        return;
    }

    if slot.record.mark_running() {
        info!(service = %ctx.name, pid = ctx.control.pid(), "{} startup verified.", ctx.name);
    } else {
        debug!(
            service = %ctx.name,
            status = %slot.record.status,
            "startup window elapsed but record already moved on; no change"
        );
    }
}

fn report_startup_failure(ctx: &WorkerContext, code: i32) {
    let mut slot = ctx.slot.lock();
    if slot.generation != ctx.generation || slot.expected_shutdown {
        return;
    }
    // Already classified as a startup failure by the Output Monitor.
    if slot.record.status != ProcessStatus::Starting {
        return;
    }

    slot.record.mark_exited(ProcessStatus::ErrorStartup, code);
    warn!(service = %ctx.name, exit_code = code, "{} failed to start. Exit code {}", ctx.name, code);
}
