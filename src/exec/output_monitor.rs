// src/exec/output_monitor.rs

//! Output Monitor: one per spawned instance.
//!
//! Drains stdout line by line, keeping `last_output` current and logging
//! every line to the log sink. stderr is drained concurrently so the child
//! never blocks on a full pipe; its tail is reported as a final diagnostic.
//! The exit is classified once both streams close or the child is reaped,
//! whichever comes first. A descendant can keep the pipes open after the
//! child itself is gone, so draining after the exit is bounded.

use std::collections::VecDeque;
use std::time::Duration;

use chrono::Local;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

use super::WorkerContext;
use super::backend::OutputStream;
use crate::process::{ProcessStatus, classify_exit};

/// Lines of stderr kept for the final diagnostic.
const STDERR_TAIL_LINES: usize = 50;

/// How long buffered output is still read after the child has been reaped.
const DRAIN_AFTER_EXIT: Duration = Duration::from_millis(250);

pub async fn monitor_output(ctx: WorkerContext, stdout: OutputStream, stderr: OutputStream) {
    info!(service = %ctx.name, pid = ctx.control.pid(), "Started monitoring output for {}", ctx.name);

    let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
    {
        let drain = async {
            tokio::join!(drain_stdout(&ctx, stdout), collect_stderr(&ctx, stderr, &mut tail))
        };
        tokio::pin!(drain);

        tokio::select! {
            _ = &mut drain => {}
            _ = ctx.control.wait() => {
                if tokio::time::timeout(DRAIN_AFTER_EXIT, &mut drain).await.is_err() {
                    debug!(
                        service = %ctx.name,
                        "output still open after exit; a descendant holds the pipe"
                    );
                }
            }
        }
    }
    let diagnostic = stderr_diagnostic(tail);

    let exit_code = ctx.control.wait().await;

    let mut slot = ctx.slot.lock();
    if slot.generation != ctx.generation {
        debug!(service = %ctx.name, "instance superseded; leaving record untouched");
        return;
    }

    if let Some(diagnostic) = diagnostic {
        warn!(service = %ctx.name, "[{} ERROR] {}", ctx.name, diagnostic);
        slot.record.note_output(&diagnostic, Local::now());
    }

    let status = classify_exit(slot.record.status, slot.expected_shutdown);
    slot.record.mark_exited(status, exit_code);
    slot.expected_shutdown = false;

    match status {
        ProcessStatus::Stopped => {
            info!(service = %ctx.name, exit_code, "{} stopped with exit code {}", ctx.name, exit_code)
        }
        ProcessStatus::ErrorStartup => {
            warn!(service = %ctx.name, exit_code, "{} failed to start. Exit code {}", ctx.name, exit_code)
        }
        _ => warn!(service = %ctx.name, exit_code, "{} crashed with exit code {}", ctx.name, exit_code),
    }
}

async fn drain_stdout(ctx: &WorkerContext, stdout: OutputStream) {
    let mut lines = BufReader::new(stdout).lines();

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                info!(target: "shepherd::child", service = %ctx.name, "[{}] {}", ctx.name, line);

                let mut slot = ctx.slot.lock();
                if slot.generation == ctx.generation {
                    slot.record.note_output(line, Local::now());
                }
            }
            Ok(None) => break,
            Err(e) => {
                debug!(service = %ctx.name, error = %e, "stdout read failed; treating as closed");
                break;
            }
        }
    }
}

/// Read stderr to the end, keeping its last lines in `tail`.
async fn collect_stderr(ctx: &WorkerContext, stderr: OutputStream, tail: &mut VecDeque<String>) {
    let mut lines = BufReader::new(stderr).lines();

    while let Ok(Some(line)) = lines.next_line().await {
        info!(target: "shepherd::child", service = %ctx.name, "[{} stderr] {}", ctx.name, line);
        if tail.len() == STDERR_TAIL_LINES {
            tail.pop_front();
        }
        tail.push_back(line);
    }
}

fn stderr_diagnostic(tail: VecDeque<String>) -> Option<String> {
    let text = tail.into_iter().collect::<Vec<_>>().join("\n");
    let text = text.trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}
