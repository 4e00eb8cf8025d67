// src/process/mod.rs

//! Per-service process record and its lifecycle state machine.
//!
//! ```text
//! stopped --start--> starting --[startup verified]--> running
//! starting --[exit inside startup window]--> error_startup
//! running --[unexpected exit]--> crashed
//! {starting,running} --[stop requested, process exits]--> stopped
//! start with missing executable --> error_not_found
//! start fails for any other reason --> error_failed_to_start
//! ```
//!
//! The record methods below are the only place fields are changed, so the
//! `pid` / `exit_code` invariants are maintained in one spot:
//! - `pid` is `Some` iff status is `starting` or `running`.
//! - `exit_code` is only `Some` when status is `stopped`, `crashed` or
//!   `error_startup`.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessStatus {
    Stopped,
    Starting,
    Running,
    Crashed,
    ErrorNotFound,
    ErrorFailedToStart,
    ErrorStartup,
}

impl ProcessStatus {
    /// A live handle is believed to exist in these states.
    pub fn is_live(self) -> bool {
        matches!(self, ProcessStatus::Starting | ProcessStatus::Running)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ProcessStatus::Stopped => "stopped",
            ProcessStatus::Starting => "starting",
            ProcessStatus::Running => "running",
            ProcessStatus::Crashed => "crashed",
            ProcessStatus::ErrorNotFound => "error_not_found",
            ProcessStatus::ErrorFailedToStart => "error_failed_to_start",
            ProcessStatus::ErrorStartup => "error_startup",
        }
    }
}

impl std::fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decide what an observed process exit means.
///
/// - An exit after a stop request is `stopped`.
/// - An exit while the instance is still `starting` (or already judged a
///   startup failure) is `error_startup`.
/// - Anything else is `crashed`.
pub fn classify_exit(current: ProcessStatus, expected_shutdown: bool) -> ProcessStatus {
    if expected_shutdown {
        return ProcessStatus::Stopped;
    }
    match current {
        ProcessStatus::Starting | ProcessStatus::ErrorStartup => ProcessStatus::ErrorStartup,
        _ => ProcessStatus::Crashed,
    }
}

/// Published state of one managed service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessRecord {
    pub status: ProcessStatus,
    pub pid: Option<u32>,
    pub last_output: String,
    pub last_output_time: Option<DateTime<Local>>,
    pub start_time: Option<DateTime<Local>>,
    pub exit_code: Option<i32>,
}

impl Default for ProcessRecord {
    fn default() -> Self {
        Self {
            status: ProcessStatus::Stopped,
            pid: None,
            last_output: String::new(),
            last_output_time: None,
            start_time: None,
            exit_code: None,
        }
    }
}

impl ProcessRecord {
    pub fn mark_starting(&mut self, pid: u32, at: DateTime<Local>) {
        self.status = ProcessStatus::Starting;
        self.pid = Some(pid);
        self.start_time = Some(at);
        self.exit_code = None;
    }

    /// Promote a verified instance. Returns false if the record had already
    /// moved past `starting`.
    pub fn mark_running(&mut self) -> bool {
        if self.status != ProcessStatus::Starting {
            return false;
        }
        self.status = ProcessStatus::Running;
        true
    }

    pub fn mark_exited(&mut self, status: ProcessStatus, exit_code: i32) {
        self.status = status;
        self.pid = None;
        self.exit_code = Some(exit_code);
    }

    pub fn mark_launch_failed(&mut self, status: ProcessStatus, at: DateTime<Local>) {
        self.status = status;
        self.pid = None;
        self.start_time = Some(at);
        self.exit_code = None;
    }

    /// Back to the idle `stopped` state. Captured output is kept.
    pub fn reset_stopped(&mut self) {
        self.status = ProcessStatus::Stopped;
        self.pid = None;
        self.start_time = None;
        self.exit_code = None;
    }

    pub fn note_output(&mut self, line: &str, at: DateTime<Local>) {
        self.last_output = line.to_string();
        self.last_output_time = Some(at);
    }
}
