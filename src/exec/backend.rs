// src/exec/backend.rs

//! Pluggable process backend abstraction.
//!
//! The controller talks to a `ProcessBackend` instead of `tokio::process`
//! directly. Production code uses [`OsProcessBackend`](super::OsProcessBackend);
//! tests can provide a backend that simulates output, exits and signals
//! without spawning anything.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use tokio::io::AsyncRead;
use tokio::sync::{mpsc, watch};

use crate::types::ServiceName;

/// Readable child output stream (stdout or stderr).
pub type OutputStream = Box<dyn AsyncRead + Send + Unpin>;

/// What to launch for a service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub name: ServiceName,
    pub program: PathBuf,
    /// When set, the child is `<interpreter> <program>`.
    pub interpreter: Option<PathBuf>,
    pub cwd: Option<PathBuf>,
}

impl LaunchSpec {
    /// Human-readable command line, for logs.
    pub fn display_command(&self) -> String {
        match &self.interpreter {
            Some(interp) => format!("{} {}", interp.display(), self.program.display()),
            None => self.program.display().to_string(),
        }
    }
}

#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("command not found: {0}")]
    NotFound(PathBuf),

    #[error("failed to spawn process: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("spawned process is missing its {0} pipe")]
    MissingPipe(&'static str),
}

/// Signal requests delivered to a child and its descendants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// Ask the process group to terminate.
    Terminate,
    /// Kill the process group outright.
    Kill,
}

/// Cloneable handle to one spawned child.
///
/// Signals go to whoever owns the child (the reaper task in production);
/// the exit code arrives on a `watch` channel once the child is reaped.
#[derive(Debug, Clone)]
pub struct ProcessControl {
    pid: u32,
    signal_tx: mpsc::UnboundedSender<Signal>,
    exit_rx: watch::Receiver<Option<i32>>,
}

impl ProcessControl {
    pub fn new(
        pid: u32,
        signal_tx: mpsc::UnboundedSender<Signal>,
        exit_rx: watch::Receiver<Option<i32>>,
    ) -> Self {
        Self {
            pid,
            signal_tx,
            exit_rx,
        }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Exit code, if the child has already been reaped.
    pub fn exit_code(&self) -> Option<i32> {
        *self.exit_rx.borrow()
    }

    pub fn has_exited(&self) -> bool {
        self.exit_code().is_some()
    }

    /// Request a signal. Returns false if the child is already gone.
    pub fn signal(&self, signal: Signal) -> bool {
        self.signal_tx.send(signal).is_ok()
    }

    /// Wait until the child exits.
    ///
    /// If the owner goes away without reporting a code, -1 is returned.
    pub async fn wait(&self) -> i32 {
        let mut rx = self.exit_rx.clone();
        match rx.wait_for(Option::is_some).await {
            Ok(code) => (*code).unwrap_or(-1),
            Err(_) => self.exit_code().unwrap_or(-1),
        }
    }

    /// Wait up to `limit` for the child to exit.
    pub async fn wait_timeout(&self, limit: Duration) -> Option<i32> {
        tokio::time::timeout(limit, self.wait()).await.ok()
    }
}

/// A freshly spawned child with its output streams.
pub struct SpawnedProcess {
    pub control: ProcessControl,
    pub stdout: OutputStream,
    pub stderr: OutputStream,
}

impl std::fmt::Debug for SpawnedProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpawnedProcess")
            .field("control", &self.control)
            .field("stdout", &"<stream>")
            .field("stderr", &"<stream>")
            .finish()
    }
}

/// Trait abstracting how service processes are launched.
///
/// `spawn` is called from within the Tokio runtime and may spawn tasks.
pub trait ProcessBackend: Send + Sync + 'static {
    fn spawn(&self, spec: &LaunchSpec) -> Result<SpawnedProcess, LaunchError>;
}
