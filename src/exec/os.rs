// src/exec/os.rs

//! Production process backend on top of `tokio::process`.

use std::process::{ExitStatus, Stdio};

use tokio::process::{Child, Command};
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use super::backend::{LaunchError, LaunchSpec, ProcessBackend, ProcessControl, Signal, SpawnedProcess};

/// Spawns real OS processes.
///
/// Each child runs in its own process group so that a stop reaches the
/// service's descendants too, and never the supervisor itself. A reaper task
/// owns the `Child`, executes signal requests and reports the exit code.
#[derive(Debug, Clone, Default)]
pub struct OsProcessBackend;

impl OsProcessBackend {
    pub fn new() -> Self {
        Self
    }
}

impl ProcessBackend for OsProcessBackend {
    fn spawn(&self, spec: &LaunchSpec) -> Result<SpawnedProcess, LaunchError> {
        if !spec.program.exists() {
            return Err(LaunchError::NotFound(spec.program.clone()));
        }

        let mut std_cmd = match &spec.interpreter {
            Some(interp) => {
                let mut c = std::process::Command::new(interp);
                c.arg(&spec.program);
                c
            }
            None => std::process::Command::new(&spec.program),
        };
        if let Some(dir) = &spec.cwd {
            std_cmd.current_dir(dir);
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            std_cmd.process_group(0);
        }

        let mut cmd = Command::from(std_cmd);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => LaunchError::NotFound(
                spec.interpreter.clone().unwrap_or_else(|| spec.program.clone()),
            ),
            _ => LaunchError::Spawn(e),
        })?;

        let pid = child.id().ok_or_else(|| {
            LaunchError::Spawn(std::io::Error::other("spawned process has no pid"))
        })?;
        let stdout = child.stdout.take().ok_or(LaunchError::MissingPipe("stdout"))?;
        let stderr = child.stderr.take().ok_or(LaunchError::MissingPipe("stderr"))?;

        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let (exit_tx, exit_rx) = watch::channel(None);
        tokio::spawn(reap(child, pid, signal_rx, exit_tx));

        Ok(SpawnedProcess {
            control: ProcessControl::new(pid, signal_tx, exit_rx),
            stdout: Box::new(stdout),
            stderr: Box::new(stderr),
        })
    }
}

/// Own the child until it exits, forwarding signal requests to it.
async fn reap(
    mut child: Child,
    pid: u32,
    mut signal_rx: mpsc::UnboundedReceiver<Signal>,
    exit_tx: watch::Sender<Option<i32>>,
) {
    let code = loop {
        tokio::select! {
            status = child.wait() => {
                break match status {
                    Ok(status) => exit_code_of(status),
                    Err(e) => {
                        warn!(pid, error = %e, "failed to wait for child process");
                        -1
                    }
                };
            }
            Some(signal) = signal_rx.recv() => deliver(&mut child, pid, signal),
        }
    };

    debug!(pid, exit_code = code, "child process reaped");
    let _ = exit_tx.send(Some(code));
}

#[cfg(unix)]
fn deliver(child: &mut Child, pid: u32, signal: Signal) {
    let signo = match signal {
        Signal::Terminate => libc::SIGTERM,
        Signal::Kill => libc::SIGKILL,
    };
    let Ok(pgid) = libc::pid_t::try_from(pid) else {
        warn!(pid, "pid does not fit pid_t; signalling child directly");
        let _ = child.start_kill();
        return;
    };

    // The child leads its own group (process_group(0)), so pgid == pid.
    #[allow(unsafe_code)]
    let rc = unsafe { libc::killpg(pgid, signo) };
    if rc == -1 {
        let err = std::io::Error::last_os_error();
        debug!(pid, ?signal, error = %err, "killpg failed; falling back to direct kill");
        if signal == Signal::Kill {
            let _ = child.start_kill();
        }
    }
}

#[cfg(not(unix))]
fn deliver(child: &mut Child, pid: u32, signal: Signal) {
    if let Err(e) = child.start_kill() {
        debug!(pid, ?signal, error = %e, "failed to kill child");
    }
}

#[cfg(unix)]
fn exit_code_of(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .or_else(|| status.signal().map(|s| -s))
        .unwrap_or(-1)
}

#[cfg(not(unix))]
fn exit_code_of(status: ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}
