use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncWriteExt, DuplexStream};
use tokio::sync::{mpsc, watch};

use shepherd::exec::{LaunchError, LaunchSpec, ProcessBackend, ProcessControl, Signal, SpawnedProcess};
use shepherd::types::ServiceName;

/// Exit code reported for a terminate request (mirrors SIGTERM on unix).
pub const TERMINATED: i32 = -15;
/// Exit code reported for a kill request (mirrors SIGKILL on unix).
pub const KILLED: i32 = -9;

/// How a fake service behaves once spawned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FakeProgram {
    /// Runs until signalled.
    LongRunning,
    /// Survives `Terminate`; only `Kill` ends it.
    IgnoresTerminate,
    /// Exits by itself with `code` after the delay (signals still work).
    ExitAfter(Duration, i32),
    /// Spawn fails as if the executable did not exist.
    NotFound,
    /// Spawn fails with an OS error.
    SpawnFails,
}

/// Things the fake backend observed, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FakeEvent {
    Spawned { service: ServiceName, pid: u32 },
    Signalled { service: ServiceName, pid: u32, signal: Signal },
}

type SignalHook = Arc<dyn Fn(&ServiceName, Signal) + Send + Sync>;

enum Control {
    Stdout(String),
    Stderr(String),
    Exit(i32),
}

#[derive(Default)]
struct Inner {
    programs: Mutex<HashMap<String, FakeProgram>>,
    events: Mutex<Vec<FakeEvent>>,
    controls: Mutex<HashMap<u32, mpsc::UnboundedSender<Control>>>,
    on_signal: Mutex<Option<SignalHook>>,
}

/// A process backend that spawns nothing.
///
/// - every service runs `FakeProgram::LongRunning` unless configured otherwise
/// - records spawns and signals as [`FakeEvent`]s
/// - lets tests feed stdout/stderr lines and make a process exit
///
/// Clones share state, so a test can keep one clone while the controller
/// owns another.
#[derive(Clone)]
pub struct FakeBackend {
    inner: Arc<Inner>,
    next_pid: Arc<AtomicU32>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self {
            inner: Arc::default(),
            next_pid: Arc::new(AtomicU32::new(1000)),
        }
    }

    pub fn with_program(self, service: &str, program: FakeProgram) -> Self {
        self.set_program(service, program);
        self
    }

    pub fn set_program(&self, service: &str, program: FakeProgram) {
        self.inner
            .programs
            .lock()
            .unwrap()
            .insert(service.to_string(), program);
    }

    /// Called from the fake process when it receives a signal, before it
    /// reacts to it.
    pub fn on_signal<F>(&self, hook: F)
    where
        F: Fn(&ServiceName, Signal) + Send + Sync + 'static,
    {
        *self.inner.on_signal.lock().unwrap() = Some(Arc::new(hook));
    }

    pub fn events(&self) -> Vec<FakeEvent> {
        self.inner.events.lock().unwrap().clone()
    }

    /// Pids spawned for `service`, oldest first.
    pub fn spawned_pids(&self, service: &str) -> Vec<u32> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                FakeEvent::Spawned { service: s, pid } if s.as_str() == service => Some(pid),
                _ => None,
            })
            .collect()
    }

    pub fn spawn_count(&self, service: &str) -> usize {
        self.spawned_pids(service).len()
    }

    /// Signals delivered to `service`, oldest first.
    pub fn signals(&self, service: &str) -> Vec<Signal> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                FakeEvent::Signalled { service: s, signal, .. } if s.as_str() == service => {
                    Some(signal)
                }
                _ => None,
            })
            .collect()
    }

    pub fn is_alive(&self, pid: u32) -> bool {
        self.inner.controls.lock().unwrap().contains_key(&pid)
    }

    pub fn write_stdout(&self, pid: u32, line: &str) {
        self.send(pid, Control::Stdout(line.to_string()));
    }

    pub fn write_stderr(&self, pid: u32, line: &str) {
        self.send(pid, Control::Stderr(line.to_string()));
    }

    /// Make the process exit on its own with `code`.
    pub fn exit(&self, pid: u32, code: i32) {
        self.send(pid, Control::Exit(code));
    }

    fn send(&self, pid: u32, control: Control) {
        if let Some(tx) = self.inner.controls.lock().unwrap().get(&pid) {
            let _ = tx.send(control);
        }
    }

    fn record(&self, event: FakeEvent) {
        self.inner.events.lock().unwrap().push(event);
    }
}

impl Default for FakeBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for FakeBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakeBackend")
            .field("events", &self.events())
            .finish_non_exhaustive()
    }
}

impl ProcessBackend for FakeBackend {
    fn spawn(&self, spec: &LaunchSpec) -> Result<SpawnedProcess, LaunchError> {
        let program = self
            .inner
            .programs
            .lock()
            .unwrap()
            .get(spec.name.as_str())
            .cloned()
            .unwrap_or(FakeProgram::LongRunning);

        match program {
            FakeProgram::NotFound => return Err(LaunchError::NotFound(spec.program.clone())),
            FakeProgram::SpawnFails => {
                return Err(LaunchError::Spawn(std::io::Error::new(
                    std::io::ErrorKind::PermissionDenied,
                    format!("permission denied: {}", spec.program.display()),
                )));
            }
            _ => {}
        }

        let pid = self.next_pid.fetch_add(1, Ordering::SeqCst);
        let (stdout_reader, stdout_writer) = tokio::io::duplex(64 * 1024);
        let (stderr_reader, stderr_writer) = tokio::io::duplex(64 * 1024);
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let (exit_tx, exit_rx) = watch::channel(None);
        let (control_tx, control_rx) = mpsc::unbounded_channel();

        self.inner.controls.lock().unwrap().insert(pid, control_tx);
        self.record(FakeEvent::Spawned {
            service: spec.name.clone(),
            pid,
        });

        let process = FakeProcess {
            backend: self.clone(),
            service: spec.name.clone(),
            pid,
            program,
            stdout: stdout_writer,
            stderr: stderr_writer,
        };
        tokio::spawn(process.run(signal_rx, control_rx, exit_tx));

        Ok(SpawnedProcess {
            control: ProcessControl::new(pid, signal_tx, exit_rx),
            stdout: Box::new(stdout_reader),
            stderr: Box::new(stderr_reader),
        })
    }
}

struct FakeProcess {
    backend: FakeBackend,
    service: ServiceName,
    pid: u32,
    program: FakeProgram,
    stdout: DuplexStream,
    stderr: DuplexStream,
}

impl FakeProcess {
    async fn run(
        mut self,
        mut signal_rx: mpsc::UnboundedReceiver<Signal>,
        mut control_rx: mpsc::UnboundedReceiver<Control>,
        exit_tx: watch::Sender<Option<i32>>,
    ) {
        let deadline = match self.program {
            FakeProgram::ExitAfter(delay, code) => Some((tokio::time::Instant::now() + delay, code)),
            _ => None,
        };

        let code = loop {
            let natural_exit = async {
                match deadline {
                    Some((at, code)) => {
                        tokio::time::sleep_until(at).await;
                        code
                    }
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                code = natural_exit => break code,
                Some(signal) = signal_rx.recv() => {
                    self.backend.record(FakeEvent::Signalled {
                        service: self.service.clone(),
                        pid: self.pid,
                        signal,
                    });
                    let hook = self.backend.inner.on_signal.lock().unwrap().clone();
                    if let Some(hook) = hook {
                        hook(&self.service, signal);
                    }
                    match (signal, &self.program) {
                        (Signal::Kill, _) => break KILLED,
                        (Signal::Terminate, FakeProgram::IgnoresTerminate) => {}
                        (Signal::Terminate, _) => break TERMINATED,
                    }
                }
                Some(control) = control_rx.recv() => match control {
                    Control::Stdout(line) => {
                        let _ = self.stdout.write_all(format!("{line}\n").as_bytes()).await;
                    }
                    Control::Stderr(line) => {
                        let _ = self.stderr.write_all(format!("{line}\n").as_bytes()).await;
                    }
                    Control::Exit(code) => break code,
                },
            }
        };

        self.backend.inner.controls.lock().unwrap().remove(&self.pid);
        // Closing the pipes first mirrors a real exit: EOF, then reap.
        drop(self.stdout);
        drop(self.stderr);
        let _ = exit_tx.send(Some(code));
    }
}
