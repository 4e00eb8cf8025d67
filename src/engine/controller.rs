// src/engine/controller.rs

//! Process Controller: start / stop / restart for each service.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Local;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::config::{ConfigFile, Timings};
use crate::engine::registry::{Instance, Registry};
use crate::errors::{Result, ShepherdError};
use crate::exec::output_monitor::monitor_output;
use crate::exec::startup_verifier::verify_startup;
use crate::exec::{LaunchError, LaunchSpec, ProcessBackend, Signal, WorkerContext};
use crate::process::ProcessStatus;
use crate::types::ServiceName;

/// Result of a `start` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started { pid: u32 },
    /// Already `starting` or `running`; nothing was spawned.
    AlreadyActive,
    /// The launch failed; the record holds the error status.
    LaunchFailed(ProcessStatus),
}

/// Result of a `stop` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// A live process was terminated within the grace period.
    Terminated { exit_code: i32 },
    /// The process ignored the terminate request and was killed.
    Killed { exit_code: Option<i32> },
    /// No live process; the record was just reset.
    NotRunning,
}

/// Owns the lifecycle operations of every configured service.
///
/// Operations on the same service must not overlap; callers serialise them
/// per service (see [`ServiceLanes`](super::ServiceLanes)).
pub struct ProcessController<B: ProcessBackend> {
    backend: B,
    registry: Arc<Registry>,
    specs: BTreeMap<ServiceName, LaunchSpec>,
    timings: Timings,
}

impl<B: ProcessBackend> std::fmt::Debug for ProcessController<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessController")
            .field("specs", &self.specs)
            .field("timings", &self.timings)
            .finish_non_exhaustive()
    }
}

impl<B: ProcessBackend> ProcessController<B> {
    pub fn new(
        backend: B,
        registry: Arc<Registry>,
        specs: BTreeMap<ServiceName, LaunchSpec>,
        timings: Timings,
    ) -> Self {
        Self {
            backend,
            registry,
            specs,
            timings,
        }
    }

    /// Build a controller for every service in `cfg`.
    pub fn from_config(backend: B, registry: Arc<Registry>, cfg: &ConfigFile) -> Self {
        let specs = cfg
            .services
            .iter()
            .map(|svc| (svc.name.clone(), cfg.launch_spec(svc)))
            .collect();
        Self::new(backend, registry, specs, cfg.timings)
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn timings(&self) -> &Timings {
        &self.timings
    }

    /// Spawn the service unless it is already `starting` or `running`.
    ///
    /// On success the record becomes `starting` with the new pid, the
    /// expected-shutdown flag is cleared, and one Output Monitor and one
    /// Startup Verifier are launched for this instance. A launch failure
    /// moves the record straight to `error_not_found` or
    /// `error_failed_to_start` and launches no workers.
    pub fn start(&self, name: &ServiceName) -> Result<StartOutcome> {
        let slot = self.slot(name)?;
        let spec = self
            .specs
            .get(name)
            .ok_or_else(|| ShepherdError::UnknownService(name.to_string()))?;

        let mut guard = slot.lock();
        if guard.record.status.is_live() {
            info!(service = %name, status = %guard.record.status, "Process {name} is already running or starting.");
            return Ok(StartOutcome::AlreadyActive);
        }

        info!(service = %name, command = %spec.display_command(), "Attempting to start {name}...");
        let spawned = match self.backend.spawn(spec) {
            Ok(spawned) => spawned,
            Err(err) => {
                let status = match &err {
                    LaunchError::NotFound(path) => {
                        error!(service = %name, "ERROR: Command not found for {name}: {}", path.display());
                        ProcessStatus::ErrorNotFound
                    }
                    other => {
                        error!(service = %name, error = %other, "ERROR: Failed to start {name}: {other}");
                        ProcessStatus::ErrorFailedToStart
                    }
                };
                guard.record.mark_launch_failed(status, Local::now());
                return Ok(StartOutcome::LaunchFailed(status));
            }
        };

        let pid = spawned.control.pid();
        guard.generation += 1;
        guard.expected_shutdown = false;
        guard.record.mark_starting(pid, Local::now());

        let ctx = WorkerContext {
            name: name.clone(),
            generation: guard.generation,
            slot: Arc::clone(slot),
            control: spawned.control.clone(),
        };
        let mut workers = JoinSet::new();
        workers.spawn(monitor_output(ctx.clone(), spawned.stdout, spawned.stderr));
        workers.spawn(verify_startup(
            ctx,
            self.timings.startup_poll_interval,
            self.timings.startup_polls,
        ));

        // Any previous instance has already exited; dropping it drops its
        // finished worker set.
        guard.instance = Some(Instance::new(spawned.control, workers));
        info!(service = %name, pid, "{name} started with PID: {pid}");

        Ok(StartOutcome::Started { pid })
    }

    /// Stop the service.
    ///
    /// Precondition for the termination signal: the expected-shutdown flag
    /// is set first, so the Output Monitor classifies the exit as `stopped`.
    /// The terminate request goes to the whole process group; if the process
    /// is still alive after `stop_grace` it is killed. The record always ends
    /// `stopped` with no pid, start time or exit code, even if termination
    /// could not be confirmed. Without a live process this only resets the
    /// record.
    pub async fn stop(&self, name: &ServiceName) -> Result<StopOutcome> {
        let slot = self.slot(name)?;
        let grace = self.timings.stop_grace;

        let (control, stale) = {
            let mut guard = slot.lock();
            match guard.live_control() {
                Some(control) => {
                    guard.expected_shutdown = true;
                    (Some(control), None)
                }
                None => {
                    let stale = guard.instance.take();
                    if stale.is_some() {
                        // Exited but possibly not yet classified; detach its workers.
                        guard.generation += 1;
                    }
                    guard.record.reset_stopped();
                    guard.expected_shutdown = false;
                    (None, stale)
                }
            }
        };

        let Some(control) = control else {
            if let Some(instance) = stale {
                instance.retire(name, grace).await;
            }
            return Ok(StopOutcome::NotRunning);
        };

        let pid = control.pid();
        info!(service = %name, pid, "Stopping {name} (PID: {pid})...");
        if !control.signal(Signal::Terminate) {
            warn!(service = %name, pid, "terminate request not delivered; process already gone");
        }

        let outcome = match control.wait_timeout(grace).await {
            Some(exit_code) => {
                info!(service = %name, pid, exit_code, "{name} stopped.");
                StopOutcome::Terminated { exit_code }
            }
            None => {
                warn!(service = %name, pid, "WARNING: {name} did not terminate gracefully, forcing kill.");
                control.signal(Signal::Kill);
                let exit_code = control.wait_timeout(grace).await;
                if exit_code.is_none() {
                    error!(service = %name, pid, "ERROR: Could not confirm {name} exited after kill");
                }
                StopOutcome::Killed { exit_code }
            }
        };

        let instance = slot.lock().instance.take();
        if let Some(instance) = instance {
            instance.retire(name, grace).await;
        }

        let mut guard = slot.lock();
        guard.record.reset_stopped();
        guard.expected_shutdown = false;

        Ok(outcome)
    }

    /// Stop, wait `restart_settle`, then start. Never concurrent, so the old
    /// and new instance do not contend for ports or files.
    pub async fn restart(&self, name: &ServiceName) -> Result<StartOutcome> {
        self.stop(name).await?;
        tokio::time::sleep(self.timings.restart_settle).await;
        self.start(name)
    }

    fn slot(&self, name: &ServiceName) -> Result<&crate::engine::SharedSlot> {
        self.registry
            .slot(name)
            .ok_or_else(|| ShepherdError::UnknownService(name.to_string()))
    }
}
