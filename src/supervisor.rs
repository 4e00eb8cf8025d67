// src/supervisor.rs

//! Supervisor Loop.
//!
//! Wires registry, controller, lanes, Command Channel and Status Publisher
//! together:
//! 1. publish the initial (all `stopped`) snapshot,
//! 2. start polling the command inbox,
//! 3. start `autostart` services one by one with a stagger,
//! 4. publish on a timer until a termination signal arrives,
//! 5. stop every service and publish the final snapshot.

use std::future::Future;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::command::{CommandCatalog, CommandChannel, CommandInbox};
use crate::config::{ConfigFile, Timings};
use crate::engine::{OpOutcome, ProcessController, Registry, ServiceLanes, ServiceOp, SupervisorState};
use crate::exec::ProcessBackend;
use crate::status::{StatusOutbox, StatusPublisher};
use crate::types::ServiceName;

pub struct Supervisor {
    registry: Arc<Registry>,
    lanes: Arc<ServiceLanes>,
    publisher: StatusPublisher,
    channel: CommandChannel,
    autostart: Vec<ServiceName>,
    timings: Timings,
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("services", &self.registry.names())
            .field("autostart", &self.autostart)
            .field("timings", &self.timings)
            .finish_non_exhaustive()
    }
}

impl Supervisor {
    /// Build the supervisor for `cfg`. Must be called inside a Tokio runtime
    /// (the per-service lanes are spawned here).
    pub fn new<B: ProcessBackend>(
        cfg: &ConfigFile,
        backend: B,
        inbox: Arc<dyn CommandInbox>,
        outbox: Arc<dyn StatusOutbox>,
    ) -> Self {
        let registry = Arc::new(Registry::new(cfg.services.iter().map(|s| s.name.clone())));
        let controller = Arc::new(ProcessController::from_config(
            backend,
            Arc::clone(&registry),
            cfg,
        ));
        let lanes = Arc::new(ServiceLanes::spawn(controller));
        let publisher = StatusPublisher::new(
            Arc::clone(&registry),
            outbox,
            cfg.timings.status_interval,
        );
        let channel = CommandChannel::new(
            inbox,
            CommandCatalog::from_config(cfg),
            Arc::clone(&lanes),
            publisher.clone(),
            cfg.timings.command_poll_interval,
        );
        let autostart = cfg
            .services
            .iter()
            .filter(|s| s.autostart)
            .map(|s| s.name.clone())
            .collect();

        Self {
            registry,
            lanes,
            publisher,
            channel,
            autostart,
            timings: cfg.timings,
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn lanes(&self) -> &Arc<ServiceLanes> {
        &self.lanes
    }

    pub fn publisher(&self) -> &StatusPublisher {
        &self.publisher
    }

    pub fn channel(&self) -> &CommandChannel {
        &self.channel
    }

    /// Start every `autostart` service in configuration order, waiting for
    /// each start to finish and then `startup_stagger` before the next.
    pub async fn start_all(&self) {
        for (i, name) in self.autostart.iter().enumerate() {
            if i > 0 && !self.timings.startup_stagger.is_zero() {
                tokio::time::sleep(self.timings.startup_stagger).await;
            }
            match self.lanes.submit(name, ServiceOp::Start) {
                Some(ticket) => {
                    if let Some(OpOutcome::Failed(e)) = ticket.settled().await {
                        error!(service = %name, error = %e, "initial start failed");
                    }
                }
                None => warn!(service = %name, "no lane for service; skipping start"),
            }
        }
        debug!(count = self.autostart.len(), "initial startup sequence finished");
    }

    /// Stop every service through its lane and wait for all of them.
    ///
    /// Stops of different services proceed concurrently.
    pub async fn stop_all(&self) {
        for ticket in self.lanes.submit_all(ServiceOp::Stop) {
            let name = ticket.service().clone();
            match ticket.settled().await {
                Some(OpOutcome::Failed(e)) => error!(service = %name, error = %e, "stop failed"),
                Some(_) => {}
                None => warn!(service = %name, "lane closed before stop ran"),
            }
        }
    }

    /// Run until `shutdown` resolves, then stop everything.
    pub async fn run_until<F>(self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        info!(pid = std::process::id(), services = self.registry.names().len(), "Supervisor starting");
        self.registry.set_supervisor_state(SupervisorState::Running);
        self.publisher.publish_now();

        let cancel = CancellationToken::new();
        let mut pollers: Vec<JoinHandle<()>> = Vec::new();
        pollers.push(tokio::spawn(self.channel.clone().run(cancel.child_token())));

        let mut shutdown = std::pin::pin!(shutdown);
        let interrupted = tokio::select! {
            _ = self.start_all() => false,
            _ = &mut shutdown => true,
        };

        if !interrupted {
            pollers.push(tokio::spawn(self.publisher.clone().run(cancel.child_token())));
            info!("Supervisor running");
            shutdown.await;
        }

        info!("Shutdown requested, stopping all services...");
        cancel.cancel();
        for poller in pollers {
            if let Err(e) = poller.await {
                warn!(error = %e, "poller task ended abnormally");
            }
        }

        self.registry.set_supervisor_state(SupervisorState::Stopping);
        self.publisher.publish_now();

        self.stop_all().await;

        self.registry.set_supervisor_state(SupervisorState::Stopped);
        self.publisher.publish_now();
        info!("Supervisor stopped");
    }
}

/// Resolves on Ctrl-C, or on SIGTERM on unix.
pub async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    res = tokio::signal::ctrl_c() => {
                        if let Err(e) = res {
                            error!(error = %e, "failed to listen for Ctrl+C");
                            term.recv().await;
                        }
                    }
                    _ = term.recv() => {}
                }
                return;
            }
            Err(e) => warn!(error = %e, "failed to install SIGTERM handler"),
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
}
