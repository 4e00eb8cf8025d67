// src/command/channel.rs

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{Command, CommandCatalog, CommandError, CommandInbox, decode_payload};
use crate::engine::{OpTicket, ServiceLanes, ServiceOp};
use crate::status::StatusPublisher;

/// Command Channel: polls the inbox and dispatches decoded commands.
///
/// Service operations are queued on the service's lane, so a slow stop of
/// one service never holds up commands for another while commands for the
/// same service still run one after the other.
#[derive(Debug, Clone)]
pub struct CommandChannel {
    inbox: Arc<dyn CommandInbox>,
    catalog: CommandCatalog,
    lanes: Arc<ServiceLanes>,
    publisher: StatusPublisher,
    interval: Duration,
}

impl CommandChannel {
    pub fn new(
        inbox: Arc<dyn CommandInbox>,
        catalog: CommandCatalog,
        lanes: Arc<ServiceLanes>,
        publisher: StatusPublisher,
        interval: Duration,
    ) -> Self {
        Self {
            inbox,
            catalog,
            lanes,
            publisher,
            interval,
        }
    }

    /// Read the inbox once and act on whatever is there.
    ///
    /// Returns the tickets of the operations queued, if any. Inbox errors,
    /// malformed payloads and unknown identifiers are logged and produce no
    /// tickets.
    pub fn poll_once(&self) -> Vec<OpTicket> {
        let raw = match self.inbox.take() {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                error!(error = %e, "Error reading command file");
                return Vec::new();
            }
        };

        let command = match decode_payload(&raw).and_then(|id| self.catalog.parse(&id)) {
            Ok(command) => command,
            Err(CommandError::Malformed(e)) => {
                error!(error = %e, "Error: Invalid JSON in command file. Discarding.");
                return Vec::new();
            }
            Err(CommandError::Unknown(id)) => {
                warn!(command = %id, "Unknown command received: {id}");
                return Vec::new();
            }
        };

        self.dispatch(command)
    }

    pub fn dispatch(&self, command: Command) -> Vec<OpTicket> {
        match command {
            Command::Service { op, service } => {
                info!(service = %service, op = op.as_str(), "Received command: {}_{}", op.as_str(), service);
                self.lanes.submit(&service, op).into_iter().collect()
            }
            Command::Status => {
                info!("Received command: status");
                self.publisher.publish_now();
                Vec::new()
            }
            Command::ShutdownAll => {
                info!("Received command: shutdown_all");
                self.lanes.submit_all(ServiceOp::Stop)
            }
        }
    }

    /// Poll every `interval` until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let queued = self.poll_once();
                    if !queued.is_empty() {
                        debug!(count = queued.len(), "command queued");
                    }
                }
            }
        }
        debug!("command channel stopped");
    }
}
