// src/engine/lanes.rs

//! Per-service operation lanes.
//!
//! Every service gets one task that executes its start / stop / restart
//! requests strictly in arrival order. Lanes of different services run
//! independently, so a slow stop of one service never delays another.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tracing::{debug, error};

use super::controller::{ProcessController, StartOutcome, StopOutcome};
use crate::exec::ProcessBackend;
use crate::types::ServiceName;

/// Lifecycle operation that can be queued on a lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceOp {
    Start,
    Stop,
    Restart,
}

impl ServiceOp {
    pub fn as_str(self) -> &'static str {
        match self {
            ServiceOp::Start => "start",
            ServiceOp::Stop => "stop",
            ServiceOp::Restart => "restart",
        }
    }
}

/// What an executed operation produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpOutcome {
    Started(StartOutcome),
    Stopped(StopOutcome),
    Failed(String),
}

struct LaneRequest {
    op: ServiceOp,
    done: oneshot::Sender<OpOutcome>,
}

/// Handle to one queued operation.
///
/// Dropping the ticket does not cancel the operation.
#[derive(Debug)]
pub struct OpTicket {
    service: ServiceName,
    op: ServiceOp,
    rx: oneshot::Receiver<OpOutcome>,
}

impl OpTicket {
    pub fn service(&self) -> &ServiceName {
        &self.service
    }

    pub fn op(&self) -> ServiceOp {
        self.op
    }

    /// Wait for the operation to finish. `None` if the lane went away
    /// before running it.
    pub async fn settled(self) -> Option<OpOutcome> {
        self.rx.await.ok()
    }
}

#[derive(Debug)]
pub struct ServiceLanes {
    lanes: BTreeMap<ServiceName, mpsc::UnboundedSender<LaneRequest>>,
    order: Vec<ServiceName>,
    /// Lane tasks are aborted when the lanes are dropped.
    _tasks: JoinSet<()>,
}

impl std::fmt::Debug for LaneRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LaneRequest").field("op", &self.op).finish_non_exhaustive()
    }
}

impl ServiceLanes {
    /// Spawn one lane per registered service.
    pub fn spawn<B: ProcessBackend>(controller: Arc<ProcessController<B>>) -> Self {
        let order = controller.registry().names().to_vec();
        let mut lanes = BTreeMap::new();
        let mut tasks = JoinSet::new();

        for name in &order {
            let (tx, rx) = mpsc::unbounded_channel();
            lanes.insert(name.clone(), tx);
            tasks.spawn(run_lane(name.clone(), Arc::clone(&controller), rx));
        }

        Self {
            lanes,
            order,
            _tasks: tasks,
        }
    }

    /// Queue `op` for `name`. `None` if the service has no lane.
    pub fn submit(&self, name: &ServiceName, op: ServiceOp) -> Option<OpTicket> {
        let lane = self.lanes.get(name)?;
        let (done, rx) = oneshot::channel();
        if lane.send(LaneRequest { op, done }).is_err() {
            error!(service = %name, op = op.as_str(), "lane closed; request dropped");
            return None;
        }
        debug!(service = %name, op = op.as_str(), "queued");

        Some(OpTicket {
            service: name.clone(),
            op,
            rx,
        })
    }

    /// Queue `op` on every lane, in configuration order.
    pub fn submit_all(&self, op: ServiceOp) -> Vec<OpTicket> {
        self.order
            .iter()
            .filter_map(|name| self.submit(name, op))
            .collect()
    }
}

async fn run_lane<B: ProcessBackend>(
    name: ServiceName,
    controller: Arc<ProcessController<B>>,
    mut rx: mpsc::UnboundedReceiver<LaneRequest>,
) {
    while let Some(LaneRequest { op, done }) = rx.recv().await {
        let outcome = match op {
            ServiceOp::Start => controller.start(&name).map(OpOutcome::Started),
            ServiceOp::Stop => controller.stop(&name).await.map(OpOutcome::Stopped),
            ServiceOp::Restart => controller.restart(&name).await.map(OpOutcome::Started),
        };
        let outcome = outcome.unwrap_or_else(|e| {
            error!(service = %name, op = op.as_str(), error = %e, "operation failed");
            OpOutcome::Failed(e.to_string())
        });
        let _ = done.send(outcome);
    }
    debug!(service = %name, "lane closed");
}
