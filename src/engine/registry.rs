// src/engine/registry.rs

//! Shared per-service state.
//!
//! Every service owns one [`ServiceSlot`] behind its own mutex. Monitors,
//! verifiers, the controller and the publisher all go through the slot, so
//! the expected-shutdown flag read while classifying an exit is always
//! consistent with the latest `stop()`.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::exec::ProcessControl;
use crate::process::ProcessRecord;
use crate::status::{SupervisorMeta, SupervisorStatus};
use crate::types::ServiceName;

/// One spawned process plus the workers observing it.
#[derive(Debug)]
pub struct Instance {
    pub control: ProcessControl,
    workers: JoinSet<()>,
}

impl Instance {
    pub fn new(control: ProcessControl, workers: JoinSet<()>) -> Self {
        Self { control, workers }
    }

    /// Wait up to `limit` for the workers to finish, then abort the rest.
    pub async fn retire(mut self, name: &ServiceName, limit: Duration) {
        let drained = tokio::time::timeout(limit, async {
            while self.workers.join_next().await.is_some() {}
        })
        .await;

        if drained.is_err() {
            warn!(service = %name, "monitor tasks did not finish in time; aborting them");
            self.workers.shutdown().await;
        } else {
            debug!(service = %name, "monitor tasks retired");
        }
    }
}

/// Mutable state of one service.
#[derive(Debug, Default)]
pub struct ServiceSlot {
    pub record: ProcessRecord,
    /// True between a stop request and the observed termination.
    pub expected_shutdown: bool,
    /// Incremented on every successful spawn. Workers compare it with the
    /// value they were started for and leave the slot alone on mismatch.
    pub generation: u64,
    pub instance: Option<Instance>,
}

impl ServiceSlot {
    /// Control handle of the current instance, if its process is still alive.
    pub fn live_control(&self) -> Option<ProcessControl> {
        self.instance
            .as_ref()
            .map(|i| i.control.clone())
            .filter(|c| !c.has_exited())
    }
}

pub type SharedSlot = Arc<Mutex<ServiceSlot>>;

/// Lifecycle of the supervisor itself, as published.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupervisorState {
    Running,
    Stopping,
    Stopped,
}

/// All service slots plus the supervisor meta-record.
///
/// Created once at startup with every configured service `stopped`; no
/// service is ever added or removed afterwards.
#[derive(Debug)]
pub struct Registry {
    slots: BTreeMap<ServiceName, SharedSlot>,
    order: Vec<ServiceName>,
    state: Mutex<SupervisorState>,
    pid: u32,
}

impl Registry {
    pub fn new(services: impl IntoIterator<Item = ServiceName>) -> Self {
        let mut slots = BTreeMap::new();
        let mut order = Vec::new();
        for name in services {
            if slots.contains_key(&name) {
                continue;
            }
            slots.insert(name.clone(), Arc::new(Mutex::new(ServiceSlot::default())));
            order.push(name);
        }

        Self {
            slots,
            order,
            state: Mutex::new(SupervisorState::Running),
            pid: std::process::id(),
        }
    }

    pub fn slot(&self, name: &ServiceName) -> Option<&SharedSlot> {
        self.slots.get(name)
    }

    /// Service names in configuration order.
    pub fn names(&self) -> &[ServiceName] {
        &self.order
    }

    pub fn record(&self, name: &ServiceName) -> Option<ProcessRecord> {
        self.slots.get(name).map(|slot| slot.lock().record.clone())
    }

    pub fn expected_shutdown(&self, name: &ServiceName) -> Option<bool> {
        self.slots.get(name).map(|slot| slot.lock().expected_shutdown)
    }

    pub fn supervisor_state(&self) -> SupervisorState {
        *self.state.lock()
    }

    pub fn set_supervisor_state(&self, state: SupervisorState) {
        *self.state.lock() = state;
    }

    /// Build the full status aggregate from scratch, stamped `now`.
    pub fn snapshot(&self, now: DateTime<Local>) -> SupervisorStatus {
        let services = self
            .slots
            .iter()
            .map(|(name, slot)| (name.clone(), slot.lock().record.clone()))
            .collect();

        SupervisorStatus {
            supervisor: SupervisorMeta {
                status: self.supervisor_state(),
                last_update: now,
                pid: self.pid,
            },
            services,
        }
    }
}
