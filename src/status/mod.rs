// src/status/mod.rs

//! The externally visible status aggregate and its publisher.

use std::collections::BTreeMap;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::engine::SupervisorState;
use crate::process::ProcessRecord;
use crate::types::ServiceName;

pub mod publisher;

pub use publisher::{FileOutbox, StatusOutbox, StatusPublisher};

/// Meta-record describing the supervisor itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupervisorMeta {
    pub status: SupervisorState,
    pub last_update: DateTime<Local>,
    pub pid: u32,
}

/// Full snapshot: the supervisor meta-record under `"supervisor"` and one
/// record per service keyed by its name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupervisorStatus {
    pub supervisor: SupervisorMeta,
    #[serde(flatten)]
    pub services: BTreeMap<ServiceName, ProcessRecord>,
}

impl SupervisorStatus {
    pub fn service(&self, name: &ServiceName) -> Option<&ProcessRecord> {
        self.services.get(name)
    }
}
