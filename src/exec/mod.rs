// src/exec/mod.rs

//! Process execution layer.
//!
//! - [`backend`] defines the `ProcessBackend` trait, launch specs and the
//!   `ProcessControl` handle used to signal and await a child.
//! - [`os`] is the `tokio::process` implementation used in production.
//! - [`output_monitor`] drains a child's output and classifies its exit.
//! - [`startup_verifier`] confirms a child survives its startup window.

pub mod backend;
pub mod os;
pub mod output_monitor;
pub mod startup_verifier;

pub use backend::{
    LaunchError, LaunchSpec, OutputStream, ProcessBackend, ProcessControl, Signal, SpawnedProcess,
};
pub use os::OsProcessBackend;

use crate::engine::SharedSlot;
use crate::types::ServiceName;

/// What every per-instance worker needs to find and update its record.
#[derive(Debug, Clone)]
pub struct WorkerContext {
    pub name: ServiceName,
    pub generation: u64,
    pub slot: SharedSlot,
    pub control: ProcessControl,
}
