// src/engine/mod.rs

//! Supervision engine.
//!
//! - [`registry`] holds the shared per-service state and the supervisor
//!   meta-record.
//! - [`controller`] implements start / stop / restart on top of a
//!   [`ProcessBackend`](crate::exec::ProcessBackend).
//! - [`lanes`] serialises those operations per service.

pub mod controller;
pub mod lanes;
pub mod registry;

pub use controller::{ProcessController, StartOutcome, StopOutcome};
pub use lanes::{OpOutcome, OpTicket, ServiceLanes, ServiceOp};
pub use registry::{Instance, Registry, ServiceSlot, SharedSlot, SupervisorState};
