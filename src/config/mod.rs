// src/config/mod.rs

//! Configuration loading and validation for shepherd.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate service names, aliases and timings (`validate.rs`).

pub mod duration;
pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_from_path};
pub use model::{
    ConfigFile, RawConfigFile, ServiceConfig, ServiceDefinition, SupervisorSection, Timings,
};
