// src/command/mod.rs

//! Operator commands.
//!
//! A payload is a JSON document `{"command": "<identifier>"}`. Recognised
//! identifiers are `start_<service>`, `stop_<service>`, `restart_<service>`
//! (service name or alias), `status` and `shutdown_all`.

use std::collections::HashMap;

use serde::Deserialize;
use thiserror::Error;

use crate::config::ConfigFile;
use crate::engine::ServiceOp;
use crate::types::ServiceName;

pub mod channel;
pub mod inbox;

pub use channel::CommandChannel;
pub use inbox::{CommandInbox, FileInbox};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Service { op: ServiceOp, service: ServiceName },
    /// Publish the status aggregate immediately.
    Status,
    /// Stop every managed service.
    ShutdownAll,
}

#[derive(Error, Debug)]
pub enum CommandError {
    #[error("malformed command payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("unknown command: {0}")]
    Unknown(String),
}

#[derive(Debug, Deserialize)]
struct Payload {
    command: String,
}

/// Extract the command identifier from a raw payload.
pub fn decode_payload(raw: &str) -> Result<String, CommandError> {
    let payload: Payload = serde_json::from_str(raw)?;
    Ok(payload.command.trim().to_string())
}

/// Maps command tokens (service names and aliases) to services.
#[derive(Debug, Clone, Default)]
pub struct CommandCatalog {
    tokens: HashMap<String, ServiceName>,
}

impl CommandCatalog {
    pub fn from_config(cfg: &ConfigFile) -> Self {
        let mut catalog = Self::default();
        for svc in &cfg.services {
            catalog.insert(svc.name.as_str(), svc.name.clone());
            if let Some(alias) = &svc.alias {
                catalog.insert(alias, svc.name.clone());
            }
        }
        catalog
    }

    pub fn insert(&mut self, token: &str, service: ServiceName) {
        self.tokens.insert(token.to_string(), service);
    }

    pub fn resolve(&self, token: &str) -> Option<&ServiceName> {
        self.tokens.get(token)
    }

    /// Parse a command identifier.
    pub fn parse(&self, identifier: &str) -> Result<Command, CommandError> {
        match identifier {
            "status" => return Ok(Command::Status),
            "shutdown_all" => return Ok(Command::ShutdownAll),
            _ => {}
        }

        let unknown = || CommandError::Unknown(identifier.to_string());
        let (verb, token) = identifier.split_once('_').ok_or_else(unknown)?;
        let op = match verb {
            "start" => ServiceOp::Start,
            "stop" => ServiceOp::Stop,
            "restart" => ServiceOp::Restart,
            _ => return Err(unknown()),
        };
        let service = self.resolve(token).ok_or_else(unknown)?.clone();

        Ok(Command::Service { op, service })
    }
}
