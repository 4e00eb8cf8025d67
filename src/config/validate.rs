// src/config/validate.rs

use std::collections::BTreeSet;
use std::time::Duration;

use crate::config::duration::parse_duration;
use crate::config::model::{
    ConfigFile, RawConfigFile, ServiceDefinition, SupervisorSection, Timings,
};
use crate::errors::{Result, ShepherdError};
use crate::types::ServiceName;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::ShepherdError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        ensure_has_services(&raw)?;
        let timings = parse_timings(&raw.supervisor)?;
        let services = validate_services(&raw)?;
        Ok(ConfigFile::new_unchecked(
            raw.supervisor,
            timings,
            raw.interpreters,
            services,
        ))
    }
}

fn ensure_has_services(cfg: &RawConfigFile) -> Result<()> {
    if cfg.service.is_empty() {
        return Err(ShepherdError::ConfigError(
            "config must contain at least one [[service]] entry".to_string(),
        ));
    }
    Ok(())
}

fn parse_timings(section: &SupervisorSection) -> Result<Timings> {
    if section.startup_polls == 0 {
        return Err(ShepherdError::ConfigError(
            "[supervisor].startup_polls must be >= 1 (got 0)".to_string(),
        ));
    }

    let startup_poll_interval = nonzero("startup_poll_interval", &section.startup_poll_interval)?;
    if startup_poll_interval.checked_mul(section.startup_polls).is_none() {
        return Err(ShepherdError::ConfigError(
            "[supervisor].startup_poll_interval * startup_polls is too large".to_string(),
        ));
    }

    Ok(Timings {
        status_interval: nonzero("status_interval", &section.status_interval)?,
        command_poll_interval: nonzero("command_poll_interval", &section.command_poll_interval)?,
        startup_stagger: field("startup_stagger", &section.startup_stagger)?,
        restart_settle: field("restart_settle", &section.restart_settle)?,
        stop_grace: nonzero("stop_grace", &section.stop_grace)?,
        startup_poll_interval,
        startup_polls: section.startup_polls,
    })
}

fn field(key: &str, value: &str) -> Result<Duration> {
    parse_duration(value)
        .map_err(|e| ShepherdError::ConfigError(format!("[supervisor].{key}: {e}")))
}

fn nonzero(key: &str, value: &str) -> Result<Duration> {
    let d = field(key, value)?;
    if d.is_zero() {
        return Err(ShepherdError::ConfigError(format!(
            "[supervisor].{key} must be greater than zero"
        )));
    }
    Ok(d)
}

fn validate_services(cfg: &RawConfigFile) -> Result<Vec<ServiceDefinition>> {
    let mut names = BTreeSet::new();
    let mut tokens = BTreeSet::new();
    let mut services = Vec::with_capacity(cfg.service.len());

    for svc in &cfg.service {
        let name: ServiceName = svc
            .name
            .parse()
            .map_err(ShepherdError::ConfigError)?;

        if !names.insert(name.clone()) {
            return Err(ShepherdError::ConfigError(format!(
                "service '{name}' is defined more than once"
            )));
        }
        if svc.path.trim().is_empty() {
            return Err(ShepherdError::ConfigError(format!(
                "service '{name}' has an empty `path`"
            )));
        }

        services.push(ServiceDefinition {
            name,
            alias: svc.alias.clone(),
            path: svc.path.clone(),
            interpreter: svc.interpreter.clone(),
            cwd: svc.cwd.clone(),
            autostart: svc.autostart,
        });
    }

    // Names and aliases share one token namespace in command identifiers.
    for svc in &services {
        tokens.insert(svc.name.as_str().to_string());
    }
    for svc in &services {
        let Some(alias) = &svc.alias else {
            continue;
        };
        let alias_name: ServiceName = alias.parse().map_err(|e: String| {
            ShepherdError::ConfigError(format!("service '{}' alias: {e}", svc.name))
        })?;
        if alias_name == svc.name {
            continue;
        }
        if !tokens.insert(alias.clone()) {
            return Err(ShepherdError::ConfigError(format!(
                "alias '{alias}' of service '{}' collides with another service name or alias",
                svc.name
            )));
        }
    }

    Ok(services)
}
