// src/config/model.rs

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::exec::LaunchSpec;
use crate::types::ServiceName;

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [supervisor]
/// status_file = "status.json"
/// command_file = "commands.json"
/// stop_grace = "5s"
///
/// [interpreters]
/// py = "python3"
///
/// [[service]]
/// name = "koboldcpp"
/// path = "../Koboldcpp/koboldcpp"
/// alias = "kobold"
/// ```
///
/// Every section except `[[service]]` is optional.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    /// Files and timings from `[supervisor]`.
    #[serde(default)]
    pub supervisor: SupervisorSection,

    /// Script extension -> runtime used to invoke it.
    #[serde(default = "default_interpreters")]
    pub interpreters: BTreeMap<String, String>,

    /// All services from `[[service]]`, in startup order.
    #[serde(default)]
    pub service: Vec<ServiceConfig>,
}

/// `[supervisor]` section.
///
/// Durations are kept as strings here and parsed during validation.
#[derive(Debug, Clone, Deserialize)]
pub struct SupervisorSection {
    #[serde(default = "default_status_file")]
    pub status_file: String,

    #[serde(default = "default_command_file")]
    pub command_file: String,

    #[serde(default = "default_log_file")]
    pub log_file: String,

    #[serde(default = "default_status_interval")]
    pub status_interval: String,

    #[serde(default = "default_command_poll_interval")]
    pub command_poll_interval: String,

    /// Delay between consecutive service starts at boot.
    #[serde(default = "default_startup_stagger")]
    pub startup_stagger: String,

    /// Delay between the stop and the start half of a restart.
    #[serde(default = "default_restart_settle")]
    pub restart_settle: String,

    /// How long a stop waits after the terminate signal before killing.
    #[serde(default = "default_stop_grace")]
    pub stop_grace: String,

    #[serde(default = "default_startup_poll_interval")]
    pub startup_poll_interval: String,

    /// Number of polls making up the startup verification window.
    #[serde(default = "default_startup_polls")]
    pub startup_polls: u32,
}

fn default_interpreters() -> BTreeMap<String, String> {
    BTreeMap::from([("py".to_string(), "python3".to_string())])
}

fn default_status_file() -> String {
    "status.json".to_string()
}

fn default_command_file() -> String {
    "commands.json".to_string()
}

fn default_log_file() -> String {
    "shepherd.log".to_string()
}

fn default_status_interval() -> String {
    "5s".to_string()
}

fn default_command_poll_interval() -> String {
    "2s".to_string()
}

fn default_startup_stagger() -> String {
    "1s".to_string()
}

fn default_restart_settle() -> String {
    "2s".to_string()
}

fn default_stop_grace() -> String {
    "5s".to_string()
}

fn default_startup_poll_interval() -> String {
    "1s".to_string()
}

fn default_startup_polls() -> u32 {
    10
}

impl Default for SupervisorSection {
    fn default() -> Self {
        Self {
            status_file: default_status_file(),
            command_file: default_command_file(),
            log_file: default_log_file(),
            status_interval: default_status_interval(),
            command_poll_interval: default_command_poll_interval(),
            startup_stagger: default_startup_stagger(),
            restart_settle: default_restart_settle(),
            stop_grace: default_stop_grace(),
            startup_poll_interval: default_startup_poll_interval(),
            startup_polls: default_startup_polls(),
        }
    }
}

/// `[[service]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub name: String,

    /// Executable or script to launch. It is started with no arguments.
    pub path: String,

    /// Extra command token, e.g. `kobold` so that `restart_kobold` works.
    #[serde(default)]
    pub alias: Option<String>,

    /// Runtime used to invoke `path`; overrides `[interpreters]`.
    #[serde(default)]
    pub interpreter: Option<String>,

    #[serde(default)]
    pub cwd: Option<String>,

    /// Start this service during the initial staggered startup.
    #[serde(default = "default_autostart")]
    pub autostart: bool,
}

fn default_autostart() -> bool {
    true
}

/// Parsed timing knobs shared by the controller, monitors and pollers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    pub status_interval: Duration,
    pub command_poll_interval: Duration,
    pub startup_stagger: Duration,
    pub restart_settle: Duration,
    pub stop_grace: Duration,
    pub startup_poll_interval: Duration,
    pub startup_polls: u32,
}

impl Timings {
    /// Time after spawn during which an exit counts as a startup failure.
    pub fn startup_window(&self) -> Duration {
        self.startup_poll_interval
            .checked_mul(self.startup_polls)
            .unwrap_or(Duration::MAX)
    }
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            status_interval: Duration::from_secs(5),
            command_poll_interval: Duration::from_secs(2),
            startup_stagger: Duration::from_secs(1),
            restart_settle: Duration::from_secs(2),
            stop_grace: Duration::from_secs(5),
            startup_poll_interval: Duration::from_secs(1),
            startup_polls: 10,
        }
    }
}

/// A validated service entry.
#[derive(Debug, Clone)]
pub struct ServiceDefinition {
    pub name: ServiceName,
    pub alias: Option<String>,
    pub path: String,
    pub interpreter: Option<String>,
    pub cwd: Option<String>,
    pub autostart: bool,
}

/// Validated configuration.
///
/// Only constructed through `TryFrom<RawConfigFile>`, so every instance has
/// at least one service, unique names/aliases and parsed timings.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub supervisor: SupervisorSection,
    pub timings: Timings,
    pub interpreters: BTreeMap<String, String>,
    pub services: Vec<ServiceDefinition>,
    base_dir: PathBuf,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        supervisor: SupervisorSection,
        timings: Timings,
        interpreters: BTreeMap<String, String>,
        services: Vec<ServiceDefinition>,
    ) -> Self {
        Self {
            supervisor,
            timings,
            interpreters,
            services,
            base_dir: PathBuf::from("."),
        }
    }

    /// Resolve relative paths against `dir` instead of the working directory.
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = dir.into();
        self
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn status_path(&self) -> PathBuf {
        self.resolve(&self.supervisor.status_file)
    }

    pub fn command_path(&self) -> PathBuf {
        self.resolve(&self.supervisor.command_file)
    }

    pub fn log_path(&self) -> PathBuf {
        self.resolve(&self.supervisor.log_file)
    }

    pub fn service(&self, name: &ServiceName) -> Option<&ServiceDefinition> {
        self.services.iter().find(|s| &s.name == name)
    }

    /// Build the launch spec for a service.
    ///
    /// The interpreter is the service's own `interpreter`, else the
    /// `[interpreters]` entry for the path's extension, else none.
    pub fn launch_spec(&self, service: &ServiceDefinition) -> LaunchSpec {
        let program = self.resolve(&service.path);
        let interpreter = service.interpreter.clone().or_else(|| {
            program
                .extension()
                .and_then(|ext| ext.to_str())
                .and_then(|ext| self.interpreters.get(&ext.to_lowercase()).cloned())
        });

        LaunchSpec {
            name: service.name.clone(),
            program,
            interpreter: interpreter.map(PathBuf::from),
            cwd: service.cwd.as_deref().map(|c| self.resolve(c)),
        }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let p = Path::new(path);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.base_dir.join(p)
        }
    }
}
