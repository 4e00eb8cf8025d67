#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::PathBuf;

use shepherd::config::{ConfigFile, RawConfigFile, ServiceConfig, SupervisorSection};

/// Builder for `ConfigFile` to simplify test setup.
///
/// Starts from timings short enough for tests: a 100ms startup window
/// (5 polls x 20ms), 200ms stop grace, 10ms restart settle and no stagger.
pub struct ConfigBuilder {
    config: RawConfigFile,
    base_dir: Option<PathBuf>,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        let supervisor = SupervisorSection {
            status_interval: "50ms".to_string(),
            command_poll_interval: "20ms".to_string(),
            startup_stagger: "0ms".to_string(),
            restart_settle: "10ms".to_string(),
            stop_grace: "200ms".to_string(),
            startup_poll_interval: "20ms".to_string(),
            startup_polls: 5,
            ..SupervisorSection::default()
        };

        Self {
            config: RawConfigFile {
                supervisor,
                interpreters: BTreeMap::from([("py".to_string(), "python3".to_string())]),
                service: Vec::new(),
            },
            base_dir: None,
        }
    }

    pub fn with_service(mut self, service: ServiceConfig) -> Self {
        self.config.service.push(service);
        self
    }

    /// Shorthand for a service at `bin/<name>` with default settings.
    pub fn service(self, name: &str) -> Self {
        self.with_service(ServiceBuilder::new(name, &format!("bin/{name}")).build())
    }

    pub fn startup_window(mut self, interval: &str, polls: u32) -> Self {
        self.config.supervisor.startup_poll_interval = interval.to_string();
        self.config.supervisor.startup_polls = polls;
        self
    }

    pub fn stop_grace(mut self, grace: &str) -> Self {
        self.config.supervisor.stop_grace = grace.to_string();
        self
    }

    pub fn restart_settle(mut self, settle: &str) -> Self {
        self.config.supervisor.restart_settle = settle.to_string();
        self
    }

    pub fn startup_stagger(mut self, stagger: &str) -> Self {
        self.config.supervisor.startup_stagger = stagger.to_string();
        self
    }

    pub fn status_interval(mut self, interval: &str) -> Self {
        self.config.supervisor.status_interval = interval.to_string();
        self
    }

    pub fn command_poll_interval(mut self, interval: &str) -> Self {
        self.config.supervisor.command_poll_interval = interval.to_string();
        self
    }

    pub fn interpreter(mut self, ext: &str, runtime: &str) -> Self {
        self.config
            .interpreters
            .insert(ext.to_string(), runtime.to_string());
        self
    }

    pub fn base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        let base_dir = self.base_dir.clone();
        let cfg =
            ConfigFile::try_from(self.config).expect("Failed to build valid config from builder");
        match base_dir {
            Some(dir) => cfg.with_base_dir(dir),
            None => cfg,
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `ServiceConfig`.
pub struct ServiceBuilder {
    service: ServiceConfig,
}

impl ServiceBuilder {
    pub fn new(name: &str, path: &str) -> Self {
        Self {
            service: ServiceConfig {
                name: name.to_string(),
                path: path.to_string(),
                alias: None,
                interpreter: None,
                cwd: None,
                autostart: true,
            },
        }
    }

    pub fn alias(mut self, alias: &str) -> Self {
        self.service.alias = Some(alias.to_string());
        self
    }

    pub fn interpreter(mut self, interpreter: &str) -> Self {
        self.service.interpreter = Some(interpreter.to_string());
        self
    }

    pub fn cwd(mut self, cwd: &str) -> Self {
        self.service.cwd = Some(cwd.to_string());
        self
    }

    pub fn autostart(mut self, autostart: bool) -> Self {
        self.service.autostart = autostart;
        self
    }

    pub fn build(self) -> ServiceConfig {
        self.service
    }
}
