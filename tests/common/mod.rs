#![allow(dead_code)]

use std::sync::Arc;

use shepherd::config::ConfigFile;
use shepherd::engine::{ProcessController, Registry};
use shepherd::process::{ProcessRecord, ProcessStatus};
use shepherd::types::ServiceName;
use shepherd_test_utils::fake_backend::FakeBackend;
use shepherd_test_utils::wait_until;

pub use shepherd_test_utils::init_tracing;

pub fn name(s: &str) -> ServiceName {
    s.parse().expect("valid service name")
}

/// Registry + controller driven by a fake backend.
pub struct Harness {
    pub cfg: ConfigFile,
    pub backend: FakeBackend,
    pub registry: Arc<Registry>,
    pub controller: Arc<ProcessController<FakeBackend>>,
}

impl Harness {
    pub fn new(cfg: ConfigFile, backend: FakeBackend) -> Self {
        let registry = Arc::new(Registry::new(cfg.services.iter().map(|s| s.name.clone())));
        let controller = Arc::new(ProcessController::from_config(
            backend.clone(),
            Arc::clone(&registry),
            &cfg,
        ));
        Self {
            cfg,
            backend,
            registry,
            controller,
        }
    }

    pub fn record(&self, service: &str) -> ProcessRecord {
        self.registry
            .record(&name(service))
            .expect("service is registered")
    }

    pub fn status(&self, service: &str) -> ProcessStatus {
        self.record(service).status
    }

    pub async fn wait_for_status(&self, service: &str, status: ProcessStatus) {
        wait_until(|| self.status(service) == status).await
    }
}
