// src/status/publisher.rs

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::Local;
use parking_lot::Mutex;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use super::SupervisorStatus;
use crate::engine::Registry;
use crate::errors::Result;
use crate::fs::FileSystem;

/// Where status snapshots are published.
pub trait StatusOutbox: Send + Sync + std::fmt::Debug {
    fn publish(&self, status: &SupervisorStatus) -> Result<()>;
}

/// Writes the snapshot as pretty JSON to a file.
///
/// The document goes to `<file>.tmp` first and is then renamed over the
/// target, so a reader never observes a partial write. Publishes through
/// one outbox (and its clones) are serialized, since they share the temp
/// file.
#[derive(Debug, Clone)]
pub struct FileOutbox<F: FileSystem> {
    fs: F,
    path: PathBuf,
    tmp_path: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl<F: FileSystem> FileOutbox<F> {
    pub fn new(fs: F, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let tmp_path = tmp_sibling(&path);
        Self {
            fs,
            path,
            tmp_path,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl<F: FileSystem> StatusOutbox for FileOutbox<F> {
    fn publish(&self, status: &SupervisorStatus) -> Result<()> {
        let json = serde_json::to_vec_pretty(status)?;
        let _guard = self.write_lock.lock();
        self.fs.write(&self.tmp_path, &json)?;
        self.fs
            .rename(&self.tmp_path, &self.path)
            .with_context(|| format!("publishing status to {:?}", self.path))?;
        Ok(())
    }
}

fn tmp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| OsString::from("status"));
    name.push(".tmp");
    path.with_file_name(name)
}

/// Status Publisher: rebuilds the full aggregate from the registry and
/// hands it to the outbox, on a timer and on demand.
#[derive(Debug, Clone)]
pub struct StatusPublisher {
    registry: Arc<Registry>,
    outbox: Arc<dyn StatusOutbox>,
    interval: Duration,
}

impl StatusPublisher {
    pub fn new(registry: Arc<Registry>, outbox: Arc<dyn StatusOutbox>, interval: Duration) -> Self {
        Self {
            registry,
            outbox,
            interval,
        }
    }

    /// Publish one snapshot now. Failures are logged and reported as
    /// `false`; they never propagate.
    pub fn publish_now(&self) -> bool {
        let snapshot = self.registry.snapshot(Local::now());
        match self.outbox.publish(&snapshot) {
            Ok(()) => {
                debug!(services = snapshot.services.len(), "status published");
                true
            }
            Err(e) => {
                error!(error = %e, "Error writing status file");
                false
            }
        }
    }

    /// Publish every `interval` until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // Skip the immediate first tick; the caller publishes on startup.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.publish_now();
                }
            }
        }
        debug!("status publisher stopped");
    }
}
