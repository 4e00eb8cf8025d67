// src/command/inbox.rs

use std::path::{Path, PathBuf};

use crate::errors::Result;
use crate::fs::FileSystem;

/// Source of operator command payloads.
pub trait CommandInbox: Send + Sync + std::fmt::Debug {
    /// Return the pending payload, if any, and leave the inbox empty.
    fn take(&self) -> Result<Option<String>>;
}

/// Command inbox backed by a file.
///
/// A missing or blank file means "no command". A non-blank file is truncated
/// before its payload is handed out, so each command is consumed at most
/// once whether or not it parses.
#[derive(Debug, Clone)]
pub struct FileInbox<F: FileSystem> {
    fs: F,
    path: PathBuf,
}

impl<F: FileSystem> FileInbox<F> {
    pub fn new(fs: F, path: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            path: path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl<F: FileSystem> CommandInbox for FileInbox<F> {
    fn take(&self) -> Result<Option<String>> {
        if !self.fs.exists(&self.path) {
            return Ok(None);
        }
        let raw = match self.fs.read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) => {
                // Unreadable payloads are discarded too.
                let _ = self.fs.write(&self.path, b"");
                return Err(e.into());
            }
        };
        if raw.trim().is_empty() {
            return Ok(None);
        }

        self.fs.write(&self.path, b"")?;
        Ok(Some(raw))
    }
}
