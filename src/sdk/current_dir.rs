// SPDX-License-Identifier: GPL-3.0-only

//! Process-wide temporary change of the current directory
//!
//! Vendor SDKs locate their plug-in libraries (depth engine, firmware
//! helpers) relative to the current directory while being loaded. The
//! directory is a process-global resource, so every change goes through one
//! static lock and is undone when the guard is dropped.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

static CURRENT_DIR_LOCK: Mutex<()> = Mutex::new(());

/// Holds the current directory at a given path until dropped
pub struct CurrentDirGuard {
    target: PathBuf,
    previous: PathBuf,
    _lock: MutexGuard<'static, ()>,
}

impl CurrentDirGuard {
    /// Switch the current directory to `path`
    ///
    /// Blocks while another guard is alive on any thread.
    pub fn enter(path: &Path) -> std::io::Result<Self> {
        let lock = CURRENT_DIR_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let target = std::path::absolute(path)?;
        let previous = std::env::current_dir()?;
        std::env::set_current_dir(&target)?;
        debug!(dir = %target.display(), "Entered native library directory");

        Ok(Self {
            target,
            previous,
            _lock: lock,
        })
    }

    /// Directory that was current before the guard was created
    pub fn previous(&self) -> &Path {
        &self.previous
    }
}

impl Drop for CurrentDirGuard {
    fn drop(&mut self) {
        match std::env::current_dir() {
            Ok(current) if current != self.target => {
                warn!(
                    expected = %self.target.display(),
                    actual = %current.display(),
                    "Current directory was changed while overridden"
                );
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Failed to read current directory"),
        }

        if let Err(e) = std::env::set_current_dir(&self.previous) {
            warn!(
                dir = %self.previous.display(),
                error = %e,
                "Failed to restore current directory"
            );
        }
    }
}
