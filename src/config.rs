// SPDX-License-Identifier: GPL-3.0-only

//! User configuration
//!
//! Stored as JSON in `<config dir>/k4a-combo/config.json`. Missing fields
//! take their defaults, so older files keep loading.

use crate::constants::{CONFIG_DIR_NAME, CONFIG_FILE_NAME};
use crate::errors::SdkResult;
use crate::sdk::ComboMode;
use crate::sensor::types::TraceLevel;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SdkConfig {
    /// Backends to initialize (Azure, Orbbec or Both)
    pub combo_mode: ComboMode,
    /// Directory holding the `k4a-azure` and `k4a-orbbec` subdirectories
    /// (default: directory of the running executable)
    pub native_lib_root: Option<PathBuf>,
    /// Minimum level of native debug messages forwarded to the log
    pub trace_level: TraceLevel,
}

impl Default for SdkConfig {
    fn default() -> Self {
        Self {
            combo_mode: ComboMode::default(),
            native_lib_root: None,
            trace_level: TraceLevel::Off,
        }
    }
}

impl SdkConfig {
    /// Native library root, falling back to the executable's directory
    pub fn native_lib_root(&self) -> PathBuf {
        if let Some(root) = &self.native_lib_root {
            return root.clone();
        }
        std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Location of the configuration file, if the platform has a config dir
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    pub fn load(path: &Path) -> SdkResult<Self> {
        let text = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&text)?;
        debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Write the configuration, creating parent directories as needed
    pub fn save(&self, path: &Path) -> SdkResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text)?;
        debug!(path = %path.display(), "Saved configuration");
        Ok(())
    }

    /// Configuration from the default path, or defaults if there is none
    ///
    /// A file that exists but cannot be parsed is logged and ignored.
    pub fn load_or_default() -> Self {
        let Some(path) = Self::default_path() else {
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }
        match Self::load(&path) {
            Ok(config) => config,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring unreadable configuration");
                Self::default()
            }
        }
    }
}
