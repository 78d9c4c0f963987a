// SPDX-License-Identifier: GPL-3.0-only

//! Crate-wide constants

/// Directory under the user config dir holding the configuration
pub const CONFIG_DIR_NAME: &str = "k4a-combo";

/// Configuration file name
pub const CONFIG_FILE_NAME: &str = "config.json";

/// Native library naming
pub mod native {
    /// Base name of the sensor SDK library in both vendor stacks
    pub const K4A_LIBRARY_NAME: &str = "k4a";

    /// Base name of the Azure depth engine plug-in
    pub const DEPTHENGINE_LIBRARY_NAME: &str = "depthengine_2_0";
}

/// Timing defaults of the command-line tool
pub mod timing {
    /// Default wait for one capture in `probe`
    pub const PROBE_TIMEOUT_MS: u32 = 1000;

    /// Default number of captures read by `probe`
    pub const PROBE_CAPTURES: u32 = 5;
}

/// Build information
pub mod app_info {
    /// Version from the build environment (git describe or override)
    pub fn version() -> &'static str {
        env!("GIT_VERSION")
    }
}
