// SPDX-License-Identifier: GPL-3.0-only

//! Device streaming configuration

use super::formats::{ColorResolution, DepthMode, FrameRate, ImageFormat};
use crate::backends::Backend;
use crate::errors::{SdkError, SdkResult};
use serde::{Deserialize, Serialize};

/// Role of a device in a wired multi-device setup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(i32)]
pub enum WiredSyncMode {
    /// No external synchronization
    #[default]
    Standalone = 0,
    /// Drives the sync-out jack
    Master = 1,
    /// Follows the signal on the sync-in jack
    Subordinate = 2,
}

impl WiredSyncMode {
    pub fn to_native(self) -> i32 {
        self as i32
    }
}

/// Camera configuration passed to `Device::start_cameras`
///
/// Mirrors `k4a_device_configuration_t` field for field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfiguration {
    pub color_format: ImageFormat,
    pub color_resolution: ColorResolution,
    pub depth_mode: DepthMode,
    pub camera_fps: FrameRate,
    /// Only deliver captures that contain both color and depth images
    pub synchronized_images_only: bool,
    /// Delay of the depth capture relative to color, may be negative
    pub depth_delay_off_color_usec: i32,
    pub wired_sync_mode: WiredSyncMode,
    pub subordinate_delay_off_master_usec: u32,
    /// Turn off the streaming LED
    pub disable_streaming_indicator: bool,
}

impl DeviceConfiguration {
    /// Everything off, equivalent of `K4A_DEVICE_CONFIG_INIT_DISABLE_ALL`
    pub const DISABLE_ALL: DeviceConfiguration = DeviceConfiguration {
        color_format: ImageFormat::ColorMjpg,
        color_resolution: ColorResolution::Off,
        depth_mode: DepthMode::Off,
        camera_fps: FrameRate::Thirty,
        synchronized_images_only: false,
        depth_delay_off_color_usec: 0,
        wired_sync_mode: WiredSyncMode::Standalone,
        subordinate_delay_off_master_usec: 0,
        disable_streaming_indicator: false,
    };

    /// Check the configuration against what devices of `backend` can stream
    pub fn validate(&self, backend: Backend) -> SdkResult<()> {
        if !self.color_format.is_color() {
            return Err(SdkError::InvalidArgument(format!(
                "color_format = {} cannot be used for color camera",
                self.color_format
            )));
        }
        if !self.depth_mode.is_compatible_with(self.camera_fps) {
            return Err(SdkError::InvalidArgument(format!(
                "camera_fps = {} Hz is not compatible with depth_mode = {:?}",
                self.camera_fps.hz(),
                self.depth_mode
            )));
        }
        if !self
            .color_resolution
            .is_compatible_with_frame_rate(self.camera_fps, backend)
        {
            return Err(SdkError::InvalidArgument(format!(
                "camera_fps = {} Hz is not compatible with color_resolution = {:?} on {}",
                self.camera_fps.hz(),
                self.color_resolution,
                backend
            )));
        }
        if self.color_resolution != ColorResolution::Off
            && !self
                .color_resolution
                .is_compatible_with_format(self.color_format, backend)
        {
            return Err(SdkError::InvalidArgument(format!(
                "color_format = {} is not compatible with color_resolution = {:?} on {}",
                self.color_format, self.color_resolution, backend
            )));
        }
        Ok(())
    }
}

impl Default for DeviceConfiguration {
    fn default() -> Self {
        Self::DISABLE_ALL
    }
}
