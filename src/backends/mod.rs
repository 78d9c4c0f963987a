// SPDX-License-Identifier: MPL-2.0

//! Native dispatch tables for the two sensor SDKs
//!
//! Both SDKs export the same `k4a_*` C API, but their binaries are not
//! interchangeable: a handle produced by one library must only ever be handed
//! back to that same library. Every call therefore goes through a
//! [`NativeApi`] table that is bound to exactly one [`Backend`].
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │        Sensor resources (sensor::*)          │
//! └────────────────────┬────────────────────────┘
//!                      │ Arc<dyn NativeApi>
//! ┌────────────────────┴────────────────────────┐
//! │              Backend Layer                   │
//! │  ┌─────────────┐    ┌──────────────────┐   │
//! │  │  LoadedApi  │    │    VirtualSdk    │   │
//! │  │ (libloading)│    │   (in-memory)    │   │
//! │  └─────────────┘    └──────────────────┘   │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`library`]: Dispatch table resolved from a native `k4a` shared library
//! - [`logging`]: Forwarding of native debug messages into `tracing`
//! - [`virtual_sdk`]: In-memory SDK simulation for tests and dry runs

pub mod library;
pub mod logging;
pub mod virtual_sdk;

use crate::handle::RawHandle;
use crate::sensor::calibration::CalibrationBlob;
use crate::sensor::configuration::DeviceConfiguration;
use crate::sensor::formats::{ColorResolution, DepthMode, ImageFormat};
use crate::sensor::types::{CalibrationGeometry, HardwareVersion, ImuSample, Timeout, TraceLevel};
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;

/// Native SDK family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Backend {
    /// Original Azure Kinect Sensor SDK
    Azure,
    /// Orbbec SDK K4A Wrapper
    Orbbec,
}

impl Backend {
    /// Both backends, in device-indexing order
    pub const ALL: [Backend; 2] = [Backend::Azure, Backend::Orbbec];

    /// Lowercase identifier used in handle names and log fields
    pub fn as_str(self) -> &'static str {
        match self {
            Backend::Azure => "azure",
            Backend::Orbbec => "orbbec",
        }
    }

    /// Subdirectory of the native library root holding this backend's binaries
    pub fn library_subdirectory(self) -> &'static str {
        match self {
            Backend::Azure => "k4a-azure",
            Backend::Orbbec => "k4a-orbbec",
        }
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Backend::Azure => write!(f, "Azure"),
            Backend::Orbbec => write!(f, "Orbbec"),
        }
    }
}

impl std::str::FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "azure" => Ok(Backend::Azure),
            "orbbec" => Ok(Backend::Orbbec),
            other => Err(format!("unknown backend: {}", other)),
        }
    }
}

/// Native call reported `K4A_RESULT_FAILED`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeFailure;

impl std::fmt::Display for NativeFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "K4A_RESULT_FAILED")
    }
}

/// Outcome of a native call returning `k4a_result_t`
pub type NativeResult<T = ()> = Result<T, NativeFailure>;

/// Outcome of a native call returning `k4a_wait_result_t`
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WaitResult<T> {
    Ready(T),
    Timeout,
    Failed,
}

/// Outcome of a native call returning `k4a_buffer_result_t`
///
/// Both success and too-small carry the size the native layer requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferResult {
    Succeeded(usize),
    TooSmall(usize),
    Failed,
}

/// Image slot of a capture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CaptureSlot {
    Color,
    Depth,
    Ir,
}

impl std::fmt::Display for CaptureSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CaptureSlot::Color => write!(f, "color"),
            CaptureSlot::Depth => write!(f, "depth"),
            CaptureSlot::Ir => write!(f, "ir"),
        }
    }
}

/// Dispatch table over one backend's `k4a_*` entry points
///
/// Creation calls return the raw pointer value, `None` standing for the null
/// handle. Every other call takes a [`RawHandle`] that was produced by this
/// same table; callers guarantee that invariant.
pub trait NativeApi: Send + Sync {
    /// Backend this table talks to
    fn backend(&self) -> Backend;

    // ===== Reference counting =====

    /// Drop one native reference (`*_release`, `k4a_device_close`, ...)
    fn release(&self, handle: RawHandle);

    /// Add one native reference to a capture or image
    fn add_reference(&self, handle: RawHandle) -> NativeResult;

    // ===== Device =====

    fn device_installed_count(&self) -> u32;

    fn device_open(&self, index: u32) -> Option<NonZeroUsize>;

    /// Copy the serial number (NUL-terminated) into `buffer`
    fn device_serialnum(&self, device: RawHandle, buffer: &mut [u8]) -> BufferResult;

    /// Copy the raw calibration JSON into `buffer`
    fn device_raw_calibration(&self, device: RawHandle, buffer: &mut [u8]) -> BufferResult;

    /// Sync-in and sync-out jack states
    fn device_sync_jack(&self, device: RawHandle) -> NativeResult<(bool, bool)>;

    fn device_version(&self, device: RawHandle) -> NativeResult<HardwareVersion>;

    fn device_start_cameras(&self, device: RawHandle, config: &DeviceConfiguration)
    -> NativeResult;

    fn device_stop_cameras(&self, device: RawHandle);

    fn device_start_imu(&self, device: RawHandle) -> NativeResult;

    fn device_stop_imu(&self, device: RawHandle);

    fn device_get_capture(&self, device: RawHandle, timeout: Timeout) -> WaitResult<NonZeroUsize>;

    fn device_get_imu_sample(&self, device: RawHandle, timeout: Timeout) -> WaitResult<ImuSample>;

    fn device_calibration(
        &self,
        device: RawHandle,
        depth_mode: DepthMode,
        color_resolution: ColorResolution,
        calibration: &mut CalibrationBlob,
    ) -> NativeResult;

    // ===== Calibration =====

    fn calibration_from_raw(
        &self,
        raw: &[u8],
        depth_mode: DepthMode,
        color_resolution: ColorResolution,
        calibration: &mut CalibrationBlob,
    ) -> NativeResult;

    // ===== Capture =====

    fn capture_create(&self) -> Option<NonZeroUsize>;

    /// Image stored in `slot`; the returned handle carries a new reference
    fn capture_image(&self, capture: RawHandle, slot: CaptureSlot) -> Option<NonZeroUsize>;

    /// Replace the image in `slot`; the capture takes its own reference
    fn capture_set_image(&self, capture: RawHandle, slot: CaptureSlot, image: Option<RawHandle>);

    fn capture_temperature_c(&self, capture: RawHandle) -> f32;

    fn capture_set_temperature_c(&self, capture: RawHandle, temperature: f32);

    // ===== Image =====

    fn image_create(
        &self,
        format: ImageFormat,
        width: i32,
        height: i32,
        stride: i32,
    ) -> Option<NonZeroUsize>;

    fn image_format(&self, image: RawHandle) -> ImageFormat;

    fn image_width(&self, image: RawHandle) -> i32;

    fn image_height(&self, image: RawHandle) -> i32;

    fn image_stride(&self, image: RawHandle) -> i32;

    fn image_size(&self, image: RawHandle) -> usize;

    fn image_device_timestamp_usec(&self, image: RawHandle) -> u64;

    fn image_set_device_timestamp_usec(&self, image: RawHandle, timestamp: u64);

    fn image_system_timestamp_nsec(&self, image: RawHandle) -> u64;

    fn image_exposure_usec(&self, image: RawHandle) -> u64;

    fn image_white_balance(&self, image: RawHandle) -> u32;

    fn image_iso_speed(&self, image: RawHandle) -> u32;

    /// Copy the whole pixel buffer out
    fn image_read(&self, image: RawHandle) -> Vec<u8>;

    /// Overwrite the pixel buffer; `data` length equals `image_size`
    fn image_write(&self, image: RawHandle, data: &[u8]);

    // ===== Transformation =====

    fn transformation_create(&self, calibration: &CalibrationBlob) -> Option<NonZeroUsize>;

    fn transformation_depth_to_color(
        &self,
        transformation: RawHandle,
        depth: RawHandle,
        transformed_depth: RawHandle,
    ) -> NativeResult;

    fn transformation_color_to_depth(
        &self,
        transformation: RawHandle,
        depth: RawHandle,
        color: RawHandle,
        transformed_color: RawHandle,
    ) -> NativeResult;

    fn transformation_depth_to_point_cloud(
        &self,
        transformation: RawHandle,
        depth: RawHandle,
        geometry: CalibrationGeometry,
        xyz: RawHandle,
    ) -> NativeResult;

    // ===== Depth engine =====

    /// Create the Orbbec depth-engine helper
    ///
    /// Tables without the helper entry points return `None`.
    fn depth_engine_helper_create(&self) -> Option<NonZeroUsize> {
        None
    }

    // ===== Logging =====

    /// Install (or with [`TraceLevel::Off`] clear) the debug message handler
    fn set_debug_message_handler(&self, min_level: TraceLevel) -> NativeResult;
}
