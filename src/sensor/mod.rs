// SPDX-License-Identifier: GPL-3.0-only

//! Sensor resources: devices, captures, images and transformations
//!
//! Every resource owns its native handle through a
//! [`HandleOwner`](crate::handle::HandleOwner) and remembers the backend it
//! was created with. Operations combining several resources reject handles
//! of the other backend.

pub mod calibration;
pub mod capture;
pub mod configuration;
pub mod depth_engine;
pub mod device;
pub mod formats;
pub mod image;
pub mod transformation;
pub mod types;

pub use calibration::Calibration;
pub use capture::Capture;
pub use configuration::{DeviceConfiguration, WiredSyncMode};
pub use depth_engine::DepthEngineHelper;
pub use device::Device;
pub use formats::{ColorResolution, DepthMode, FrameRate, ImageFormat};
pub use image::Image;
pub use transformation::Transformation;
pub use types::{CalibrationGeometry, FirmwareVersion, HardwareVersion, ImuSample, Timeout, TraceLevel};

use crate::backends::BufferResult;

/// Read a variable-length value through the native size-query protocol
///
/// The first call passes an empty buffer to learn the size, the second one
/// fills a buffer of that size. Returns `None` if either call fails.
pub(crate) fn read_byte_buffer<F>(mut read: F) -> Option<Vec<u8>>
where
    F: FnMut(&mut [u8]) -> BufferResult,
{
    let size = match read(&mut []) {
        BufferResult::Succeeded(_) => return Some(Vec::new()),
        BufferResult::TooSmall(size) if size > 0 => size,
        _ => return None,
    };

    let mut buffer = vec![0u8; size];
    match read(&mut buffer) {
        BufferResult::Succeeded(written) => {
            buffer.truncate(written.min(size));
            Some(buffer)
        }
        _ => None,
    }
}
