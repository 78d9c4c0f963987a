// SPDX-License-Identifier: GPL-3.0-only

//! Opened sensor devices
//!
//! Devices are addressed by a combined index across the initialized
//! backends: Azure devices come first, Orbbec devices follow.
//!
//! ```text
//! combined index:  0   1   2   3   4
//!                 [Azure 0,1] [Orbbec 0,1,2]
//! ```

use super::calibration::{Calibration, CalibrationBlob, check_modes};
use super::capture::Capture;
use super::configuration::DeviceConfiguration;
use super::formats::{ColorResolution, DepthMode};
use super::read_byte_buffer;
use super::types::{HardwareVersion, ImuSample, Timeout};
use crate::backends::{Backend, NativeApi, WaitResult};
use crate::errors::{SdkError, SdkResult};
use crate::handle::{HandleKind, HandleOwner, ListenerId, OwnerId, RawHandle};
use crate::sdk::SdkContext;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Index of the first device
pub const DEFAULT_DEVICE_INDEX: u32 = 0;

/// One opened device
#[derive(Debug)]
pub struct Device {
    owner: HandleOwner,
    index: u32,
    serial_number: String,
    version: HardwareVersion,
}

impl Device {
    /// Number of devices attached for one backend
    pub fn installed_count(ctx: &SdkContext, backend: Backend) -> SdkResult<u32> {
        let api = ctx.ensure_enabled(backend)?;
        Ok(api.device_installed_count())
    }

    /// Number of devices across every initialized backend
    pub fn total_installed_count(ctx: &SdkContext) -> u32 {
        Backend::ALL
            .into_iter()
            .filter(|b| ctx.is_initialized(*b))
            .filter_map(|b| Self::installed_count(ctx, b).ok())
            .sum()
    }

    /// Open the device at a combined index, `None` if it cannot be opened
    pub fn try_open(ctx: &SdkContext, index: u32) -> SdkResult<Option<Device>> {
        if ctx.combo_mode().is_none() {
            return Err(SdkError::Configuration(
                "No backend is initialized, call SdkContext::init first".into(),
            ));
        }
        let mut index = index;

        if ctx.is_initialized(Backend::Azure) {
            let count = Self::installed_count(ctx, Backend::Azure)?;
            if index < count {
                return Self::try_open_on(ctx, Backend::Azure, index);
            }
            index -= count;
        }

        if ctx.is_initialized(Backend::Orbbec)
            && index < Self::installed_count(ctx, Backend::Orbbec)?
        {
            return Self::try_open_on(ctx, Backend::Orbbec, index);
        }

        Ok(None)
    }

    /// Open the device at a combined index
    ///
    /// Fails with [`SdkError::DeviceNotFound`] when the index is past the
    /// installed devices and [`SdkError::DeviceOccupied`] otherwise.
    pub fn open(ctx: &SdkContext, index: u32) -> SdkResult<Device> {
        match Self::try_open(ctx, index)? {
            Some(device) => Ok(device),
            None if index >= Self::total_installed_count(ctx) => {
                Err(SdkError::DeviceNotFound { index })
            }
            None => Err(SdkError::DeviceOccupied { index }),
        }
    }

    /// Open a device by its index within one backend
    pub fn try_open_on(ctx: &SdkContext, backend: Backend, index: u32) -> SdkResult<Option<Device>> {
        let api = ctx.ensure_enabled(backend)?;
        let Some(value) = api.device_open(index) else {
            debug!(backend = %backend, index, "Device could not be opened");
            return Ok(None);
        };
        let raw = RawHandle::from_non_zero(backend, HandleKind::Device, value);
        let owner = HandleOwner::wrap(Arc::clone(&api), raw)?;

        let serial = read_byte_buffer(|buffer| api.device_serialnum(raw, buffer));
        let version = api.device_version(raw).ok();
        let (Some(serial), Some(version)) = (serial, version) else {
            warn!(handle = %raw, "Cannot read device identity, closing");
            owner.release();
            return Ok(None);
        };

        let device = Device {
            owner,
            index,
            serial_number: serial_to_string(&serial),
            version,
        };
        info!(backend = %backend, index, device = %device, "Opened device");
        Ok(Some(device))
    }

    /// Open a device by its index within one backend
    pub fn open_on(ctx: &SdkContext, backend: Backend, index: u32) -> SdkResult<Device> {
        match Self::try_open_on(ctx, backend, index)? {
            Some(device) => Ok(device),
            None if index >= Self::installed_count(ctx, backend)? => {
                Err(SdkError::DeviceNotFound { index })
            }
            None => Err(SdkError::DeviceOccupied { index }),
        }
    }

    fn api(&self) -> &Arc<dyn NativeApi> {
        self.owner.api()
    }

    fn access(&self) -> SdkResult<RawHandle> {
        self.owner.access()
    }

    pub fn backend(&self) -> Backend {
        self.owner.backend()
    }

    /// Index of the device within its backend
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn serial_number(&self) -> &str {
        &self.serial_number
    }

    pub fn version(&self) -> &HardwareVersion {
        &self.version
    }

    /// Whether the device is open and still answers
    pub fn is_connected(&self) -> bool {
        let Ok(raw) = self.access() else {
            return false;
        };
        match self.backend() {
            Backend::Azure => self.api().device_sync_jack(raw).is_ok(),
            Backend::Orbbec => self.api().device_version(raw).is_ok(),
        }
    }

    /// Sync-in and sync-out jack connection states
    pub fn sync_jack(&self) -> SdkResult<(bool, bool)> {
        let raw = self.access()?;
        self.api()
            .device_sync_jack(raw)
            .map_err(|_| self.failure(None))
    }

    /// Start streaming from the color and depth cameras
    pub fn start_cameras(&self, config: &DeviceConfiguration) -> SdkResult<()> {
        config.validate(self.backend())?;
        let raw = self.access()?;
        self.api().device_start_cameras(raw, config).map_err(|_| {
            self.failure(Some(
                "Cameras streaming is already running, or invalid configuration specified.",
            ))
        })?;
        debug!(device = %self, ?config, "Cameras started");
        Ok(())
    }

    pub fn stop_cameras(&self) -> SdkResult<()> {
        let raw = self.access()?;
        self.api().device_stop_cameras(raw);
        Ok(())
    }

    /// Start the IMU; the cameras must be streaming
    pub fn start_imu(&self) -> SdkResult<()> {
        let raw = self.access()?;
        self.api().device_start_imu(raw).map_err(|_| {
            self.failure(Some(
                "IMU streaming is already running or cameras streaming is not running.",
            ))
        })
    }

    pub fn stop_imu(&self) -> SdkResult<()> {
        let raw = self.access()?;
        self.api().device_stop_imu(raw);
        Ok(())
    }

    /// Wait for the next capture, `None` on timeout
    pub fn try_get_capture(&self, timeout: Timeout) -> SdkResult<Option<Capture>> {
        let raw = self.access()?;
        match self.api().device_get_capture(raw, timeout) {
            WaitResult::Ready(value) => {
                let capture = RawHandle::from_non_zero(raw.backend(), HandleKind::Capture, value);
                let owner = HandleOwner::wrap(Arc::clone(self.api()), capture)?;
                Ok(Some(Capture::from_owner(owner)))
            }
            WaitResult::Timeout => Ok(None),
            WaitResult::Failed => Err(self.failure(Some(
                "Cameras streaming is not running or has been stopped.",
            ))),
        }
    }

    /// Wait for the next capture without timeout
    pub fn get_capture(&self) -> SdkResult<Capture> {
        self.try_get_capture(Timeout::INFINITE)?
            .ok_or_else(|| SdkError::Failed("Capture wait without timeout timed out".into()))
    }

    /// Wait for the next IMU sample, `None` on timeout
    pub fn try_get_imu_sample(&self, timeout: Timeout) -> SdkResult<Option<ImuSample>> {
        let raw = self.access()?;
        match self.api().device_get_imu_sample(raw, timeout) {
            WaitResult::Ready(sample) => Ok(Some(sample)),
            WaitResult::Timeout => Ok(None),
            WaitResult::Failed => Err(self.failure(Some(
                "IMU streaming is not running or has been stopped.",
            ))),
        }
    }

    pub fn get_imu_sample(&self) -> SdkResult<ImuSample> {
        self.try_get_imu_sample(Timeout::INFINITE)?
            .ok_or_else(|| SdkError::Failed("IMU wait without timeout timed out".into()))
    }

    /// Raw calibration JSON, including the terminating NUL
    pub fn raw_calibration(&self) -> SdkResult<Vec<u8>> {
        let raw = self.access()?;
        read_byte_buffer(|buffer| self.api().device_raw_calibration(raw, buffer))
            .ok_or_else(|| self.failure(None))
    }

    /// Calibration for the given camera modes
    pub fn calibration(
        &self,
        depth_mode: DepthMode,
        color_resolution: ColorResolution,
    ) -> SdkResult<Calibration> {
        check_modes(depth_mode, color_resolution)?;
        let backend = self.backend();
        if !ColorResolution::supported_by(backend).contains(&color_resolution) {
            return Err(SdkError::Unsupported(format!(
                "Resolution {:?} is not supported by {} devices",
                color_resolution, backend
            )));
        }

        let raw = self.access()?;
        let mut blob = CalibrationBlob::zeroed();
        self.api()
            .device_calibration(raw, depth_mode, color_resolution, &mut blob)
            .map_err(|_| self.failure(None))?;
        Ok(Calibration::from_blob(backend, depth_mode, color_resolution, blob))
    }

    /// Close the device
    ///
    /// Returns `true` if this call closed it.
    pub fn release(&self) -> bool {
        self.owner.release()
    }

    pub fn is_disposed(&self) -> bool {
        self.owner.is_disposed()
    }

    pub fn on_disposed<F>(&self, listener: F) -> Option<ListenerId>
    where
        F: FnOnce(OwnerId) + Send + 'static,
    {
        self.owner.on_disposed(listener)
    }

    /// Error for a failed native call
    ///
    /// A released device reports [`SdkError::Disposed`], an unreachable one
    /// [`SdkError::ConnectionLost`].
    fn failure(&self, message: Option<&str>) -> SdkError {
        if let Err(e) = self.access() {
            return e;
        }
        if !self.is_connected() {
            warn!(device = %self, "Connection lost");
            return SdkError::ConnectionLost { index: self.index };
        }
        SdkError::Failed(
            message
                .unwrap_or("Unspecified error in Sensor SDK. See logs for details.")
                .to_string(),
        )
    }
}

impl std::fmt::Display for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.backend() {
            Backend::Azure => write!(f, "Azure Kinect #{}", self.serial_number),
            Backend::Orbbec => write!(f, "Orbbec Femto #{}", self.serial_number),
        }
    }
}

/// Serial number bytes without the terminating NUL
fn serial_to_string(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}
