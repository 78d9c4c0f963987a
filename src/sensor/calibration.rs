// SPDX-License-Identifier: GPL-3.0-only

//! Device calibration data
//!
//! The calibration is kept as the opaque native `k4a_calibration_t` blob and
//! handed back to the SDK unchanged (transformation creation). No geometry is
//! computed on this side.

use super::formats::{ColorResolution, DepthMode};
use crate::backends::Backend;
use crate::errors::{SdkError, SdkResult};
use crate::sdk::SdkContext;

/// Size of `k4a_calibration_t` in bytes
pub const CALIBRATION_BLOB_SIZE: usize = 1032;

const DEPTH_MODE_OFFSET: usize = 1024;
const COLOR_RESOLUTION_OFFSET: usize = 1028;

// k4a_calibration_camera_t: extrinsics, intrinsics, resolution, metric radius
const CAMERA_SIZE: usize = 128;
const COLOR_CAMERA_OFFSET: usize = CAMERA_SIZE;
const EXTRINSICS_OFFSET: usize = 2 * CAMERA_SIZE;
const EXTRINSICS_SIZE: usize = 48;
const GEOMETRY_COUNT: usize = 4;
const INTRINSICS_TYPE_OFFSET: usize = 48;
const PARAMETER_COUNT_OFFSET: usize = 52;
const PARAMETERS_OFFSET: usize = 56;
const RESOLUTION_WIDTH_OFFSET: usize = 116;
const RESOLUTION_HEIGHT_OFFSET: usize = 120;
const METRIC_RADIUS_OFFSET: usize = 124;

/// `K4A_CALIBRATION_LENS_DISTORTION_MODEL_BROWN_CONRADY`
const BROWN_CONRADY_MODEL: i32 = 4;
const BROWN_CONRADY_PARAMETER_COUNT: i32 = 14;
const DUMMY_METRIC_RADIUS: f32 = 1.7;

/// Storage for one native `k4a_calibration_t`
#[derive(Clone, PartialEq, Eq)]
#[repr(C, align(4))]
pub struct CalibrationBlob(pub [u8; CALIBRATION_BLOB_SIZE]);

impl CalibrationBlob {
    pub fn zeroed() -> Self {
        CalibrationBlob([0; CALIBRATION_BLOB_SIZE])
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    fn read_i32(&self, offset: usize) -> i32 {
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(&self.0[offset..offset + 4]);
        i32::from_ne_bytes(bytes)
    }

    fn write_i32(&mut self, offset: usize, value: i32) {
        self.0[offset..offset + 4].copy_from_slice(&value.to_ne_bytes());
    }

    /// `depth_mode` field as stored by the native layer
    pub fn depth_mode(&self) -> Option<DepthMode> {
        DepthMode::from_native(self.read_i32(DEPTH_MODE_OFFSET))
    }

    /// `color_resolution` field as stored by the native layer
    pub fn color_resolution(&self) -> Option<ColorResolution> {
        ColorResolution::from_native(self.read_i32(COLOR_RESOLUTION_OFFSET))
    }

    fn write_f32(&mut self, offset: usize, value: f32) {
        self.0[offset..offset + 4].copy_from_slice(&value.to_ne_bytes());
    }

    fn read_f32(&self, offset: usize) -> f32 {
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(&self.0[offset..offset + 4]);
        f32::from_ne_bytes(bytes)
    }

    /// Identity rotation, zero translation
    fn write_identity_extrinsics(&mut self, offset: usize) {
        for diagonal in [0, 4, 8] {
            self.write_f32(offset + diagonal * 4, 1.0);
        }
    }

    /// Ideal pin-hole camera centered on the sensor, no distortion
    fn write_pinhole_camera(&mut self, offset: usize, width: u32, height: u32, fov: (f32, f32)) {
        let focus = |size: u32, fov_degrees: f32| {
            size as f32 / (2.0 * (fov_degrees.to_radians() / 2.0).tan())
        };
        let (width_f, height_f) = (width as f32, height as f32);

        self.write_identity_extrinsics(offset);
        self.write_i32(offset + INTRINSICS_TYPE_OFFSET, BROWN_CONRADY_MODEL);
        self.write_i32(offset + PARAMETER_COUNT_OFFSET, BROWN_CONRADY_PARAMETER_COUNT);
        let parameters = offset + PARAMETERS_OFFSET;
        self.write_f32(parameters, (width_f - 1.0) / 2.0);
        self.write_f32(parameters + 4, (height_f - 1.0) / 2.0);
        self.write_f32(parameters + 8, focus(width, fov.0));
        self.write_f32(parameters + 12, focus(height, fov.1));
        self.write_i32(offset + RESOLUTION_WIDTH_OFFSET, width as i32);
        self.write_i32(offset + RESOLUTION_HEIGHT_OFFSET, height as i32);
        self.write_f32(offset + METRIC_RADIUS_OFFSET, DUMMY_METRIC_RADIUS);
    }

    /// Store the mode fields the way the native layer lays them out
    pub fn set_modes(&mut self, depth_mode: DepthMode, color_resolution: ColorResolution) {
        self.write_i32(DEPTH_MODE_OFFSET, depth_mode.to_native());
        self.write_i32(COLOR_RESOLUTION_OFFSET, color_resolution.to_native());
    }
}

impl Default for CalibrationBlob {
    fn default() -> Self {
        Self::zeroed()
    }
}

impl std::fmt::Debug for CalibrationBlob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CalibrationBlob({} bytes)", CALIBRATION_BLOB_SIZE)
    }
}

/// Calibration of one device for a given depth mode and color resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Calibration {
    backend: Backend,
    depth_mode: DepthMode,
    color_resolution: ColorResolution,
    blob: CalibrationBlob,
}

impl Calibration {
    pub(crate) fn from_blob(
        backend: Backend,
        depth_mode: DepthMode,
        color_resolution: ColorResolution,
        blob: CalibrationBlob,
    ) -> Self {
        Self {
            backend,
            depth_mode,
            color_resolution,
            blob,
        }
    }

    /// Parse the raw calibration JSON read from a device or recording
    ///
    /// `raw` must include the terminating NUL, as returned by
    /// `Device::raw_calibration`.
    pub fn from_raw(
        ctx: &SdkContext,
        backend: Backend,
        raw: &[u8],
        depth_mode: DepthMode,
        color_resolution: ColorResolution,
    ) -> SdkResult<Self> {
        check_modes(depth_mode, color_resolution)?;
        if !raw.contains(&0) {
            return Err(SdkError::InvalidArgument(
                "raw calibration data must be 0-terminated".into(),
            ));
        }

        let api = ctx.ensure_enabled(backend)?;
        let mut blob = CalibrationBlob::zeroed();
        api.calibration_from_raw(raw, depth_mode, color_resolution, &mut blob)
            .map_err(|_| {
                SdkError::InvalidArgument(
                    "cannot create calibration from the raw calibration data".into(),
                )
            })?;

        Ok(Self::from_blob(backend, depth_mode, color_resolution, blob))
    }

    /// Ideal calibration with aligned sensors and nominal fields of view
    ///
    /// Good enough to create a [`Transformation`](super::transformation::Transformation)
    /// without a device, which is how the depth engine gets loaded eagerly.
    pub fn dummy(
        backend: Backend,
        depth_mode: DepthMode,
        color_resolution: ColorResolution,
    ) -> SdkResult<Self> {
        check_modes(depth_mode, color_resolution)?;

        let mut blob = CalibrationBlob::zeroed();
        if let Some(fov) = depth_mode.nominal_fov_degrees() {
            blob.write_pinhole_camera(
                0,
                depth_mode.width_pixels(),
                depth_mode.height_pixels(),
                fov,
            );
        }
        if let Some(fov) = color_resolution.nominal_fov_degrees(backend) {
            blob.write_pinhole_camera(
                COLOR_CAMERA_OFFSET,
                color_resolution.width_pixels(),
                color_resolution.height_pixels(),
                fov,
            );
        }
        for i in 0..GEOMETRY_COUNT * GEOMETRY_COUNT {
            blob.write_identity_extrinsics(EXTRINSICS_OFFSET + i * EXTRINSICS_SIZE);
        }
        blob.set_modes(depth_mode, color_resolution);

        Ok(Self::from_blob(backend, depth_mode, color_resolution, blob))
    }

    /// Backend whose SDK produced the calibration
    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub fn depth_mode(&self) -> DepthMode {
        self.depth_mode
    }

    pub fn color_resolution(&self) -> ColorResolution {
        self.color_resolution
    }

    /// Native blob
    pub fn blob(&self) -> &CalibrationBlob {
        &self.blob
    }
}

/// A calibration needs at least one of the cameras on
pub(crate) fn check_modes(
    depth_mode: DepthMode,
    color_resolution: ColorResolution,
) -> SdkResult<()> {
    if depth_mode == DepthMode::Off && color_resolution == ColorResolution::Off {
        return Err(SdkError::InvalidArgument(
            "depth_mode and color_resolution cannot be both Off".into(),
        ));
    }
    Ok(())
}
