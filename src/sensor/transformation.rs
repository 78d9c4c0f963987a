// SPDX-License-Identifier: GPL-3.0-only

//! Image transformations between the depth and color cameras
//!
//! All images are checked for format and geometry before the native call.
//! Output images are allocated by the caller and filled in place.

use super::calibration::Calibration;
use super::formats::{ColorResolution, DepthMode, ImageFormat};
use super::image::Image;
use super::types::CalibrationGeometry;
use crate::backends::{Backend, NativeApi};
use crate::errors::{SdkError, SdkResult};
use crate::handle::{HandleKind, HandleOwner, ListenerId, OwnerId, RawHandle};
use crate::sdk::SdkContext;
use std::sync::Arc;
use tracing::debug;

/// Pre-computed lookup tables for one calibration
///
/// Creating it loads the depth engine of the calibration's backend.
#[derive(Debug)]
pub struct Transformation {
    owner: HandleOwner,
    depth_mode: DepthMode,
    color_resolution: ColorResolution,
}

impl Transformation {
    pub fn new(ctx: &SdkContext, calibration: &Calibration) -> SdkResult<Self> {
        let backend = calibration.backend();
        let api = ctx.ensure_enabled(backend)?;
        let value = api.transformation_create(calibration.blob()).ok_or_else(|| {
            SdkError::InvalidHandle(
                "Cannot create transformation object from specified calibration data or depth engine library cannot be found".into(),
            )
        })?;
        let raw = RawHandle::from_non_zero(backend, HandleKind::Transformation, value);
        debug!(handle = %raw, depth_mode = ?calibration.depth_mode(), "Created transformation");
        Ok(Self {
            owner: HandleOwner::wrap(api, raw)?,
            depth_mode: calibration.depth_mode(),
            color_resolution: calibration.color_resolution(),
        })
    }

    fn api(&self) -> &Arc<dyn NativeApi> {
        self.owner.api()
    }

    pub fn backend(&self) -> Backend {
        self.owner.backend()
    }

    pub fn depth_mode(&self) -> DepthMode {
        self.depth_mode
    }

    pub fn color_resolution(&self) -> ColorResolution {
        self.color_resolution
    }

    /// Map a depth image into the geometry of the color camera
    pub fn depth_image_to_color_camera(
        &self,
        depth_image: &Image,
        transformed_depth_image: &Image,
    ) -> SdkResult<()> {
        let raw = self.owner.access()?;
        let (width, height) = self.depth_size();
        let depth = self.check_image("depth_image", depth_image, ImageFormat::Depth16, width, height)?;
        let (width, height) = self.color_size();
        let transformed = self.check_image(
            "transformed_depth_image",
            transformed_depth_image,
            ImageFormat::Depth16,
            width,
            height,
        )?;

        self.api()
            .transformation_depth_to_color(raw, depth, transformed)
            .map_err(|_| {
                SdkError::Failed(
                    "Failed to transform specified depth image to color camera".into(),
                )
            })
    }

    /// Map a color image into the geometry of the depth camera
    pub fn color_image_to_depth_camera(
        &self,
        depth_image: &Image,
        color_image: &Image,
        transformed_color_image: &Image,
    ) -> SdkResult<()> {
        let raw = self.owner.access()?;
        let (depth_width, depth_height) = self.depth_size();
        let (color_width, color_height) = self.color_size();
        let depth = self.check_image(
            "depth_image",
            depth_image,
            ImageFormat::Depth16,
            depth_width,
            depth_height,
        )?;
        let color = self.check_image(
            "color_image",
            color_image,
            ImageFormat::ColorBgra32,
            color_width,
            color_height,
        )?;
        let transformed = self.check_image(
            "transformed_color_image",
            transformed_color_image,
            ImageFormat::ColorBgra32,
            depth_width,
            depth_height,
        )?;

        self.api()
            .transformation_color_to_depth(raw, depth, color, transformed)
            .map_err(|_| {
                SdkError::Failed("Failed to transform specified color image to depth camera".into())
            })
    }

    /// Compute XYZ points in millimeters, three `i16` per pixel
    ///
    /// `geometry` selects the camera whose coordinates the points use and must
    /// be [`CalibrationGeometry::Depth`] or [`CalibrationGeometry::Color`].
    pub fn depth_image_to_point_cloud(
        &self,
        depth_image: &Image,
        geometry: CalibrationGeometry,
        xyz_image: &Image,
    ) -> SdkResult<()> {
        let raw = self.owner.access()?;
        let (width, height) = match geometry {
            CalibrationGeometry::Depth => self.depth_size(),
            CalibrationGeometry::Color => self.color_size(),
            other => {
                return Err(SdkError::InvalidArgument(format!(
                    "Point cloud cannot be computed in coordinates of {:?} geometry",
                    other
                )));
            }
        };
        let depth = self.check_image("depth_image", depth_image, ImageFormat::Depth16, width, height)?;
        let xyz = self.check_image("xyz_image", xyz_image, ImageFormat::Custom, width, height)?;

        let stride = xyz_image.stride_bytes()?;
        if u64::from(stride) < 6 * u64::from(width) {
            return Err(SdkError::InvalidArgument(format!(
                "{} must have a stride in bytes of at least 6 times its width in pixels",
                xyz_image
            )));
        }

        self.api()
            .transformation_depth_to_point_cloud(raw, depth, geometry, xyz)
            .map_err(|_| {
                SdkError::Failed(format!(
                    "Failed to transform specified depth image to point cloud in coordinates of {:?} camera",
                    geometry
                ))
            })
    }

    fn depth_size(&self) -> (u32, u32) {
        (self.depth_mode.width_pixels(), self.depth_mode.height_pixels())
    }

    fn color_size(&self) -> (u32, u32) {
        (
            self.color_resolution.width_pixels(),
            self.color_resolution.height_pixels(),
        )
    }

    /// Validate one image argument and return its handle
    fn check_image(
        &self,
        name: &str,
        image: &Image,
        format: ImageFormat,
        width: u32,
        height: u32,
    ) -> SdkResult<RawHandle> {
        let raw = image.access()?;
        if raw.backend() != self.backend() {
            return Err(SdkError::BackendMismatch {
                expected: self.backend(),
                actual: raw.backend(),
            });
        }

        let actual = image.format()?;
        if actual != format {
            return Err(SdkError::InvalidArgument(format!(
                "{} must have {} format but has {}",
                name, format, actual
            )));
        }
        let actual = image.width_pixels()?;
        if actual != width {
            return Err(SdkError::InvalidArgument(format!(
                "{} must have {} width in pixels but has {}",
                name, width, actual
            )));
        }
        let actual = image.height_pixels()?;
        if actual != height {
            return Err(SdkError::InvalidArgument(format!(
                "{} must have {} height in pixels but has {}",
                name, height, actual
            )));
        }
        Ok(raw)
    }

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
}
