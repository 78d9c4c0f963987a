// SPDX-License-Identifier: GPL-3.0-only

//! Image buffers

use super::formats::ImageFormat;
use crate::backends::{Backend, NativeApi};
use crate::errors::{SdkError, SdkResult};
use crate::handle::{
    HandleKind, HandleOwner, ListenerId, OwnerId, RawHandle, ReferenceDuplicatable,
};
use crate::sdk::SdkContext;
use std::sync::Arc;
use tracing::debug;

/// Image owned by the caller or handed out by a capture
///
/// Images obtained from a [`Capture`](super::capture::Capture) are released
/// together with that capture at the latest.
#[derive(Debug)]
pub struct Image {
    owner: HandleOwner,
}

impl Image {
    /// Allocate an image in native memory
    ///
    /// `stride` is in bytes; zero lets the native layer derive it from the
    /// format. For formats with a known pixel size a non-zero stride must
    /// cover a full row.
    pub fn new(
        ctx: &SdkContext,
        backend: Backend,
        format: ImageFormat,
        width: u32,
        height: u32,
        stride: u32,
    ) -> SdkResult<Self> {
        validate_geometry(format, width, height, stride)?;
        let api = ctx.ensure_enabled(backend)?;

        let value = api
            .image_create(format, width as i32, height as i32, stride as i32)
            .ok_or_else(|| {
                SdkError::InvalidArgument(format!(
                    "Cannot create image with format {}, size {}x{} pixels and stride {} bytes",
                    format, width, height, stride
                ))
            })?;

        let raw = RawHandle::from_non_zero(backend, HandleKind::Image, value);
        debug!(handle = %raw, %format, width, height, "Created image");
        Ok(Self::from_owner(HandleOwner::wrap(api, raw)?))
    }

    /// Allocate an image with the tightest stride for `format`
    pub fn with_default_stride(
        ctx: &SdkContext,
        backend: Backend,
        format: ImageFormat,
        width: u32,
        height: u32,
    ) -> SdkResult<Self> {
        let stride = format.stride_bytes(width).ok_or_else(|| {
            SdkError::InvalidArgument(format!(
                "Cannot derive stride from width for {} format",
                format
            ))
        })?;
        Self::new(ctx, backend, format, width, height, stride)
    }

    pub(crate) fn from_owner(owner: HandleOwner) -> Self {
        Self { owner }
    }

    fn api(&self) -> &Arc<dyn NativeApi> {
        self.owner.api()
    }

    /// Raw handle for native calls, failing once released
    pub(crate) fn access(&self) -> SdkResult<RawHandle> {
        self.owner.access()
    }

    pub fn backend(&self) -> Backend {
        self.owner.backend()
    }

    /// Identity of this owner of the native image
    pub fn id(&self) -> OwnerId {
        self.owner.id()
    }

    pub fn format(&self) -> SdkResult<ImageFormat> {
        let raw = self.access()?;
        Ok(self.api().image_format(raw))
    }

    pub fn width_pixels(&self) -> SdkResult<u32> {
        let raw = self.access()?;
        Ok(self.api().image_width(raw).max(0) as u32)
    }

    pub fn height_pixels(&self) -> SdkResult<u32> {
        let raw = self.access()?;
        Ok(self.api().image_height(raw).max(0) as u32)
    }

    pub fn stride_bytes(&self) -> SdkResult<u32> {
        let raw = self.access()?;
        Ok(self.api().image_stride(raw).max(0) as u32)
    }

    /// Size of the pixel buffer in bytes
    pub fn size_bytes(&self) -> SdkResult<usize> {
        let raw = self.access()?;
        Ok(self.api().image_size(raw))
    }

    /// Device timestamp in microseconds
    pub fn device_timestamp_usec(&self) -> SdkResult<u64> {
        let raw = self.access()?;
        Ok(self.api().image_device_timestamp_usec(raw))
    }

    pub fn set_device_timestamp_usec(&self, timestamp: u64) -> SdkResult<()> {
        let raw = self.access()?;
        self.api().image_set_device_timestamp_usec(raw, timestamp);
        Ok(())
    }

    /// Host timestamp in nanoseconds
    pub fn system_timestamp_nsec(&self) -> SdkResult<u64> {
        let raw = self.access()?;
        Ok(self.api().image_system_timestamp_nsec(raw))
    }

    pub fn exposure_usec(&self) -> SdkResult<u64> {
        let raw = self.access()?;
        Ok(self.api().image_exposure_usec(raw))
    }

    /// White balance in Kelvin, zero for non-color images
    pub fn white_balance(&self) -> SdkResult<u32> {
        let raw = self.access()?;
        Ok(self.api().image_white_balance(raw))
    }

    pub fn iso_speed(&self) -> SdkResult<u32> {
        let raw = self.access()?;
        Ok(self.api().image_iso_speed(raw))
    }

    /// Copy of the pixel buffer
    pub fn copy_to_vec(&self) -> SdkResult<Vec<u8>> {
        let raw = self.access()?;
        Ok(self.api().image_read(raw))
    }

    /// Overwrite the pixel buffer; `data` must be exactly `size_bytes` long
    pub fn copy_from_slice(&self, data: &[u8]) -> SdkResult<()> {
        let raw = self.access()?;
        let size = self.api().image_size(raw);
        if data.len() != size {
            return Err(SdkError::InvalidArgument(format!(
                "Buffer of {} bytes does not match image size of {} bytes",
                data.len(),
                size
            )));
        }
        self.api().image_write(raw, data);
        Ok(())
    }

    /// Release this owner's native reference
    ///
    /// Returns `true` if this call released it.
    pub fn release(&self) -> bool {
        self.owner.release()
    }

    pub fn is_disposed(&self) -> bool {
        self.owner.is_disposed()
    }

    /// Register a one-shot callback fired after the native release
    pub fn on_disposed<F>(&self, listener: F) -> Option<ListenerId>
    where
        F: FnOnce(OwnerId) + Send + 'static,
    {
        self.owner.on_disposed(listener)
    }

    /// Whether both images refer to the same native image
    pub fn same_native_image(&self, other: &Image) -> bool {
        self.owner.raw() == other.owner.raw()
    }
}

impl ReferenceDuplicatable for Image {
    fn duplicate_reference(&self) -> SdkResult<Self> {
        Ok(Self::from_owner(self.owner.duplicate()?))
    }
}

impl std::fmt::Display for Image {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.owner)
    }
}

/// Check image dimensions before any native call
pub(crate) fn validate_geometry(
    format: ImageFormat,
    width: u32,
    height: u32,
    stride: u32,
) -> SdkResult<()> {
    if width == 0 || width > i32::MAX as u32 {
        return Err(SdkError::InvalidArgument(format!(
            "width must be positive, got {}",
            width
        )));
    }
    if height == 0 || height > i32::MAX as u32 {
        return Err(SdkError::InvalidArgument(format!(
            "height must be positive, got {}",
            height
        )));
    }
    if stride > i32::MAX as u32 {
        return Err(SdkError::InvalidArgument(format!(
            "stride {} is out of range",
            stride
        )));
    }
    if stride != 0 {
        if let Some(bpp) = format.bytes_per_pixel() {
            let min_stride = u64::from(width) * u64::from(bpp);
            if u64::from(stride) < min_stride {
                return Err(SdkError::InvalidArgument(format!(
                    "stride of {} bytes is too small for {} pixels of {} format",
                    stride, width, format
                )));
            }
        }
    }
    Ok(())
}
