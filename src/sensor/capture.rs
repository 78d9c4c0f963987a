// SPDX-License-Identifier: GPL-3.0-only

//! Captures: a color, depth and IR image taken together

use super::image::Image;
use crate::backends::{Backend, CaptureSlot, NativeApi};
use crate::errors::{SdkError, SdkResult};
use crate::handle::{
    ChildTracker, HandleKind, HandleOwner, ListenerId, OwnerId, RawHandle, ReferenceDuplicatable,
};
use crate::sdk::SdkContext;
use std::sync::Arc;
use tracing::debug;

/// Container of up to three images sharing a timestamp
///
/// Images read from a capture are independent owners, but they are released
/// together with the capture object that handed them out unless released
/// earlier.
#[derive(Debug)]
pub struct Capture {
    owner: HandleOwner,
    children: ChildTracker,
}

impl Capture {
    /// Empty capture, to be filled with [`set_image`](Self::set_image)
    pub fn new(ctx: &SdkContext, backend: Backend) -> SdkResult<Self> {
        let api = ctx.ensure_enabled(backend)?;
        let value = api.capture_create().ok_or_else(|| {
            SdkError::InvalidHandle("Failed to create blank capture instance".into())
        })?;
        let raw = RawHandle::from_non_zero(backend, HandleKind::Capture, value);
        debug!(handle = %raw, "Created capture");
        Ok(Self::from_owner(HandleOwner::wrap(api, raw)?))
    }

    pub(crate) fn from_owner(owner: HandleOwner) -> Self {
        Self {
            owner,
            children: ChildTracker::new(),
        }
    }

    fn api(&self) -> &Arc<dyn NativeApi> {
        self.owner.api()
    }

    pub fn backend(&self) -> Backend {
        self.owner.backend()
    }

    pub fn id(&self) -> OwnerId {
        self.owner.id()
    }

    /// Image in `slot`, or `None` when the slot is empty
    pub fn image(&self, slot: CaptureSlot) -> SdkResult<Option<Image>> {
        let raw = self.owner.access()?;
        let Some(value) = self.api().capture_image(raw, slot) else {
            return Ok(None);
        };
        let image = RawHandle::from_non_zero(raw.backend(), HandleKind::Image, value);
        let owner = HandleOwner::wrap(Arc::clone(self.api()), image)?;
        Ok(Some(Image::from_owner(self.children.register(owner))))
    }

    pub fn color_image(&self) -> SdkResult<Option<Image>> {
        self.image(CaptureSlot::Color)
    }

    pub fn depth_image(&self) -> SdkResult<Option<Image>> {
        self.image(CaptureSlot::Depth)
    }

    pub fn ir_image(&self) -> SdkResult<Option<Image>> {
        self.image(CaptureSlot::Ir)
    }

    /// Store `image` in `slot`, or clear the slot with `None`
    ///
    /// The capture takes its own native reference to the image.
    pub fn set_image(&self, slot: CaptureSlot, image: Option<&Image>) -> SdkResult<()> {
        let raw = self.owner.access()?;
        let image = match image {
            Some(image) => {
                let handle = image.access()?;
                if handle.backend() != raw.backend() {
                    return Err(SdkError::BackendMismatch {
                        expected: raw.backend(),
                        actual: handle.backend(),
                    });
                }
                Some(handle)
            }
            None => None,
        };
        self.api().capture_set_image(raw, slot, image);
        Ok(())
    }

    pub fn set_color_image(&self, image: Option<&Image>) -> SdkResult<()> {
        self.set_image(CaptureSlot::Color, image)
    }

    pub fn set_depth_image(&self, image: Option<&Image>) -> SdkResult<()> {
        self.set_image(CaptureSlot::Depth, image)
    }

    pub fn set_ir_image(&self, image: Option<&Image>) -> SdkResult<()> {
        self.set_image(CaptureSlot::Ir, image)
    }

    /// Device temperature in Celsius, NaN when unknown
    pub fn temperature_c(&self) -> SdkResult<f32> {
        let raw = self.owner.access()?;
        Ok(self.api().capture_temperature_c(raw))
    }

    pub fn set_temperature_c(&self, temperature: f32) -> SdkResult<()> {
        let raw = self.owner.access()?;
        self.api().capture_set_temperature_c(raw, temperature);
        Ok(())
    }

    /// Number of images handed out and not yet released
    pub fn live_image_count(&self) -> usize {
        self.children.len()
    }

    /// Release every image handed out by this object, then the capture
    ///
    /// Returns `true` if this call released the capture reference.
    pub fn release(&self) -> bool {
        let images = self.children.release_all();
        if images > 0 {
            debug!(handle = %self.owner.raw(), images, "Released images with capture");
        }
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

    /// Whether both captures refer to the same native capture
    pub fn same_native_capture(&self, other: &Capture) -> bool {
        self.owner.raw() == other.owner.raw()
    }
}

impl ReferenceDuplicatable for Capture {
    /// Second owner of the same native capture
    ///
    /// The duplicate tracks only the images read through it.
    fn duplicate_reference(&self) -> SdkResult<Self> {
        Ok(Self::from_owner(self.owner.duplicate()?))
    }
}

impl Drop for Capture {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Display for Capture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.owner)
    }
}
