// SPDX-License-Identifier: GPL-3.0-only

//! Orbbec depth engine helper
//!
//! The Orbbec wrapper needs this object alive before anything else touches
//! the depth engine. The context creates one during bootstrap and keeps it
//! for the lifetime of the backend.

use crate::backends::Backend;
use crate::errors::{SdkError, SdkResult};
use crate::handle::{HandleKind, HandleOwner, ListenerId, OwnerId, RawHandle};
use crate::sdk::SdkContext;
use tracing::debug;

/// Owner of the native depth engine helper
#[derive(Debug)]
pub struct DepthEngineHelper {
    owner: HandleOwner,
}

impl DepthEngineHelper {
    pub fn create(ctx: &SdkContext) -> SdkResult<Self> {
        let api = ctx.ensure_enabled(Backend::Orbbec)?;
        let value = api.depth_engine_helper_create().ok_or_else(|| {
            SdkError::InvalidHandle("Failed to create depthengine helper".into())
        })?;
        let raw = RawHandle::from_non_zero(Backend::Orbbec, HandleKind::DepthEngine, value);
        debug!(handle = %raw, "Created depth engine helper");
        Ok(Self {
            owner: HandleOwner::wrap(api, raw)?,
        })
    }

    /// Give up the wrapper, keeping the native helper alive in the owner
    pub fn into_owner(self) -> HandleOwner {
        self.owner
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
