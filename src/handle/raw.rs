// SPDX-License-Identifier: GPL-3.0-only

//! Opaque native handle values

use crate::backends::Backend;
use std::num::NonZeroUsize;

/// Kind of native object a handle refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleKind {
    /// `k4a_device_t`
    Device,
    /// `k4a_capture_t`
    Capture,
    /// `k4a_image_t`
    Image,
    /// `k4a_transformation_t`
    Transformation,
    /// `k4a_depthengine_t` (Orbbec only)
    DepthEngine,
}

impl HandleKind {
    /// Whether the native API can add a reference to this kind of object
    pub fn supports_references(self) -> bool {
        matches!(self, HandleKind::Capture | HandleKind::Image)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HandleKind::Device => "Device",
            HandleKind::Capture => "Capture",
            HandleKind::Image => "Image",
            HandleKind::Transformation => "Transformation",
            HandleKind::DepthEngine => "DepthEngine",
        }
    }
}

impl std::fmt::Display for HandleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A non-null native pointer tagged with its backend and object kind
///
/// The null pointer is the invalid sentinel of the native API and cannot be
/// represented. Two raw handles are equal when they name the same native
/// object of the same backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawHandle {
    backend: Backend,
    kind: HandleKind,
    value: NonZeroUsize,
}

impl RawHandle {
    /// Wrap a pointer value, returning `None` for null
    pub fn new(backend: Backend, kind: HandleKind, value: usize) -> Option<Self> {
        NonZeroUsize::new(value).map(|value| Self::from_non_zero(backend, kind, value))
    }

    pub fn from_non_zero(backend: Backend, kind: HandleKind, value: NonZeroUsize) -> Self {
        Self {
            backend,
            kind,
            value,
        }
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub fn kind(&self) -> HandleKind {
        self.kind
    }

    /// Pointer value as an integer
    pub fn value(&self) -> usize {
        self.value.get()
    }

    /// Pointer value for passing to a native entry point
    pub fn as_ptr(&self) -> *mut std::ffi::c_void {
        self.value.get() as *mut std::ffi::c_void
    }
}

impl std::fmt::Display for RawHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}#{}#{:#X}",
            self.kind,
            self.backend.as_str(),
            self.value.get()
        )
    }
}
