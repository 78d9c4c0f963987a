// SPDX-License-Identifier: GPL-3.0-only

//! Error types for the SDK binding
//!
//! Every fallible operation in the crate returns [`SdkResult`]. Errors are
//! surfaced synchronously to the immediate caller; the only silent paths are
//! the idempotent ones (double release, pruning an already-pruned child).

use crate::backends::Backend;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using SdkError
pub type SdkResult<T> = Result<T, SdkError>;

/// Main error type of the binding
#[derive(Debug, Clone, Error)]
pub enum SdkError {
    /// Operation attempted on an owner that has already been released
    #[error("{resource} has been disposed")]
    Disposed {
        /// Display form of the released handle
        resource: String,
    },

    /// A native creation call did not produce a usable handle
    #[error("Invalid native handle: {0}")]
    InvalidHandle(String),

    /// The target backend is not initialized in the current process
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A previously opened device can no longer be reached
    #[error("Connection to device #{index} has been lost")]
    ConnectionLost {
        /// Index of the device within its own backend
        index: u32,
    },

    /// Caller-supplied parameters violate a documented constraint
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A handle of one backend was handed to an object of the other
    #[error("Handle belongs to the {actual} backend but {expected} was expected")]
    BackendMismatch {
        /// Backend of the object performing the call
        expected: Backend,
        /// Backend the offending handle was created with
        actual: Backend,
    },

    /// No device exists at the requested index
    #[error("Device #{index} not found")]
    DeviceNotFound {
        /// Requested device index
        index: u32,
    },

    /// Device exists but could not be opened (usually opened by another process)
    #[error("Device #{index} is occupied by another process or cannot be opened")]
    DeviceOccupied {
        /// Requested device index
        index: u32,
    },

    /// Operation is not available for this resource kind or backend
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// Native library or one of its symbols could not be loaded
    #[error("Failed to load native library {}: {message}", path.display())]
    Library {
        /// Path that was being loaded
        path: PathBuf,
        /// Loader error message
        message: String,
    },

    /// Generic failure reported by the native layer
    #[error("Native call failed: {0}")]
    Failed(String),

    /// Configuration file could not be read or parsed
    #[error("Config error: {0}")]
    Config(String),
}

impl SdkError {
    /// Build a disposed-resource error for the given resource description
    pub fn disposed(resource: impl ToString) -> Self {
        SdkError::Disposed {
            resource: resource.to_string(),
        }
    }

    /// Check if the error reports a use-after-release
    pub fn is_disposed(&self) -> bool {
        matches!(self, SdkError::Disposed { .. })
    }

    /// Whether repeating the same call with the same handle may succeed
    ///
    /// Only generic native failures qualify. A lost connection needs the
    /// device to be re-opened, not the call repeated.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SdkError::Failed(_))
    }
}

impl From<std::io::Error> for SdkError {
    fn from(err: std::io::Error) -> Self {
        SdkError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for SdkError {
    fn from(err: serde_json::Error) -> Self {
        SdkError::Config(err.to_string())
    }
}
