// SPDX-License-Identifier: GPL-3.0-only

//! Native debug messages forwarded into `tracing`
//!
//! The SDK calls [`debug_message_handler`] on its own threads. The context
//! pointer registered with the handler carries the backend, so messages of
//! both SDKs can be told apart in the log.

use super::Backend;
use crate::sensor::types::TraceLevel;
use libc::{c_char, c_int, c_void};
use std::ffi::CStr;
use tracing::{debug, error, info, trace, warn};

/// `k4a_logging_message_cb_t`
pub type DebugMessageHandler = unsafe extern "C" fn(
    context: *mut c_void,
    level: c_int,
    file: *const c_char,
    line: c_int,
    message: *const c_char,
);

/// Context pointer value identifying `backend`
///
/// Never dereferenced; zero is avoided so the SDK keeps the value.
pub fn context_for(backend: Backend) -> *mut c_void {
    let tag: usize = match backend {
        Backend::Azure => 1,
        Backend::Orbbec => 2,
    };
    tag as *mut c_void
}

fn backend_from_context(context: *mut c_void) -> Option<Backend> {
    match context as usize {
        1 => Some(Backend::Azure),
        2 => Some(Backend::Orbbec),
        _ => None,
    }
}

/// Emit one native message at the matching `tracing` level
pub fn forward(backend: Option<Backend>, level: TraceLevel, file: &str, line: i32, message: &str) {
    let backend = backend.map(Backend::as_str).unwrap_or("unknown");
    match level {
        TraceLevel::Critical | TraceLevel::Error => {
            error!(target: "k4a_native", backend, file, line, "{}", message)
        }
        TraceLevel::Warning => warn!(target: "k4a_native", backend, file, line, "{}", message),
        TraceLevel::Info => info!(target: "k4a_native", backend, file, line, "{}", message),
        TraceLevel::Trace => debug!(target: "k4a_native", backend, file, line, "{}", message),
        TraceLevel::Off => trace!(target: "k4a_native", backend, file, line, "{}", message),
    }
}

/// Lossy conversion of a possibly null C string
///
/// # Safety
///
/// `ptr` must be null or point to a NUL-terminated string valid for the call.
unsafe fn c_str<'a>(ptr: *const c_char) -> std::borrow::Cow<'a, str> {
    if ptr.is_null() {
        return std::borrow::Cow::Borrowed("");
    }
    unsafe { CStr::from_ptr(ptr) }.to_string_lossy()
}

/// Handler registered with `k4a_set_debug_message_handler`
///
/// # Safety
///
/// Called by the SDK with NUL-terminated `file` and `message` strings.
pub unsafe extern "C" fn debug_message_handler(
    context: *mut c_void,
    level: c_int,
    file: *const c_char,
    line: c_int,
    message: *const c_char,
) {
    let level = TraceLevel::from_native(level).unwrap_or(TraceLevel::Trace);
    let file = unsafe { c_str(file) };
    let message = unsafe { c_str(message) };
    forward(backend_from_context(context), level, &file, line, message.trim_end());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_round_trip() {
        for backend in Backend::ALL {
            assert_eq!(backend_from_context(context_for(backend)), Some(backend));
        }
        assert_eq!(backend_from_context(std::ptr::null_mut()), None);
    }

    #[test]
    fn test_handler_accepts_null_strings() {
        unsafe {
            debug_message_handler(
                context_for(Backend::Orbbec),
                TraceLevel::Warning.to_native(),
                std::ptr::null(),
                0,
                std::ptr::null(),
            );
        }
    }
}
