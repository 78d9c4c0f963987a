// SPDX-License-Identifier: GPL-3.0-only

//! Dispatch table resolved from a native `k4a` shared library
//!
//! Each backend ships its own `k4a` binary in a subdirectory of the native
//! library root:
//!
//! ```text
//! <root>/
//!   k4a-azure/    k4a, depthengine   (Azure Kinect Sensor SDK)
//!   k4a-orbbec/   k4a, OrbbecSDK     (Orbbec SDK K4A Wrapper)
//! ```
//!
//! Entry points are resolved once at load time into plain function pointers.
//! They stay valid for as long as the [`LoadedApi`] holding the library lives.

use super::logging::{DebugMessageHandler, context_for, debug_message_handler};
use super::{Backend, BufferResult, CaptureSlot, NativeApi, NativeFailure, NativeResult, WaitResult};
use crate::constants::native::{DEPTHENGINE_LIBRARY_NAME, K4A_LIBRARY_NAME};
use crate::errors::{SdkError, SdkResult};
use crate::handle::{HandleKind, RawHandle};
use crate::sdk::NativeLoader;
use crate::sensor::calibration::CalibrationBlob;
use crate::sensor::configuration::DeviceConfiguration;
use crate::sensor::formats::{ColorResolution, DepthMode, ImageFormat};
use crate::sensor::types::{CalibrationGeometry, HardwareVersion, ImuSample, Timeout, TraceLevel};
use libloading::Library;
use libc::{c_char, c_int, c_void, size_t};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

type Handle = *mut c_void;

/// `k4a_result_t`
type K4aResult = c_int;
/// `k4a_wait_result_t`
type K4aWaitResult = c_int;
/// `k4a_buffer_result_t`
type K4aBufferResult = c_int;

const K4A_RESULT_SUCCEEDED: K4aResult = 0;
const K4A_WAIT_RESULT_SUCCEEDED: K4aWaitResult = 0;
const K4A_WAIT_RESULT_TIMEOUT: K4aWaitResult = 2;
const K4A_BUFFER_RESULT_SUCCEEDED: K4aBufferResult = 0;
const K4A_BUFFER_RESULT_TOO_SMALL: K4aBufferResult = 2;

/// `k4a_device_configuration_t`
#[repr(C)]
struct NativeDeviceConfiguration {
    color_format: c_int,
    color_resolution: c_int,
    depth_mode: c_int,
    camera_fps: c_int,
    synchronized_images_only: bool,
    depth_delay_off_color_usec: i32,
    wired_sync_mode: c_int,
    subordinate_delay_off_master_usec: u32,
    disable_streaming_indicator: bool,
}

impl From<&DeviceConfiguration> for NativeDeviceConfiguration {
    fn from(config: &DeviceConfiguration) -> Self {
        Self {
            color_format: config.color_format.to_native(),
            color_resolution: config.color_resolution.to_native(),
            depth_mode: config.depth_mode.to_native(),
            camera_fps: config.camera_fps.to_native(),
            synchronized_images_only: config.synchronized_images_only,
            depth_delay_off_color_usec: config.depth_delay_off_color_usec,
            wired_sync_mode: config.wired_sync_mode.to_native(),
            subordinate_delay_off_master_usec: config.subordinate_delay_off_master_usec,
            disable_streaming_indicator: config.disable_streaming_indicator,
        }
    }
}

/// Resolved `k4a_*` entry points
struct Symbols {
    device_get_installed_count: unsafe extern "C" fn() -> u32,
    device_open: unsafe extern "C" fn(u32, *mut Handle) -> K4aResult,
    device_close: unsafe extern "C" fn(Handle),
    device_get_serialnum: unsafe extern "C" fn(Handle, *mut c_char, *mut size_t) -> K4aBufferResult,
    device_get_raw_calibration: unsafe extern "C" fn(Handle, *mut u8, *mut size_t) -> K4aBufferResult,
    device_get_sync_jack: unsafe extern "C" fn(Handle, *mut bool, *mut bool) -> K4aResult,
    device_get_version: unsafe extern "C" fn(Handle, *mut HardwareVersion) -> K4aResult,
    device_start_cameras:
        unsafe extern "C" fn(Handle, *const NativeDeviceConfiguration) -> K4aResult,
    device_stop_cameras: unsafe extern "C" fn(Handle),
    device_start_imu: unsafe extern "C" fn(Handle) -> K4aResult,
    device_stop_imu: unsafe extern "C" fn(Handle),
    device_get_capture: unsafe extern "C" fn(Handle, *mut Handle, i32) -> K4aWaitResult,
    device_get_imu_sample: unsafe extern "C" fn(Handle, *mut ImuSample, i32) -> K4aWaitResult,
    device_get_calibration:
        unsafe extern "C" fn(Handle, c_int, c_int, *mut CalibrationBlob) -> K4aResult,
    calibration_get_from_raw:
        unsafe extern "C" fn(*mut c_char, size_t, c_int, c_int, *mut CalibrationBlob) -> K4aResult,
    capture_create: unsafe extern "C" fn(*mut Handle) -> K4aResult,
    capture_release: unsafe extern "C" fn(Handle),
    capture_reference: unsafe extern "C" fn(Handle),
    capture_get_color_image: unsafe extern "C" fn(Handle) -> Handle,
    capture_get_depth_image: unsafe extern "C" fn(Handle) -> Handle,
    capture_get_ir_image: unsafe extern "C" fn(Handle) -> Handle,
    capture_set_color_image: unsafe extern "C" fn(Handle, Handle),
    capture_set_depth_image: unsafe extern "C" fn(Handle, Handle),
    capture_set_ir_image: unsafe extern "C" fn(Handle, Handle),
    capture_get_temperature_c: unsafe extern "C" fn(Handle) -> f32,
    capture_set_temperature_c: unsafe extern "C" fn(Handle, f32),
    image_create: unsafe extern "C" fn(c_int, c_int, c_int, c_int, *mut Handle) -> K4aResult,
    image_release: unsafe extern "C" fn(Handle),
    image_reference: unsafe extern "C" fn(Handle),
    image_get_buffer: unsafe extern "C" fn(Handle) -> *mut u8,
    image_get_size: unsafe extern "C" fn(Handle) -> size_t,
    image_get_format: unsafe extern "C" fn(Handle) -> c_int,
    image_get_width_pixels: unsafe extern "C" fn(Handle) -> c_int,
    image_get_height_pixels: unsafe extern "C" fn(Handle) -> c_int,
    image_get_stride_bytes: unsafe extern "C" fn(Handle) -> c_int,
    image_get_device_timestamp_usec: unsafe extern "C" fn(Handle) -> u64,
    image_set_device_timestamp_usec: unsafe extern "C" fn(Handle, u64),
    image_get_system_timestamp_nsec: unsafe extern "C" fn(Handle) -> u64,
    image_get_exposure_usec: unsafe extern "C" fn(Handle) -> u64,
    image_get_white_balance: unsafe extern "C" fn(Handle) -> u32,
    image_get_iso_speed: unsafe extern "C" fn(Handle) -> u32,
    transformation_create: unsafe extern "C" fn(*const CalibrationBlob) -> Handle,
    transformation_destroy: unsafe extern "C" fn(Handle),
    transformation_depth_image_to_color_camera:
        unsafe extern "C" fn(Handle, Handle, Handle) -> K4aResult,
    transformation_color_image_to_depth_camera:
        unsafe extern "C" fn(Handle, Handle, Handle, Handle) -> K4aResult,
    transformation_depth_image_to_point_cloud:
        unsafe extern "C" fn(Handle, Handle, c_int, Handle) -> K4aResult,
    set_debug_message_handler:
        unsafe extern "C" fn(Option<DebugMessageHandler>, *mut c_void, c_int) -> K4aResult,
    /// Orbbec wrapper only
    depth_engine_helper_create: Option<unsafe extern "C" fn(*mut Handle) -> K4aResult>,
    depth_engine_helper_release: Option<unsafe extern "C" fn(Handle)>,
}

/// Resolve a mandatory symbol, failing the load when it is missing
///
/// # Safety
///
/// `T` must be the C signature of the named symbol.
unsafe fn required<T: Copy>(library: &Library, path: &Path, name: &str) -> SdkResult<T> {
    let symbol = unsafe { library.get::<T>(name.as_bytes()) }.map_err(|e| SdkError::Library {
        path: path.to_path_buf(),
        message: format!("missing symbol {}: {}", name, e),
    })?;
    Ok(*symbol)
}

/// Resolve an optional symbol
///
/// # Safety
///
/// As for [`required`].
unsafe fn optional<T: Copy>(library: &Library, name: &str) -> Option<T> {
    unsafe { library.get::<T>(name.as_bytes()) }
        .ok()
        .map(|symbol| *symbol)
}

impl Symbols {
    /// # Safety
    ///
    /// `library` must be a `k4a` build exporting the standard C API.
    unsafe fn resolve(library: &Library, path: &Path) -> SdkResult<Self> {
        // SAFETY: every field type below is the documented `k4a.h` signature
        unsafe {
            Ok(Self {
                device_get_installed_count: required(
                    library,
                    path,
                    "k4a_device_get_installed_count",
                )?,
                device_open: required(library, path, "k4a_device_open")?,
                device_close: required(library, path, "k4a_device_close")?,
                device_get_serialnum: required(library, path, "k4a_device_get_serialnum")?,
                device_get_raw_calibration: required(
                    library,
                    path,
                    "k4a_device_get_raw_calibration",
                )?,
                device_get_sync_jack: required(library, path, "k4a_device_get_sync_jack")?,
                device_get_version: required(library, path, "k4a_device_get_version")?,
                device_start_cameras: required(library, path, "k4a_device_start_cameras")?,
                device_stop_cameras: required(library, path, "k4a_device_stop_cameras")?,
                device_start_imu: required(library, path, "k4a_device_start_imu")?,
                device_stop_imu: required(library, path, "k4a_device_stop_imu")?,
                device_get_capture: required(library, path, "k4a_device_get_capture")?,
                device_get_imu_sample: required(library, path, "k4a_device_get_imu_sample")?,
                device_get_calibration: required(library, path, "k4a_device_get_calibration")?,
                calibration_get_from_raw: required(library, path, "k4a_calibration_get_from_raw")?,
                capture_create: required(library, path, "k4a_capture_create")?,
                capture_release: required(library, path, "k4a_capture_release")?,
                capture_reference: required(library, path, "k4a_capture_reference")?,
                capture_get_color_image: required(library, path, "k4a_capture_get_color_image")?,
                capture_get_depth_image: required(library, path, "k4a_capture_get_depth_image")?,
                capture_get_ir_image: required(library, path, "k4a_capture_get_ir_image")?,
                capture_set_color_image: required(library, path, "k4a_capture_set_color_image")?,
                capture_set_depth_image: required(library, path, "k4a_capture_set_depth_image")?,
                capture_set_ir_image: required(library, path, "k4a_capture_set_ir_image")?,
                capture_get_temperature_c: required(
                    library,
                    path,
                    "k4a_capture_get_temperature_c",
                )?,
                capture_set_temperature_c: required(
                    library,
                    path,
                    "k4a_capture_set_temperature_c",
                )?,
                image_create: required(library, path, "k4a_image_create")?,
                image_release: required(library, path, "k4a_image_release")?,
                image_reference: required(library, path, "k4a_image_reference")?,
                image_get_buffer: required(library, path, "k4a_image_get_buffer")?,
                image_get_size: required(library, path, "k4a_image_get_size")?,
                image_get_format: required(library, path, "k4a_image_get_format")?,
                image_get_width_pixels: required(library, path, "k4a_image_get_width_pixels")?,
                image_get_height_pixels: required(library, path, "k4a_image_get_height_pixels")?,
                image_get_stride_bytes: required(library, path, "k4a_image_get_stride_bytes")?,
                image_get_device_timestamp_usec: required(
                    library,
                    path,
                    "k4a_image_get_device_timestamp_usec",
                )?,
                image_set_device_timestamp_usec: required(
                    library,
                    path,
                    "k4a_image_set_device_timestamp_usec",
                )?,
                image_get_system_timestamp_nsec: required(
                    library,
                    path,
                    "k4a_image_get_system_timestamp_nsec",
                )?,
                image_get_exposure_usec: required(library, path, "k4a_image_get_exposure_usec")?,
                image_get_white_balance: required(library, path, "k4a_image_get_white_balance")?,
                image_get_iso_speed: required(library, path, "k4a_image_get_iso_speed")?,
                transformation_create: required(library, path, "k4a_transformation_create")?,
                transformation_destroy: required(library, path, "k4a_transformation_destroy")?,
                transformation_depth_image_to_color_camera: required(
                    library,
                    path,
                    "k4a_transformation_depth_image_to_color_camera",
                )?,
                transformation_color_image_to_depth_camera: required(
                    library,
                    path,
                    "k4a_transformation_color_image_to_depth_camera",
                )?,
                transformation_depth_image_to_point_cloud: required(
                    library,
                    path,
                    "k4a_transformation_depth_image_to_point_cloud",
                )?,
                set_debug_message_handler: required(
                    library,
                    path,
                    "k4a_set_debug_message_handler",
                )?,
                depth_engine_helper_create: optional(library, "k4a_depth_engine_helper_create"),
                depth_engine_helper_release: optional(library, "k4a_depth_engine_helper_release"),
            })
        }
    }
}

fn result(code: K4aResult) -> NativeResult {
    if code == K4A_RESULT_SUCCEEDED {
        Ok(())
    } else {
        Err(NativeFailure)
    }
}

fn non_null(handle: Handle) -> Option<NonZeroUsize> {
    NonZeroUsize::new(handle as usize)
}

fn buffer_result(code: K4aBufferResult, size: usize) -> BufferResult {
    match code {
        K4A_BUFFER_RESULT_SUCCEEDED => BufferResult::Succeeded(size),
        K4A_BUFFER_RESULT_TOO_SMALL => BufferResult::TooSmall(size),
        _ => BufferResult::Failed,
    }
}

fn buffer_ptr(buffer: &mut [u8]) -> *mut u8 {
    if buffer.is_empty() {
        std::ptr::null_mut()
    } else {
        buffer.as_mut_ptr()
    }
}

fn image_handle(image: Option<RawHandle>) -> Handle {
    image.map_or(std::ptr::null_mut(), |raw| raw.as_ptr())
}

/// One backend's `k4a` library with its resolved entry points
pub struct LoadedApi {
    backend: Backend,
    path: PathBuf,
    symbols: Symbols,
    // Keeps the function pointers in `symbols` valid; dropped last
    _library: Library,
}

impl LoadedApi {
    /// Load the library at `path` and resolve every entry point
    pub fn open(backend: Backend, path: &Path) -> SdkResult<Self> {
        // SAFETY: loading runs the library's initializers; the vendor SDKs have
        // no initialization-order requirements beyond the current directory.
        let library = unsafe { Library::new(path) }.map_err(|e| SdkError::Library {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        // SAFETY: the file was found under a backend's `k4a` name
        let symbols = unsafe { Symbols::resolve(&library, path) }?;
        info!(backend = %backend, path = %path.display(), "Loaded native library");

        if backend == Backend::Orbbec && symbols.depth_engine_helper_create.is_none() {
            warn!(path = %path.display(), "Library has no depth engine helper entry points");
        }

        Ok(Self {
            backend,
            path: path.to_path_buf(),
            symbols,
            _library: library,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

// SAFETY for every call below: handles passed in were produced by this same
// library (the `NativeApi` contract) and are still referenced by their owner.
impl NativeApi for LoadedApi {
    fn backend(&self) -> Backend {
        self.backend
    }

    fn release(&self, handle: RawHandle) {
        let s = &self.symbols;
        let ptr = handle.as_ptr();
        unsafe {
            match handle.kind() {
                HandleKind::Device => (s.device_close)(ptr),
                HandleKind::Capture => (s.capture_release)(ptr),
                HandleKind::Image => (s.image_release)(ptr),
                HandleKind::Transformation => (s.transformation_destroy)(ptr),
                HandleKind::DepthEngine => match s.depth_engine_helper_release {
                    Some(release) => release(ptr),
                    None => warn!(handle = %handle, "No depth engine release entry point"),
                },
            }
        }
    }

    fn add_reference(&self, handle: RawHandle) -> NativeResult {
        let ptr = handle.as_ptr();
        match handle.kind() {
            HandleKind::Capture => unsafe { (self.symbols.capture_reference)(ptr) },
            HandleKind::Image => unsafe { (self.symbols.image_reference)(ptr) },
            _ => return Err(NativeFailure),
        }
        Ok(())
    }

    fn device_installed_count(&self) -> u32 {
        unsafe { (self.symbols.device_get_installed_count)() }
    }

    fn device_open(&self, index: u32) -> Option<NonZeroUsize> {
        let mut handle: Handle = std::ptr::null_mut();
        let code = unsafe { (self.symbols.device_open)(index, &mut handle) };
        result(code).ok()?;
        non_null(handle)
    }

    fn device_serialnum(&self, device: RawHandle, buffer: &mut [u8]) -> BufferResult {
        let mut size = buffer.len();
        let code = unsafe {
            (self.symbols.device_get_serialnum)(
                device.as_ptr(),
                buffer_ptr(buffer).cast::<c_char>(),
                &mut size,
            )
        };
        buffer_result(code, size)
    }

    fn device_raw_calibration(&self, device: RawHandle, buffer: &mut [u8]) -> BufferResult {
        let mut size = buffer.len();
        let code = unsafe {
            (self.symbols.device_get_raw_calibration)(device.as_ptr(), buffer_ptr(buffer), &mut size)
        };
        buffer_result(code, size)
    }

    fn device_sync_jack(&self, device: RawHandle) -> NativeResult<(bool, bool)> {
        let mut sync_in = false;
        let mut sync_out = false;
        let code =
            unsafe { (self.symbols.device_get_sync_jack)(device.as_ptr(), &mut sync_in, &mut sync_out) };
        result(code).map(|()| (sync_in, sync_out))
    }

    fn device_version(&self, device: RawHandle) -> NativeResult<HardwareVersion> {
        let mut version = HardwareVersion::default();
        let code = unsafe { (self.symbols.device_get_version)(device.as_ptr(), &mut version) };
        result(code).map(|()| version)
    }

    fn device_start_cameras(
        &self,
        device: RawHandle,
        config: &DeviceConfiguration,
    ) -> NativeResult {
        let native = NativeDeviceConfiguration::from(config);
        result(unsafe { (self.symbols.device_start_cameras)(device.as_ptr(), &native) })
    }

    fn device_stop_cameras(&self, device: RawHandle) {
        unsafe { (self.symbols.device_stop_cameras)(device.as_ptr()) }
    }

    fn device_start_imu(&self, device: RawHandle) -> NativeResult {
        result(unsafe { (self.symbols.device_start_imu)(device.as_ptr()) })
    }

    fn device_stop_imu(&self, device: RawHandle) {
        unsafe { (self.symbols.device_stop_imu)(device.as_ptr()) }
    }

    fn device_get_capture(&self, device: RawHandle, timeout: Timeout) -> WaitResult<NonZeroUsize> {
        let mut capture: Handle = std::ptr::null_mut();
        let code = unsafe {
            (self.symbols.device_get_capture)(device.as_ptr(), &mut capture, timeout.as_millis())
        };
        match code {
            K4A_WAIT_RESULT_SUCCEEDED => match non_null(capture) {
                Some(value) => WaitResult::Ready(value),
                None => WaitResult::Failed,
            },
            K4A_WAIT_RESULT_TIMEOUT => WaitResult::Timeout,
            _ => WaitResult::Failed,
        }
    }

    fn device_get_imu_sample(&self, device: RawHandle, timeout: Timeout) -> WaitResult<ImuSample> {
        let mut sample = ImuSample::default();
        let code = unsafe {
            (self.symbols.device_get_imu_sample)(device.as_ptr(), &mut sample, timeout.as_millis())
        };
        match code {
            K4A_WAIT_RESULT_SUCCEEDED => WaitResult::Ready(sample),
            K4A_WAIT_RESULT_TIMEOUT => WaitResult::Timeout,
            _ => WaitResult::Failed,
        }
    }

    fn device_calibration(
        &self,
        device: RawHandle,
        depth_mode: DepthMode,
        color_resolution: ColorResolution,
        calibration: &mut CalibrationBlob,
    ) -> NativeResult {
        result(unsafe {
            (self.symbols.device_get_calibration)(
                device.as_ptr(),
                depth_mode.to_native(),
                color_resolution.to_native(),
                calibration,
            )
        })
    }

    fn calibration_from_raw(
        &self,
        raw: &[u8],
        depth_mode: DepthMode,
        color_resolution: ColorResolution,
        calibration: &mut CalibrationBlob,
    ) -> NativeResult {
        // The SDK only reads the buffer despite the mutable pointer type
        result(unsafe {
            (self.symbols.calibration_get_from_raw)(
                raw.as_ptr().cast_mut().cast::<c_char>(),
                raw.len(),
                depth_mode.to_native(),
                color_resolution.to_native(),
                calibration,
            )
        })
    }

    fn capture_create(&self) -> Option<NonZeroUsize> {
        let mut capture: Handle = std::ptr::null_mut();
        result(unsafe { (self.symbols.capture_create)(&mut capture) }).ok()?;
        non_null(capture)
    }

    fn capture_image(&self, capture: RawHandle, slot: CaptureSlot) -> Option<NonZeroUsize> {
        let get = match slot {
            CaptureSlot::Color => self.symbols.capture_get_color_image,
            CaptureSlot::Depth => self.symbols.capture_get_depth_image,
            CaptureSlot::Ir => self.symbols.capture_get_ir_image,
        };
        non_null(unsafe { get(capture.as_ptr()) })
    }

    fn capture_set_image(&self, capture: RawHandle, slot: CaptureSlot, image: Option<RawHandle>) {
        let set = match slot {
            CaptureSlot::Color => self.symbols.capture_set_color_image,
            CaptureSlot::Depth => self.symbols.capture_set_depth_image,
            CaptureSlot::Ir => self.symbols.capture_set_ir_image,
        };
        unsafe { set(capture.as_ptr(), image_handle(image)) }
    }

    fn capture_temperature_c(&self, capture: RawHandle) -> f32 {
        unsafe { (self.symbols.capture_get_temperature_c)(capture.as_ptr()) }
    }

    fn capture_set_temperature_c(&self, capture: RawHandle, temperature: f32) {
        unsafe { (self.symbols.capture_set_temperature_c)(capture.as_ptr(), temperature) }
    }

    fn image_create(
        &self,
        format: ImageFormat,
        width: i32,
        height: i32,
        stride: i32,
    ) -> Option<NonZeroUsize> {
        let mut image: Handle = std::ptr::null_mut();
        let code = unsafe {
            (self.symbols.image_create)(format.to_native(), width, height, stride, &mut image)
        };
        result(code).ok()?;
        non_null(image)
    }

    fn image_format(&self, image: RawHandle) -> ImageFormat {
        let value = unsafe { (self.symbols.image_get_format)(image.as_ptr()) };
        ImageFormat::from_native(value).unwrap_or(ImageFormat::Custom)
    }

    fn image_width(&self, image: RawHandle) -> i32 {
        unsafe { (self.symbols.image_get_width_pixels)(image.as_ptr()) }
    }

    fn image_height(&self, image: RawHandle) -> i32 {
        unsafe { (self.symbols.image_get_height_pixels)(image.as_ptr()) }
    }

    fn image_stride(&self, image: RawHandle) -> i32 {
        unsafe { (self.symbols.image_get_stride_bytes)(image.as_ptr()) }
    }

    fn image_size(&self, image: RawHandle) -> usize {
        unsafe { (self.symbols.image_get_size)(image.as_ptr()) }
    }

    fn image_device_timestamp_usec(&self, image: RawHandle) -> u64 {
        unsafe { (self.symbols.image_get_device_timestamp_usec)(image.as_ptr()) }
    }

    fn image_set_device_timestamp_usec(&self, image: RawHandle, timestamp: u64) {
        unsafe { (self.symbols.image_set_device_timestamp_usec)(image.as_ptr(), timestamp) }
    }

    fn image_system_timestamp_nsec(&self, image: RawHandle) -> u64 {
        unsafe { (self.symbols.image_get_system_timestamp_nsec)(image.as_ptr()) }
    }

    fn image_exposure_usec(&self, image: RawHandle) -> u64 {
        unsafe { (self.symbols.image_get_exposure_usec)(image.as_ptr()) }
    }

    fn image_white_balance(&self, image: RawHandle) -> u32 {
        unsafe { (self.symbols.image_get_white_balance)(image.as_ptr()) }
    }

    fn image_iso_speed(&self, image: RawHandle) -> u32 {
        unsafe { (self.symbols.image_get_iso_speed)(image.as_ptr()) }
    }

    fn image_read(&self, image: RawHandle) -> Vec<u8> {
        let ptr = image.as_ptr();
        unsafe {
            let buffer = (self.symbols.image_get_buffer)(ptr);
            let size = (self.symbols.image_get_size)(ptr);
            if buffer.is_null() || size == 0 {
                return Vec::new();
            }
            std::slice::from_raw_parts(buffer, size).to_vec()
        }
    }

    fn image_write(&self, image: RawHandle, data: &[u8]) {
        let ptr = image.as_ptr();
        unsafe {
            let buffer = (self.symbols.image_get_buffer)(ptr);
            let size = (self.symbols.image_get_size)(ptr);
            if buffer.is_null() {
                return;
            }
            let len = size.min(data.len());
            std::ptr::copy_nonoverlapping(data.as_ptr(), buffer, len);
        }
    }

    fn transformation_create(&self, calibration: &CalibrationBlob) -> Option<NonZeroUsize> {
        non_null(unsafe { (self.symbols.transformation_create)(calibration) })
    }

    fn transformation_depth_to_color(
        &self,
        transformation: RawHandle,
        depth: RawHandle,
        transformed_depth: RawHandle,
    ) -> NativeResult {
        result(unsafe {
            (self.symbols.transformation_depth_image_to_color_camera)(
                transformation.as_ptr(),
                depth.as_ptr(),
                transformed_depth.as_ptr(),
            )
        })
    }

    fn transformation_color_to_depth(
        &self,
        transformation: RawHandle,
        depth: RawHandle,
        color: RawHandle,
        transformed_color: RawHandle,
    ) -> NativeResult {
        result(unsafe {
            (self.symbols.transformation_color_image_to_depth_camera)(
                transformation.as_ptr(),
                depth.as_ptr(),
                color.as_ptr(),
                transformed_color.as_ptr(),
            )
        })
    }

    fn transformation_depth_to_point_cloud(
        &self,
        transformation: RawHandle,
        depth: RawHandle,
        geometry: CalibrationGeometry,
        xyz: RawHandle,
    ) -> NativeResult {
        result(unsafe {
            (self.symbols.transformation_depth_image_to_point_cloud)(
                transformation.as_ptr(),
                depth.as_ptr(),
                geometry.to_native(),
                xyz.as_ptr(),
            )
        })
    }

    fn depth_engine_helper_create(&self) -> Option<NonZeroUsize> {
        let create = self.symbols.depth_engine_helper_create?;
        let mut helper: Handle = std::ptr::null_mut();
        result(unsafe { create(&mut helper) }).ok()?;
        non_null(helper)
    }

    fn set_debug_message_handler(&self, min_level: TraceLevel) -> NativeResult {
        let handler: Option<DebugMessageHandler> = if min_level == TraceLevel::Off {
            None
        } else {
            Some(debug_message_handler)
        };
        result(unsafe {
            (self.symbols.set_debug_message_handler)(
                handler,
                context_for(self.backend),
                min_level.to_native(),
            )
        })
    }
}

/// [`NativeLoader`] reading `<root>/<backend subdirectory>/k4a`
#[derive(Debug, Clone)]
pub struct LibraryLoader {
    root: PathBuf,
}

impl LibraryLoader {
    /// Relative roots are resolved against the current directory right away,
    /// since loading runs with the backend directory as current directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let root = std::path::absolute(&root).unwrap_or_else(|e| {
            warn!(path = %root.display(), error = %e, "Cannot resolve native library root");
            root
        });
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding the binaries of `backend`
    pub fn backend_dir(&self, backend: Backend) -> PathBuf {
        self.root.join(backend.library_subdirectory())
    }

    /// Full path of the `k4a` library of `backend`
    pub fn library_path(&self, backend: Backend) -> PathBuf {
        self.backend_dir(backend)
            .join(libloading::library_filename(K4A_LIBRARY_NAME))
    }

    /// Full path of the Azure depth engine plug-in
    ///
    /// The Orbbec wrapper ships a library with the same name, which is why
    /// both stacks cannot serve depth from their own copy in one process.
    pub fn depth_engine_path(&self, backend: Backend) -> PathBuf {
        self.backend_dir(backend)
            .join(libloading::library_filename(DEPTHENGINE_LIBRARY_NAME))
    }
}

impl NativeLoader for LibraryLoader {
    fn load(&self, backend: Backend) -> SdkResult<Arc<dyn NativeApi>> {
        let path = self.library_path(backend);
        debug!(backend = %backend, path = %path.display(), "Loading native library");

        let depth_engine = self.depth_engine_path(backend);
        if backend == Backend::Azure && !depth_engine.exists() {
            warn!(
                path = %depth_engine.display(),
                "Depth engine not found next to k4a, depth streaming will fail"
            );
        }
        let api: Arc<dyn NativeApi> = Arc::new(LoadedApi::open(backend, &path)?);
        Ok(api)
    }

    fn library_dir(&self, backend: Backend) -> Option<PathBuf> {
        Some(self.backend_dir(backend))
    }
}
