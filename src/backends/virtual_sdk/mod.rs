// SPDX-License-Identifier: GPL-3.0-only

//! In-memory sensor SDK
//!
//! [`VirtualSdk`] implements [`NativeApi`] without any native library. It
//! keeps a table of simulated native objects with their reference counts,
//! simulates installed devices that stream synthetic captures, and records
//! how often each entry point was called. The test-suite uses it to observe
//! release counts; the `--virtual` CLI flag uses it for dry runs.
//!
//! # Simulated objects
//!
//! ```text
//! handle value ──► VirtualObject { kind, refs, data }
//!                        │
//!                        ├── Device         (index into installed devices)
//!                        ├── Capture        (holds one reference per image slot)
//!                        ├── Image          (format, geometry, pixel buffer)
//!                        ├── Transformation (calibration modes)
//!                        └── DepthEngine
//! ```

use super::{Backend, BufferResult, CaptureSlot, NativeApi, NativeFailure, NativeResult, WaitResult};
use crate::errors::{SdkError, SdkResult};
use crate::handle::{HandleKind, RawHandle};
use crate::sdk::NativeLoader;
use crate::sensor::calibration::CalibrationBlob;
use crate::sensor::configuration::DeviceConfiguration;
use crate::sensor::formats::{ColorResolution, DepthMode, ImageFormat};
use crate::sensor::types::{
    CalibrationGeometry, FirmwareVersion, HardwareVersion, ImuSample, Timeout, TraceLevel,
};
use std::collections::{HashMap, HashSet};
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, trace};

const FIRST_HANDLE: usize = 0x1000;
const HANDLE_STEP: usize = 0x10;

/// Interval between simulated frames at 30 fps
const FRAME_INTERVAL_USEC: u64 = 33_333;

/// Simulated installed device
#[derive(Debug, Clone)]
struct VirtualDevice {
    serial: String,
    connected: bool,
    opened: bool,
    streaming: Option<DeviceConfiguration>,
    imu_running: bool,
    /// Upcoming capture waits that time out
    pending_timeouts: u32,
    frame: u64,
}

#[derive(Debug, Clone)]
struct ImageData {
    format: ImageFormat,
    width: i32,
    height: i32,
    stride: i32,
    buffer: Vec<u8>,
    device_timestamp_usec: u64,
    system_timestamp_nsec: u64,
    exposure_usec: u64,
    white_balance: u32,
    iso_speed: u32,
}

#[derive(Debug, Clone)]
enum ObjectData {
    Device { index: Option<usize> },
    Capture { images: [Option<usize>; 3], temperature: f32 },
    Image(ImageData),
    Transformation { depth_mode: DepthMode, color_resolution: ColorResolution },
    DepthEngine,
}

#[derive(Debug, Clone)]
struct VirtualObject {
    kind: HandleKind,
    refs: usize,
    data: ObjectData,
}

#[derive(Default)]
struct VirtualState {
    next_handle: usize,
    objects: HashMap<usize, VirtualObject>,
    release_calls: HashMap<usize, usize>,
    calls: HashMap<&'static str, usize>,
    failures: HashSet<&'static str>,
    devices: Vec<VirtualDevice>,
    trace_level: Option<TraceLevel>,
}

impl VirtualState {
    fn record(&mut self, call: &'static str) -> bool {
        *self.calls.entry(call).or_insert(0) += 1;
        !self.failures.contains(call)
    }

    fn allocate(&mut self, kind: HandleKind, data: ObjectData) -> NonZeroUsize {
        if self.next_handle == 0 {
            self.next_handle = FIRST_HANDLE;
        }
        let value = self.next_handle;
        self.next_handle += HANDLE_STEP;
        self.objects.insert(
            value,
            VirtualObject {
                kind,
                refs: 1,
                data,
            },
        );
        // FIRST_HANDLE is non-zero and the counter only grows
        NonZeroUsize::new(value).unwrap_or(NonZeroUsize::MIN)
    }

    fn add_ref(&mut self, value: usize) -> bool {
        match self.objects.get_mut(&value) {
            Some(object) => {
                object.refs += 1;
                true
            }
            None => false,
        }
    }

    /// Drop one reference and destroy the object when it was the last
    fn drop_ref(&mut self, value: usize) {
        let Some(object) = self.objects.get_mut(&value) else {
            return;
        };
        object.refs -= 1;
        if object.refs > 0 {
            return;
        }
        let Some(object) = self.objects.remove(&value) else {
            return;
        };
        match object.data {
            ObjectData::Capture { images, .. } => {
                for image in images.into_iter().flatten() {
                    self.drop_ref(image);
                }
            }
            ObjectData::Device { index: Some(index) } => {
                if let Some(device) = self.devices.get_mut(index) {
                    device.opened = false;
                    device.streaming = None;
                    device.imu_running = false;
                }
            }
            _ => {}
        }
    }

    fn image(&self, value: usize) -> Option<&ImageData> {
        match self.objects.get(&value).map(|o| &o.data) {
            Some(ObjectData::Image(data)) => Some(data),
            _ => None,
        }
    }

    /// Depth and color sizes a transformation works with
    fn transformation_sizes(&self, value: usize) -> Option<((i32, i32), (i32, i32))> {
        match self.objects.get(&value).map(|o| &o.data) {
            Some(ObjectData::Transformation {
                depth_mode,
                color_resolution,
            }) => Some((
                (depth_mode.width_pixels() as i32, depth_mode.height_pixels() as i32),
                (
                    color_resolution.width_pixels() as i32,
                    color_resolution.height_pixels() as i32,
                ),
            )),
            _ => None,
        }
    }

    fn image_has_size(&self, value: usize, (width, height): (i32, i32)) -> bool {
        self.image(value)
            .is_some_and(|image| image.width == width && image.height == height)
    }

    fn image_mut(&mut self, value: usize) -> Option<&mut ImageData> {
        match self.objects.get_mut(&value).map(|o| &mut o.data) {
            Some(ObjectData::Image(data)) => Some(data),
            _ => None,
        }
    }

    fn device_index(&self, value: usize) -> Option<usize> {
        match self.objects.get(&value).map(|o| &o.data) {
            Some(ObjectData::Device { index }) => *index,
            _ => None,
        }
    }

    fn device(&mut self, value: usize) -> Option<&mut VirtualDevice> {
        let index = self.device_index(value)?;
        self.devices.get_mut(index)
    }

    fn new_image(
        &mut self,
        format: ImageFormat,
        width: i32,
        height: i32,
        stride: i32,
    ) -> Option<NonZeroUsize> {
        if width <= 0 || height <= 0 || stride < 0 {
            return None;
        }
        let stride = if stride == 0 {
            format.stride_bytes(width as u32)? as i32
        } else {
            stride
        };
        let size = format.image_size_bytes(stride as u32, height as u32)?;
        Some(self.allocate(
            HandleKind::Image,
            ObjectData::Image(ImageData {
                format,
                width,
                height,
                stride,
                buffer: vec![0; size],
                device_timestamp_usec: 0,
                system_timestamp_nsec: 0,
                exposure_usec: 0,
                white_balance: 0,
                iso_speed: 0,
            }),
        ))
    }
}

/// Simulated SDK for one backend
pub struct VirtualSdk {
    backend: Backend,
    state: Mutex<VirtualState>,
}

impl VirtualSdk {
    /// SDK without installed devices
    pub fn new(backend: Backend) -> Self {
        Self {
            backend,
            state: Mutex::new(VirtualState::default()),
        }
    }

    /// SDK with `count` connected devices named after the backend
    pub fn with_devices(backend: Backend, count: usize) -> Self {
        let sdk = Self::new(backend);
        for i in 0..count {
            sdk.add_device(&format!("{}-{:06}", backend.as_str(), i + 1));
        }
        sdk
    }

    fn lock(&self) -> MutexGuard<'_, VirtualState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn handle(&self, kind: HandleKind, value: NonZeroUsize) -> RawHandle {
        RawHandle::from_non_zero(self.backend, kind, value)
    }

    /// Loader handing this table to an `SdkContext`
    pub fn loader(self: &Arc<Self>) -> VirtualLoader {
        VirtualLoader {
            sdk: Arc::clone(self),
        }
    }

    /// How many times a context loaded this table
    pub fn load_count(&self) -> usize {
        self.call_count("load")
    }

    // ===== Simulation control =====

    /// Install one more device, returning its backend-local index
    pub fn add_device(&self, serial: &str) -> usize {
        let mut state = self.lock();
        state.devices.push(VirtualDevice {
            serial: serial.to_string(),
            connected: true,
            opened: false,
            streaming: None,
            imu_running: false,
            pending_timeouts: 0,
            frame: 0,
        });
        debug!(backend = %self.backend, serial, "Added virtual device");
        state.devices.len() - 1
    }

    /// Unplug a device; open handles stay valid but calls start failing
    pub fn disconnect_device(&self, index: usize) {
        if let Some(device) = self.lock().devices.get_mut(index) {
            device.connected = false;
            device.streaming = None;
            device.imu_running = false;
        }
    }

    /// Make the next `count` capture waits on a device time out
    pub fn queue_capture_timeouts(&self, index: usize, count: u32) {
        if let Some(device) = self.lock().devices.get_mut(index) {
            device.pending_timeouts += count;
        }
    }

    /// Make every future call of the named entry point fail
    ///
    /// Names are the trait method names, e.g. `"image_create"`.
    pub fn inject_failure(&self, call: &'static str) {
        self.lock().failures.insert(call);
    }

    pub fn clear_failures(&self) {
        self.lock().failures.clear();
    }

    /// Create a standalone object with one reference, outside any device
    pub fn create_test_handle(&self, kind: HandleKind) -> RawHandle {
        let mut state = self.lock();
        let data = match kind {
            HandleKind::Device => ObjectData::Device { index: None },
            HandleKind::Capture => ObjectData::Capture {
                images: [None; 3],
                temperature: f32::NAN,
            },
            HandleKind::Image => {
                let value = state.new_image(ImageFormat::Custom8, 4, 4, 4);
                return self.handle(kind, value.unwrap_or(NonZeroUsize::MIN));
            }
            HandleKind::Transformation => ObjectData::Transformation {
                depth_mode: DepthMode::Off,
                color_resolution: ColorResolution::Off,
            },
            HandleKind::DepthEngine => ObjectData::DepthEngine,
        };
        let value = state.allocate(kind, data);
        self.handle(kind, value)
    }

    // ===== Observation =====

    /// How many times `release` was called for this handle value
    pub fn release_count(&self, handle: RawHandle) -> usize {
        self.lock()
            .release_calls
            .get(&handle.value())
            .copied()
            .unwrap_or(0)
    }

    /// Native reference count, `None` once the object is destroyed
    pub fn reference_count(&self, handle: RawHandle) -> Option<usize> {
        self.lock().objects.get(&handle.value()).map(|o| o.refs)
    }

    /// Number of calls of the named entry point
    pub fn call_count(&self, call: &str) -> usize {
        self.lock().calls.get(call).copied().unwrap_or(0)
    }

    pub fn add_reference_calls(&self) -> usize {
        self.call_count("add_reference")
    }

    /// Number of simulated native objects still alive
    pub fn live_objects(&self) -> usize {
        self.lock().objects.len()
    }

    /// Number of live objects of one kind
    pub fn live_objects_of(&self, kind: HandleKind) -> usize {
        self.lock()
            .objects
            .values()
            .filter(|o| o.kind == kind)
            .count()
    }

    /// Minimum level of the installed debug handler, `None` when cleared
    pub fn debug_handler_level(&self) -> Option<TraceLevel> {
        self.lock().trace_level
    }

    fn copy_buffer(source: &[u8], buffer: &mut [u8]) -> BufferResult {
        if buffer.len() < source.len() {
            return BufferResult::TooSmall(source.len());
        }
        buffer[..source.len()].copy_from_slice(source);
        BufferResult::Succeeded(source.len())
    }

    fn synthetic_capture(
        state: &mut VirtualState,
        config: DeviceConfiguration,
        frame: u64,
    ) -> NonZeroUsize {
        let timestamp = frame * FRAME_INTERVAL_USEC;
        let mut images = [None; 3];

        if config.color_resolution != ColorResolution::Off {
            let width = config.color_resolution.width_pixels() as i32;
            let height = config.color_resolution.height_pixels() as i32;
            let stride = config
                .color_format
                .stride_bytes(width as u32)
                .map(|s| s as i32)
                .unwrap_or(width * 2);
            images[0] = state.new_image(config.color_format, width, height, stride);
        }
        if config.depth_mode.has_depth() {
            let width = config.depth_mode.width_pixels() as i32;
            let height = config.depth_mode.height_pixels() as i32;
            images[1] = state.new_image(ImageFormat::Depth16, width, height, 0);
        }
        if config.depth_mode.has_passive_ir() {
            let width = config.depth_mode.width_pixels() as i32;
            let height = config.depth_mode.height_pixels() as i32;
            images[2] = state.new_image(ImageFormat::Ir16, width, height, 0);
        }

        let images = images.map(|slot| slot.map(NonZeroUsize::get));
        for value in images.iter().flatten() {
            if let Some(image) = state.image_mut(*value) {
                image.device_timestamp_usec = timestamp;
                image.system_timestamp_nsec = timestamp * 1000;
            }
        }

        state.allocate(
            HandleKind::Capture,
            ObjectData::Capture {
                images,
                temperature: 35.0,
            },
        )
    }
}

/// [`NativeLoader`] returning a shared [`VirtualSdk`]
///
/// Injecting a failure for `"load"` makes loading fail like a missing
/// library would.
pub struct VirtualLoader {
    sdk: Arc<VirtualSdk>,
}

impl NativeLoader for VirtualLoader {
    fn load(&self, backend: Backend) -> SdkResult<Arc<dyn NativeApi>> {
        if backend != self.sdk.backend {
            return Err(SdkError::BackendMismatch {
                expected: backend,
                actual: self.sdk.backend,
            });
        }
        if !self.sdk.lock().record("load") {
            return Err(SdkError::Library {
                path: PathBuf::from(backend.library_subdirectory()),
                message: "simulated load failure".into(),
            });
        }
        debug!(backend = %backend, "Loaded virtual SDK");
        let api: Arc<dyn NativeApi> = self.sdk.clone();
        Ok(api)
    }
}

fn slot_index(slot: CaptureSlot) -> usize {
    match slot {
        CaptureSlot::Color => 0,
        CaptureSlot::Depth => 1,
        CaptureSlot::Ir => 2,
    }
}

fn outcome(ok: bool) -> NativeResult {
    if ok { Ok(()) } else { Err(NativeFailure) }
}

impl NativeApi for VirtualSdk {
    fn backend(&self) -> Backend {
        self.backend
    }

    fn release(&self, handle: RawHandle) {
        let mut state = self.lock();
        state.record("release");
        *state.release_calls.entry(handle.value()).or_insert(0) += 1;
        state.drop_ref(handle.value());
        trace!(handle = %handle, "Virtual release");
    }

    fn add_reference(&self, handle: RawHandle) -> NativeResult {
        let mut state = self.lock();
        let ok = state.record("add_reference") && state.add_ref(handle.value());
        outcome(ok)
    }

    fn device_installed_count(&self) -> u32 {
        let mut state = self.lock();
        state.record("device_installed_count");
        state.devices.len() as u32
    }

    fn device_open(&self, index: u32) -> Option<NonZeroUsize> {
        let mut state = self.lock();
        if !state.record("device_open") {
            return None;
        }
        let index = index as usize;
        let device = state.devices.get_mut(index)?;
        if device.opened || !device.connected {
            return None;
        }
        device.opened = true;
        Some(state.allocate(HandleKind::Device, ObjectData::Device { index: Some(index) }))
    }

    fn device_serialnum(&self, device: RawHandle, buffer: &mut [u8]) -> BufferResult {
        let mut state = self.lock();
        if !state.record("device_serialnum") {
            return BufferResult::Failed;
        }
        let Some(dev) = state.device(device.value()) else {
            return BufferResult::Failed;
        };
        let mut serial = dev.serial.clone().into_bytes();
        serial.push(0);
        Self::copy_buffer(&serial, buffer)
    }

    fn device_raw_calibration(&self, device: RawHandle, buffer: &mut [u8]) -> BufferResult {
        let mut state = self.lock();
        if !state.record("device_raw_calibration") {
            return BufferResult::Failed;
        }
        let Some(dev) = state.device(device.value()) else {
            return BufferResult::Failed;
        };
        if !dev.connected {
            return BufferResult::Failed;
        }
        let json = format!(
            "{{\"CalibrationInformation\":{{\"Serial\":\"{}\"}}}}",
            dev.serial
        );
        let mut raw = json.into_bytes();
        raw.push(0);
        Self::copy_buffer(&raw, buffer)
    }

    fn device_sync_jack(&self, device: RawHandle) -> NativeResult<(bool, bool)> {
        let mut state = self.lock();
        let ok = state.record("device_sync_jack");
        match state.device(device.value()) {
            Some(dev) if ok && dev.connected => Ok((false, false)),
            _ => Err(NativeFailure),
        }
    }

    fn device_version(&self, device: RawHandle) -> NativeResult<HardwareVersion> {
        let mut state = self.lock();
        let ok = state.record("device_version");
        match state.device(device.value()) {
            Some(dev) if ok && dev.connected => {
                let version = FirmwareVersion {
                    major: 1,
                    minor: 6,
                    iteration: 110,
                };
                Ok(HardwareVersion {
                    rgb: version,
                    depth: version,
                    audio: version,
                    depth_sensor: version,
                    firmware_build: 0,
                    firmware_signature: 0,
                })
            }
            _ => Err(NativeFailure),
        }
    }

    fn device_start_cameras(
        &self,
        device: RawHandle,
        config: &DeviceConfiguration,
    ) -> NativeResult {
        let mut state = self.lock();
        let ok = state.record("device_start_cameras");
        match state.device(device.value()) {
            Some(dev) if ok && dev.connected && dev.streaming.is_none() => {
                dev.streaming = Some(*config);
                Ok(())
            }
            _ => Err(NativeFailure),
        }
    }

    fn device_stop_cameras(&self, device: RawHandle) {
        let mut state = self.lock();
        state.record("device_stop_cameras");
        if let Some(dev) = state.device(device.value()) {
            dev.streaming = None;
        }
    }

    fn device_start_imu(&self, device: RawHandle) -> NativeResult {
        let mut state = self.lock();
        let ok = state.record("device_start_imu");
        match state.device(device.value()) {
            // IMU only runs while the cameras do
            Some(dev) if ok && dev.connected && dev.streaming.is_some() && !dev.imu_running => {
                dev.imu_running = true;
                Ok(())
            }
            _ => Err(NativeFailure),
        }
    }

    fn device_stop_imu(&self, device: RawHandle) {
        let mut state = self.lock();
        state.record("device_stop_imu");
        if let Some(dev) = state.device(device.value()) {
            dev.imu_running = false;
        }
    }

    fn device_get_capture(&self, device: RawHandle, _timeout: Timeout) -> WaitResult<NonZeroUsize> {
        let mut state = self.lock();
        if !state.record("device_get_capture") {
            return WaitResult::Failed;
        }
        let Some(dev) = state.device(device.value()) else {
            return WaitResult::Failed;
        };
        let Some(config) = dev.streaming.filter(|_| dev.connected) else {
            return WaitResult::Failed;
        };
        if dev.pending_timeouts > 0 {
            dev.pending_timeouts -= 1;
            return WaitResult::Timeout;
        }
        dev.frame += 1;
        let frame = dev.frame;
        WaitResult::Ready(Self::synthetic_capture(&mut state, config, frame))
    }

    fn device_get_imu_sample(&self, device: RawHandle, _timeout: Timeout) -> WaitResult<ImuSample> {
        let mut state = self.lock();
        if !state.record("device_get_imu_sample") {
            return WaitResult::Failed;
        }
        match state.device(device.value()) {
            Some(dev) if dev.connected && dev.imu_running => {
                dev.frame += 1;
                let timestamp = dev.frame * FRAME_INTERVAL_USEC;
                WaitResult::Ready(ImuSample {
                    temperature: 30.0,
                    acc_sample: [0.0, 0.0, -9.81],
                    acc_timestamp_usec: timestamp,
                    gyro_sample: [0.0; 3],
                    gyro_timestamp_usec: timestamp,
                })
            }
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
        let mut state = self.lock();
        let ok = state.record("device_calibration");
        match state.device(device.value()) {
            Some(dev) if ok && dev.connected => {
                calibration.set_modes(depth_mode, color_resolution);
                Ok(())
            }
            _ => Err(NativeFailure),
        }
    }

    fn calibration_from_raw(
        &self,
        raw: &[u8],
        depth_mode: DepthMode,
        color_resolution: ColorResolution,
        calibration: &mut CalibrationBlob,
    ) -> NativeResult {
        let ok = self.lock().record("calibration_from_raw");
        if !ok || raw.first() != Some(&b'{') {
            return Err(NativeFailure);
        }
        calibration.set_modes(depth_mode, color_resolution);
        Ok(())
    }

    fn capture_create(&self) -> Option<NonZeroUsize> {
        let mut state = self.lock();
        if !state.record("capture_create") {
            return None;
        }
        Some(state.allocate(
            HandleKind::Capture,
            ObjectData::Capture {
                images: [None; 3],
                temperature: f32::NAN,
            },
        ))
    }

    fn capture_image(&self, capture: RawHandle, slot: CaptureSlot) -> Option<NonZeroUsize> {
        let mut state = self.lock();
        state.record("capture_image");
        let image = match state.objects.get(&capture.value()).map(|o| &o.data) {
            Some(ObjectData::Capture { images, .. }) => images[slot_index(slot)]?,
            _ => return None,
        };
        // The caller receives its own reference
        state.add_ref(image).then_some(())?;
        NonZeroUsize::new(image)
    }

    fn capture_set_image(&self, capture: RawHandle, slot: CaptureSlot, image: Option<RawHandle>) {
        let mut state = self.lock();
        state.record("capture_set_image");
        let new_value = image.map(|i| i.value());
        if let Some(value) = new_value {
            if !state.add_ref(value) {
                return;
            }
        }
        let replaced = match state.objects.get_mut(&capture.value()).map(|o| &mut o.data) {
            Some(ObjectData::Capture { images, .. }) => {
                Some(std::mem::replace(&mut images[slot_index(slot)], new_value))
            }
            _ => None,
        };
        match replaced {
            Some(Some(old)) => state.drop_ref(old),
            Some(None) => {}
            // Not a capture: give back the reference taken above
            None => {
                if let Some(value) = new_value {
                    state.drop_ref(value);
                }
            }
        }
    }

    fn capture_temperature_c(&self, capture: RawHandle) -> f32 {
        match self.lock().objects.get(&capture.value()).map(|o| &o.data) {
            Some(ObjectData::Capture { temperature, .. }) => *temperature,
            _ => f32::NAN,
        }
    }

    fn capture_set_temperature_c(&self, capture: RawHandle, value: f32) {
        if let Some(ObjectData::Capture { temperature, .. }) = self
            .lock()
            .objects
            .get_mut(&capture.value())
            .map(|o| &mut o.data)
        {
            *temperature = value;
        }
    }

    fn image_create(
        &self,
        format: ImageFormat,
        width: i32,
        height: i32,
        stride: i32,
    ) -> Option<NonZeroUsize> {
        let mut state = self.lock();
        if !state.record("image_create") {
            return None;
        }
        state.new_image(format, width, height, stride)
    }

    fn image_format(&self, image: RawHandle) -> ImageFormat {
        self.lock()
            .image(image.value())
            .map(|i| i.format)
            .unwrap_or(ImageFormat::Custom)
    }

    fn image_width(&self, image: RawHandle) -> i32 {
        self.lock().image(image.value()).map(|i| i.width).unwrap_or(0)
    }

    fn image_height(&self, image: RawHandle) -> i32 {
        self.lock().image(image.value()).map(|i| i.height).unwrap_or(0)
    }

    fn image_stride(&self, image: RawHandle) -> i32 {
        self.lock().image(image.value()).map(|i| i.stride).unwrap_or(0)
    }

    fn image_size(&self, image: RawHandle) -> usize {
        self.lock()
            .image(image.value())
            .map(|i| i.buffer.len())
            .unwrap_or(0)
    }

    fn image_device_timestamp_usec(&self, image: RawHandle) -> u64 {
        self.lock()
            .image(image.value())
            .map(|i| i.device_timestamp_usec)
            .unwrap_or(0)
    }

    fn image_set_device_timestamp_usec(&self, image: RawHandle, timestamp: u64) {
        if let Some(data) = self.lock().image_mut(image.value()) {
            data.device_timestamp_usec = timestamp;
        }
    }

    fn image_system_timestamp_nsec(&self, image: RawHandle) -> u64 {
        self.lock()
            .image(image.value())
            .map(|i| i.system_timestamp_nsec)
            .unwrap_or(0)
    }

    fn image_exposure_usec(&self, image: RawHandle) -> u64 {
        self.lock()
            .image(image.value())
            .map(|i| i.exposure_usec)
            .unwrap_or(0)
    }

    fn image_white_balance(&self, image: RawHandle) -> u32 {
        self.lock()
            .image(image.value())
            .map(|i| i.white_balance)
            .unwrap_or(0)
    }

    fn image_iso_speed(&self, image: RawHandle) -> u32 {
        self.lock()
            .image(image.value())
            .map(|i| i.iso_speed)
            .unwrap_or(0)
    }

    fn image_read(&self, image: RawHandle) -> Vec<u8> {
        self.lock()
            .image(image.value())
            .map(|i| i.buffer.clone())
            .unwrap_or_default()
    }

    fn image_write(&self, image: RawHandle, data: &[u8]) {
        if let Some(target) = self.lock().image_mut(image.value()) {
            let len = target.buffer.len().min(data.len());
            target.buffer[..len].copy_from_slice(&data[..len]);
        }
    }

    fn transformation_create(&self, calibration: &CalibrationBlob) -> Option<NonZeroUsize> {
        let mut state = self.lock();
        if !state.record("transformation_create") {
            return None;
        }
        let depth_mode = calibration.depth_mode()?;
        let color_resolution = calibration.color_resolution()?;
        Some(state.allocate(
            HandleKind::Transformation,
            ObjectData::Transformation {
                depth_mode,
                color_resolution,
            },
        ))
    }

    fn transformation_depth_to_color(
        &self,
        transformation: RawHandle,
        depth: RawHandle,
        transformed_depth: RawHandle,
    ) -> NativeResult {
        let mut state = self.lock();
        let ok = state.record("transformation_depth_to_color");
        let ok = ok
            && state
                .transformation_sizes(transformation.value())
                .is_some_and(|(depth_size, color_size)| {
                    state.image_has_size(depth.value(), depth_size)
                        && state.image_has_size(transformed_depth.value(), color_size)
                });
        outcome(ok)
    }

    fn transformation_color_to_depth(
        &self,
        transformation: RawHandle,
        depth: RawHandle,
        color: RawHandle,
        transformed_color: RawHandle,
    ) -> NativeResult {
        let mut state = self.lock();
        let ok = state.record("transformation_color_to_depth");
        let ok = ok
            && state
                .transformation_sizes(transformation.value())
                .is_some_and(|(depth_size, color_size)| {
                    state.image_has_size(depth.value(), depth_size)
                        && state.image_has_size(color.value(), color_size)
                        && state.image_has_size(transformed_color.value(), depth_size)
                });
        outcome(ok)
    }

    fn transformation_depth_to_point_cloud(
        &self,
        transformation: RawHandle,
        depth: RawHandle,
        geometry: CalibrationGeometry,
        xyz: RawHandle,
    ) -> NativeResult {
        let mut state = self.lock();
        if !state.record("transformation_depth_to_point_cloud") {
            return Err(NativeFailure);
        }
        let Some((depth_size, color_size)) = state.transformation_sizes(transformation.value())
        else {
            return Err(NativeFailure);
        };
        let size = match geometry {
            CalibrationGeometry::Depth => depth_size,
            CalibrationGeometry::Color => color_size,
            _ => return Err(NativeFailure),
        };
        if !state.image_has_size(depth.value(), size) || !state.image_has_size(xyz.value(), size) {
            return Err(NativeFailure);
        }
        let Some(source) = state.image(depth.value()).cloned() else {
            return Err(NativeFailure);
        };
        let Some(target) = state.image_mut(xyz.value()) else {
            return Err(NativeFailure);
        };

        // Pixel grid as x/y, depth as z
        let width = source.width as usize;
        for (i, depth_mm) in source.buffer.chunks_exact(2).enumerate() {
            let point = [
                (i % width) as i16,
                (i / width) as i16,
                i16::from_ne_bytes([depth_mm[0], depth_mm[1]]),
            ];
            let offset = (i / width) * target.stride as usize + (i % width) * 6;
            if let Some(out) = target.buffer.get_mut(offset..offset + 6) {
                for (j, coordinate) in point.iter().enumerate() {
                    out[j * 2..j * 2 + 2].copy_from_slice(&coordinate.to_ne_bytes());
                }
            }
        }
        Ok(())
    }

    fn depth_engine_helper_create(&self) -> Option<NonZeroUsize> {
        let mut state = self.lock();
        if !state.record("depth_engine_helper_create") || self.backend != Backend::Orbbec {
            return None;
        }
        Some(state.allocate(HandleKind::DepthEngine, ObjectData::DepthEngine))
    }

    fn set_debug_message_handler(&self, min_level: TraceLevel) -> NativeResult {
        let mut state = self.lock();
        if !state.record("set_debug_message_handler") {
            return Err(NativeFailure);
        }
        state.trace_level = (min_level != TraceLevel::Off).then_some(min_level);
        Ok(())
    }
}
