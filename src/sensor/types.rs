// SPDX-License-Identifier: GPL-3.0-only

//! Small value types shared by the sensor resources and the native tables

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Wait timeout for blocking native calls, in milliseconds
///
/// `-1` waits forever and `0` polls without blocking, as the native API
/// defines them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Timeout(i32);

impl Timeout {
    /// Return immediately if no data is available
    pub const NO_WAIT: Timeout = Timeout(0);
    /// Block until data arrives or the operation fails
    pub const INFINITE: Timeout = Timeout(-1);

    /// Timeout of `ms` milliseconds, saturating at the largest finite value
    pub fn from_millis(ms: u32) -> Self {
        Timeout(i32::try_from(ms).unwrap_or(i32::MAX))
    }

    /// Native `int32_t timeout_in_ms` value
    pub fn as_millis(self) -> i32 {
        self.0
    }

    pub fn is_infinite(self) -> bool {
        self == Self::INFINITE
    }

    /// Duration equivalent, `None` for an infinite timeout
    pub fn to_duration(self) -> Option<Duration> {
        u64::try_from(self.0).ok().map(Duration::from_millis)
    }
}

impl From<Duration> for Timeout {
    fn from(duration: Duration) -> Self {
        Timeout(i32::try_from(duration.as_millis()).unwrap_or(i32::MAX))
    }
}

impl std::fmt::Display for Timeout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_infinite() {
            write!(f, "infinite")
        } else {
            write!(f, "{} ms", self.0)
        }
    }
}

/// Minimum severity of native SDK debug messages to forward
///
/// Ordered like `k4a_log_level_t`: lower values are more severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(i32)]
pub enum TraceLevel {
    Critical = 0,
    Error = 1,
    Warning = 2,
    Info = 3,
    Trace = 4,
    /// No messages are forwarded and no native handler is installed
    #[default]
    Off = 5,
}

impl TraceLevel {
    pub fn from_native(value: i32) -> Option<Self> {
        [
            TraceLevel::Critical,
            TraceLevel::Error,
            TraceLevel::Warning,
            TraceLevel::Info,
            TraceLevel::Trace,
            TraceLevel::Off,
        ]
        .get(usize::try_from(value).ok()?)
        .copied()
    }

    pub fn to_native(self) -> i32 {
        self as i32
    }
}

impl std::str::FromStr for TraceLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "critical" => Ok(TraceLevel::Critical),
            "error" => Ok(TraceLevel::Error),
            "warning" | "warn" => Ok(TraceLevel::Warning),
            "info" => Ok(TraceLevel::Info),
            "trace" => Ok(TraceLevel::Trace),
            "off" => Ok(TraceLevel::Off),
            other => Err(format!("unknown trace level: {}", other)),
        }
    }
}

/// Sensor whose coordinate system a calibration call refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum CalibrationGeometry {
    Depth = 0,
    Color = 1,
    Gyro = 2,
    Accel = 3,
}

impl CalibrationGeometry {
    pub fn to_native(self) -> i32 {
        self as i32
    }
}

/// One accelerometer plus gyroscope reading (`k4a_imu_sample_t`)
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[repr(C)]
pub struct ImuSample {
    /// Sensor temperature in Celsius
    pub temperature: f32,
    /// Accelerometer reading in m/s²
    pub acc_sample: [f32; 3],
    pub acc_timestamp_usec: u64,
    /// Gyroscope reading in rad/s
    pub gyro_sample: [f32; 3],
    pub gyro_timestamp_usec: u64,
}

/// Firmware component version (`k4a_version_t`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(C)]
pub struct FirmwareVersion {
    pub major: u32,
    pub minor: u32,
    pub iteration: u32,
}

impl std::fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.iteration)
    }
}

/// Firmware versions reported by a device (`k4a_hardware_version_t`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(C)]
pub struct HardwareVersion {
    pub rgb: FirmwareVersion,
    pub depth: FirmwareVersion,
    pub audio: FirmwareVersion,
    pub depth_sensor: FirmwareVersion,
    /// 0 = release build, 1 = debug build
    pub firmware_build: i32,
    /// 0 = Microsoft signed, 1 = test signed, 2 = unsigned
    pub firmware_signature: i32,
}
