// SPDX-License-Identifier: GPL-3.0-only

//! Image format, depth mode, color resolution and frame rate lookups
//!
//! The discriminants match the native `k4a_image_format_t`, `k4a_depth_mode_t`,
//! `k4a_color_resolution_t` and `k4a_fps_t` values so they can be handed to
//! either backend unchanged.

use crate::backends::Backend;
use serde::{Deserialize, Serialize};

/// Pixel format of an image buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum ImageFormat {
    /// MJPG compressed color frame
    ColorMjpg = 0,
    /// NV12: Y plane followed by interleaved U/V plane
    ColorNv12 = 1,
    /// YUY2: interleaved 4:2:2
    ColorYuy2 = 2,
    /// 32 bits per pixel, blue/green/red/alpha
    ColorBgra32 = 3,
    /// 16-bit depth in millimeters
    Depth16 = 4,
    /// 16-bit infrared brightness
    Ir16 = 5,
    /// Custom 8-bit single channel
    Custom8 = 6,
    /// Custom 16-bit single channel
    Custom16 = 7,
    /// Custom format with caller-defined layout (point clouds, etc.)
    Custom = 8,
}

impl ImageFormat {
    /// All formats in native order
    pub const ALL: [ImageFormat; 9] = [
        ImageFormat::ColorMjpg,
        ImageFormat::ColorNv12,
        ImageFormat::ColorYuy2,
        ImageFormat::ColorBgra32,
        ImageFormat::Depth16,
        ImageFormat::Ir16,
        ImageFormat::Custom8,
        ImageFormat::Custom16,
        ImageFormat::Custom,
    ];

    /// Convert a native format value
    pub fn from_native(value: i32) -> Option<Self> {
        Self::ALL.get(usize::try_from(value).ok()?).copied()
    }

    /// Native `k4a_image_format_t` value
    pub fn to_native(self) -> i32 {
        self as i32
    }

    /// Whether the format can be produced by the color camera
    pub fn is_color(self) -> bool {
        self.to_native() <= ImageFormat::ColorBgra32.to_native()
    }

    pub fn is_depth(self) -> bool {
        self == ImageFormat::Depth16
    }

    /// Whether the stride can be derived from the width alone
    pub fn has_known_bytes_per_pixel(self) -> bool {
        self.bytes_per_pixel().is_some()
    }

    /// Bytes per pixel for formats with a fixed pixel size
    pub fn bytes_per_pixel(self) -> Option<u32> {
        match self {
            ImageFormat::Depth16 | ImageFormat::Ir16 | ImageFormat::ColorYuy2 => Some(2),
            ImageFormat::ColorBgra32 => Some(4),
            ImageFormat::Custom8 => Some(1),
            ImageFormat::Custom16 => Some(2),
            _ => None,
        }
    }

    /// Stride in bytes for a row of `width` pixels
    ///
    /// NV12 stride covers the luminance plane only. Returns `None` for
    /// compressed and custom formats.
    pub fn stride_bytes(self, width: u32) -> Option<u32> {
        match self {
            ImageFormat::ColorNv12 => Some(width),
            _ => self.bytes_per_pixel().map(|bpp| bpp * width),
        }
    }

    /// Buffer size for an image of this format
    ///
    /// NV12 carries a half-height chroma plane after the luminance plane.
    /// Returns `None` when the stride is unknown (zero).
    pub fn image_size_bytes(self, stride: u32, height: u32) -> Option<usize> {
        if stride == 0 {
            return None;
        }
        let size = stride as usize * height as usize;
        if self == ImageFormat::ColorNv12 {
            Some(3 * size / 2)
        } else {
            Some(size)
        }
    }
}

impl std::fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ImageFormat::ColorMjpg => "MJPG",
            ImageFormat::ColorNv12 => "NV12",
            ImageFormat::ColorYuy2 => "YUY2",
            ImageFormat::ColorBgra32 => "BGRA32",
            ImageFormat::Depth16 => "DEPTH16",
            ImageFormat::Ir16 => "IR16",
            ImageFormat::Custom8 => "CUSTOM8",
            ImageFormat::Custom16 => "CUSTOM16",
            ImageFormat::Custom => "CUSTOM",
        };
        write!(f, "{}", name)
    }
}

const DEPTH_WIDTHS: [u32; 6] = [0, 320, 640, 512, 1024, 1024];
const DEPTH_HEIGHTS: [u32; 6] = [0, 288, 576, 512, 1024, 1024];

/// Depth sensor operating mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(i32)]
pub enum DepthMode {
    /// Depth sensor is off
    #[default]
    Off = 0,
    /// Narrow field of view, 2x2 binned
    NarrowView2x2Binned = 1,
    /// Narrow field of view, unbinned
    NarrowViewUnbinned = 2,
    /// Wide field of view, 2x2 binned
    WideView2x2Binned = 3,
    /// Wide field of view, unbinned
    WideViewUnbinned = 4,
    /// Passive infrared only, no depth
    PassiveIr = 5,
}

impl DepthMode {
    pub const ALL: [DepthMode; 6] = [
        DepthMode::Off,
        DepthMode::NarrowView2x2Binned,
        DepthMode::NarrowViewUnbinned,
        DepthMode::WideView2x2Binned,
        DepthMode::WideViewUnbinned,
        DepthMode::PassiveIr,
    ];

    pub fn from_native(value: i32) -> Option<Self> {
        Self::ALL.get(usize::try_from(value).ok()?).copied()
    }

    pub fn to_native(self) -> i32 {
        self as i32
    }

    /// Width of depth and IR images produced in this mode
    pub fn width_pixels(self) -> u32 {
        DEPTH_WIDTHS[self as usize]
    }

    /// Height of depth and IR images produced in this mode
    pub fn height_pixels(self) -> u32 {
        DEPTH_HEIGHTS[self as usize]
    }

    /// Whether the mode produces depth images (passive IR does not)
    pub fn has_depth(self) -> bool {
        !matches!(self, DepthMode::Off | DepthMode::PassiveIr)
    }

    pub fn has_passive_ir(self) -> bool {
        self != DepthMode::Off
    }

    pub fn is_wide_view(self) -> bool {
        matches!(
            self,
            DepthMode::WideView2x2Binned | DepthMode::WideViewUnbinned | DepthMode::PassiveIr
        )
    }

    pub fn is_binned(self) -> bool {
        matches!(
            self,
            DepthMode::NarrowView2x2Binned | DepthMode::WideView2x2Binned
        )
    }

    /// Wide unbinned depth cannot run at 30 fps
    pub fn is_compatible_with(self, frame_rate: FrameRate) -> bool {
        !(self == DepthMode::WideViewUnbinned && frame_rate == FrameRate::Thirty)
    }

    /// Nominal horizontal and vertical field of view in degrees
    ///
    /// `None` for modes without depth.
    pub fn nominal_fov_degrees(self) -> Option<(f32, f32)> {
        if !self.has_depth() {
            None
        } else if self.is_wide_view() {
            Some((120.0, 120.0))
        } else {
            Some((75.0, 65.0))
        }
    }
}

const COLOR_HEIGHTS: [u32; 7] = [0, 720, 1080, 1440, 1536, 2160, 3072];

/// Color camera resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(i32)]
pub enum ColorResolution {
    /// Color camera is off
    #[default]
    Off = 0,
    R720p = 1,
    R1080p = 2,
    R1440p = 3,
    /// 4:3, not available on Orbbec devices
    R1536p = 4,
    R2160p = 5,
    /// 4:3, not available on Orbbec devices
    R3072p = 6,
}

impl ColorResolution {
    pub const ALL: [ColorResolution; 7] = [
        ColorResolution::Off,
        ColorResolution::R720p,
        ColorResolution::R1080p,
        ColorResolution::R1440p,
        ColorResolution::R1536p,
        ColorResolution::R2160p,
        ColorResolution::R3072p,
    ];

    pub fn from_native(value: i32) -> Option<Self> {
        Self::ALL.get(usize::try_from(value).ok()?).copied()
    }

    pub fn to_native(self) -> i32 {
        self as i32
    }

    /// Resolutions a device of the given backend can stream
    pub fn supported_by(backend: Backend) -> Vec<ColorResolution> {
        Self::ALL
            .into_iter()
            .filter(|r| backend != Backend::Orbbec || !r.is_aspect_ratio_4_3())
            .collect()
    }

    pub fn height_pixels(self) -> u32 {
        COLOR_HEIGHTS[self as usize]
    }

    pub fn width_pixels(self) -> u32 {
        if self.is_aspect_ratio_4_3() {
            self.height_pixels() * 4 / 3
        } else {
            self.height_pixels() * 16 / 9
        }
    }

    pub fn is_aspect_ratio_4_3(self) -> bool {
        matches!(self, ColorResolution::R1536p | ColorResolution::R3072p)
    }

    pub fn is_aspect_ratio_16_9(self) -> bool {
        !matches!(self, ColorResolution::Off) && !self.is_aspect_ratio_4_3()
    }

    /// Nominal horizontal and vertical field of view in degrees
    ///
    /// The Orbbec color sensor is narrower than the Azure one.
    pub fn nominal_fov_degrees(self, backend: Backend) -> Option<(f32, f32)> {
        match (backend, self.is_aspect_ratio_4_3()) {
            _ if self == ColorResolution::Off => None,
            (Backend::Azure, true) => Some((90.0, 74.3)),
            (Backend::Azure, false) => Some((90.0, 59.0)),
            (Backend::Orbbec, true) => Some((65.0, 51.0)),
            (Backend::Orbbec, false) => Some((80.0, 51.0)),
        }
    }

    /// Frame-rate compatibility for the given backend
    pub fn is_compatible_with_frame_rate(self, frame_rate: FrameRate, backend: Backend) -> bool {
        match backend {
            Backend::Orbbec => !self.is_aspect_ratio_4_3(),
            Backend::Azure => !(self == ColorResolution::R3072p && frame_rate == FrameRate::Thirty),
        }
    }

    /// Color format compatibility for the given backend
    ///
    /// MJPG and BGRA32 work at every resolution; NV12 and YUY2 only at 720p.
    /// Orbbec devices have no BGRA32 and no 4:3 modes.
    pub fn is_compatible_with_format(self, format: ImageFormat, backend: Backend) -> bool {
        if backend == Backend::Orbbec
            && (format == ImageFormat::ColorBgra32 || self.is_aspect_ratio_4_3())
        {
            return false;
        }
        match format {
            ImageFormat::ColorBgra32 | ImageFormat::ColorMjpg => true,
            ImageFormat::ColorNv12 | ImageFormat::ColorYuy2 => self == ColorResolution::R720p,
            _ => false,
        }
    }
}

/// Camera frame rate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(i32)]
pub enum FrameRate {
    Five = 0,
    Fifteen = 1,
    #[default]
    Thirty = 2,
}

impl FrameRate {
    pub const ALL: [FrameRate; 3] = [FrameRate::Five, FrameRate::Fifteen, FrameRate::Thirty];

    pub fn from_native(value: i32) -> Option<Self> {
        Self::ALL.get(usize::try_from(value).ok()?).copied()
    }

    pub fn to_native(self) -> i32 {
        self as i32
    }

    /// Frame rate in Hz
    pub fn hz(self) -> u32 {
        match self {
            FrameRate::Five => 5,
            FrameRate::Fifteen => 15,
            FrameRate::Thirty => 30,
        }
    }

    pub fn from_hz(hz: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.hz() == hz)
    }
}
