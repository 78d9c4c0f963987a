// SPDX-License-Identifier: MPL-2.0

//! Integration tests for image formats and camera modes

use k4a_combo::Backend;
use k4a_combo::sensor::{ColorResolution, DepthMode, DeviceConfiguration, FrameRate, ImageFormat};

#[test]
fn test_stride_derivation() {
    // Fixed pixel sizes derive the stride, compressed and custom formats do not
    assert_eq!(ImageFormat::Depth16.stride_bytes(640), Some(1280));
    assert_eq!(ImageFormat::ColorBgra32.stride_bytes(1280), Some(5120));
    assert_eq!(ImageFormat::ColorNv12.stride_bytes(1280), Some(1280));
    assert_eq!(ImageFormat::ColorMjpg.stride_bytes(1280), None);
    assert_eq!(ImageFormat::Custom.stride_bytes(10), None);
}

#[test]
fn test_orbbec_supports_only_16_9_color() {
    let azure = ColorResolution::supported_by(Backend::Azure);
    let orbbec = ColorResolution::supported_by(Backend::Orbbec);

    assert_eq!(azure.len(), ColorResolution::ALL.len());
    assert!(orbbec.iter().all(|r| !r.is_aspect_ratio_4_3()));
    assert!(orbbec.contains(&ColorResolution::R2160p));
}

#[test]
fn test_color_format_compatibility() {
    assert!(ColorResolution::R720p.is_compatible_with_format(ImageFormat::ColorNv12, Backend::Azure));
    assert!(!ColorResolution::R1080p.is_compatible_with_format(ImageFormat::ColorYuy2, Backend::Azure));
    assert!(ColorResolution::R1080p.is_compatible_with_format(ImageFormat::ColorBgra32, Backend::Azure));
    assert!(
        !ColorResolution::R1080p.is_compatible_with_format(ImageFormat::ColorBgra32, Backend::Orbbec),
        "Orbbec devices have no BGRA32 color mode"
    );
}

#[test]
fn test_frame_rate_limits() {
    assert!(!DepthMode::WideViewUnbinned.is_compatible_with(FrameRate::Thirty));
    assert!(DepthMode::WideViewUnbinned.is_compatible_with(FrameRate::Fifteen));
    assert!(!ColorResolution::R3072p.is_compatible_with_frame_rate(FrameRate::Thirty, Backend::Azure));
    assert!(ColorResolution::R3072p.is_compatible_with_frame_rate(FrameRate::Fifteen, Backend::Azure));
    assert_eq!(FrameRate::from_hz(15), Some(FrameRate::Fifteen));
    assert_eq!(FrameRate::from_hz(25), None);
}

#[test]
fn test_configuration_validation_per_backend() {
    let config = DeviceConfiguration {
        color_format: ImageFormat::ColorBgra32,
        color_resolution: ColorResolution::R1080p,
        depth_mode: DepthMode::WideView2x2Binned,
        ..DeviceConfiguration::DISABLE_ALL
    };
    assert!(config.validate(Backend::Azure).is_ok());
    assert!(config.validate(Backend::Orbbec).is_err());

    let config = DeviceConfiguration {
        color_format: ImageFormat::Ir16,
        ..DeviceConfiguration::DISABLE_ALL
    };
    assert!(
        config.validate(Backend::Azure).is_err(),
        "IR16 cannot be used as a color format"
    );
}
