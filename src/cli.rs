// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands for device inspection
//!
//! This module provides command-line functionality for:
//! - Listing attached devices of every initialized backend
//! - Probing one device by streaming a few captures
//! - Showing and saving the configuration

use k4a_combo::backends::virtual_sdk::VirtualSdk;
use k4a_combo::sensor::types::{CalibrationGeometry, Timeout, TraceLevel};
use k4a_combo::sensor::{ColorResolution, DepthMode, FrameRate, ImageFormat};
use k4a_combo::{
    Backend, Capture, ComboMode, Device, DeviceConfiguration, Image, SdkConfig, SdkContext,
    Transformation,
};
use std::path::PathBuf;
use std::sync::Arc;

/// Global options shared by every command
pub struct ContextOptions {
    pub mode: Option<ComboMode>,
    pub lib_root: Option<PathBuf>,
    pub trace_level: Option<TraceLevel>,
    /// Number of simulated devices per backend, instead of native libraries
    pub virtual_devices: Option<usize>,
}

impl ContextOptions {
    /// Configuration file values with command-line overrides applied
    fn effective_config(&self) -> SdkConfig {
        let mut config = SdkConfig::load_or_default();
        if let Some(mode) = self.mode {
            config.combo_mode = mode;
        }
        if let Some(root) = &self.lib_root {
            config.native_lib_root = Some(root.clone());
        }
        if let Some(level) = self.trace_level {
            config.trace_level = level;
        }
        config
    }

    /// Build a context and initialize the configured backends
    fn open_context(&self) -> Result<SdkContext, Box<dyn std::error::Error>> {
        let config = self.effective_config();
        let ctx = match self.virtual_devices {
            Some(count) => SdkContext::builder()
                .azure(Arc::new(VirtualSdk::with_devices(Backend::Azure, count)).loader())
                .orbbec(Arc::new(VirtualSdk::with_devices(Backend::Orbbec, count)).loader())
                .trace_level(config.trace_level)
                .build(),
            None => SdkContext::from_config(&config),
        };
        ctx.init(config.combo_mode)?;
        Ok(ctx)
    }
}

/// List all attached devices
pub fn list_devices(options: &ContextOptions) -> Result<(), Box<dyn std::error::Error>> {
    let ctx = options.open_context()?;

    let total = Device::total_installed_count(&ctx);
    if total == 0 {
        println!("No devices found.");
        return Ok(());
    }

    println!("Available devices:");
    println!();
    let mut combined = 0u32;
    for backend in Backend::ALL {
        if !ctx.is_initialized(backend) {
            continue;
        }
        let count = Device::installed_count(&ctx, backend)?;
        for index in 0..count {
            match Device::try_open_on(&ctx, backend, index)? {
                Some(device) => {
                    let version = device.version();
                    println!("  [{}] {}", combined, device);
                    println!(
                        "      Firmware: rgb {}, depth {}, audio {}",
                        version.rgb, version.depth, version.audio
                    );
                    device.release();
                }
                None => println!("  [{}] {} device (in use)", combined, backend),
            }
            combined += 1;
        }
    }
    println!();

    Ok(())
}

/// Streaming configuration accepted by devices of both backends
fn probe_configuration() -> DeviceConfiguration {
    DeviceConfiguration {
        color_format: ImageFormat::ColorMjpg,
        color_resolution: ColorResolution::R720p,
        depth_mode: DepthMode::NarrowViewUnbinned,
        camera_fps: FrameRate::Thirty,
        ..DeviceConfiguration::DISABLE_ALL
    }
}

/// Stream a few captures from one device and print what arrives
pub fn probe_device(
    options: &ContextOptions,
    index: u32,
    captures: u32,
    timeout_ms: u32,
) -> Result<(), Box<dyn std::error::Error>> {
    let ctx = options.open_context()?;
    let device = Device::open(&ctx, index)?;
    println!("Using device: {}", device);

    let config = probe_configuration();
    let calibration = device.calibration(config.depth_mode, config.color_resolution)?;
    let transformation = Transformation::new(&ctx, &calibration)?;

    device.start_cameras(&config)?;
    println!(
        "Streaming {:?} depth and {:?} color at {} fps",
        config.depth_mode,
        config.color_resolution,
        config.camera_fps.hz()
    );

    let timeout = Timeout::from_millis(timeout_ms);
    let mut received = 0;
    for _ in 0..captures {
        let Some(capture) = device.try_get_capture(timeout)? else {
            println!("  timeout after {} ms", timeout_ms);
            continue;
        };
        received += 1;
        print_capture(&capture)?;

        if received == 1 {
            if let Some(depth) = capture.depth_image()? {
                print_center_point(&ctx, &device, &transformation, &depth)?;
            }
        }
        capture.release();
    }

    device.stop_cameras()?;
    transformation.release();
    device.release();
    println!("Received {} of {} captures", received, captures);

    Ok(())
}

fn print_capture(capture: &Capture) -> Result<(), Box<dyn std::error::Error>> {
    let mut parts = Vec::new();
    for (name, image) in [
        ("color", capture.color_image()?),
        ("depth", capture.depth_image()?),
        ("ir", capture.ir_image()?),
    ] {
        if let Some(image) = image {
            parts.push(format!(
                "{} {}x{} @{}us",
                name,
                image.width_pixels()?,
                image.height_pixels()?,
                image.device_timestamp_usec()?
            ));
        }
    }
    println!(
        "  capture: {} (temperature {:.1} C)",
        parts.join(", "),
        capture.temperature_c()?
    );
    Ok(())
}

/// Convert one depth image to a point cloud and print its center point
fn print_center_point(
    ctx: &SdkContext,
    device: &Device,
    transformation: &Transformation,
    depth: &Image,
) -> Result<(), Box<dyn std::error::Error>> {
    let width = depth.width_pixels()?;
    let height = depth.height_pixels()?;
    let xyz = Image::new(
        ctx,
        device.backend(),
        ImageFormat::Custom,
        width,
        height,
        width * 6,
    )?;
    transformation.depth_image_to_point_cloud(depth, CalibrationGeometry::Depth, &xyz)?;

    let data = xyz.copy_to_vec()?;
    let stride = xyz.stride_bytes()? as usize;
    let offset = (height as usize / 2) * stride + (width as usize / 2) * 6;
    if let Some(point) = data.get(offset..offset + 6) {
        let coordinate = |i: usize| i16::from_ne_bytes([point[i], point[i + 1]]);
        println!(
            "  center point: ({}, {}, {}) mm",
            coordinate(0),
            coordinate(2),
            coordinate(4)
        );
    }
    xyz.release();
    Ok(())
}

/// Print the effective configuration, optionally saving it
pub fn show_config(options: &ContextOptions, save: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config = options.effective_config();
    let path = SdkConfig::default_path();

    match &path {
        Some(path) => println!("Config file: {}", path.display()),
        None => println!("Config file: (no config directory on this platform)"),
    }
    println!("Native library root: {}", config.native_lib_root().display());
    println!("{}", serde_json::to_string_pretty(&config)?);

    if save {
        let path = path.ok_or("No config directory to save to")?;
        config.save(&path)?;
        println!("Saved to {}", path.display());
    }
    Ok(())
}
