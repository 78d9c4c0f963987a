// SPDX-License-Identifier: MPL-2.0

//! Integration tests for devices, streaming and transformations

use k4a_combo::backends::virtual_sdk::VirtualSdk;
use k4a_combo::handle::HandleKind;
use k4a_combo::sensor::types::{CalibrationGeometry, Timeout};
use k4a_combo::sensor::{ColorResolution, DepthMode, FrameRate, ImageFormat};
use k4a_combo::{
    Backend, Capture, ComboMode, Device, DeviceConfiguration, Image, SdkContext, SdkError,
    Transformation,
};
use std::sync::Arc;

struct Fixture {
    ctx: SdkContext,
    azure: Arc<VirtualSdk>,
    orbbec: Arc<VirtualSdk>,
}

/// Both backends initialized, with the given number of devices each
fn combo(azure_devices: usize, orbbec_devices: usize) -> Fixture {
    let azure = Arc::new(VirtualSdk::with_devices(Backend::Azure, azure_devices));
    let orbbec = Arc::new(VirtualSdk::with_devices(Backend::Orbbec, orbbec_devices));
    let ctx = SdkContext::builder()
        .azure(azure.loader())
        .orbbec(orbbec.loader())
        .build();
    ctx.init(ComboMode::Both).expect("virtual backends initialize");
    Fixture { ctx, azure, orbbec }
}

fn streaming_config() -> DeviceConfiguration {
    DeviceConfiguration {
        color_format: ImageFormat::ColorMjpg,
        color_resolution: ColorResolution::R720p,
        depth_mode: DepthMode::NarrowViewUnbinned,
        camera_fps: FrameRate::Thirty,
        ..DeviceConfiguration::DISABLE_ALL
    }
}

#[test]
fn test_combined_indexing_puts_azure_first() {
    let fx = combo(2, 1);
    assert_eq!(Device::total_installed_count(&fx.ctx), 3);

    let devices: Vec<Device> = (0..3).map(|i| Device::open(&fx.ctx, i).unwrap()).collect();
    let placement: Vec<(Backend, u32)> = devices.iter().map(|d| (d.backend(), d.index())).collect();
    assert_eq!(
        placement,
        vec![(Backend::Azure, 0), (Backend::Azure, 1), (Backend::Orbbec, 0)]
    );
    assert_eq!(devices[2].serial_number(), "orbbec-000001");
    assert_eq!(devices[0].to_string(), "Azure Kinect #azure-000001");
    assert_eq!(devices[2].to_string(), "Orbbec Femto #orbbec-000001");
}

#[test]
fn test_single_backend_mode_only_counts_its_devices() {
    let azure = Arc::new(VirtualSdk::with_devices(Backend::Azure, 2));
    let orbbec = Arc::new(VirtualSdk::with_devices(Backend::Orbbec, 1));
    let ctx = SdkContext::builder()
        .azure(azure.loader())
        .orbbec(orbbec.loader())
        .build();
    ctx.init(ComboMode::Orbbec).unwrap();

    assert_eq!(Device::total_installed_count(&ctx), 1);
    let device = Device::open(&ctx, 0).unwrap();
    assert_eq!(device.backend(), Backend::Orbbec);
    assert!(matches!(
        Device::open_on(&ctx, Backend::Azure, 0),
        Err(SdkError::Configuration(_))
    ));
    assert_eq!(azure.load_count(), 0);
}

#[test]
fn test_open_reports_not_found_and_occupied() {
    let fx = combo(1, 1);

    let err = Device::open(&fx.ctx, 2).unwrap_err();
    assert!(matches!(err, SdkError::DeviceNotFound { index: 2 }), "got {:?}", err);

    let first = Device::open(&fx.ctx, 1).unwrap();
    let err = Device::open(&fx.ctx, 1).unwrap_err();
    assert!(matches!(err, SdkError::DeviceOccupied { index: 1 }), "got {:?}", err);
    assert!(Device::try_open(&fx.ctx, 1).unwrap().is_none());

    assert!(first.release());
    assert!(
        Device::open(&fx.ctx, 1).is_ok(),
        "Released device should open again"
    );
}

#[test]
fn test_streaming_scenario_with_point_cloud() {
    let fx = combo(1, 1);
    let device = Device::open(&fx.ctx, 1).unwrap();
    assert_eq!(device.backend(), Backend::Orbbec);
    assert!(device.is_connected());

    let config = streaming_config();
    let calibration = device
        .calibration(config.depth_mode, config.color_resolution)
        .unwrap();
    assert_eq!(calibration.depth_mode(), DepthMode::NarrowViewUnbinned);
    let transformation = Transformation::new(&fx.ctx, &calibration).unwrap();

    device.start_cameras(&config).unwrap();
    let capture = device.get_capture().unwrap();
    let color = capture.color_image().unwrap().expect("color image");
    assert_eq!(color.format().unwrap(), ImageFormat::ColorMjpg);
    assert_eq!(color.width_pixels().unwrap(), 1280);

    let depth = capture.depth_image().unwrap().expect("depth image");
    let (width, height) = (depth.width_pixels().unwrap(), depth.height_pixels().unwrap());
    assert_eq!((width, height), (640, 576));
    assert!(depth.device_timestamp_usec().unwrap() > 0);

    let mut pixels = vec![0u8; depth.size_bytes().unwrap()];
    pixels[0..2].copy_from_slice(&1000u16.to_ne_bytes());
    depth.copy_from_slice(&pixels).unwrap();

    let xyz = Image::new(&fx.ctx, Backend::Orbbec, ImageFormat::Custom, width, height, width * 6).unwrap();
    transformation
        .depth_image_to_point_cloud(&depth, CalibrationGeometry::Depth, &xyz)
        .unwrap();
    let points = xyz.copy_to_vec().unwrap();
    assert_eq!(
        i16::from_ne_bytes([points[4], points[5]]),
        1000,
        "First point should carry the depth value as z"
    );

    capture.release();
    assert!(depth.is_disposed(), "Capture release should take its images along");
    xyz.release();
    device.stop_cameras().unwrap();
    transformation.release();
    device.release();
    assert_eq!(
        fx.orbbec.live_objects(),
        1,
        "Only the depth engine helper outlives the session"
    );
}

#[test]
fn test_capture_timeout_returns_none() {
    let fx = combo(1, 0);
    let device = Device::open(&fx.ctx, 0).unwrap();
    device.start_cameras(&streaming_config()).unwrap();

    fx.azure.queue_capture_timeouts(0, 2);
    assert!(device.try_get_capture(Timeout::NO_WAIT).unwrap().is_none());
    assert!(device.try_get_capture(Timeout::from_millis(10)).unwrap().is_none());
    let capture = device.try_get_capture(Timeout::NO_WAIT).unwrap();
    assert!(capture.is_some(), "Frames should follow the queued timeouts");
}

#[test]
fn test_disconnected_device_reports_connection_lost() {
    let fx = combo(0, 2);
    let device = Device::open_on(&fx.ctx, Backend::Orbbec, 1).unwrap();
    device.start_cameras(&streaming_config()).unwrap();

    fx.orbbec.disconnect_device(1);
    assert!(!device.is_connected());
    let err = device.try_get_capture(Timeout::NO_WAIT).unwrap_err();
    assert!(
        matches!(err, SdkError::ConnectionLost { index: 1 }),
        "got {:?}",
        err
    );
    assert!(!err.is_retryable());

    device.release();
    let err = device.sync_jack().unwrap_err();
    assert!(err.is_disposed(), "Released device should report disposal first");
}

#[test]
fn test_imu_requires_running_cameras() {
    let fx = combo(1, 0);
    let device = Device::open(&fx.ctx, 0).unwrap();

    let err = device.start_imu().unwrap_err();
    match err {
        SdkError::Failed(message) => assert!(message.contains("IMU"), "{}", message),
        other => panic!("unexpected error: {:?}", other),
    }

    device.start_cameras(&streaming_config()).unwrap();
    device.start_imu().unwrap();
    let sample = device.get_imu_sample().unwrap();
    assert!(sample.acc_timestamp_usec > 0);
    device.stop_imu().unwrap();
    assert!(device.try_get_imu_sample(Timeout::NO_WAIT).is_err());
}

#[test]
fn test_start_cameras_twice_fails() {
    let fx = combo(1, 0);
    let device = Device::open(&fx.ctx, 0).unwrap();
    device.start_cameras(&streaming_config()).unwrap();
    let err = device.start_cameras(&streaming_config()).unwrap_err();
    assert!(matches!(err, SdkError::Failed(_)), "got {:?}", err);
}

#[test]
fn test_images_cannot_cross_backends() {
    let fx = combo(0, 0);
    let capture = Capture::new(&fx.ctx, Backend::Azure).unwrap();
    let image = Image::with_default_stride(&fx.ctx, Backend::Orbbec, ImageFormat::Depth16, 4, 4).unwrap();

    let err = capture.set_depth_image(Some(&image)).unwrap_err();
    assert!(
        matches!(
            err,
            SdkError::BackendMismatch {
                expected: Backend::Azure,
                actual: Backend::Orbbec
            }
        ),
        "got {:?}",
        err
    );
    assert!(capture.depth_image().unwrap().is_none());
    assert_eq!(fx.azure.live_objects_of(HandleKind::Image), 0);
}

#[test]
fn test_transformation_validates_images() {
    let fx = combo(1, 0);
    let device = Device::open(&fx.ctx, 0).unwrap();
    let calibration = device
        .calibration(DepthMode::NarrowView2x2Binned, ColorResolution::R720p)
        .unwrap();
    let transformation = Transformation::new(&fx.ctx, &calibration).unwrap();
    let (width, height) = (320, 288);

    let depth = Image::with_default_stride(&fx.ctx, Backend::Azure, ImageFormat::Depth16, width, height).unwrap();
    let wrong_format = Image::with_default_stride(&fx.ctx, Backend::Azure, ImageFormat::Ir16, width, height).unwrap();
    let narrow_xyz = Image::new(&fx.ctx, Backend::Azure, ImageFormat::Custom, width, height, width * 4).unwrap();
    let xyz = Image::new(&fx.ctx, Backend::Azure, ImageFormat::Custom, width, height, width * 6).unwrap();

    let err = transformation
        .depth_image_to_point_cloud(&wrong_format, CalibrationGeometry::Depth, &xyz)
        .unwrap_err();
    match err {
        SdkError::InvalidArgument(message) => assert!(
            message.contains("depth_image must have DEPTH16 format but has IR16"),
            "{}",
            message
        ),
        other => panic!("unexpected error: {:?}", other),
    }

    let err = transformation
        .depth_image_to_point_cloud(&depth, CalibrationGeometry::Depth, &narrow_xyz)
        .unwrap_err();
    assert!(matches!(err, SdkError::InvalidArgument(_)), "got {:?}", err);

    let err = transformation
        .depth_image_to_point_cloud(&depth, CalibrationGeometry::Gyro, &xyz)
        .unwrap_err();
    assert!(matches!(err, SdkError::InvalidArgument(_)), "got {:?}", err);

    let err = transformation
        .depth_image_to_point_cloud(&depth, CalibrationGeometry::Color, &xyz)
        .unwrap_err();
    assert!(
        matches!(err, SdkError::InvalidArgument(ref m) if m.contains("width")),
        "Color geometry needs color-sized images, got {:?}",
        err
    );

    transformation
        .depth_image_to_point_cloud(&depth, CalibrationGeometry::Depth, &xyz)
        .unwrap();

    transformation.release();
    let err = transformation
        .depth_image_to_point_cloud(&depth, CalibrationGeometry::Depth, &xyz)
        .unwrap_err();
    assert!(err.is_disposed());
}

#[test]
fn test_orbbec_rejects_4_3_resolutions() {
    let fx = combo(0, 1);
    let device = Device::open(&fx.ctx, 0).unwrap();

    let err = device
        .calibration(DepthMode::NarrowViewUnbinned, ColorResolution::R1536p)
        .unwrap_err();
    assert!(matches!(err, SdkError::Unsupported(_)), "got {:?}", err);

    let config = DeviceConfiguration {
        color_resolution: ColorResolution::R3072p,
        camera_fps: FrameRate::Fifteen,
        ..streaming_config()
    };
    let err = device.start_cameras(&config).unwrap_err();
    assert!(matches!(err, SdkError::InvalidArgument(_)), "got {:?}", err);
    assert_eq!(
        fx.orbbec.call_count("device_start_cameras"),
        0,
        "Rejected configurations must not reach the device"
    );
}

#[test]
fn test_raw_calibration_is_nul_terminated() {
    let fx = combo(1, 0);
    let device = Device::open(&fx.ctx, 0).unwrap();
    let raw = device.raw_calibration().unwrap();
    assert_eq!(raw.last(), Some(&0));
    assert_eq!(raw.first(), Some(&b'{'));

    let err = device
        .calibration(DepthMode::Off, ColorResolution::Off)
        .unwrap_err();
    assert!(matches!(err, SdkError::InvalidArgument(_)), "got {:?}", err);
}

#[test]
fn test_open_capture_duplicate_scenario() {
    let sdk = Arc::new(VirtualSdk::with_devices(Backend::Azure, 1));
    let ctx = SdkContext::builder().azure(sdk.loader()).build();

    // Opening before initialization is a configuration error
    let err = Device::open_on(&ctx, Backend::Azure, 0).unwrap_err();
    assert!(matches!(err, SdkError::Configuration(_)), "got {:?}", err);
    let err = Device::open(&ctx, 0).unwrap_err();
    assert!(matches!(err, SdkError::Configuration(_)), "got {:?}", err);

    ctx.init(ComboMode::Azure).unwrap();
    let device = Device::open_on(&ctx, Backend::Azure, 0).unwrap();
    assert!(!device.is_disposed());

    device
        .start_cameras(&DeviceConfiguration {
            depth_mode: DepthMode::PassiveIr,
            ..DeviceConfiguration::DISABLE_ALL
        })
        .unwrap();
    let capture = device.get_capture().unwrap();
    let ir = capture.ir_image().unwrap().expect("passive IR image");
    assert!(capture.depth_image().unwrap().is_none(), "Passive IR has no depth");
    let duplicate = k4a_combo::ReferenceDuplicatable::duplicate_reference(&ir).unwrap();

    capture.release();
    assert!(ir.is_disposed(), "Original image wrapper is released by the capture");
    assert!(!duplicate.is_disposed(), "Duplicate is not tracked by the capture");
    assert_eq!(duplicate.format().unwrap(), ImageFormat::Ir16);
    assert_eq!(duplicate.width_pixels().unwrap(), 1024);

    duplicate.release();
    assert_eq!(sdk.live_objects_of(HandleKind::Image), 0);
}
