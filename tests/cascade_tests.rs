// SPDX-License-Identifier: MPL-2.0

//! Integration tests for releasing images together with their capture

use k4a_combo::backends::virtual_sdk::VirtualSdk;
use k4a_combo::handle::{ChildTracker, HandleKind, HandleOwner};
use k4a_combo::sensor::ImageFormat;
use k4a_combo::{Backend, Capture, ComboMode, Image, ReferenceDuplicatable, SdkContext};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

fn orbbec_context() -> (SdkContext, Arc<VirtualSdk>) {
    let sdk = Arc::new(VirtualSdk::new(Backend::Orbbec));
    let ctx = SdkContext::builder().orbbec(sdk.loader()).build();
    ctx.init(ComboMode::Orbbec).expect("virtual Orbbec backend initializes");
    (ctx, sdk)
}

/// Capture with a depth and an IR image, neither referenced from outside
fn filled_capture(ctx: &SdkContext) -> Capture {
    let capture = Capture::new(ctx, Backend::Orbbec).unwrap();
    let depth = Image::with_default_stride(ctx, Backend::Orbbec, ImageFormat::Depth16, 4, 4).unwrap();
    let ir = Image::with_default_stride(ctx, Backend::Orbbec, ImageFormat::Ir16, 4, 4).unwrap();
    capture.set_depth_image(Some(&depth)).unwrap();
    capture.set_ir_image(Some(&ir)).unwrap();
    depth.release();
    ir.release();
    capture
}

#[test]
fn test_capture_release_cascades_to_images() {
    let (ctx, sdk) = orbbec_context();
    let capture = filled_capture(&ctx);

    let depth = capture.depth_image().unwrap().expect("depth slot is filled");
    let ir = capture.ir_image().unwrap().expect("IR slot is filled");
    assert!(capture.color_image().unwrap().is_none(), "Color slot should be empty");
    assert_eq!(capture.live_image_count(), 2);

    assert!(capture.release());
    assert!(depth.is_disposed(), "Depth image should be released with the capture");
    assert!(ir.is_disposed(), "IR image should be released with the capture");
    assert_eq!(
        sdk.live_objects_of(HandleKind::Image),
        0,
        "No native image reference should survive the capture"
    );
    assert!(depth.copy_to_vec().unwrap_err().is_disposed());
}

#[test]
fn test_image_released_early_is_no_longer_tracked() {
    let (ctx, sdk) = orbbec_context();
    let capture = filled_capture(&ctx);

    let depth = capture.depth_image().unwrap().unwrap();
    assert!(depth.release());
    assert_eq!(capture.live_image_count(), 0, "Released image should be pruned");

    let release_calls = sdk.call_count("release");
    capture.release();
    // Only the capture itself, the pruned image is not released again
    assert_eq!(sdk.call_count("release"), release_calls + 1);
    assert_eq!(sdk.live_objects(), 1, "Only the kept depth engine helper remains");
}

#[test]
fn test_dropped_capture_releases_images() {
    let (ctx, sdk) = orbbec_context();
    let depth = {
        let capture = filled_capture(&ctx);
        capture.depth_image().unwrap().unwrap()
    };
    assert!(depth.is_disposed(), "Dropping the capture should release its images");
    assert_eq!(sdk.live_objects_of(HandleKind::Capture), 0);
}

#[test]
fn test_duplicate_capture_has_its_own_images() {
    let (ctx, sdk) = orbbec_context();
    let capture = filled_capture(&ctx);
    let duplicate = capture.duplicate_reference().unwrap();

    let from_original = capture.depth_image().unwrap().unwrap();
    let from_duplicate = duplicate.depth_image().unwrap().unwrap();
    assert!(from_original.same_native_image(&from_duplicate));
    assert_eq!(duplicate.live_image_count(), 1);

    capture.release();
    assert!(from_original.is_disposed());
    assert!(
        !from_duplicate.is_disposed(),
        "Images read through the duplicate belong to the duplicate"
    );
    assert_eq!(from_duplicate.width_pixels().unwrap(), 4);

    duplicate.release();
    assert!(from_duplicate.is_disposed());
    assert_eq!(sdk.live_objects_of(HandleKind::Image), 0);
}

#[test]
fn test_image_release_races_capture_release() {
    let (ctx, sdk) = orbbec_context();

    for _ in 0..50 {
        let capture = filled_capture(&ctx);
        let images: Vec<Image> = (0..4)
            .flat_map(|_| {
                [
                    capture.depth_image().unwrap().unwrap(),
                    capture.ir_image().unwrap().unwrap(),
                ]
            })
            .collect();
        let notified = Arc::new(AtomicUsize::new(0));
        for image in &images {
            let notified = notified.clone();
            image.on_disposed(move |_| {
                notified.fetch_add(1, Ordering::SeqCst);
            });
        }
        let release_calls = sdk.call_count("release");

        let barrier = Arc::new(Barrier::new(images.len() + 1));
        let count = images.len();
        let releasing: Vec<_> = images
            .into_iter()
            .map(|image| {
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    image.release();
                    image
                })
            })
            .collect();
        barrier.wait();
        capture.release();
        let images: Vec<Image> = releasing.into_iter().map(|h| h.join().unwrap()).collect();

        assert!(images.iter().all(Image::is_disposed), "Every image should end released");
        assert_eq!(
            sdk.call_count("release"),
            release_calls + count + 1,
            "Each image and the capture should reach the native layer exactly once"
        );
        assert_eq!(notified.load(Ordering::SeqCst), count);
        assert_eq!(sdk.live_objects_of(HandleKind::Image), 0);
        assert_eq!(sdk.live_objects_of(HandleKind::Capture), 0);
    }
}

#[test]
fn test_register_races_release_all() {
    let sdk = Arc::new(VirtualSdk::new(Backend::Azure));

    for _ in 0..50 {
        let tracker = ChildTracker::new();
        let children: Vec<HandleOwner> = (0..8)
            .map(|_| {
                HandleOwner::wrap(sdk.clone(), sdk.create_test_handle(HandleKind::Image)).unwrap()
            })
            .collect();

        let barrier = Arc::new(Barrier::new(2));
        let registering = {
            let tracker = tracker.clone();
            let barrier = barrier.clone();
            let children = children.clone();
            thread::spawn(move || {
                barrier.wait();
                for child in children {
                    tracker.register(child);
                }
            })
        };
        barrier.wait();
        tracker.release_all();
        registering.join().unwrap();

        // Whatever registered after the drain is still tracked and released here
        tracker.release_all();
        assert!(tracker.is_empty(), "Tracker should end empty");
        for child in &children {
            assert!(child.is_disposed(), "Every child should end released");
            assert_eq!(sdk.release_count(child.raw()), 1, "{} released twice", child);
        }
    }
    assert_eq!(sdk.live_objects(), 0);
}
