// SPDX-License-Identifier: MPL-2.0

//! Integration tests for native handle ownership

use k4a_combo::backends::virtual_sdk::VirtualSdk;
use k4a_combo::handle::{HandleKind, HandleOwner};
use k4a_combo::sensor::ImageFormat;
use k4a_combo::{Backend, ComboMode, Image, SdkContext, SdkError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

fn azure_context() -> (SdkContext, Arc<VirtualSdk>) {
    let sdk = Arc::new(VirtualSdk::new(Backend::Azure));
    let ctx = SdkContext::builder().azure(sdk.loader()).build();
    ctx.init(ComboMode::Azure).expect("virtual Azure backend initializes");
    (ctx, sdk)
}

#[test]
fn test_concurrent_release_happens_once() {
    let sdk = Arc::new(VirtualSdk::new(Backend::Orbbec));
    let raw = sdk.create_test_handle(HandleKind::Capture);
    let owner = HandleOwner::wrap(sdk.clone(), raw).unwrap();

    let fired = Arc::new(AtomicUsize::new(0));
    let counter = fired.clone();
    owner.on_disposed(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    // Every thread races to release a clone of the same owner
    let threads = 8;
    let barrier = Arc::new(Barrier::new(threads));
    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let owner = owner.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                owner.release()
            })
        })
        .collect();
    let winners = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|released| *released)
        .count();

    assert_eq!(winners, 1, "Exactly one release call should win");
    assert_eq!(sdk.release_count(raw), 1, "Native release should run once");
    assert_eq!(fired.load(Ordering::SeqCst), 1, "Listener should fire once");
}

#[test]
fn test_image_release_and_drop() {
    let (ctx, sdk) = azure_context();

    let image = Image::with_default_stride(&ctx, Backend::Azure, ImageFormat::Depth16, 8, 4).unwrap();
    assert_eq!(image.stride_bytes().unwrap(), 16);
    assert!(image.release(), "First release should report success");
    assert!(!image.release(), "Second release should be a no-op");
    assert!(
        image.width_pixels().unwrap_err().is_disposed(),
        "Use after release should report a disposed resource"
    );

    let before = sdk.live_objects_of(HandleKind::Image);
    {
        let _scoped = Image::new(&ctx, Backend::Azure, ImageFormat::Custom8, 4, 4, 4).unwrap();
        assert_eq!(sdk.live_objects_of(HandleKind::Image), before + 1);
    }
    assert_eq!(
        sdk.live_objects_of(HandleKind::Image),
        before,
        "Dropping an image should release it"
    );
}

#[test]
fn test_image_validation_precedes_native_call() {
    let (ctx, sdk) = azure_context();
    let calls = sdk.call_count("image_create");

    let err = Image::new(&ctx, Backend::Azure, ImageFormat::ColorBgra32, 10, 10, 20).unwrap_err();
    assert!(matches!(err, SdkError::InvalidArgument(_)), "got {:?}", err);
    let err = Image::new(&ctx, Backend::Azure, ImageFormat::Depth16, 0, 10, 0).unwrap_err();
    assert!(matches!(err, SdkError::InvalidArgument(_)), "got {:?}", err);

    assert_eq!(
        sdk.call_count("image_create"),
        calls,
        "Invalid geometry must not reach the native layer"
    );
}

#[test]
fn test_native_image_creation_failure() {
    let (ctx, sdk) = azure_context();
    sdk.inject_failure("image_create");
    let err = Image::new(&ctx, Backend::Azure, ImageFormat::Depth16, 4, 4, 0).unwrap_err();
    match err {
        SdkError::InvalidArgument(message) => {
            assert!(message.contains("DEPTH16"), "Message should name the format: {}", message)
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[test]
fn test_image_buffer_round_trip() {
    let (ctx, _sdk) = azure_context();
    let image = Image::new(&ctx, Backend::Azure, ImageFormat::Custom8, 4, 2, 4).unwrap();
    let pixels: Vec<u8> = (0..8).collect();

    image.copy_from_slice(&pixels).unwrap();
    assert_eq!(image.copy_to_vec().unwrap(), pixels);
    assert!(
        image.copy_from_slice(&pixels[..4]).is_err(),
        "Short buffers should be rejected"
    );

    image.set_device_timestamp_usec(1234).unwrap();
    assert_eq!(image.device_timestamp_usec().unwrap(), 1234);
}

#[test]
fn test_disposed_listener_on_resource() {
    let (ctx, _sdk) = azure_context();
    let image = Image::new(&ctx, Backend::Azure, ImageFormat::Custom16, 2, 2, 4).unwrap();
    let fired = Arc::new(AtomicUsize::new(0));
    let counter = fired.clone();
    let id = image.id();
    image
        .on_disposed(move |released| {
            assert_eq!(released, id);
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .expect("Live image should accept listeners");

    drop(image);
    assert_eq!(fired.load(Ordering::SeqCst), 1, "Drop should notify listeners");
}
