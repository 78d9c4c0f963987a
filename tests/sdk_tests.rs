// SPDX-License-Identifier: MPL-2.0

//! Integration tests for backend selection and initialization

use k4a_combo::backends::NativeApi;
use k4a_combo::backends::virtual_sdk::VirtualSdk;
use k4a_combo::errors::SdkResult;
use k4a_combo::sdk::{ActivationState, CurrentDirGuard, NativeLoader};
use k4a_combo::sensor::types::TraceLevel;
use k4a_combo::{Backend, ComboMode, Device, SdkContext, SdkError};
use std::path::PathBuf;
use std::sync::{Arc, Barrier, Mutex, OnceLock};
use std::thread;

#[test]
fn test_backend_unavailable_before_init() {
    let sdk = Arc::new(VirtualSdk::with_devices(Backend::Azure, 1));
    let ctx = SdkContext::builder().azure(sdk.loader()).build();

    assert_eq!(ctx.state(Backend::Azure), ActivationState::Uninitialized);
    match ctx.ensure_enabled(Backend::Azure) {
        Err(SdkError::Configuration(message)) => assert!(
            message.contains("azure"),
            "Message should name the combo mode: {}",
            message
        ),
        other => panic!("unexpected result: {:?}", other.map(|_| ())),
    }
    assert!(Device::installed_count(&ctx, Backend::Azure).is_err());
    assert_eq!(ctx.combo_mode(), None);
    assert_eq!(sdk.load_count(), 0, "Nothing should load before init");
}

#[test]
fn test_missing_loader_is_a_configuration_error() {
    let sdk = Arc::new(VirtualSdk::new(Backend::Azure));
    let ctx = SdkContext::builder().azure(sdk.loader()).build();

    let err = ctx.init(ComboMode::Both).unwrap_err();
    assert!(matches!(err, SdkError::Configuration(_)), "got {:?}", err);
    assert!(
        ctx.is_initialized(Backend::Azure),
        "Azure initializes before Orbbec is attempted"
    );
    assert_eq!(ctx.state(Backend::Orbbec), ActivationState::Uninitialized);
    assert_eq!(ctx.combo_mode(), Some(ComboMode::Azure));
}

#[test]
fn test_loader_for_other_backend_is_rejected() {
    let orbbec = Arc::new(VirtualSdk::new(Backend::Orbbec));
    let ctx = SdkContext::builder().azure(orbbec.loader()).build();

    let err = ctx.initialize(Backend::Azure).unwrap_err();
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
    assert!(!ctx.is_initialized(Backend::Azure));
}

#[test]
fn test_init_is_idempotent() {
    let azure = Arc::new(VirtualSdk::new(Backend::Azure));
    let orbbec = Arc::new(VirtualSdk::new(Backend::Orbbec));
    let ctx = SdkContext::builder()
        .azure(azure.loader())
        .orbbec(orbbec.loader())
        .build();

    ctx.init(ComboMode::Both).unwrap();
    ctx.init(ComboMode::Both).unwrap();
    ctx.initialize(Backend::Orbbec).unwrap();

    assert_eq!(azure.load_count(), 1, "Azure should load exactly once");
    assert_eq!(orbbec.load_count(), 1, "Orbbec should load exactly once");
    assert_eq!(ctx.combo_mode(), Some(ComboMode::Both));
}

#[test]
fn test_concurrent_init_loads_once() {
    let sdk = Arc::new(VirtualSdk::with_devices(Backend::Orbbec, 2));
    let ctx = SdkContext::builder().orbbec(sdk.loader()).build();

    let threads = 8;
    let barrier = Arc::new(Barrier::new(threads));
    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let ctx = ctx.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                ctx.init(ComboMode::Orbbec)
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap().expect("every caller sees success");
    }

    assert_eq!(sdk.load_count(), 1);
    assert_eq!(ctx.kept_alive_count(Backend::Orbbec), 1);
    assert_eq!(Device::installed_count(&ctx, Backend::Orbbec).unwrap(), 2);
}

#[test]
fn test_failed_bootstrap_reverts_and_can_retry() {
    let sdk = Arc::new(VirtualSdk::new(Backend::Azure));
    let ctx = SdkContext::builder()
        .azure(sdk.loader())
        .trace_level(TraceLevel::Info)
        .build();
    sdk.inject_failure("image_create");

    let err = ctx.init(ComboMode::Azure).unwrap_err();
    assert!(matches!(err, SdkError::InvalidArgument(_)), "got {:?}", err);
    assert_eq!(ctx.state(Backend::Azure), ActivationState::Uninitialized);
    assert!(ctx.ensure_enabled(Backend::Azure).is_err());
    assert_eq!(sdk.debug_handler_level(), None, "Trace level is applied last");

    sdk.clear_failures();
    ctx.init(ComboMode::Azure).expect("retry after a failed bootstrap");
    assert_eq!(sdk.load_count(), 2, "A failed attempt loads again on retry");
    assert!(ctx.is_initialized(Backend::Azure));
    assert_eq!(sdk.debug_handler_level(), Some(TraceLevel::Info));
    assert_eq!(sdk.live_objects(), 0, "Bootstrap images are released");
}

#[test]
fn test_azure_bootstrap_computes_a_point_cloud() {
    let sdk = Arc::new(VirtualSdk::new(Backend::Azure));
    let ctx = SdkContext::builder().azure(sdk.loader()).build();
    ctx.init(ComboMode::Azure).unwrap();

    assert_eq!(sdk.call_count("transformation_create"), 1);
    assert_eq!(
        sdk.call_count("transformation_depth_to_point_cloud"),
        1,
        "A depth computation is what loads the depth engine"
    );
    assert_eq!(sdk.call_count("image_create"), 2);
    assert_eq!(sdk.live_objects(), 0, "Bootstrap objects are released");
}

#[test]
fn test_missing_depth_engine_fails_azure_init() {
    let sdk = Arc::new(VirtualSdk::new(Backend::Azure));
    let ctx = SdkContext::builder().azure(sdk.loader()).build();
    sdk.inject_failure("transformation_create");

    let err = ctx.init(ComboMode::Azure).unwrap_err();
    assert!(matches!(err, SdkError::InvalidHandle(_)), "got {:?}", err);
    assert_eq!(ctx.state(Backend::Azure), ActivationState::Uninitialized);
    assert_eq!(sdk.call_count("transformation_depth_to_point_cloud"), 0);
    assert_eq!(sdk.live_objects(), 0);
}

#[test]
fn test_failed_orbbec_init_releases_depth_engine() {
    let sdk = Arc::new(VirtualSdk::new(Backend::Orbbec));
    let ctx = SdkContext::builder()
        .orbbec(sdk.loader())
        .trace_level(TraceLevel::Warning)
        .build();
    sdk.inject_failure("set_debug_message_handler");

    let err = ctx.init(ComboMode::Orbbec).unwrap_err();
    assert!(matches!(err, SdkError::Failed(_)), "got {:?}", err);
    assert_eq!(ctx.kept_alive_count(Backend::Orbbec), 0);
    assert_eq!(
        sdk.live_objects(),
        0,
        "Depth engine helper should be released when initialization fails"
    );
}

#[test]
fn test_depth_engine_helper_required_for_orbbec() {
    let sdk = Arc::new(VirtualSdk::new(Backend::Orbbec));
    let ctx = SdkContext::builder().orbbec(sdk.loader()).build();
    sdk.inject_failure("depth_engine_helper_create");

    let err = ctx.init(ComboMode::Orbbec).unwrap_err();
    assert!(matches!(err, SdkError::InvalidHandle(_)), "got {:?}", err);
    assert_eq!(
        sdk.call_count("device_installed_count"),
        0,
        "Helper is created before k4a is touched"
    );
}

#[test]
fn test_trace_level_changes() {
    let sdk = Arc::new(VirtualSdk::new(Backend::Azure));
    let ctx = SdkContext::builder().azure(sdk.loader()).build();
    ctx.init(ComboMode::Azure).unwrap();

    assert_eq!(ctx.trace_level(Backend::Azure).unwrap(), TraceLevel::Off);
    assert_eq!(sdk.debug_handler_level(), None);

    ctx.set_trace_level(Backend::Azure, TraceLevel::Trace).unwrap();
    assert_eq!(sdk.debug_handler_level(), Some(TraceLevel::Trace));

    let calls = sdk.call_count("set_debug_message_handler");
    ctx.set_trace_level(Backend::Azure, TraceLevel::Trace).unwrap();
    assert_eq!(
        sdk.call_count("set_debug_message_handler"),
        calls,
        "Same level should not reinstall the handler"
    );

    ctx.set_trace_level(Backend::Azure, TraceLevel::Off).unwrap();
    assert_eq!(sdk.debug_handler_level(), None);
    assert!(
        ctx.set_trace_level(Backend::Orbbec, TraceLevel::Info).is_err(),
        "Uninitialized backend cannot change its trace level"
    );
}

#[test]
fn test_only_initializing_thread_sees_backend() {
    let sdk = Arc::new(VirtualSdk::new(Backend::Azure));
    let shared: Arc<OnceLock<SdkContext>> = Arc::new(OnceLock::new());
    let seen_by_other_thread = Arc::new(Mutex::new(None));

    let loader = {
        let sdk = sdk.clone();
        let shared = shared.clone();
        let seen = seen_by_other_thread.clone();
        move |backend: Backend| -> SdkResult<Arc<dyn NativeApi>> {
            if let Some(ctx) = shared.get() {
                let ctx = ctx.clone();
                let outcome = thread::spawn(move || ctx.ensure_enabled(backend).is_ok())
                    .join()
                    .unwrap_or(true);
                *seen.lock().unwrap() = Some(outcome);
            }
            sdk.loader().load(backend)
        }
    };

    let ctx = SdkContext::builder().azure(loader).build();
    assert!(shared.set(ctx.clone()).is_ok());
    ctx.init(ComboMode::Azure).unwrap();

    assert_eq!(
        *seen_by_other_thread.lock().unwrap(),
        Some(false),
        "Other threads must not use a backend while it bootstraps"
    );
    assert!(ctx.ensure_enabled(Backend::Azure).is_ok());
}

/// Loader that records the current directory while loading
struct DirectoryRecorder {
    sdk: Arc<VirtualSdk>,
    dir: PathBuf,
    seen: Mutex<Option<PathBuf>>,
}

struct RecordingLoader(Arc<DirectoryRecorder>);

impl NativeLoader for RecordingLoader {
    fn load(&self, backend: Backend) -> SdkResult<Arc<dyn NativeApi>> {
        *self.0.seen.lock().unwrap() = std::env::current_dir().ok();
        self.0.sdk.loader().load(backend)
    }

    fn library_dir(&self, _backend: Backend) -> Option<PathBuf> {
        Some(self.0.dir.clone())
    }
}

#[test]
fn test_library_directory_is_current_while_loading() {
    let dir = std::env::temp_dir().join(format!("k4a-combo-test-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    let dir = dir.canonicalize().unwrap();
    let before = std::env::current_dir().unwrap();

    let recorder = Arc::new(DirectoryRecorder {
        sdk: Arc::new(VirtualSdk::new(Backend::Orbbec)),
        dir: dir.clone(),
        seen: Mutex::new(None),
    });
    let ctx = SdkContext::builder().orbbec(RecordingLoader(recorder.clone())).build();
    ctx.init(ComboMode::Orbbec).unwrap();

    assert_eq!(recorder.seen.lock().unwrap().as_deref(), Some(dir.as_path()));
    assert_eq!(
        std::env::current_dir().unwrap(),
        before,
        "Current directory should be restored after initialization"
    );
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn test_missing_library_directory_fails_init() {
    let recorder = Arc::new(DirectoryRecorder {
        sdk: Arc::new(VirtualSdk::new(Backend::Azure)),
        dir: PathBuf::from("/nonexistent/k4a-combo/k4a-azure"),
        seen: Mutex::new(None),
    });
    let ctx = SdkContext::builder().azure(RecordingLoader(recorder.clone())).build();

    let err = ctx.init(ComboMode::Azure).unwrap_err();
    assert!(matches!(err, SdkError::Library { .. }), "got {:?}", err);
    assert!(recorder.seen.lock().unwrap().is_none(), "Loader should not run");
}

#[test]
fn test_relative_library_root_survives_directory_switch() {
    let base = std::env::temp_dir().join(format!("k4a-combo-test-{}", uuid::Uuid::new_v4()));
    let azure_dir = base.join("libs").join("k4a-azure");
    std::fs::create_dir_all(&azure_dir).unwrap();
    let base = base.canonicalize().unwrap();
    let library = base
        .join("libs")
        .join("k4a-azure")
        .join(libloading::library_filename("k4a"));
    std::fs::write(&library, b"not a shared library").unwrap();

    // Resolve "libs" while the base directory is current
    let ctx = {
        let _cwd = CurrentDirGuard::enter(&base).unwrap();
        SdkContext::builder().native_lib_root("libs").build()
    };

    let err = ctx.initialize(Backend::Azure).unwrap_err();
    match err {
        SdkError::Library { path, .. } => assert_eq!(
            path, library,
            "Library should be looked up under the resolved root, not the backend directory"
        ),
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(ctx.state(Backend::Azure), ActivationState::Uninitialized);
    let _ = std::fs::remove_dir_all(&base);
}

#[test]
fn test_combo_mode_parsing() {
    assert_eq!("Both".parse::<ComboMode>().unwrap(), ComboMode::Both);
    assert_eq!("orbbec".parse::<ComboMode>().unwrap(), ComboMode::Orbbec);
    assert!("kinect".parse::<ComboMode>().is_err());
    assert_eq!(ComboMode::default(), ComboMode::Azure);
    assert_eq!(ComboMode::Both.backends(), vec![Backend::Azure, Backend::Orbbec]);
    assert!(!ComboMode::Orbbec.includes(Backend::Azure));
}
