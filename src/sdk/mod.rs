// SPDX-License-Identifier: GPL-3.0-only

//! Backend selection and one-time activation
//!
//! An [`SdkContext`] owns the activation state of both backends. A backend is
//! usable only after [`SdkContext::initialize`] has loaded its native library
//! and run a short bootstrap that forces the vendor SDK to load all of its
//! plug-ins. Every resource constructor asks the context for the backend's
//! dispatch table through [`SdkContext::ensure_enabled`], which fails until
//! the backend is initialized.
//!
//! While the bootstrap runs, only the initializing thread passes that check,
//! so the bootstrap can create resources the normal way while other threads
//! still see the backend as unavailable.

mod activation;
pub mod current_dir;

pub use activation::ActivationState;
pub use current_dir::CurrentDirGuard;

use crate::backends::library::LibraryLoader;
use crate::backends::{Backend, NativeApi};
use crate::config::SdkConfig;
use crate::errors::{SdkError, SdkResult};
use crate::sensor::depth_engine::DepthEngineHelper;
use crate::sensor::device::Device;
use crate::sensor::calibration::Calibration;
use crate::sensor::formats::{ColorResolution, DepthMode, ImageFormat};
use crate::sensor::image::Image;
use crate::sensor::transformation::Transformation;
use crate::sensor::types::{CalibrationGeometry, TraceLevel};
use activation::BackendSlot;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use tracing::{debug, error, info};

/// Which backends a process works with
///
/// With [`ComboMode::Both`] devices of both vendors can be used side by side,
/// with one limitation: both vendor stacks ship a depth engine library under
/// the same name, and recording, playback and body tracking libraries bind to
/// a single `k4a` instance. Those sub-functionalities are served by one of the
/// two stacks regardless of which object issued the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ComboMode {
    /// Azure Kinect Sensor SDK only
    #[default]
    Azure,
    /// Orbbec SDK K4A Wrapper only
    Orbbec,
    /// Both SDKs side by side
    Both,
}

impl ComboMode {
    pub fn includes(self, backend: Backend) -> bool {
        match self {
            ComboMode::Azure => backend == Backend::Azure,
            ComboMode::Orbbec => backend == Backend::Orbbec,
            ComboMode::Both => true,
        }
    }

    /// Backends of this mode in initialization order
    pub fn backends(self) -> Vec<Backend> {
        Backend::ALL
            .into_iter()
            .filter(|b| self.includes(*b))
            .collect()
    }
}

impl std::fmt::Display for ComboMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ComboMode::Azure => write!(f, "azure"),
            ComboMode::Orbbec => write!(f, "orbbec"),
            ComboMode::Both => write!(f, "both"),
        }
    }
}

impl std::str::FromStr for ComboMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "azure" => Ok(ComboMode::Azure),
            "orbbec" => Ok(ComboMode::Orbbec),
            "both" => Ok(ComboMode::Both),
            other => Err(format!("unknown combo mode: {}", other)),
        }
    }
}

/// Produces the dispatch table of a backend
///
/// Called once per successful initialization, with the current directory
/// switched to [`library_dir`](Self::library_dir) when one is given.
pub trait NativeLoader: Send + Sync {
    fn load(&self, backend: Backend) -> SdkResult<Arc<dyn NativeApi>>;

    /// Directory to make current while loading and bootstrapping
    fn library_dir(&self, _backend: Backend) -> Option<PathBuf> {
        None
    }
}

impl<F> NativeLoader for F
where
    F: Fn(Backend) -> SdkResult<Arc<dyn NativeApi>> + Send + Sync,
{
    fn load(&self, backend: Backend) -> SdkResult<Arc<dyn NativeApi>> {
        self(backend)
    }
}

struct ContextInner {
    azure: BackendSlot,
    orbbec: BackendSlot,
    default_trace_level: TraceLevel,
}

/// Activation state of both backends plus their dispatch tables
///
/// Cloning is cheap; clones share the same state.
#[derive(Clone)]
pub struct SdkContext {
    inner: Arc<ContextInner>,
}

/// Builder for [`SdkContext`]
#[derive(Default)]
pub struct SdkContextBuilder {
    azure: Option<Box<dyn NativeLoader>>,
    orbbec: Option<Box<dyn NativeLoader>>,
    trace_level: TraceLevel,
}

impl SdkContextBuilder {
    /// Loader for the Azure backend
    pub fn azure(mut self, loader: impl NativeLoader + 'static) -> Self {
        self.azure = Some(Box::new(loader));
        self
    }

    /// Loader for the Orbbec backend
    pub fn orbbec(mut self, loader: impl NativeLoader + 'static) -> Self {
        self.orbbec = Some(Box::new(loader));
        self
    }

    /// Load both backends from `<root>/k4a-azure` and `<root>/k4a-orbbec`
    pub fn native_lib_root(self, root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        self.azure(LibraryLoader::new(root.clone()))
            .orbbec(LibraryLoader::new(root))
    }

    /// Native debug-message level applied at the end of the bootstrap
    pub fn trace_level(mut self, level: TraceLevel) -> Self {
        self.trace_level = level;
        self
    }

    pub fn build(self) -> SdkContext {
        SdkContext {
            inner: Arc::new(ContextInner {
                azure: BackendSlot::new(Backend::Azure, self.azure),
                orbbec: BackendSlot::new(Backend::Orbbec, self.orbbec),
                default_trace_level: self.trace_level,
            }),
        }
    }
}

impl SdkContext {
    pub fn builder() -> SdkContextBuilder {
        SdkContextBuilder::default()
    }

    /// Context loading the native libraries named by the configuration
    pub fn from_config(config: &SdkConfig) -> Self {
        Self::builder()
            .native_lib_root(config.native_lib_root())
            .trace_level(config.trace_level)
            .build()
    }

    fn slot(&self, backend: Backend) -> &BackendSlot {
        match backend {
            Backend::Azure => &self.inner.azure,
            Backend::Orbbec => &self.inner.orbbec,
        }
    }

    pub fn state(&self, backend: Backend) -> ActivationState {
        self.slot(backend).state()
    }

    pub fn is_initialized(&self, backend: Backend) -> bool {
        self.state(backend) == ActivationState::Initialized
    }

    /// Dispatch table of `backend`, if the calling thread may use it
    pub fn ensure_enabled(&self, backend: Backend) -> SdkResult<Arc<dyn NativeApi>> {
        let slot = self.slot(backend);
        if !slot.is_enabled_for_current_thread() {
            return Err(SdkError::Configuration(format!(
                "This functionality requires SDK initialization in combo mode {} or both",
                ComboMode::from(backend)
            )));
        }
        slot.api().ok_or_else(|| {
            SdkError::Configuration(format!("The {} backend has no native library loaded", backend))
        })
    }

    /// Load and bootstrap one backend
    ///
    /// Runs at most once successfully; later calls return immediately.
    /// Concurrent callers wait for the running attempt. On failure the
    /// backend is left uninitialized and the error is returned.
    pub fn initialize(&self, backend: Backend) -> SdkResult<()> {
        let slot = self.slot(backend);
        let _init = slot.init_lock.lock().unwrap_or_else(|e| e.into_inner());

        if slot.state() == ActivationState::Initialized {
            return Ok(());
        }
        let Some(loader) = slot.loader.as_deref() else {
            return Err(SdkError::Configuration(format!(
                "No native library loader configured for the {} backend",
                backend
            )));
        };

        info!(backend = %backend, "Initializing native SDK");
        slot.begin_initializing();

        match self.load_and_bootstrap(slot, loader) {
            Ok(()) => {
                slot.finish_initializing(ActivationState::Initialized);
                info!(backend = %backend, "Native SDK initialized");
                Ok(())
            }
            Err(e) => {
                slot.release_kept();
                slot.set_api(None);
                *slot.trace_level() = TraceLevel::Off;
                slot.finish_initializing(ActivationState::Uninitialized);
                error!(backend = %backend, error = %e, "Native SDK initialization failed");
                Err(e)
            }
        }
    }

    fn load_and_bootstrap(&self, slot: &BackendSlot, loader: &dyn NativeLoader) -> SdkResult<()> {
        let backend = slot.backend;

        // Vendor SDKs resolve their plug-ins relative to the current directory
        let _cwd = match loader.library_dir(backend) {
            Some(dir) => Some(CurrentDirGuard::enter(&dir).map_err(|e| SdkError::Library {
                path: dir.clone(),
                message: e.to_string(),
            })?),
            None => None,
        };

        let api = loader.load(backend)?;
        if api.backend() != backend {
            return Err(SdkError::BackendMismatch {
                expected: backend,
                actual: api.backend(),
            });
        }
        slot.set_api(Some(api));

        match backend {
            Backend::Azure => self.bootstrap_azure()?,
            Backend::Orbbec => self.bootstrap_orbbec(slot)?,
        }

        self.set_trace_level(backend, self.inner.default_trace_level)
    }

    /// Force `k4a` and the depth engine to load
    fn bootstrap_azure(&self) -> SdkResult<()> {
        let count = Device::installed_count(self, Backend::Azure)?;
        debug!(backend = %Backend::Azure, count, "Installed devices");

        // The depth engine is loaded lazily by the first depth computation
        let depth_mode = DepthMode::NarrowViewUnbinned;
        let calibration = Calibration::dummy(Backend::Azure, depth_mode, ColorResolution::Off)?;
        let transformation = Transformation::new(self, &calibration)?;
        let width = depth_mode.width_pixels();
        let height = depth_mode.height_pixels();
        let depth = Image::with_default_stride(self, Backend::Azure, ImageFormat::Depth16, width, height)?;
        let xyz = Image::new(self, Backend::Azure, ImageFormat::Custom, width, height, width * 6)?;
        transformation.depth_image_to_point_cloud(&depth, CalibrationGeometry::Depth, &xyz)
    }

    /// Create the depth engine helper first, then force `k4a` to load
    fn bootstrap_orbbec(&self, slot: &BackendSlot) -> SdkResult<()> {
        let helper = DepthEngineHelper::create(self)?;
        slot.keep_alive(helper.into_owner());

        let count = Device::installed_count(self, Backend::Orbbec)?;
        debug!(backend = %Backend::Orbbec, count, "Installed devices");
        Ok(())
    }

    /// Initialize every backend of `mode`, Azure first
    pub fn init(&self, mode: ComboMode) -> SdkResult<()> {
        for backend in mode.backends() {
            self.initialize(backend)?;
        }
        Ok(())
    }

    /// Mode matching the backends initialized so far
    pub fn combo_mode(&self) -> Option<ComboMode> {
        match (
            self.is_initialized(Backend::Azure),
            self.is_initialized(Backend::Orbbec),
        ) {
            (true, true) => Some(ComboMode::Both),
            (true, false) => Some(ComboMode::Azure),
            (false, true) => Some(ComboMode::Orbbec),
            (false, false) => None,
        }
    }

    /// Forward native debug messages at `level` and above into `tracing`
    pub fn set_trace_level(&self, backend: Backend, level: TraceLevel) -> SdkResult<()> {
        let api = self.ensure_enabled(backend)?;
        let mut current = self.slot(backend).trace_level();
        if *current == level {
            return Ok(());
        }

        if *current != TraceLevel::Off {
            api.set_debug_message_handler(TraceLevel::Off).map_err(|_| {
                SdkError::Failed("Failed to clear the debug message handler".into())
            })?;
        }
        if level != TraceLevel::Off {
            api.set_debug_message_handler(level).map_err(|_| {
                SdkError::Failed("Failed to set the debug message handler".into())
            })?;
        }

        debug!(backend = %backend, ?level, "Native trace level changed");
        *current = level;
        Ok(())
    }

    pub fn trace_level(&self, backend: Backend) -> SdkResult<TraceLevel> {
        self.ensure_enabled(backend)?;
        Ok(*self.slot(backend).trace_level())
    }

    /// Number of native objects held for the lifetime of the backend
    pub fn kept_alive_count(&self, backend: Backend) -> usize {
        self.slot(backend).kept_count()
    }
}

impl From<Backend> for ComboMode {
    fn from(backend: Backend) -> Self {
        match backend {
            Backend::Azure => ComboMode::Azure,
            Backend::Orbbec => ComboMode::Orbbec,
        }
    }
}

impl std::fmt::Debug for SdkContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SdkContext")
            .field("azure", &self.state(Backend::Azure))
            .field("orbbec", &self.state(Backend::Orbbec))
            .finish()
    }
}

static GLOBAL_CONTEXT: OnceLock<SdkContext> = OnceLock::new();

/// Process-wide context configured from the user configuration file
///
/// Created on first use; backends still need to be initialized explicitly.
pub fn global() -> &'static SdkContext {
    GLOBAL_CONTEXT.get_or_init(|| SdkContext::from_config(&SdkConfig::load_or_default()))
}
