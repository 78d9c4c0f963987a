// SPDX-License-Identifier: MPL-2.0

//! k4a-combo - Azure Kinect and Orbbec Femto sensors behind one API
//!
//! This library binds the native `k4a` API of two vendor stacks, the Azure
//! Kinect Sensor SDK and the Orbbec SDK K4A Wrapper, and lets devices of
//! both be used from one process. Every native object is owned by exactly
//! one [`HandleOwner`](handle::HandleOwner) that knows which library
//! produced it.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`handle`]: Native handle ownership, release notification and
//!   child tracking
//! - [`sdk`]: Backend selection and one-time initialization
//! - [`sensor`]: Devices, captures, images and transformations
//! - [`backends`]: Native dispatch tables (shared library or in-memory)
//! - [`config`]: User configuration handling
//!
//! # Example
//!
//! ```no_run
//! use k4a_combo::{ComboMode, Device, SdkContext, SdkConfig};
//!
//! let ctx = SdkContext::from_config(&SdkConfig::default());
//! ctx.init(ComboMode::Both)?;
//! let device = Device::open(&ctx, 0)?;
//! println!("{}", device);
//! # Ok::<(), k4a_combo::SdkError>(())
//! ```

pub mod backends;
pub mod config;
pub mod constants;
pub mod errors;
pub mod handle;
pub mod sdk;
pub mod sensor;

// Re-export commonly used types
pub use backends::Backend;
pub use config::SdkConfig;
pub use errors::{SdkError, SdkResult};
pub use handle::{HandleOwner, ReferenceDuplicatable};
pub use sdk::{ComboMode, SdkContext};
pub use sensor::{Capture, Device, DeviceConfiguration, Image, Transformation};
