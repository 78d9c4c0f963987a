// SPDX-License-Identifier: GPL-3.0-only

//! Native handle ownership
//!
//! - [`raw`]: Backend and kind tagged native pointer values
//! - [`owner`]: Exactly-once release with disposal notification and
//!   native reference duplication
//! - [`cascade`]: Release of child owners together with their parent

pub mod cascade;
pub mod owner;
pub mod raw;

pub use cascade::ChildTracker;
pub use owner::{HandleOwner, ListenerId, OwnerId, WeakOwner};
pub use raw::{HandleKind, RawHandle};

use crate::errors::SdkResult;

/// Objects that can hand out an independent owner of the same native object
///
/// The duplicate keeps the native object alive after the original is
/// released, and vice versa.
pub trait ReferenceDuplicatable: Sized {
    fn duplicate_reference(&self) -> SdkResult<Self>;
}
