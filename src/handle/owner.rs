// SPDX-License-Identifier: GPL-3.0-only

//! Exactly-once ownership of a native handle
//!
//! A [`HandleOwner`] is the single place where a native reference is given
//! back to the SDK. Clones of an owner share the same state; an independent
//! second owner of the same native object is obtained with
//! [`HandleOwner::duplicate`], which asks the native layer for one more
//! reference.

use super::raw::RawHandle;
use crate::backends::NativeApi;
use crate::errors::{SdkError, SdkResult};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tracing::trace;

static NEXT_OWNER_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of an owner
///
/// Duplicates of one native object share the raw value but never the id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OwnerId(u64);

impl OwnerId {
    fn next() -> Self {
        OwnerId(NEXT_OWNER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for OwnerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "owner-{}", self.0)
    }
}

/// Registration token returned by [`HandleOwner::on_disposed`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type DisposeListener = Box<dyn FnOnce(OwnerId) + Send>;

struct ListenerState {
    closed: bool,
    next_id: u64,
    entries: Vec<(ListenerId, DisposeListener)>,
}

struct OwnerInner {
    id: OwnerId,
    raw: RawHandle,
    api: Arc<dyn NativeApi>,
    /// Mirrors `ListenerState::closed` so `access` stays lock-free
    disposed: AtomicBool,
    state: Mutex<ListenerState>,
}

impl OwnerInner {
    fn lock_state(&self) -> MutexGuard<'_, ListenerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn release(&self) -> bool {
        let listeners = {
            let mut state = self.lock_state();
            if state.closed {
                return false;
            }
            state.closed = true;
            self.disposed.store(true, Ordering::Release);
            std::mem::take(&mut state.entries)
        };

        self.api.release(self.raw);
        trace!(handle = %self.raw, owner = %self.id, "Released native handle");

        for (_, listener) in listeners {
            listener(self.id);
        }
        true
    }
}

impl Drop for OwnerInner {
    fn drop(&mut self) {
        self.release();
    }
}

/// Owner of one native reference
#[derive(Clone)]
pub struct HandleOwner {
    inner: Arc<OwnerInner>,
}

impl HandleOwner {
    /// Take ownership of a native reference produced by `api`
    pub fn wrap(api: Arc<dyn NativeApi>, raw: RawHandle) -> SdkResult<Self> {
        if api.backend() != raw.backend() {
            return Err(SdkError::BackendMismatch {
                expected: api.backend(),
                actual: raw.backend(),
            });
        }

        let id = OwnerId::next();
        trace!(handle = %raw, owner = %id, "Wrapped native handle");

        Ok(Self {
            inner: Arc::new(OwnerInner {
                id,
                raw,
                api,
                disposed: AtomicBool::new(false),
                state: Mutex::new(ListenerState {
                    closed: false,
                    next_id: 1,
                    entries: Vec::new(),
                }),
            }),
        })
    }

    /// Give the native reference back
    ///
    /// Only the first call on any clone releases and notifies listeners;
    /// it returns `true`. Later calls return `false`.
    pub fn release(&self) -> bool {
        self.inner.release()
    }

    /// Raw handle for a native call, failing once the owner is released
    pub fn access(&self) -> SdkResult<RawHandle> {
        if self.inner.disposed.load(Ordering::Acquire) {
            return Err(SdkError::disposed(self.inner.raw));
        }
        Ok(self.inner.raw)
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }

    pub fn id(&self) -> OwnerId {
        self.inner.id
    }

    /// Raw handle regardless of the disposed state, for display and comparison
    pub fn raw(&self) -> RawHandle {
        self.inner.raw
    }

    pub fn kind(&self) -> super::HandleKind {
        self.inner.raw.kind()
    }

    pub fn backend(&self) -> crate::backends::Backend {
        self.inner.raw.backend()
    }

    /// Dispatch table the handle belongs to
    pub(crate) fn api(&self) -> &Arc<dyn NativeApi> {
        &self.inner.api
    }

    /// Register a one-shot listener called right after the native release
    ///
    /// Returns `None` when the owner is already released; the listener is
    /// dropped without being called in that case.
    pub fn on_disposed<F>(&self, listener: F) -> Option<ListenerId>
    where
        F: FnOnce(OwnerId) + Send + 'static,
    {
        let mut state = self.inner.lock_state();
        if state.closed {
            return None;
        }
        let id = ListenerId(state.next_id);
        state.next_id += 1;
        state.entries.push((id, Box::new(listener)));
        Some(id)
    }

    /// Unregister a listener; unknown ids are ignored
    pub fn remove_listener(&self, id: ListenerId) {
        let removed = {
            let mut state = self.inner.lock_state();
            state
                .entries
                .iter()
                .position(|(entry_id, _)| *entry_id == id)
                .map(|pos| state.entries.remove(pos))
        };
        // Listener closures may own other owners; drop them outside the lock
        drop(removed);
    }

    /// Create an independent owner of the same native object
    ///
    /// The native layer counts the extra reference; each owner gives back
    /// its own.
    pub fn duplicate(&self) -> SdkResult<HandleOwner> {
        let raw = self.inner.raw;
        if !raw.kind().supports_references() {
            return Err(SdkError::Unsupported(format!(
                "{} handles cannot be duplicated",
                raw.kind()
            )));
        }

        {
            // Holding the state lock keeps a concurrent release from freeing
            // the object between the check and the native increment.
            let state = self.inner.lock_state();
            if state.closed {
                return Err(SdkError::disposed(raw));
            }
            self.inner
                .api
                .add_reference(raw)
                .map_err(|e| SdkError::Failed(format!("Failed to add reference to {}: {}", raw, e)))?;
        }

        trace!(handle = %raw, from = %self.inner.id, "Duplicated native reference");
        HandleOwner::wrap(Arc::clone(&self.inner.api), raw)
    }

    /// Non-owning reference that does not keep the handle alive
    pub fn downgrade(&self) -> WeakOwner {
        WeakOwner {
            id: self.inner.id,
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Whether both values are clones of the same owner
    pub fn same_owner(&self, other: &HandleOwner) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::fmt::Debug for HandleOwner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandleOwner")
            .field("id", &self.inner.id)
            .field("handle", &format_args!("{}", self.inner.raw))
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

impl std::fmt::Display for HandleOwner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.inner.raw)
    }
}

/// Weak counterpart of [`HandleOwner`]
#[derive(Clone)]
pub struct WeakOwner {
    id: OwnerId,
    inner: Weak<OwnerInner>,
}

impl WeakOwner {
    pub fn id(&self) -> OwnerId {
        self.id
    }

    /// Strong owner, or `None` once every clone has been dropped
    pub fn upgrade(&self) -> Option<HandleOwner> {
        self.inner.upgrade().map(|inner| HandleOwner { inner })
    }
}
