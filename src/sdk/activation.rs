// SPDX-License-Identifier: GPL-3.0-only

//! Per-backend activation state

use super::NativeLoader;
use crate::backends::{Backend, NativeApi};
use crate::handle::HandleOwner;
use crate::sensor::types::TraceLevel;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::thread::ThreadId;

/// Lifecycle of one backend in a context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ActivationState {
    /// Native library not loaded (or a previous attempt failed)
    Uninitialized = 0,
    /// Library loaded, bootstrap in progress on one thread
    Initializing = 1,
    /// Ready for use from every thread
    Initialized = 2,
}

impl ActivationState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => ActivationState::Initializing,
            2 => ActivationState::Initialized,
            _ => ActivationState::Uninitialized,
        }
    }
}

impl std::fmt::Display for ActivationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActivationState::Uninitialized => write!(f, "uninitialized"),
            ActivationState::Initializing => write!(f, "initializing"),
            ActivationState::Initialized => write!(f, "initialized"),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Everything a context knows about one backend
pub(crate) struct BackendSlot {
    pub(crate) backend: Backend,
    pub(crate) loader: Option<Box<dyn NativeLoader>>,
    state: AtomicU8,
    /// Held for the whole of an initialization attempt
    pub(crate) init_lock: Mutex<()>,
    initializing_thread: Mutex<Option<ThreadId>>,
    api: RwLock<Option<Arc<dyn NativeApi>>>,
    /// Native objects that must live as long as the backend (depth engine)
    keep_alive: Mutex<Vec<HandleOwner>>,
    trace_level: Mutex<TraceLevel>,
}

impl BackendSlot {
    pub(crate) fn new(backend: Backend, loader: Option<Box<dyn NativeLoader>>) -> Self {
        Self {
            backend,
            loader,
            state: AtomicU8::new(ActivationState::Uninitialized as u8),
            init_lock: Mutex::new(()),
            initializing_thread: Mutex::new(None),
            api: RwLock::new(None),
            keep_alive: Mutex::new(Vec::new()),
            trace_level: Mutex::new(TraceLevel::Off),
        }
    }

    pub(crate) fn state(&self) -> ActivationState {
        ActivationState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: ActivationState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Record the calling thread as the one running the bootstrap
    pub(crate) fn begin_initializing(&self) {
        *lock(&self.initializing_thread) = Some(std::thread::current().id());
        self.set_state(ActivationState::Initializing);
    }

    pub(crate) fn finish_initializing(&self, state: ActivationState) {
        self.set_state(state);
        *lock(&self.initializing_thread) = None;
    }

    /// Whether the calling thread may use the backend right now
    pub(crate) fn is_enabled_for_current_thread(&self) -> bool {
        match self.state() {
            ActivationState::Initialized => true,
            ActivationState::Initializing => {
                *lock(&self.initializing_thread) == Some(std::thread::current().id())
            }
            ActivationState::Uninitialized => false,
        }
    }

    pub(crate) fn api(&self) -> Option<Arc<dyn NativeApi>> {
        self.api.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub(crate) fn set_api(&self, api: Option<Arc<dyn NativeApi>>) {
        *self.api.write().unwrap_or_else(|e| e.into_inner()) = api;
    }

    pub(crate) fn keep_alive(&self, owner: HandleOwner) {
        lock(&self.keep_alive).push(owner);
    }

    /// Release the objects kept for the backend's lifetime
    pub(crate) fn release_kept(&self) {
        let kept = std::mem::take(&mut *lock(&self.keep_alive));
        for owner in kept {
            owner.release();
        }
    }

    pub(crate) fn kept_count(&self) -> usize {
        lock(&self.keep_alive).len()
    }

    pub(crate) fn trace_level(&self) -> MutexGuard<'_, TraceLevel> {
        lock(&self.trace_level)
    }
}
