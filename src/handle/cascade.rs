// SPDX-License-Identifier: GPL-3.0-only

//! Release of child objects together with their parent
//!
//! A capture hands out image owners. The images may outlive the capture
//! object in user code, but they are released no later than the capture
//! itself. [`ChildTracker`] keeps weak references to the children handed out,
//! forgets a child as soon as it is released on its own, and releases the
//! rest when the parent goes away.

use super::owner::{HandleOwner, ListenerId, OwnerId, WeakOwner};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tracing::{debug, trace};

type ChildMap = HashMap<OwnerId, (WeakOwner, Option<ListenerId>)>;

/// Set of live child owners
#[derive(Clone, Default)]
pub struct ChildTracker {
    children: Arc<Mutex<ChildMap>>,
}

impl ChildTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(children: &Mutex<ChildMap>) -> MutexGuard<'_, ChildMap> {
        children.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Start tracking `child` and hand it back
    ///
    /// Already released children are not tracked. Safe to call while another
    /// thread runs [`release_all`](Self::release_all).
    pub fn register(&self, child: HandleOwner) -> HandleOwner {
        if child.is_disposed() {
            return child;
        }

        let id = child.id();
        Self::lock(&self.children).insert(id, (child.downgrade(), None));

        let tracker: Weak<Mutex<ChildMap>> = Arc::downgrade(&self.children);
        let subscription = child.on_disposed(move |id| {
            if let Some(children) = tracker.upgrade() {
                let removed = Self::lock(&children).remove(&id);
                if removed.is_some() {
                    trace!(owner = %id, "Child released, no longer tracked");
                }
            }
        });

        let mut children = Self::lock(&self.children);
        match subscription {
            Some(listener) => {
                // Entry may already be gone if release_all drained it meanwhile
                if let Some(entry) = children.get_mut(&id) {
                    entry.1 = Some(listener);
                }
            }
            None => {
                // Released between the insert and the subscription
                children.remove(&id);
            }
        }
        drop(children);

        child
    }

    /// Release every tracked child, returning how many this call released
    ///
    /// The set is drained under the lock and the children are released after
    /// the lock is dropped, so a child's own notification finds nothing to
    /// remove.
    pub fn release_all(&self) -> usize {
        let snapshot: Vec<(WeakOwner, Option<ListenerId>)> =
            Self::lock(&self.children).drain().map(|(_, entry)| entry).collect();

        let mut released = 0;
        for (weak, listener) in snapshot {
            let Some(child) = weak.upgrade() else {
                continue;
            };
            if let Some(listener) = listener {
                child.remove_listener(listener);
            }
            if child.release() {
                released += 1;
            }
        }

        if released > 0 {
            debug!(count = released, "Released tracked children");
        }
        released
    }

    /// Number of children currently tracked
    pub fn len(&self) -> usize {
        Self::lock(&self.children).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the child with this id is tracked
    pub fn contains(&self, id: OwnerId) -> bool {
        Self::lock(&self.children).contains_key(&id)
    }
}

impl std::fmt::Debug for ChildTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChildTracker")
            .field("children", &self.len())
            .finish()
    }
}
