//! Transient object handles.
//!
//! A displayable reference to a binary resource (a preview frame, a captured
//! file). Creating one allocates a resource in a [`HandleRegistry`]; dropping
//! the [`ObjectHandle`] revokes it, so every handle is released exactly once.

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Allocates and revokes handle resources.
pub trait HandleRegistry: Send + Sync {
    /// Allocate a resource for `len` bytes of `mime_type`; returns its id.
    fn create(&self, mime_type: &str, len: usize) -> String;

    fn revoke(&self, id: &str);
}

/// Owned reference to a registered resource. Revoked on drop.
pub struct ObjectHandle {
    id: String,
    registry: Arc<dyn HandleRegistry>,
}

impl ObjectHandle {
    pub fn new(registry: Arc<dyn HandleRegistry>, mime_type: &str, len: usize) -> Self {
        let id = registry.create(mime_type, len);
        Self { id, registry }
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Debug for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ObjectHandle").field(&self.id).finish()
    }
}

impl Drop for ObjectHandle {
    fn drop(&mut self) {
        self.registry.revoke(&self.id);
    }
}

/// Registry that counts allocations and keeps the set of live ids.
#[derive(Default)]
pub struct TrackingRegistry {
    next_id: AtomicU64,
    created: AtomicU64,
    revoked: AtomicU64,
    live: Mutex<HashSet<String>>,
}

impl TrackingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn created(&self) -> u64 {
        self.created.load(Ordering::SeqCst)
    }

    pub fn revoked(&self) -> u64 {
        self.revoked.load(Ordering::SeqCst)
    }

    pub fn live(&self) -> usize {
        self.live_ids().len()
    }

    pub fn is_live(&self, id: &str) -> bool {
        self.live_ids().contains(id)
    }

    fn live_ids(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        self.live.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl HandleRegistry for TrackingRegistry {
    fn create(&self, mime_type: &str, len: usize) -> String {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let id = format!("blob:tethercam/{}", n);
        self.created.fetch_add(1, Ordering::SeqCst);
        self.live_ids().insert(id.clone());
        log::trace!("Created handle {} ({}, {} bytes)", id, mime_type, len);
        id
    }

    fn revoke(&self, id: &str) {
        if self.live_ids().remove(id) {
            self.revoked.fetch_add(1, Ordering::SeqCst);
            log::trace!("Revoked handle {}", id);
        } else {
            log::warn!("Revoking unknown or already revoked handle {}", id);
        }
    }
}
