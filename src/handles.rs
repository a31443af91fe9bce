//! Revocable object URLs for previews and downloads.
//!
//! Every preview thumbnail and every in-flight download is addressed through
//! an [`ObjectUrl`] minted by a [`HandleRegistry`]. Each URL pins its bytes
//! until it is revoked, so the registry is the one place that knows which
//! handles are still alive. Previews are owned by the
//! [`crate::store::FileStore`]; download URLs are wrapped in a
//! [`ScopedObjectUrl`] and released as soon as delivery returns.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// An opaque, revocable reference to a blob of bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectUrl(String);

impl ObjectUrl {
    /// Wrap an already-minted URL string. Registries other than
    /// [`ObjectUrls`] use this to hand out their own schemes.
    pub fn new(url: impl Into<String>) -> Self {
        ObjectUrl(url.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Mints and revokes [`ObjectUrl`]s.
///
/// Implementations must be `Send + Sync`: download URLs are released from
/// whichever task finishes the delivery.
pub trait HandleRegistry: Send + Sync {
    /// Create a new URL pinning `bytes` (declared as `mime`).
    fn create(&self, mime: &str, bytes: Arc<[u8]>) -> ObjectUrl;

    /// Release `url`. Returns `false` if it was unknown or already revoked.
    fn revoke(&self, url: &ObjectUrl) -> bool;
}

/// In-process registry backed by a map of live URLs.
#[derive(Default)]
pub struct ObjectUrls {
    next: AtomicU64,
    live: Mutex<HashMap<ObjectUrl, Arc<[u8]>>>,
}

impl ObjectUrls {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of URLs created and not yet revoked.
    pub fn live_count(&self) -> usize {
        self.lock().len()
    }

    pub fn is_live(&self, url: &ObjectUrl) -> bool {
        self.lock().contains_key(url)
    }

    /// Bytes behind a live URL.
    pub fn resolve(&self, url: &ObjectUrl) -> Option<Arc<[u8]>> {
        self.lock().get(url).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<ObjectUrl, Arc<[u8]>>> {
        // A poisoned map is still structurally valid.
        self.live.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl HandleRegistry for ObjectUrls {
    fn create(&self, mime: &str, bytes: Arc<[u8]>) -> ObjectUrl {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        let url = ObjectUrl(format!("blob:batch-convert/{n:08x}"));
        debug!("Created {} ({}, {} bytes)", url, mime, bytes.len());
        self.lock().insert(url.clone(), bytes);
        url
    }

    fn revoke(&self, url: &ObjectUrl) -> bool {
        let removed = self.lock().remove(url).is_some();
        if removed {
            debug!("Revoked {}", url);
        } else {
            warn!("Revoke of unknown or already revoked {}", url);
        }
        removed
    }
}

/// An [`ObjectUrl`] revoked when this guard drops.
pub struct ScopedObjectUrl<'a> {
    registry: &'a dyn HandleRegistry,
    url: ObjectUrl,
}

impl<'a> ScopedObjectUrl<'a> {
    pub fn new(registry: &'a dyn HandleRegistry, mime: &str, bytes: Arc<[u8]>) -> Self {
        let url = registry.create(mime, bytes);
        Self { registry, url }
    }

    pub fn url(&self) -> &ObjectUrl {
        &self.url
    }
}

impl Drop for ScopedObjectUrl<'_> {
    fn drop(&mut self) {
        self.registry.revoke(&self.url);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes(b: &[u8]) -> Arc<[u8]> {
        Arc::from(b)
    }

    #[test]
    fn create_and_revoke() {
        let reg = ObjectUrls::new();
        let url = reg.create("image/png", bytes(b"abc"));
        assert!(reg.is_live(&url));
        assert_eq!(reg.resolve(&url).as_deref(), Some(&b"abc"[..]));
        assert!(reg.revoke(&url));
        assert!(!reg.is_live(&url));
        assert!(!reg.revoke(&url), "second revoke must report false");
    }

    #[test]
    fn urls_are_unique() {
        let reg = ObjectUrls::new();
        let a = reg.create("image/png", bytes(b"1"));
        let b = reg.create("image/png", bytes(b"1"));
        assert_ne!(a, b);
        assert_eq!(reg.live_count(), 2);
    }

    #[test]
    fn scoped_url_released_on_drop() {
        let reg = ObjectUrls::new();
        let url = {
            let scoped = ScopedObjectUrl::new(&reg, "application/zip", bytes(b"PK"));
            assert!(reg.is_live(scoped.url()));
            scoped.url().clone()
        };
        assert!(!reg.is_live(&url));
        assert_eq!(reg.live_count(), 0);
    }
}
