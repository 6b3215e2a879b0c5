use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Counters for handles issued by an [`ObjectStore`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HandleStats {
    pub created: u64,
    pub released: u64,
    pub live: usize,
}

#[derive(Debug, Default)]
struct StoreInner {
    objects: BTreeMap<String, Arc<[u8]>>,
    created: u64,
    released: u64,
}

/// Registry of locally-resolvable object URLs (`blob:cute-avatar/<id>`).
///
/// Every URL is owned by exactly one [`ObjectHandle`]; dropping the handle
/// revokes the URL.
#[derive(Debug, Clone, Default)]
pub struct ObjectStore {
    inner: Arc<Mutex<StoreInner>>,
}

impl ObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, bytes: impl Into<Arc<[u8]>>) -> ObjectHandle {
        let url = format!("blob:cute-avatar/{}", uuid::Uuid::new_v4());
        let mut inner = self.lock();
        inner.objects.insert(url.clone(), bytes.into());
        inner.created += 1;
        drop(inner);
        tracing::debug!(%url, "object url created");
        ObjectHandle {
            url,
            store: self.clone(),
        }
    }

    pub fn resolve(&self, url: &str) -> Option<Arc<[u8]>> {
        self.lock()
            .objects
            .get(url)
            .map(Arc::clone)
    }

    pub fn stats(&self) -> HandleStats {
        let inner = self.lock();
        HandleStats {
            created: inner.created,
            released: inner.released,
            live: inner.objects.len(),
        }
    }

    fn revoke(&self, url: &str) {
        let mut inner = self.lock();
        if inner.objects.remove(url).is_some() {
            inner.released += 1;
            tracing::debug!(%url, "object url revoked");
        } else {
            tracing::warn!(%url, "object url revoked twice");
        }
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        // A panic while holding the lock cannot leave the map half-updated.
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Owner of one object URL. Released exactly once, on drop.
#[derive(Debug)]
pub struct ObjectHandle {
    url: String,
    store: ObjectStore,
}

impl ObjectHandle {
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn bytes(&self) -> Option<Arc<[u8]>> {
        self.store.resolve(&self.url)
    }

    pub fn release(self) {
        drop(self);
    }
}

impl Drop for ObjectHandle {
    fn drop(&mut self) {
        self.store.revoke(&self.url);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_resolves_until_dropped() {
        let store = ObjectStore::new();
        let handle = store.create(b"png-bytes".to_vec());
        let url = handle.url().to_string();
        assert!(url.starts_with("blob:cute-avatar/"));
        assert_eq!(store.resolve(&url).as_deref(), Some(&b"png-bytes"[..]));

        handle.release();
        assert!(store.resolve(&url).is_none());
        assert_eq!(
            store.stats(),
            HandleStats {
                created: 1,
                released: 1,
                live: 0
            }
        );
    }

    #[test]
    fn urls_are_unique() {
        let store = ObjectStore::new();
        let a = store.create(Vec::new());
        let b = store.create(Vec::new());
        assert_ne!(a.url(), b.url());
        assert_eq!(store.stats().live, 2);
    }
}
