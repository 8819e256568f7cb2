use std::sync::Arc;

use tokio::sync::RwLock;

use super::ObjectStore;

/// Process-wide slot for the configured backend.
///
/// Readers clone the inner `Arc` and drop the lock before talking to the
/// backend, so a reconfiguration never waits on network calls.
#[derive(Clone, Default)]
pub struct StorageHandle {
    inner: Arc<RwLock<Option<Arc<dyn ObjectStore>>>>,
}

impl StorageHandle {
    pub fn new(store: Option<Arc<dyn ObjectStore>>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(store)),
        }
    }

    /// Snapshot of the current backend, `None` until storage is configured.
    pub async fn current(&self) -> Option<Arc<dyn ObjectStore>> {
        self.inner.read().await.clone()
    }

    pub async fn is_configured(&self) -> bool {
        self.inner.read().await.is_some()
    }

    /// Swap in a new backend, returning the previous one.
    pub async fn replace(&self, store: Arc<dyn ObjectStore>) -> Option<Arc<dyn ObjectStore>> {
        self.inner.write().await.replace(store)
    }
}
