//! Side-effect hooks (C10): project statistics refresh and webhook fan-out bound to
//! registry state transitions.
//!
//! Hooks run after the durable write that triggers them has already succeeded. Per
//! §4.10/§7, any error from a hook implementation is logged and MUST NOT fail the HTTP
//! response -- callers in `registry_http` call these methods and discard `Err`, logging
//! it, rather than propagating it.
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Semaphore;

/// A manifest push or delete, reported to [`RegistryHooks`] after the underlying store
/// write has succeeded.
#[derive(Debug, Clone)]
pub struct ManifestEvent {
    pub repository: String,
    pub reference: String,
    pub digest: String,
    pub size: u64,
    pub user_id: Option<String>,
    pub username: Option<String>,
}

/// A blob delete, reported to [`RegistryHooks`] after the underlying store write has
/// succeeded. Unlike manifest events this does not recompute `imageCount`, only
/// `storageUsed` (§4.10).
#[derive(Debug, Clone)]
pub struct BlobEvent {
    pub repository: String,
    pub digest: String,
}

/// Best-effort side-effects triggered by registry state transitions.
///
/// Implementations are expected to be non-blocking with respect to the HTTP response --
/// e.g. enqueueing onto a bounded worker pool and dropping under backpressure, per §9.
/// The default (unit type) implementation does nothing, suitable for embedding this
/// crate without a project/webhook backend wired up.
#[async_trait]
pub trait RegistryHooks: Send + Sync {
    /// Called after a manifest PUT has been durably written. Implementations resolve
    /// the project from `event.repository`'s first path segment, creating it if absent
    /// and the pusher's identity is known, then recompute `imageCount`/`storageUsed`
    /// and emit a push event to the webhook dispatcher.
    async fn on_manifest_put(&self, _event: &ManifestEvent) {}

    /// Called after a manifest DELETE has been durably applied. Recomputes the same
    /// stats as [`Self::on_manifest_put`] and emits a delete event.
    async fn on_manifest_delete(&self, _event: &ManifestEvent) {}

    /// Called after a blob DELETE has been durably applied. Recomputes `storageUsed`
    /// only.
    async fn on_blob_delete(&self, _event: &BlobEvent) {}
}

impl RegistryHooks for () {}

/// Wraps a [`RegistryHooks`] implementation so each call is dispatched onto its own
/// `tokio::task` instead of being awaited on the caller's path, bounded by a fixed-size
/// [`Semaphore`] (§9: "best-effort, bounded worker pool"). A call arriving when the
/// pool is saturated is dropped -- logged, not queued -- rather than backing up the
/// caller; the wrapped implementation still runs to completion, just off to the side.
pub struct BoundedHooks<H> {
    inner: Arc<H>,
    permits: Arc<Semaphore>,
}

impl<H> BoundedHooks<H> {
    /// `capacity` bounds the number of hook calls running concurrently; pushes and
    /// deletes beyond that are dropped rather than queued indefinitely.
    pub fn new(inner: H, capacity: usize) -> Self {
        Self {
            inner: Arc::new(inner),
            permits: Arc::new(Semaphore::new(capacity)),
        }
    }

    fn spawn(&self, name: &'static str, fut: impl Future<Output = ()> + Send + 'static)
    where
        H: Send + Sync + 'static,
    {
        match self.permits.clone().try_acquire_owned() {
            Ok(permit) => {
                tokio::spawn(async move {
                    fut.await;
                    drop(permit);
                });
            }
            Err(_) => {
                tracing::warn!(hook = name, "dropping side-effect hook call, worker pool saturated");
            }
        }
    }
}

#[async_trait]
impl<H: RegistryHooks + Send + Sync + 'static> RegistryHooks for BoundedHooks<H> {
    async fn on_manifest_put(&self, event: &ManifestEvent) {
        let inner = self.inner.clone();
        let event = event.clone();
        self.spawn("on_manifest_put", async move { inner.on_manifest_put(&event).await });
    }

    async fn on_manifest_delete(&self, event: &ManifestEvent) {
        let inner = self.inner.clone();
        let event = event.clone();
        self.spawn("on_manifest_delete", async move { inner.on_manifest_delete(&event).await });
    }

    async fn on_blob_delete(&self, event: &BlobEvent) {
        let inner = self.inner.clone();
        let event = event.clone();
        self.spawn("on_blob_delete", async move { inner.on_blob_delete(&event).await });
    }
}
