//! Cleanup of finished Workers and Jobs.
//!
//! Cleanup is requested immediately when a pod is being deleted, or after a
//! delay once its resource reached a terminal phase. The delay gives the log
//! agent time to ship the pod's output before the pod goes away.

use brigade_sdk::ApiError;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, Instrument};

use crate::config::ObserverConfig;
use crate::kind::{PodKey, ResourceKind, ResourceRef};
use crate::remote::with_deadline;

#[derive(Debug)]
struct Scheduled {
    id: u64,
    cancel: CancellationToken,
}

pub struct CleanupScheduler<K: ResourceKind> {
    client: Arc<K::Client>,
    delay: Duration,
    api_timeout: Duration,
    pending: Arc<DashMap<PodKey, Scheduled>>,
    next_id: AtomicU64,
    shutdown: CancellationToken,
    _kind: PhantomData<K>,
}

impl<K: ResourceKind> CleanupScheduler<K> {
    #[must_use]
    pub fn new(client: Arc<K::Client>, config: &ObserverConfig, shutdown: CancellationToken) -> Self {
        Self {
            client,
            delay: config.delay_before_cleanup,
            api_timeout: config.api_request_timeout,
            pending: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(0),
            shutdown,
            _kind: PhantomData,
        }
    }

    /// Requests cleanup right away, superseding any deferred cleanup.
    pub async fn cleanup_now(&self, key: &PodKey, resource: &ResourceRef) -> Result<(), ApiError> {
        if let Some((_, scheduled)) = self.pending.remove(key) {
            scheduled.cancel.cancel();
            debug!(pod = %key, "Cancelled deferred cleanup");
        }

        let result = with_deadline(self.api_timeout, K::cleanup(&*self.client, resource)).await;
        match &result {
            Ok(()) => info!(pod = %key, %resource, "Cleaned up {}", K::NAME),
            Err(e) => error!(pod = %key, %resource, error = %e, "Failed to clean up {}", K::NAME),
        }
        result
    }

    /// Schedules cleanup after the configured delay.
    ///
    /// Returns false when cleanup is already scheduled for `key`. A deferred
    /// cleanup is attempted once; failures are logged and not retried.
    pub fn schedule(&self, key: &PodKey, resource: &ResourceRef) -> bool {
        let Entry::Vacant(slot) = self.pending.entry(key.clone()) else {
            return false;
        };

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cancel = self.shutdown.child_token();
        slot.insert(Scheduled {
            id,
            cancel: cancel.clone(),
        });

        debug!(pod = %key, delay = ?self.delay, "Scheduled cleanup");

        let client = Arc::clone(&self.client);
        let pending = Arc::clone(&self.pending);
        let (delay, api_timeout) = (self.delay, self.api_timeout);
        let key = key.clone();
        let resource = resource.clone();
        let span = info_span!("deferred_cleanup", kind = K::NAME, pod = %key);

        tokio::spawn(
            async move {
                tokio::select! {
                    () = cancel.cancelled() => {
                        pending.remove_if(&key, |_, scheduled| scheduled.id == id);
                        return;
                    }
                    () = tokio::time::sleep(delay) => {}
                }

                pending.remove_if(&key, |_, scheduled| scheduled.id == id);

                match with_deadline(api_timeout, K::cleanup(&*client, &resource)).await {
                    Ok(()) => info!(%resource, "Cleaned up {}", K::NAME),
                    Err(e) => error!(%resource, error = %e, "Failed to clean up {}", K::NAME),
                }
            }
            .instrument(span),
        );

        true
    }

    #[must_use]
    pub fn is_scheduled(&self, key: &PodKey) -> bool {
        self.pending.contains_key(key)
    }

    #[must_use]
    pub fn pending_cleanups(&self) -> usize {
        self.pending.len()
    }
}
