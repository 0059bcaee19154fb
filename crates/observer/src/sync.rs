//! Per-event reconciliation of one Worker or Job pod.

use k8s_openapi::api::core::v1::Pod;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::cleanup::CleanupScheduler;
use crate::config::ObserverConfig;
use crate::kind::{DerivedStatus, PodKey, ResourceKind, ResourcePhase};
use crate::phase::derive_status;
use crate::status::{StatusSync, SyncOutcome};
use crate::timeout::TimeoutClock;

/// What the handler decided about cleanup for one observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupAction {
    None,
    /// The pod is being deleted; cleanup was requested right away.
    Immediate,
    /// Immediate cleanup was already requested for this deletion.
    AlreadyDeleting,
    Deferred,
    AlreadyScheduled,
}

/// Everything one call to [`PodSyncHandler::sync`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport<P> {
    pub status: DerivedStatus<P>,
    pub outcome: SyncOutcome,
    pub cleanup: CleanupAction,
}

/// Composes phase mapping, timeouts, status sync and cleanup for one kind.
pub struct PodSyncHandler<K: ResourceKind> {
    timeouts: TimeoutClock<K>,
    status: StatusSync<K>,
    cleanup: CleanupScheduler<K>,
    /// Pods whose deletion has been seen and whose immediate cleanup was
    /// issued.
    deleting: Mutex<HashSet<PodKey>>,
}

impl<K: ResourceKind> PodSyncHandler<K> {
    #[must_use]
    pub fn new(client: Arc<K::Client>, config: &ObserverConfig, shutdown: &CancellationToken) -> Self {
        Self {
            timeouts: TimeoutClock::new(Arc::clone(&client), config, shutdown.clone()),
            status: StatusSync::new(Arc::clone(&client), config.api_request_timeout),
            cleanup: CleanupScheduler::new(client, config, shutdown.clone()),
            deleting: Mutex::new(HashSet::new()),
        }
    }

    /// Handles a pod add or update.
    ///
    /// Returns `None` when the pod cannot be mapped to a Brigade resource.
    #[instrument(skip_all, fields(kind = K::NAME, pod = %PodKey::of(pod)))]
    pub async fn sync(&self, pod: &Pod) -> Option<SyncReport<K::Phase>> {
        let key = PodKey::of(pod);
        let Some(resource) = K::resource_ref(pod) else {
            warn!("Pod is missing Brigade labels; ignoring");
            return None;
        };

        let status = derive_status::<K>(pod);
        debug!(%resource, phase = %status.phase, "Observed pod");

        self.timeouts.manage_timeout(pod, &resource, status.phase);

        let outcome = self.status.sync_status(pod, &key, &resource, &status).await;

        let cleanup = if pod.metadata.deletion_timestamp.is_some() {
            if self.mark_deleting(&key) {
                if self.cleanup.cleanup_now(&key, &resource).await.is_err() {
                    // Allow the next observation of this deletion to retry
                    self.unmark_deleting(&key);
                }
                CleanupAction::Immediate
            } else {
                CleanupAction::AlreadyDeleting
            }
        } else if status.phase.is_terminal() {
            if self.cleanup.schedule(&key, &resource) {
                CleanupAction::Deferred
            } else {
                CleanupAction::AlreadyScheduled
            }
        } else {
            CleanupAction::None
        };

        Some(SyncReport {
            status,
            outcome,
            cleanup,
        })
    }

    /// Handles removal of the pod from the substrate.
    pub fn handle_deleted(&self, pod: &Pod) {
        let key = PodKey::of(pod);
        if self.unmark_deleting(&key) {
            debug!(kind = K::NAME, pod = %key, "Pod deleted");
        }
    }

    fn mark_deleting(&self, key: &PodKey) -> bool {
        self.deleting
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.clone())
    }

    fn unmark_deleting(&self, key: &PodKey) -> bool {
        self.deleting
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
    }

    #[must_use]
    pub fn is_deleting(&self, key: &PodKey) -> bool {
        self.deleting
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(key)
    }

    #[must_use]
    pub fn timeouts(&self) -> &TimeoutClock<K> {
        &self.timeouts
    }

    #[must_use]
    pub fn cleanups(&self) -> &CleanupScheduler<K> {
        &self.cleanup
    }
}
