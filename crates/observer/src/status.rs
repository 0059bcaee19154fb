//! Pushes derived statuses to the API server.

use k8s_openapi::api::core::v1::Pod;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

use crate::kind::{DerivedStatus, PodKey, ResourceKind, ResourceRef};
use crate::remote::with_deadline;

/// Result of a single status write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Updated,
    /// The API server refused the write because the resource is already
    /// terminal, and the pod was being deleted anyway.
    ConflictSuppressed,
    /// Logged; the next watch event for the pod retries implicitly.
    Failed,
}

pub struct StatusSync<K: ResourceKind> {
    client: Arc<K::Client>,
    api_timeout: Duration,
    _kind: PhantomData<K>,
}

impl<K: ResourceKind> StatusSync<K> {
    #[must_use]
    pub fn new(client: Arc<K::Client>, api_timeout: Duration) -> Self {
        Self {
            client,
            api_timeout,
            _kind: PhantomData,
        }
    }

    /// Writes `status` for `resource`. Never returns an error: failures are
    /// logged here and reported through the outcome.
    pub async fn sync_status(
        &self,
        pod: &Pod,
        key: &PodKey,
        resource: &ResourceRef,
        status: &DerivedStatus<K::Phase>,
    ) -> SyncOutcome {
        let result = with_deadline(
            self.api_timeout,
            K::update_status(&*self.client, resource, status),
        )
        .await;

        match result {
            Ok(()) => {
                debug!(pod = %key, %resource, phase = %status.phase, "Updated status");
                SyncOutcome::Updated
            }
            // Deleting a pod whose resource already finished always yields
            // an ABORTED write the API server refuses. Expected, not an error.
            Err(e) if e.is_conflict() && pod.metadata.deletion_timestamp.is_some() => {
                SyncOutcome::ConflictSuppressed
            }
            Err(e) => {
                error!(
                    pod = %key,
                    %resource,
                    phase = %status.phase,
                    error = %e,
                    "Failed to update {} status",
                    K::NAME
                );
                SyncOutcome::Failed
            }
        }
    }
}
