//! Per-pod execution timeouts.
//!
//! A timer runs for every pod in a non-terminal phase. When it expires the
//! API server is asked to time out the Worker or Job; when the pod reaches a
//! terminal phase first the timer is cancelled.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::config::ObserverConfig;
use crate::kind::{PodKey, ResourceKind, ResourcePhase, ResourceRef, ANNOTATION_TIMEOUT_DURATION};
use crate::remote::with_deadline;

/// An active timer.
#[derive(Debug)]
struct PodTimer {
    id: u64,
    cancel: CancellationToken,
    deadline: Instant,
}

/// Owns the timers of one resource kind.
pub struct TimeoutClock<K: ResourceKind> {
    client: Arc<K::Client>,
    max_lifetime: Duration,
    api_timeout: Duration,
    timers: Arc<DashMap<PodKey, PodTimer>>,
    next_id: AtomicU64,
    shutdown: CancellationToken,
    _kind: PhantomData<K>,
}

impl<K: ResourceKind> TimeoutClock<K> {
    /// Timers are children of `shutdown` and stop when it is cancelled.
    #[must_use]
    pub fn new(client: Arc<K::Client>, config: &ObserverConfig, shutdown: CancellationToken) -> Self {
        Self {
            client,
            max_lifetime: K::max_lifetime(config),
            api_timeout: config.api_request_timeout,
            timers: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(0),
            shutdown,
            _kind: PhantomData,
        }
    }

    /// Starts, stops or leaves alone the timer for `pod` given its new phase.
    ///
    /// Idempotent: at most one timer per pod ever exists.
    pub fn manage_timeout(&self, pod: &Pod, resource: &ResourceRef, phase: K::Phase) {
        let key = PodKey::of(pod);

        if phase.is_terminal() {
            if let Some((_, timer)) = self.timers.remove(&key) {
                timer.cancel.cancel();
                debug!(pod = %key, %phase, "Stopped timeout clock");
            }
            return;
        }

        let Entry::Vacant(slot) = self.timers.entry(key.clone()) else {
            return;
        };

        let duration = self.timeout_for(pod, &key);
        let timer = PodTimer {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            cancel: self.shutdown.child_token(),
            deadline: Instant::now() + duration,
        };
        let (id, cancel, deadline) = (timer.id, timer.cancel.clone(), timer.deadline);
        slot.insert(timer);

        debug!(pod = %key, %phase, timeout = ?duration, "Started timeout clock");

        let client = Arc::clone(&self.client);
        let timers = Arc::clone(&self.timers);
        let api_timeout = self.api_timeout;
        let resource = resource.clone();
        let span = info_span!("timeout_clock", kind = K::NAME, pod = %key);

        tokio::spawn(
            async move {
                let expired = tokio::select! {
                    () = cancel.cancelled() => false,
                    () = tokio::time::sleep_until(deadline) => true,
                };

                if expired {
                    info!(%resource, "Timeout reached");
                    // Not bound to `cancel`: the pod reaching a terminal phase
                    // while this call is in flight must not abort it.
                    match with_deadline(api_timeout, K::timeout(&*client, &resource)).await {
                        Ok(()) => info!(%resource, "Timed out {}", K::NAME),
                        Err(e) => error!(%resource, error = %e, "Failed to time out {}", K::NAME),
                    }
                }

                timers.remove_if(&key, |_, timer| timer.id == id);
            }
            .instrument(span),
        );
    }

    fn timeout_for(&self, pod: &Pod, key: &PodKey) -> Duration {
        let Some(raw) = pod.annotations().get(ANNOTATION_TIMEOUT_DURATION) else {
            return self.max_lifetime;
        };
        match humantime::parse_duration(raw.trim()) {
            Ok(duration) if !duration.is_zero() => duration,
            Ok(_) => {
                warn!(pod = %key, value = %raw, "Ignoring zero timeout annotation");
                self.max_lifetime
            }
            Err(e) => {
                warn!(pod = %key, value = %raw, error = %e, "Ignoring unparsable timeout annotation");
                self.max_lifetime
            }
        }
    }

    /// Whether a timer is currently running for `key`.
    #[must_use]
    pub fn is_timing(&self, key: &PodKey) -> bool {
        self.timers.contains_key(key)
    }

    /// When the timer for `key` expires, if one is running.
    #[must_use]
    pub fn deadline(&self, key: &PodKey) -> Option<Instant> {
        self.timers.get(key).map(|timer| timer.deadline)
    }

    #[must_use]
    pub fn active_timers(&self) -> usize {
        self.timers.len()
    }
}
