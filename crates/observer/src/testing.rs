//! Shared test fixtures: pod builders, a recording fake of the Brigade API
//! and a channel-backed pod source.

use async_trait::async_trait;
use brigade_sdk::{ApiError, JobStatus, JobsClient, SystemClient, WorkerStatus, WorkersClient};
use chrono::{DateTime, TimeZone, Utc};
use futures::channel::mpsc;
use futures::StreamExt;
use k8s_openapi::api::core::v1::{
    Container, ContainerState, ContainerStateRunning, ContainerStateTerminated,
    ContainerStateWaiting, ContainerStatus, Pod, PodSpec, PodStatus,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::kind::{ANNOTATION_TIMEOUT_DURATION, LABEL_BRIGADE_ID, LABEL_COMPONENT, LABEL_EVENT, LABEL_JOB};
use crate::watcher::{PodEvent, PodEventStream, PodSource};

/// A fixed instant plus `secs` seconds.
pub(crate) fn at(secs: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap() + chrono::Duration::seconds(secs)
}

pub(crate) struct PodBuilder {
    pod: Pod,
}

impl PodBuilder {
    fn new(name: String, component: &str, labels: &[(&str, &str)], containers: &[&str]) -> Self {
        let mut all_labels = BTreeMap::from([
            (LABEL_COMPONENT.to_string(), component.to_string()),
            (LABEL_BRIGADE_ID.to_string(), "brigade-1".to_string()),
        ]);
        for (key, value) in labels {
            all_labels.insert((*key).to_string(), (*value).to_string());
        }

        Self {
            pod: Pod {
                metadata: ObjectMeta {
                    name: Some(name),
                    namespace: Some("brigade-project".to_string()),
                    labels: Some(all_labels),
                    ..Default::default()
                },
                spec: Some(PodSpec {
                    containers: containers
                        .iter()
                        .map(|name| Container {
                            name: (*name).to_string(),
                            ..Default::default()
                        })
                        .collect(),
                    ..Default::default()
                }),
                status: Some(PodStatus::default()),
            },
        }
    }

    pub(crate) fn worker(event: &str) -> Self {
        Self::new(
            format!("{event}-worker"),
            "worker",
            &[(LABEL_EVENT, event)],
            &["worker"],
        )
    }

    /// A job pod whose primary container is named after the job, plus a sidecar.
    pub(crate) fn job(event: &str, job: &str) -> Self {
        Self::new(
            format!("{event}-{job}"),
            "job",
            &[(LABEL_EVENT, event), (LABEL_JOB, job)],
            &[job, "sidecar"],
        )
    }

    fn status(&mut self) -> &mut PodStatus {
        self.pod.status.get_or_insert_with(PodStatus::default)
    }

    fn container_state(mut self, container: &str, state: ContainerState) -> Self {
        let statuses = self.status().container_statuses.get_or_insert_with(Vec::new);
        match statuses.iter_mut().find(|status| status.name == container) {
            Some(status) => status.state = Some(state),
            None => statuses.push(ContainerStatus {
                name: container.to_string(),
                state: Some(state),
                ..Default::default()
            }),
        }
        self
    }

    pub(crate) fn phase(mut self, phase: &str) -> Self {
        self.status().phase = Some(phase.to_string());
        self
    }

    pub(crate) fn started_at(mut self, time: DateTime<Utc>) -> Self {
        self.status().start_time = Some(Time(time));
        self
    }

    pub(crate) fn deleting(mut self) -> Self {
        self.pod.metadata.deletion_timestamp = Some(Time(at(3600)));
        self
    }

    pub(crate) fn timeout_annotation(mut self, value: &str) -> Self {
        self.pod
            .metadata
            .annotations
            .get_or_insert_with(BTreeMap::new)
            .insert(ANNOTATION_TIMEOUT_DURATION.to_string(), value.to_string());
        self
    }

    pub(crate) fn waiting(self, container: &str, reason: &str) -> Self {
        self.container_state(
            container,
            ContainerState {
                waiting: Some(ContainerStateWaiting {
                    reason: Some(reason.to_string()),
                    ..Default::default()
                }),
                ..Default::default()
            },
        )
    }

    pub(crate) fn running(self, container: &str) -> Self {
        self.container_state(
            container,
            ContainerState {
                running: Some(ContainerStateRunning::default()),
                ..Default::default()
            },
        )
    }

    pub(crate) fn terminated(
        self,
        container: &str,
        exit_code: i32,
        finished_at: Option<DateTime<Utc>>,
    ) -> Self {
        self.container_state(
            container,
            ContainerState {
                terminated: Some(ContainerStateTerminated {
                    exit_code,
                    finished_at: finished_at.map(Time),
                    ..Default::default()
                }),
                ..Default::default()
            },
        )
    }

    pub(crate) fn build(self) -> Pod {
        self.pod
    }
}

/// A call received by [`FakeApi`].
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Call {
    Ping,
    WorkerStatus { event: String, status: WorkerStatus },
    WorkerCleanup { event: String },
    WorkerTimeout { event: String },
    JobStatus { event: String, job: String, status: JobStatus },
    JobCleanup { event: String, job: String },
    JobTimeout { event: String, job: String },
}

/// Records every call; failures are switched on per operation.
#[derive(Default)]
pub(crate) struct FakeApi {
    calls: Mutex<Vec<Call>>,
    pub(crate) conflict_on_status: AtomicBool,
    pub(crate) fail_status: AtomicBool,
    pub(crate) fail_cleanup: AtomicBool,
    pub(crate) fail_ping: AtomicBool,
    /// How long timeout calls take before they are recorded
    pub(crate) timeout_latency: Mutex<Duration>,
}

impl FakeApi {
    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn count(&self, matches: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|call| matches(call)).count()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn status_result(&self) -> Result<(), ApiError> {
        if self.conflict_on_status.load(Ordering::SeqCst) {
            return Err(ApiError::Conflict {
                reason: "already in a terminal phase".to_string(),
            });
        }
        if self.fail_status.load(Ordering::SeqCst) {
            return Err(ApiError::Status {
                status: 500,
                message: "internal error".to_string(),
            });
        }
        Ok(())
    }

    fn cleanup_result(&self) -> Result<(), ApiError> {
        if self.fail_cleanup.load(Ordering::SeqCst) {
            return Err(ApiError::Status {
                status: 503,
                message: "unavailable".to_string(),
            });
        }
        Ok(())
    }

    async fn simulate_timeout_latency(&self) {
        let latency = *self.timeout_latency.lock().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl SystemClient for FakeApi {
    async fn ping(&self) -> Result<String, ApiError> {
        self.record(Call::Ping);
        if self.fail_ping.load(Ordering::SeqCst) {
            return Err(ApiError::Status {
                status: 502,
                message: "bad gateway".to_string(),
            });
        }
        Ok("v2.6.0".to_string())
    }
}

#[async_trait]
impl WorkersClient for FakeApi {
    async fn update_status(&self, event_id: &str, status: &WorkerStatus) -> Result<(), ApiError> {
        self.record(Call::WorkerStatus {
            event: event_id.to_string(),
            status: status.clone(),
        });
        self.status_result()
    }

    async fn cleanup(&self, event_id: &str) -> Result<(), ApiError> {
        self.record(Call::WorkerCleanup {
            event: event_id.to_string(),
        });
        self.cleanup_result()
    }

    async fn timeout(&self, event_id: &str) -> Result<(), ApiError> {
        self.simulate_timeout_latency().await;
        self.record(Call::WorkerTimeout {
            event: event_id.to_string(),
        });
        Ok(())
    }
}

#[async_trait]
impl JobsClient for FakeApi {
    async fn update_status(
        &self,
        event_id: &str,
        job_name: &str,
        status: &JobStatus,
    ) -> Result<(), ApiError> {
        self.record(Call::JobStatus {
            event: event_id.to_string(),
            job: job_name.to_string(),
            status: status.clone(),
        });
        self.status_result()
    }

    async fn cleanup(&self, event_id: &str, job_name: &str) -> Result<(), ApiError> {
        self.record(Call::JobCleanup {
            event: event_id.to_string(),
            job: job_name.to_string(),
        });
        self.cleanup_result()
    }

    async fn timeout(&self, event_id: &str, job_name: &str) -> Result<(), ApiError> {
        self.simulate_timeout_latency().await;
        self.record(Call::JobTimeout {
            event: event_id.to_string(),
            job: job_name.to_string(),
        });
        Ok(())
    }
}

pub(crate) type PodEventSender = mpsc::UnboundedSender<Result<PodEvent, kube::runtime::watcher::Error>>;

/// Serves one channel-backed stream per label selector. Selectors without a
/// registered channel get a stream that never yields.
#[derive(Default)]
pub(crate) struct ChannelPodSource {
    streams: Mutex<HashMap<String, PodEventStream>>,
    pub(crate) fail_setup: AtomicBool,
}

impl ChannelPodSource {
    pub(crate) fn channel(&self, selector: &str) -> PodEventSender {
        let (tx, rx) = mpsc::unbounded();
        self.streams
            .lock()
            .unwrap()
            .insert(selector.to_string(), rx.boxed());
        tx
    }
}

#[async_trait]
impl PodSource for ChannelPodSource {
    async fn watch(&self, label_selector: &str) -> Result<PodEventStream, kube::Error> {
        if self.fail_setup.load(Ordering::SeqCst) {
            return Err(kube::Error::Api(kube::error::ErrorResponse {
                status: "Failure".to_string(),
                message: "pods is forbidden".to_string(),
                reason: "Forbidden".to_string(),
                code: 403,
            }));
        }
        Ok(self
            .streams
            .lock()
            .unwrap()
            .remove(label_selector)
            .unwrap_or_else(|| futures::stream::pending().boxed()))
    }
}
