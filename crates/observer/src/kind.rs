//! Resource kinds backed by pods.
//!
//! Workers and Jobs are reconciled by the same pipeline. [`ResourceKind`]
//! captures everything that differs between them: the phase type, the API
//! client, how a pod is mapped back to its Brigade resource, and whether the
//! primary container alone decides the outcome.

use async_trait::async_trait;
use brigade_sdk::{ApiError, JobPhase, JobStatus, JobsClient, WorkerPhase, WorkerStatus, WorkersClient};
use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;
use std::fmt;
use std::time::Duration;

use crate::config::ObserverConfig;

/// Label identifying which Brigade component a pod belongs to
pub const LABEL_COMPONENT: &str = "brigade.sh/component";
/// Label carrying the installation identifier
pub const LABEL_BRIGADE_ID: &str = "brigade.sh/id";
/// Label carrying the event a Worker or Job pod handles
pub const LABEL_EVENT: &str = "brigade.sh/event";
/// Label carrying a Job's name
pub const LABEL_JOB: &str = "brigade.sh/job";
/// Annotation overriding the maximum lifetime of a single Worker or Job
pub const ANNOTATION_TIMEOUT_DURATION: &str = "brigade.sh/timeoutDuration";

/// Identity of a pod for all per-pod tracking.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PodKey {
    pub namespace: String,
    pub name: String,
}

impl PodKey {
    #[must_use]
    pub fn of(pod: &Pod) -> Self {
        Self {
            namespace: pod.namespace().unwrap_or_default(),
            name: pod.name_any(),
        }
    }
}

impl fmt::Display for PodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// The Brigade Worker or Job a pod belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRef {
    pub event_id: String,
    /// Set for Jobs only
    pub job_name: Option<String>,
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.job_name {
            Some(job) => write!(f, "event {} job {}", self.event_id, job),
            None => write!(f, "event {} worker", self.event_id),
        }
    }
}

/// Phase values the reconciler needs to name, plus terminal classification.
pub trait ResourcePhase:
    Copy + Eq + fmt::Debug + fmt::Display + Send + Sync + 'static
{
    const RUNNING: Self;
    const SUCCEEDED: Self;
    const FAILED: Self;
    const ABORTED: Self;
    const UNKNOWN: Self;

    fn is_terminal(self) -> bool;
}

impl ResourcePhase for WorkerPhase {
    const RUNNING: Self = Self::Running;
    const SUCCEEDED: Self = Self::Succeeded;
    const FAILED: Self = Self::Failed;
    const ABORTED: Self = Self::Aborted;
    const UNKNOWN: Self = Self::Unknown;

    fn is_terminal(self) -> bool {
        WorkerPhase::is_terminal(self)
    }
}

impl ResourcePhase for JobPhase {
    const RUNNING: Self = Self::Running;
    const SUCCEEDED: Self = Self::Succeeded;
    const FAILED: Self = Self::Failed;
    const ABORTED: Self = Self::Aborted;
    const UNKNOWN: Self = Self::Unknown;

    fn is_terminal(self) -> bool {
        JobPhase::is_terminal(self)
    }
}

/// Status computed from a pod. Never read back from the API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedStatus<P> {
    pub phase: P,
    pub started: Option<DateTime<Utc>>,
    pub ended: Option<DateTime<Utc>>,
}

/// A Brigade resource whose lifecycle is backed by exactly one pod.
#[async_trait]
pub trait ResourceKind: Send + Sync + 'static {
    type Phase: ResourcePhase;
    type Client: ?Sized + Send + Sync + 'static;

    /// Value of the component label, also used in logs
    const NAME: &'static str;

    /// When set, a terminated primary container settles the outcome even
    /// while sidecars keep the pod running.
    const PRIMARY_CONTAINER_DECIDES_OUTCOME: bool;

    /// Reads the owning resource from pod labels.
    fn resource_ref(pod: &Pod) -> Option<ResourceRef>;

    /// Timeout for pods without a timeout annotation.
    fn max_lifetime(config: &ObserverConfig) -> Duration;

    /// Selector matching this kind's pods for one installation.
    fn label_selector(brigade_id: &str) -> String {
        format!(
            "{LABEL_COMPONENT}={},{LABEL_BRIGADE_ID}={brigade_id}",
            Self::NAME
        )
    }

    async fn update_status(
        client: &Self::Client,
        resource: &ResourceRef,
        status: &DerivedStatus<Self::Phase>,
    ) -> Result<(), ApiError>;

    async fn cleanup(client: &Self::Client, resource: &ResourceRef) -> Result<(), ApiError>;

    async fn timeout(client: &Self::Client, resource: &ResourceRef) -> Result<(), ApiError>;
}

fn label<'a>(pod: &'a Pod, key: &str) -> Option<&'a str> {
    pod.labels()
        .get(key)
        .map(String::as_str)
        .filter(|value| !value.is_empty())
}

/// Worker pods: one per event.
pub struct Worker;

#[async_trait]
impl ResourceKind for Worker {
    type Phase = WorkerPhase;
    type Client = dyn WorkersClient;

    const NAME: &'static str = "worker";
    const PRIMARY_CONTAINER_DECIDES_OUTCOME: bool = false;

    fn resource_ref(pod: &Pod) -> Option<ResourceRef> {
        Some(ResourceRef {
            event_id: label(pod, LABEL_EVENT)?.to_string(),
            job_name: None,
        })
    }

    fn max_lifetime(config: &ObserverConfig) -> Duration {
        config.max_worker_lifetime
    }

    async fn update_status(
        client: &Self::Client,
        resource: &ResourceRef,
        status: &DerivedStatus<WorkerPhase>,
    ) -> Result<(), ApiError> {
        let status = WorkerStatus {
            started: status.started,
            ended: status.ended,
            phase: status.phase,
        };
        client.update_status(&resource.event_id, &status).await
    }

    async fn cleanup(client: &Self::Client, resource: &ResourceRef) -> Result<(), ApiError> {
        client.cleanup(&resource.event_id).await
    }

    async fn timeout(client: &Self::Client, resource: &ResourceRef) -> Result<(), ApiError> {
        client.timeout(&resource.event_id).await
    }
}

/// Job pods: spawned by a Worker, possibly with sidecars.
pub struct Job;

impl Job {
    fn job_name(resource: &ResourceRef) -> &str {
        resource.job_name.as_deref().unwrap_or_default()
    }
}

#[async_trait]
impl ResourceKind for Job {
    type Phase = JobPhase;
    type Client = dyn JobsClient;

    const NAME: &'static str = "job";
    const PRIMARY_CONTAINER_DECIDES_OUTCOME: bool = true;

    fn resource_ref(pod: &Pod) -> Option<ResourceRef> {
        Some(ResourceRef {
            event_id: label(pod, LABEL_EVENT)?.to_string(),
            job_name: Some(label(pod, LABEL_JOB)?.to_string()),
        })
    }

    fn max_lifetime(config: &ObserverConfig) -> Duration {
        config.max_job_lifetime
    }

    async fn update_status(
        client: &Self::Client,
        resource: &ResourceRef,
        status: &DerivedStatus<JobPhase>,
    ) -> Result<(), ApiError> {
        let status = JobStatus {
            started: status.started,
            ended: status.ended,
            phase: status.phase,
        };
        client
            .update_status(&resource.event_id, Self::job_name(resource), &status)
            .await
    }

    async fn cleanup(client: &Self::Client, resource: &ResourceRef) -> Result<(), ApiError> {
        client
            .cleanup(&resource.event_id, Self::job_name(resource))
            .await
    }

    async fn timeout(client: &Self::Client, resource: &ResourceRef) -> Result<(), ApiError> {
        client
            .timeout(&resource.event_id, Self::job_name(resource))
            .await
    }
}
