//! Pod status → Brigade phase mapping.
//!
//! Pure functions; no I/O and no shared state. The same pod always maps to the
//! same status.

use k8s_openapi::api::core::v1::{ContainerStateTerminated, ContainerStatus, Pod};

use crate::kind::{DerivedStatus, ResourceKind, ResourcePhase};

const POD_PENDING: &str = "Pending";
const POD_RUNNING: &str = "Running";
const POD_SUCCEEDED: &str = "Succeeded";
const POD_FAILED: &str = "Failed";

/// Waiting reasons that leave a pod pending forever.
const IMAGE_PULL_FAILURES: [&str; 2] = ["ImagePullBackOff", "ErrImagePull"];

/// Computes the Brigade status of the resource backed by `pod`.
#[must_use]
pub fn derive_status<K: ResourceKind>(pod: &Pod) -> DerivedStatus<K::Phase> {
    let primary = primary_container_status(pod);

    DerivedStatus {
        phase: derive_phase::<K>(pod, primary),
        started: pod
            .status
            .as_ref()
            .and_then(|status| status.start_time.as_ref())
            .map(|time| time.0),
        ended: primary
            .and_then(terminated)
            .and_then(|terminated| terminated.finished_at.as_ref())
            .map(|time| time.0),
    }
}

fn derive_phase<K: ResourceKind>(pod: &Pod, primary: Option<&ContainerStatus>) -> K::Phase {
    // Best effort: the pod may already have reported a terminal phase, in
    // which case the API server rejects this write as a conflict.
    if pod.metadata.deletion_timestamp.is_some() {
        return K::Phase::ABORTED;
    }

    // An unset phase is what the substrate reports before the pod is
    // scheduled, which is Pending in all but name.
    let substrate_phase = pod
        .status
        .as_ref()
        .and_then(|status| status.phase.as_deref())
        .unwrap_or(POD_PENDING);

    let phase = match substrate_phase {
        // From the user's perspective a pending pod is already running,
        // unless its image can never be pulled.
        POD_PENDING if image_pull_failed(pod) => K::Phase::FAILED,
        POD_PENDING | POD_RUNNING => K::Phase::RUNNING,
        POD_SUCCEEDED => K::Phase::SUCCEEDED,
        POD_FAILED => K::Phase::FAILED,
        _ => K::Phase::UNKNOWN,
    };

    // Sidecars can keep a pod running after the primary container's result
    // is known.
    if K::PRIMARY_CONTAINER_DECIDES_OUTCOME && phase == K::Phase::RUNNING {
        if let Some(terminated) = primary.and_then(terminated) {
            return if terminated.exit_code == 0 {
                K::Phase::SUCCEEDED
            } else {
                K::Phase::FAILED
            };
        }
    }

    phase
}

/// The status of the container listed first in the pod spec.
///
/// Container statuses are not guaranteed to follow spec order, so they are
/// matched by name, falling back to the first reported status.
#[must_use]
pub fn primary_container_status(pod: &Pod) -> Option<&ContainerStatus> {
    let statuses = pod.status.as_ref()?.container_statuses.as_ref()?;
    pod.spec
        .as_ref()
        .and_then(|spec| spec.containers.first())
        .and_then(|primary| statuses.iter().find(|status| status.name == primary.name))
        .or_else(|| statuses.first())
}

fn terminated(status: &ContainerStatus) -> Option<&ContainerStateTerminated> {
    status.state.as_ref()?.terminated.as_ref()
}

fn image_pull_failed(pod: &Pod) -> bool {
    let Some(status) = pod.status.as_ref() else {
        return false;
    };
    status
        .init_container_statuses
        .iter()
        .chain(status.container_statuses.iter())
        .flatten()
        .filter_map(|container| container.state.as_ref()?.waiting.as_ref()?.reason.as_deref())
        .any(|reason| IMAGE_PULL_FAILURES.contains(&reason))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kind::{Job, Worker};
    use crate::testing::{at, PodBuilder};
    use brigade_sdk::{JobPhase, WorkerPhase};

    #[test]
    fn test_substrate_phase_mapping() {
        let cases = [
            ("Pending", WorkerPhase::Running),
            ("Running", WorkerPhase::Running),
            ("Succeeded", WorkerPhase::Succeeded),
            ("Failed", WorkerPhase::Failed),
            ("Unknown", WorkerPhase::Unknown),
            ("SomethingNew", WorkerPhase::Unknown),
        ];
        for (substrate, expected) in cases {
            let pod = PodBuilder::worker("evt").phase(substrate).build();
            assert_eq!(
                derive_status::<Worker>(&pod).phase,
                expected,
                "substrate phase {substrate}"
            );
        }
    }

    #[test]
    fn test_missing_phase_is_treated_as_pending() {
        let pod = PodBuilder::worker("evt").build();
        assert_eq!(derive_status::<Worker>(&pod).phase, WorkerPhase::Running);
    }

    #[test]
    fn test_deletion_marker_always_aborts() {
        for substrate in ["Pending", "Running", "Succeeded", "Failed", "Unknown"] {
            let worker = PodBuilder::worker("evt").phase(substrate).deleting().build();
            assert_eq!(derive_status::<Worker>(&worker).phase, WorkerPhase::Aborted);

            let job = PodBuilder::job("evt", "build")
                .phase(substrate)
                .terminated("build", 0, Some(at(10)))
                .deleting()
                .build();
            assert_eq!(derive_status::<Job>(&job).phase, JobPhase::Aborted);
        }
    }

    #[test]
    fn test_image_pull_backoff_fails_pending_pod() {
        let pod = PodBuilder::worker("evt")
            .phase("Pending")
            .waiting("worker", "ImagePullBackOff")
            .build();
        let status = derive_status::<Worker>(&pod);
        assert_eq!(status.phase, WorkerPhase::Failed);
        assert_eq!(status.ended, None);

        let pod = PodBuilder::job("evt", "build")
            .phase("Pending")
            .waiting("sidecar", "ErrImagePull")
            .build();
        assert_eq!(derive_status::<Job>(&pod).phase, JobPhase::Failed);
    }

    #[test]
    fn test_other_waiting_reasons_stay_running() {
        let pod = PodBuilder::worker("evt")
            .phase("Pending")
            .waiting("worker", "ContainerCreating")
            .build();
        assert_eq!(derive_status::<Worker>(&pod).phase, WorkerPhase::Running);
    }

    #[test]
    fn test_job_primary_container_decides_outcome() {
        let succeeded = PodBuilder::job("evt", "build")
            .phase("Pending")
            .terminated("build", 0, Some(at(20)))
            .build();
        let status = derive_status::<Job>(&succeeded);
        assert_eq!(status.phase, JobPhase::Succeeded);
        assert_eq!(status.ended, Some(at(20)));

        let failed = PodBuilder::job("evt", "build")
            .phase("Running")
            .terminated("build", 2, Some(at(20)))
            .running("sidecar")
            .build();
        assert_eq!(derive_status::<Job>(&failed).phase, JobPhase::Failed);
    }

    #[test]
    fn test_sidecar_termination_does_not_decide_job() {
        let pod = PodBuilder::job("evt", "build")
            .phase("Running")
            .running("build")
            .terminated("sidecar", 1, Some(at(5)))
            .build();
        let status = derive_status::<Job>(&pod);
        assert_eq!(status.phase, JobPhase::Running);
        assert_eq!(status.ended, None);
    }

    #[test]
    fn test_worker_primary_container_does_not_override_phase() {
        let pod = PodBuilder::worker("evt")
            .phase("Running")
            .terminated("worker", 0, Some(at(30)))
            .build();
        let status = derive_status::<Worker>(&pod);
        assert_eq!(status.phase, WorkerPhase::Running);
        assert_eq!(status.ended, Some(at(30)));
    }

    #[test]
    fn test_worker_success_timestamps() {
        let pod = PodBuilder::worker("evt")
            .phase("Succeeded")
            .started_at(at(0))
            .terminated("worker", 0, Some(at(42)))
            .build();
        assert_eq!(
            derive_status::<Worker>(&pod),
            DerivedStatus {
                phase: WorkerPhase::Succeeded,
                started: Some(at(0)),
                ended: Some(at(42)),
            }
        );
    }

    #[test]
    fn test_mapping_is_idempotent() {
        let pod = PodBuilder::job("evt", "build")
            .phase("Running")
            .started_at(at(1))
            .terminated("build", 0, Some(at(9)))
            .running("sidecar")
            .build();
        assert_eq!(derive_status::<Job>(&pod), derive_status::<Job>(&pod));
    }

    #[test]
    fn test_primary_container_matched_by_spec_name() {
        // Statuses reported out of spec order
        let pod = PodBuilder::job("evt", "build")
            .running("sidecar")
            .terminated("build", 0, Some(at(3)))
            .build();
        assert_eq!(primary_container_status(&pod).unwrap().name, "build");
    }
}
