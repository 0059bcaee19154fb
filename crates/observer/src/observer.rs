//! Top-level coordination of the observer's long-running tasks.

use brigade_sdk::{JobsClient, SystemClient, WorkersClient};
use futures::future::join_all;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::ObserverConfig;
use crate::error::{ObserverError, Result};
use crate::health::run_healthcheck;
use crate::kind::{Job, Worker};
use crate::sync::PodSyncHandler;
use crate::watcher::{PodSource, PodWatcher};

/// Number of tasks that can report a fatal error.
const TASK_COUNT: usize = 3;

/// Runs the healthcheck loop and the Worker and Job pod watchers.
pub struct Observer {
    config: ObserverConfig,
    system: Arc<dyn SystemClient>,
    workers: Arc<dyn WorkersClient>,
    jobs: Arc<dyn JobsClient>,
    pods: Arc<dyn PodSource>,
}

impl Observer {
    #[must_use]
    pub fn new(
        config: ObserverConfig,
        system: Arc<dyn SystemClient>,
        workers: Arc<dyn WorkersClient>,
        jobs: Arc<dyn JobsClient>,
        pods: Arc<dyn PodSource>,
    ) -> Self {
        Self {
            config,
            system,
            workers,
            jobs,
            pods,
        }
    }

    /// Runs until a task fails or `shutdown` is cancelled.
    ///
    /// Always returns an error: the first fatal task error, or
    /// [`ObserverError::Shutdown`] when stopped from outside. Either way all
    /// tasks are cancelled and given the configured grace period to stop.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        let tasks = shutdown.child_token();
        let (errors_tx, mut errors_rx) = mpsc::channel(TASK_COUNT);

        info!(brigade_id = %self.config.brigade_id, "Starting observer");

        let worker_handler = Arc::new(PodSyncHandler::<Worker>::new(
            Arc::clone(&self.workers),
            &self.config,
            &tasks,
        ));
        let job_handler = Arc::new(PodSyncHandler::<Job>::new(
            Arc::clone(&self.jobs),
            &self.config,
            &tasks,
        ));

        let handles = vec![
            spawn_reporting(
                "healthcheck",
                run_healthcheck(
                    Arc::clone(&self.system),
                    self.config.healthcheck_interval,
                    self.config.api_request_timeout,
                    tasks.clone(),
                ),
                errors_tx.clone(),
            ),
            spawn_reporting(
                "worker watcher",
                PodWatcher::new(Arc::clone(&self.pods), worker_handler, &self.config.brigade_id)
                    .run(tasks.clone()),
                errors_tx.clone(),
            ),
            spawn_reporting(
                "job watcher",
                PodWatcher::new(Arc::clone(&self.pods), job_handler, &self.config.brigade_id)
                    .run(tasks.clone()),
                errors_tx,
            ),
        ];

        let cause = tokio::select! {
            Some(err) = errors_rx.recv() => err,
            () = shutdown.cancelled() => ObserverError::Shutdown,
        };

        info!(reason = %cause, "Stopping observer");
        tasks.cancel();

        let grace = self.config.shutdown_grace_period;
        if tokio::time::timeout(grace, join_all(handles)).await.is_err() {
            warn!(grace_period = ?grace, "Observer tasks did not stop within the grace period");
        }

        Err(cause)
    }
}

fn spawn_reporting<F>(
    name: &'static str,
    task: F,
    errors: mpsc::Sender<ObserverError>,
) -> JoinHandle<()>
where
    F: Future<Output = Result<()>> + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(e) = task.await {
            error!(task = name, error = %e, "Observer task failed");
            // Capacity covers every task, so this never blocks; only the
            // first error is read.
            let _ = errors.try_send(e);
        }
    })
}
