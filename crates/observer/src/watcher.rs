//! Pod watch streams and the loop that feeds them to a sync handler.

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::{future, StreamExt};
use k8s_openapi::api::core::v1::Pod;
use kube::api::ListParams;
use kube::runtime::watcher::{self, Event};
use kube::runtime::WatchStreamExt;
use kube::{Api, Client};
use std::marker::PhantomData;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::{ObserverError, Result};
use crate::kind::ResourceKind;
use crate::sync::PodSyncHandler;

/// A change to a watched pod.
#[derive(Debug, Clone)]
pub enum PodEvent {
    /// The pod was added or updated, or listed when the watch (re)started.
    Applied(Pod),
    /// The pod is gone from the substrate.
    Deleted(Pod),
}

pub type PodEventStream = BoxStream<'static, std::result::Result<PodEvent, watcher::Error>>;

/// Source of pod watch streams.
#[async_trait]
pub trait PodSource: Send + Sync {
    /// Opens a watch over pods in every namespace matching `label_selector`.
    ///
    /// An error here means the watch could not be established at all. Errors
    /// once the stream is running are transient and yielded as stream items.
    async fn watch(&self, label_selector: &str) -> std::result::Result<PodEventStream, kube::Error>;
}

/// Pod source backed by the Kubernetes API.
#[derive(Clone)]
pub struct KubePodSource {
    client: Client,
}

impl KubePodSource {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PodSource for KubePodSource {
    async fn watch(&self, label_selector: &str) -> std::result::Result<PodEventStream, kube::Error> {
        let pods: Api<Pod> = Api::all(self.client.clone());

        // The watcher retries forever, so probe access up front to fail fast
        // on missing permissions or a bad selector.
        pods.list(&ListParams::default().labels(label_selector).limit(1))
            .await?;

        let events = watcher::watcher(pods, watcher::Config::default().labels(label_selector))
            .default_backoff()
            .filter_map(|event| {
                future::ready(match event {
                    Ok(Event::Apply(pod) | Event::InitApply(pod)) => Some(Ok(PodEvent::Applied(pod))),
                    Ok(Event::Delete(pod)) => Some(Ok(PodEvent::Deleted(pod))),
                    Ok(Event::Init | Event::InitDone) => None,
                    Err(e) => Some(Err(e)),
                })
            })
            .boxed();

        Ok(events)
    }
}

/// Feeds the pods of one kind to its sync handler, one event at a time.
pub struct PodWatcher<K: ResourceKind> {
    source: Arc<dyn PodSource>,
    handler: Arc<PodSyncHandler<K>>,
    label_selector: String,
    _kind: PhantomData<K>,
}

impl<K: ResourceKind> PodWatcher<K> {
    #[must_use]
    pub fn new(source: Arc<dyn PodSource>, handler: Arc<PodSyncHandler<K>>, brigade_id: &str) -> Self {
        Self {
            source,
            handler,
            label_selector: K::label_selector(brigade_id),
            _kind: PhantomData,
        }
    }

    /// Runs until `shutdown` is cancelled.
    ///
    /// An event being handled when shutdown is requested is finished first.
    /// Failing to establish the watch, or the stream ending, is fatal.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let mut events = self
            .source
            .watch(&self.label_selector)
            .await
            .map_err(|source| ObserverError::WatchSetup {
                kind: K::NAME,
                source,
            })?;

        info!(kind = K::NAME, selector = %self.label_selector, "Watching pods");

        loop {
            let event = tokio::select! {
                () = shutdown.cancelled() => {
                    info!(kind = K::NAME, "Pod watcher stopped");
                    return Ok(());
                }
                event = events.next() => event,
            };

            match event {
                Some(Ok(PodEvent::Applied(pod))) => {
                    self.handler.sync(&pod).await;
                }
                Some(Ok(PodEvent::Deleted(pod))) => self.handler.handle_deleted(&pod),
                Some(Err(e)) => warn!(kind = K::NAME, error = %e, "Pod watch error; retrying"),
                None => return Err(ObserverError::WatchEnded { kind: K::NAME }),
            }
        }
    }
}
