//! API server liveness check.

use brigade_sdk::SystemClient;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::error::{ObserverError, Result};
use crate::remote::with_deadline;

/// Pings the API server every `interval` until `shutdown` is cancelled.
///
/// The observer cannot do useful work without the API server, so the first
/// failed ping ends the loop with an error.
pub async fn run_healthcheck(
    client: Arc<dyn SystemClient>,
    interval: Duration,
    api_timeout: Duration,
    shutdown: CancellationToken,
) -> Result<()> {
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = shutdown.cancelled() => return Ok(()),
            _ = ticker.tick() => {}
        }

        match with_deadline(api_timeout, client.ping()).await {
            Ok(version) => debug!(%version, "API server healthcheck passed"),
            Err(e) => {
                error!(error = %e, "API server healthcheck failed");
                return Err(ObserverError::Healthcheck(e));
            }
        }
    }
}
