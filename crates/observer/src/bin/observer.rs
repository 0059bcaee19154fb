//! Brigade observer service
//!
//! Reads its configuration from the environment, connects to the Brigade API
//! server and the Kubernetes API, and runs until SIGTERM or Ctrl+C.

use anyhow::{Context, Result};
use brigade_sdk::ApiClient;
use observer::{KubePodSource, Observer, ObserverError, Settings};
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    info!("Starting Brigade observer v{}", env!("CARGO_PKG_VERSION"));

    let settings = Settings::from_env().context("failed to load configuration")?;
    info!(
        api_address = %settings.api.address,
        brigade_id = %settings.observer.brigade_id,
        "Configuration loaded"
    );

    let api = Arc::new(ApiClient::new(settings.api).context("failed to create API client")?);
    let kube_client = kube::Client::try_default()
        .await
        .context("failed to create Kubernetes client")?;

    let observer = Observer::new(
        settings.observer,
        api.clone(),
        api.clone(),
        api,
        Arc::new(KubePodSource::new(kube_client)),
    );

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            shutdown_signal().await;
            shutdown.cancel();
        }
    });

    match observer.run(shutdown).await {
        Ok(()) | Err(ObserverError::Shutdown) => {
            info!("Observer shut down");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Observer stopped");
            Err(e.into())
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let registry = tracing_subscriber::registry().with(filter);

    // LOG_FORMAT=json for log aggregation in-cluster
    if std::env::var("LOG_FORMAT").is_ok_and(|format| format.eq_ignore_ascii_case("json")) {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C, shutting down gracefully");
        },
        () = terminate => {
            info!("Received SIGTERM, shutting down gracefully");
        },
    }
}
