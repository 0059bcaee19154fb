//! Error types for the observer.

use brigade_sdk::ApiError;
use thiserror::Error;

/// Errors that stop the observer.
///
/// Component-local failures (a rejected status write, a failed cleanup) are
/// logged where they happen and never surface here.
#[derive(Debug, Error)]
pub enum ObserverError {
    #[error("API server healthcheck failed: {0}")]
    Healthcheck(#[source] ApiError),

    #[error("failed to start watching {kind} pods: {source}")]
    WatchSetup {
        kind: &'static str,
        #[source]
        source: kube::Error,
    },

    #[error("{kind} pod watch ended unexpectedly")]
    WatchEnded { kind: &'static str },

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("observer shut down")]
    Shutdown,
}

/// Errors raised while loading configuration from the environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("required environment variable {0} is not set")]
    Missing(&'static str),

    #[error("environment variable {name} has invalid value {value:?}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Result type for observer operations
pub type Result<T, E = ObserverError> = std::result::Result<T, E>;
