//! Observer configuration
//!
//! Everything is sourced from environment variables. Loading goes through a
//! lookup function so tests can supply values without touching the process
//! environment.

use brigade_sdk::ClientConfig;
use std::time::Duration;

use crate::error::ConfigError;

const ENV_API_ADDRESS: &str = "API_ADDRESS";
const ENV_API_TOKEN: &str = "API_TOKEN";
const ENV_API_IGNORE_CERT_WARNINGS: &str = "API_IGNORE_CERT_WARNINGS";
const ENV_BRIGADE_ID: &str = "BRIGADE_ID";
const ENV_DELAY_BEFORE_CLEANUP: &str = "DELAY_BEFORE_CLEANUP";
const ENV_MAX_WORKER_LIFETIME: &str = "MAX_WORKER_LIFETIME";
const ENV_MAX_JOB_LIFETIME: &str = "MAX_JOB_LIFETIME";
const ENV_HEALTHCHECK_INTERVAL: &str = "HEALTHCHECK_INTERVAL";
const ENV_API_REQUEST_TIMEOUT: &str = "API_REQUEST_TIMEOUT";
const ENV_SHUTDOWN_GRACE_PERIOD: &str = "SHUTDOWN_GRACE_PERIOD";

/// Tunables for the observer core.
#[derive(Debug, Clone)]
pub struct ObserverConfig {
    /// Installation identifier; scopes the pod label selectors
    pub brigade_id: String,
    /// How long a terminal pod is left alone before cleanup, so the log
    /// agent can finish shipping its output
    pub delay_before_cleanup: Duration,
    /// Timeout for Worker pods without a timeout annotation
    pub max_worker_lifetime: Duration,
    /// Timeout for Job pods without a timeout annotation
    pub max_job_lifetime: Duration,
    /// Interval between API server pings
    pub healthcheck_interval: Duration,
    /// Deadline applied to each remote call
    pub api_request_timeout: Duration,
    /// How long shutdown waits for tasks to stop
    pub shutdown_grace_period: Duration,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            brigade_id: String::new(),
            delay_before_cleanup: Duration::from_secs(60),
            max_worker_lifetime: Duration::from_secs(60 * 60),
            max_job_lifetime: Duration::from_secs(60 * 60),
            healthcheck_interval: Duration::from_secs(30),
            api_request_timeout: Duration::from_secs(30),
            shutdown_grace_period: Duration::from_secs(3),
        }
    }
}

/// Complete process configuration: API connection plus observer tunables.
#[derive(Debug, Clone)]
pub struct Settings {
    pub api: ClientConfig,
    pub observer: ObserverConfig,
}

impl Settings {
    /// Load settings from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load settings through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = ObserverConfig::default();

        let api = ClientConfig {
            address: required(&lookup, ENV_API_ADDRESS)?,
            token: required(&lookup, ENV_API_TOKEN)?,
            allow_insecure: boolean(&lookup, ENV_API_IGNORE_CERT_WARNINGS, false)?,
        };

        let observer = ObserverConfig {
            brigade_id: required(&lookup, ENV_BRIGADE_ID)?,
            delay_before_cleanup: duration(
                &lookup,
                ENV_DELAY_BEFORE_CLEANUP,
                defaults.delay_before_cleanup,
                true,
            )?,
            max_worker_lifetime: duration(
                &lookup,
                ENV_MAX_WORKER_LIFETIME,
                defaults.max_worker_lifetime,
                false,
            )?,
            max_job_lifetime: duration(
                &lookup,
                ENV_MAX_JOB_LIFETIME,
                defaults.max_job_lifetime,
                false,
            )?,
            healthcheck_interval: duration(
                &lookup,
                ENV_HEALTHCHECK_INTERVAL,
                defaults.healthcheck_interval,
                false,
            )?,
            api_request_timeout: duration(
                &lookup,
                ENV_API_REQUEST_TIMEOUT,
                defaults.api_request_timeout,
                false,
            )?,
            shutdown_grace_period: duration(
                &lookup,
                ENV_SHUTDOWN_GRACE_PERIOD,
                defaults.shutdown_grace_period,
                true,
            )?,
        };

        Ok(Self { api, observer })
    }
}

fn optional<F>(lookup: &F, name: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn required<F>(lookup: &F, name: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    optional(lookup, name).ok_or(ConfigError::Missing(name))
}

fn boolean<F>(lookup: &F, name: &'static str, default: bool) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(value) = optional(lookup, name) else {
        return Ok(default);
    };
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(ConfigError::Invalid {
            name,
            value,
            reason: "expected a boolean".to_string(),
        }),
    }
}

fn duration<F>(
    lookup: &F,
    name: &'static str,
    default: Duration,
    allow_zero: bool,
) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(value) = optional(lookup, name) else {
        return Ok(default);
    };
    let parsed = humantime::parse_duration(&value).map_err(|e| ConfigError::Invalid {
        name,
        value: value.clone(),
        reason: e.to_string(),
    })?;
    if parsed.is_zero() && !allow_zero {
        return Err(ConfigError::Invalid {
            name,
            value,
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(parsed)
}
