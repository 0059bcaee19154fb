//! HTTP client for the Brigade API.

use async_trait::async_trait;
use reqwest::{header, Client as HttpClient, Method, Response, Url};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};

use crate::error::ApiError;
use crate::types::{JobStatus, WorkerStatus};

const USER_AGENT: &str = concat!("brigade-sdk/", env!("CARGO_PKG_VERSION"));

/// Upper bound on any single HTTP exchange. Callers usually impose a tighter
/// deadline of their own.
const HTTP_TIMEOUT: Duration = Duration::from_secs(60);

/// Connection settings for [`ApiClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the API server, e.g. `https://brigade-apiserver.brigade.svc`
    pub address: String,
    /// Bearer token presented on every request
    pub token: String,
    /// Accept self-signed or otherwise invalid TLS certificates
    pub allow_insecure: bool,
}

/// Liveness operations.
#[async_trait]
pub trait SystemClient: Send + Sync {
    /// Pings the API server, returning the version it reports.
    async fn ping(&self) -> Result<String, ApiError>;
}

/// Worker operations used by the observer.
#[async_trait]
pub trait WorkersClient: Send + Sync {
    /// Overwrites the status of the Worker handling `event_id`.
    async fn update_status(&self, event_id: &str, status: &WorkerStatus) -> Result<(), ApiError>;

    /// Asks the API server to delete the Worker's substrate resources.
    async fn cleanup(&self, event_id: &str) -> Result<(), ApiError>;

    /// Marks the Worker as timed out and tears it down.
    async fn timeout(&self, event_id: &str) -> Result<(), ApiError>;
}

/// Job operations used by the observer.
#[async_trait]
pub trait JobsClient: Send + Sync {
    /// Overwrites the status of Job `job_name` of the Worker handling `event_id`.
    async fn update_status(
        &self,
        event_id: &str,
        job_name: &str,
        status: &JobStatus,
    ) -> Result<(), ApiError>;

    /// Asks the API server to delete the Job's substrate resources.
    async fn cleanup(&self, event_id: &str, job_name: &str) -> Result<(), ApiError>;

    /// Marks the Job as timed out and tears it down.
    async fn timeout(&self, event_id: &str, job_name: &str) -> Result<(), ApiError>;
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    reason: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PingResponse {
    version: String,
}

/// Brigade API client over HTTP.
#[derive(Clone)]
pub struct ApiClient {
    http_client: HttpClient,
    base_url: Url,
    token: String,
}

impl ApiClient {
    /// Create a new client.
    pub fn new(config: ClientConfig) -> Result<Self, ApiError> {
        let base_url = Url::parse(&config.address)
            .map_err(|e| ApiError::InvalidConfig(format!("API address {:?}: {e}", config.address)))?;
        if base_url.cannot_be_a_base() {
            return Err(ApiError::InvalidConfig(format!(
                "API address {:?} is not a base URL",
                config.address
            )));
        }

        let http_client = HttpClient::builder()
            .user_agent(USER_AGENT)
            .timeout(HTTP_TIMEOUT)
            .danger_accept_invalid_certs(config.allow_insecure)
            .build()?;

        Ok(Self {
            http_client,
            base_url,
            token: config.token,
        })
    }

    /// Builds `<base>/v2/<segments...>`, percent-encoding each segment.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| ApiError::InvalidConfig("API address is not a base URL".to_string()))?
            .pop_if_empty()
            .push("v2")
            .extend(segments);
        Ok(url)
    }

    async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        segments: &[&str],
        body: Option<&B>,
    ) -> Result<Response, ApiError> {
        let url = self.endpoint(segments)?;
        debug!(method = %method, url = %url, "Calling Brigade API");

        let mut request = self
            .http_client
            .request(method, url)
            .header(header::AUTHORIZATION, format!("Bearer {}", self.token))
            .header(header::ACCEPT, "application/json");
        if let Some(body) = body {
            request = request.json(body);
        }

        check_response(request.send().await?).await
    }

    async fn put_empty(&self, segments: &[&str]) -> Result<(), ApiError> {
        self.send::<()>(Method::PUT, segments, None).await?;
        Ok(())
    }
}

async fn check_response(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let reason = serde_json::from_str::<ErrorBody>(&body)
        .ok()
        .and_then(|err| err.reason.or(err.message))
        .unwrap_or_else(|| body.trim().to_string());

    Err(match status.as_u16() {
        409 => ApiError::Conflict { reason },
        404 => ApiError::NotFound { reason },
        code @ (401 | 403) => ApiError::Unauthorized { status: code },
        code => ApiError::Status {
            status: code,
            message: reason,
        },
    })
}

#[async_trait]
impl SystemClient for ApiClient {
    #[instrument(skip(self))]
    async fn ping(&self) -> Result<String, ApiError> {
        let response = self.send::<()>(Method::GET, &["ping"], None).await?;
        let body = response.text().await?;
        Ok(serde_json::from_str::<PingResponse>(&body)
            .map(|ping| ping.version)
            .unwrap_or_else(|_| body.trim().to_string()))
    }
}

#[async_trait]
impl WorkersClient for ApiClient {
    #[instrument(skip(self, status), fields(phase = %status.phase))]
    async fn update_status(&self, event_id: &str, status: &WorkerStatus) -> Result<(), ApiError> {
        self.send(
            Method::PUT,
            &["events", event_id, "worker", "status"],
            Some(status),
        )
        .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn cleanup(&self, event_id: &str) -> Result<(), ApiError> {
        self.put_empty(&["events", event_id, "worker", "cleanup"])
            .await
    }

    #[instrument(skip(self))]
    async fn timeout(&self, event_id: &str) -> Result<(), ApiError> {
        self.put_empty(&["events", event_id, "worker", "timeout"])
            .await
    }
}

#[async_trait]
impl JobsClient for ApiClient {
    #[instrument(skip(self, status), fields(phase = %status.phase))]
    async fn update_status(
        &self,
        event_id: &str,
        job_name: &str,
        status: &JobStatus,
    ) -> Result<(), ApiError> {
        self.send(
            Method::PUT,
            &["events", event_id, "worker", "jobs", job_name, "status"],
            Some(status),
        )
        .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn cleanup(&self, event_id: &str, job_name: &str) -> Result<(), ApiError> {
        self.put_empty(&["events", event_id, "worker", "jobs", job_name, "cleanup"])
            .await
    }

    #[instrument(skip(self))]
    async fn timeout(&self, event_id: &str, job_name: &str) -> Result<(), ApiError> {
        self.put_empty(&["events", event_id, "worker", "jobs", job_name, "timeout"])
            .await
    }
}
