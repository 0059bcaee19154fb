//! Brigade API types and client.
//!
//! This crate carries the subset of the Brigade API that platform components
//! (the observer in particular) talk to: Worker and Job status shapes, and
//! the status/cleanup/timeout/ping operations.
//!
//! # Usage
//!
//! ```no_run
//! use brigade_sdk::{ApiClient, ClientConfig, SystemClient};
//!
//! # async fn example() -> Result<(), brigade_sdk::ApiError> {
//! let client = ApiClient::new(ClientConfig {
//!     address: "https://brigade-apiserver.brigade.svc".to_string(),
//!     token: "observer-token".to_string(),
//!     allow_insecure: false,
//! })?;
//! let version = client.ping().await?;
//! println!("API server version: {version}");
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! The operations are split into narrow traits so callers can depend on only
//! what they use and substitute fakes in tests:
//!
//! - [`SystemClient`] pings the API server
//! - [`WorkersClient`] updates, cleans up and times out Workers
//! - [`JobsClient`] updates, cleans up and times out Jobs
//!
//! [`ApiClient`] implements all three over HTTP.

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod client;
pub mod error;
pub mod types;

pub use client::{ApiClient, ClientConfig, JobsClient, SystemClient, WorkersClient};
pub use error::ApiError;
pub use types::{JobPhase, JobStatus, WorkerPhase, WorkerStatus};
