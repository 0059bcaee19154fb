//! Brigade observer.
//!
//! Watches the pods backing Brigade Workers and Jobs and keeps the API
//! server informed about them:
//!
//! - pod state is mapped to a Worker or Job phase and written to the API
//! - Workers and Jobs that run past their timeout are timed out
//! - finished Workers and Jobs are cleaned up, after a delay that lets their
//!   logs ship
//! - the API server is pinged periodically; the observer stops when it is
//!   unreachable
//!
//! [`Observer`] wires these together. The Brigade API is reached through the
//! client traits of `brigade_sdk` and pods through a [`PodSource`], so both
//! can be replaced.

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cleanup;
pub mod config;
pub mod error;
pub mod health;
pub mod kind;
pub mod observer;
pub mod phase;
mod remote;
pub mod status;
pub mod sync;
pub mod timeout;
pub mod watcher;

#[cfg(test)]
mod testing;

pub use config::{ObserverConfig, Settings};
pub use error::{ConfigError, ObserverError, Result};
pub use kind::{Job, PodKey, ResourceKind, Worker};
pub use observer::Observer;
pub use watcher::{KubePodSource, PodEvent, PodSource};
