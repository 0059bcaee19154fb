//! Worker and Job status shapes exchanged with the Brigade API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle phase of a Worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerPhase {
    /// Waiting for capacity before being started
    Pending,
    /// Pod is being created
    Starting,
    /// Pod is running (Brigade also reports a substrate-pending pod as running)
    Running,
    Succeeded,
    Failed,
    /// The pod was deleted before reaching a result
    Aborted,
    /// Canceled by a user before it started
    Canceled,
    /// The scheduler could not place the Worker
    SchedulingFailed,
    /// Exceeded its allotted lifetime
    TimedOut,
    /// State could not be determined
    Unknown,
}

impl WorkerPhase {
    /// Terminal phases never transition further.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Succeeded
                | Self::Failed
                | Self::Aborted
                | Self::Canceled
                | Self::SchedulingFailed
                | Self::TimedOut
        )
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Starting => "STARTING",
            Self::Running => "RUNNING",
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
            Self::Aborted => "ABORTED",
            Self::Canceled => "CANCELED",
            Self::SchedulingFailed => "SCHEDULING_FAILED",
            Self::TimedOut => "TIMED_OUT",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for WorkerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle phase of a Job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobPhase {
    Pending,
    Starting,
    Running,
    Succeeded,
    Failed,
    Aborted,
    Canceled,
    SchedulingFailed,
    TimedOut,
    Unknown,
}

impl JobPhase {
    /// Terminal phases never transition further.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Succeeded
                | Self::Failed
                | Self::Aborted
                | Self::Canceled
                | Self::SchedulingFailed
                | Self::TimedOut
        )
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Starting => "STARTING",
            Self::Running => "RUNNING",
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
            Self::Aborted => "ABORTED",
            Self::Canceled => "CANCELED",
            Self::SchedulingFailed => "SCHEDULING_FAILED",
            Self::TimedOut => "TIMED_OUT",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for JobPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a Worker as reported to the API server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended: Option<DateTime<Utc>>,
    pub phase: WorkerPhase,
}

/// Status of a Job as reported to the API server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended: Option<DateTime<Utc>>,
    pub phase: JobPhase,
}
