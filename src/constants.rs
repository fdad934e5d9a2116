//! # System Constants
//!
//! Status and result vocabularies shared by the executor, the command tracker and
//! the invocation boundary.

use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Lifecycle status of a tracked command / executed task.
///
/// Statuses are grouped, not ranked by value: see [`status_groups`].
/// `NotFound` is only ever returned by queries, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    /// Registered with the tracker but not yet handed to the executor
    Staging,
    /// Accepted by the executor, waiting for a worker
    Queued,
    /// Running on a worker
    InProgress,
    /// Aborted before or while running
    Aborted,
    /// Not found by a status query
    NotFound,
    /// Finished successfully
    Completed,
    /// Refused at submission
    Rejected,
    /// Finished with an error
    Failed,
}

impl TaskStatus {
    /// Terminal statuses trigger scheduled removal from the tracker
    pub fn is_terminal(&self) -> bool {
        status_groups::TERMINAL.contains(self)
    }

    /// Statuses of commands that still occupy the queue
    pub fn is_active(&self) -> bool {
        status_groups::ACTIVE.contains(self)
    }

    /// Position in the lifecycle. Only meaningful for forward-progress checks:
    /// every terminal status shares the last position.
    pub(crate) fn lifecycle_rank(&self) -> u8 {
        match self {
            Self::Staging => 0,
            Self::Queued => 1,
            Self::InProgress => 2,
            Self::Completed | Self::Failed | Self::Aborted | Self::Rejected => 3,
            Self::NotFound => u8::MAX,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Staging => "STAGING",
            Self::Queued => "QUEUED",
            Self::InProgress => "IN_PROGRESS",
            Self::Aborted => "ABORTED",
            Self::NotFound => "NOT_FOUND",
            Self::Completed => "COMPLETED",
            Self::Rejected => "REJECTED",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "STAGING" => Ok(Self::Staging),
            "QUEUED" => Ok(Self::Queued),
            "IN_PROGRESS" => Ok(Self::InProgress),
            "ABORTED" => Ok(Self::Aborted),
            "NOT_FOUND" => Ok(Self::NotFound),
            "COMPLETED" => Ok(Self::Completed),
            "REJECTED" => Ok(Self::Rejected),
            "FAILED" => Ok(Self::Failed),
            _ => Err(format!("Invalid task status: {s}")),
        }
    }
}

/// Status groupings used for lifecycle decisions
pub mod status_groups {
    use super::TaskStatus;

    /// Commands in these statuses are still "in the queue"
    pub const ACTIVE: &[TaskStatus] = &[
        TaskStatus::Staging,
        TaskStatus::Queued,
        TaskStatus::InProgress,
    ];

    /// Commands in these statuses are finished and will be evicted
    pub const TERMINAL: &[TaskStatus] = &[
        TaskStatus::Completed,
        TaskStatus::Failed,
        TaskStatus::Aborted,
        TaskStatus::Rejected,
    ];
}

/// Result code returned across the command invocation boundary.
///
/// The numeric values are part of the published result feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultCode {
    Ok = 0,
    Started = 1,
    Queued = 2,
    Failed = 3,
    Unknown = 4,
    Rejected = 5,
    NotAllowed = 6,
    Aborted = 7,
}

impl ResultCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Started => "STARTED",
            Self::Queued => "QUEUED",
            Self::Failed => "FAILED",
            Self::Unknown => "UNKNOWN",
            Self::Rejected => "REJECTED",
            Self::NotAllowed => "NOT_ALLOWED",
            Self::Aborted => "ABORTED",
        }
    }
}

impl Serialize for ResultCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(*self as u8)
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
