use std::fmt;
use std::str::FromStr;

use crate::error::{ModelError, Result};
use crate::job::{Job, JobFailure, JobUpdate, RunnerId};

/// The `key` of every event envelope this client understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EventKind {
    JobStarted,
    JobProgress,
    JobComplete,
    JobFailed,
    CreatedMedia,
    CreatedMediaBatch,
    CreatedSeries,
}

impl EventKind {
    pub const ALL: [Self; 7] = [
        Self::JobStarted,
        Self::JobProgress,
        Self::JobComplete,
        Self::JobFailed,
        Self::CreatedMedia,
        Self::CreatedMediaBatch,
        Self::CreatedSeries,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::JobStarted => "JobStarted",
            Self::JobProgress => "JobProgress",
            Self::JobComplete => "JobComplete",
            Self::JobFailed => "JobFailed",
            Self::CreatedMedia => "CreatedMedia",
            Self::CreatedMediaBatch => "CreatedMediaBatch",
            Self::CreatedSeries => "CreatedSeries",
        }
    }

    /// Job lifecycle events, as opposed to catalog mutations.
    pub fn is_job_event(&self) -> bool {
        matches!(
            self,
            Self::JobStarted
                | Self::JobProgress
                | Self::JobComplete
                | Self::JobFailed
        )
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ModelError::UnknownEventKind(s.to_owned()))
    }
}

/// A decoded server-push event.
///
/// Creation events carry no payload the client relies on; only their
/// arrival matters. Any other key is kept as `Unknown` so callers can log
/// it without failing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    JobStarted(Job),
    JobProgress(JobUpdate),
    JobComplete(RunnerId),
    JobFailed(JobFailure),
    CreatedMedia,
    CreatedMediaBatch,
    CreatedSeries,
    Unknown { key: String },
}

impl ServerEvent {
    pub fn kind(&self) -> Option<EventKind> {
        match self {
            Self::JobStarted(_) => Some(EventKind::JobStarted),
            Self::JobProgress(_) => Some(EventKind::JobProgress),
            Self::JobComplete(_) => Some(EventKind::JobComplete),
            Self::JobFailed(_) => Some(EventKind::JobFailed),
            Self::CreatedMedia => Some(EventKind::CreatedMedia),
            Self::CreatedMediaBatch => Some(EventKind::CreatedMediaBatch),
            Self::CreatedSeries => Some(EventKind::CreatedSeries),
            Self::Unknown { .. } => None,
        }
    }

    pub fn runner_id(&self) -> Option<&RunnerId> {
        match self {
            Self::JobStarted(job) => Some(&job.runner_id),
            Self::JobProgress(update) => Some(&update.runner_id),
            Self::JobComplete(id) => Some(id),
            Self::JobFailed(failure) => Some(&failure.runner_id),
            _ => None,
        }
    }
}
