use std::fmt;
use std::str::FromStr;

use crate::error::{ModelError, Result};

/// Stable identity of one server-side job occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct RunnerId(String);

impl RunnerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RunnerId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for RunnerId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum JobStatus {
    #[default]
    #[cfg_attr(feature = "serde", serde(alias = "RUNNING", alias = "running"))]
    Running,
    #[cfg_attr(
        feature = "serde",
        serde(alias = "COMPLETED", alias = "completed")
    )]
    Completed,
    #[cfg_attr(feature = "serde", serde(alias = "FAILED", alias = "failed"))]
    Failed,
    #[cfg_attr(
        feature = "serde",
        serde(alias = "CANCELLED", alias = "cancelled")
    )]
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "Running",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
            Self::Cancelled => "Cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(ModelError::UnknownStatus(s.to_owned())),
        }
    }
}

/// One server-side unit of work as seen by the client.
///
/// `current_task` and `task_count` are the progress numerator and
/// denominator; either may be absent while progress is indeterminate.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct Job {
    pub runner_id: RunnerId,
    #[cfg_attr(feature = "serde", serde(default = "Job::unknown_kind"))]
    pub kind: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub status: JobStatus,
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub current_task: Option<u64>,
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub task_count: Option<u64>,
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub message: Option<String>,
}

impl Job {
    pub const UNKNOWN_KIND: &'static str = "unknown";

    pub fn running(
        runner_id: impl Into<RunnerId>,
        kind: impl Into<String>,
    ) -> Self {
        Self {
            runner_id: runner_id.into(),
            kind: kind.into(),
            status: JobStatus::Running,
            current_task: None,
            task_count: None,
            message: None,
        }
    }

    #[cfg(feature = "serde")]
    fn unknown_kind() -> String {
        Self::UNKNOWN_KIND.to_owned()
    }

    /// Merge the fields a progress update carries into this record.
    ///
    /// Status is left untouched: progress never moves a job between states.
    pub fn apply(&mut self, update: &JobUpdate) {
        if let Some(kind) = &update.kind {
            self.kind.clone_from(kind);
        }
        if update.current_task.is_some() {
            self.current_task = update.current_task;
        }
        if update.task_count.is_some() {
            self.task_count = update.task_count;
        }
        if update.message.is_some() {
            self.message.clone_from(&update.message);
        }
    }

    /// Fraction complete in `0.0..=1.0`, or `None` while indeterminate.
    pub fn progress(&self) -> Option<f64> {
        match (self.current_task, self.task_count) {
            (Some(current), Some(total)) if total > 0 => {
                Some((current.min(total) as f64) / (total as f64))
            }
            _ => None,
        }
    }
}

impl From<JobUpdate> for Job {
    /// Synthesizes a running record from a progress fragment that arrived
    /// before its `JobStarted`.
    fn from(update: JobUpdate) -> Self {
        Self {
            runner_id: update.runner_id,
            kind: update
                .kind
                .unwrap_or_else(|| Self::UNKNOWN_KIND.to_owned()),
            status: JobStatus::Running,
            current_task: update.current_task,
            task_count: update.task_count,
            message: update.message,
        }
    }
}

/// Partial job record carried by `JobProgress`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct JobUpdate {
    pub runner_id: RunnerId,
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub kind: Option<String>,
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub current_task: Option<u64>,
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub task_count: Option<u64>,
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub message: Option<String>,
}

impl JobUpdate {
    pub fn new(runner_id: impl Into<RunnerId>) -> Self {
        Self {
            runner_id: runner_id.into(),
            kind: None,
            current_task: None,
            task_count: None,
            message: None,
        }
    }

    pub fn with_task(mut self, current_task: u64) -> Self {
        self.current_task = Some(current_task);
        self
    }

    pub fn with_task_count(mut self, task_count: u64) -> Self {
        self.task_count = Some(task_count);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// True when this update reports the last unit of work. `known_total`
    /// is used when the update itself carries no task count.
    pub fn is_final_task(&self, known_total: Option<u64>) -> bool {
        matches!(
            (self.current_task, self.task_count.or(known_total)),
            (Some(current), Some(total)) if current >= total
        )
    }
}

/// Payload of a `JobFailed` event.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct JobFailure {
    pub runner_id: RunnerId,
    #[cfg_attr(feature = "serde", serde(default))]
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_merges_only_present_fields() {
        let mut job = Job::running("r1", "library_scan");
        job.message = Some("Starting".into());
        job.task_count = Some(10);

        job.apply(&JobUpdate::new("r1").with_task(4));

        assert_eq!(job.current_task, Some(4));
        assert_eq!(job.task_count, Some(10));
        assert_eq!(job.message.as_deref(), Some("Starting"));
        assert_eq!(job.status, JobStatus::Running);
    }

    #[test]
    fn synthesized_job_is_running_with_unknown_kind() {
        let job = Job::from(JobUpdate::new("r9").with_message("Analyzing"));
        assert_eq!(job.status, JobStatus::Running);
        assert_eq!(job.kind, Job::UNKNOWN_KIND);
        assert_eq!(job.message.as_deref(), Some("Analyzing"));
    }

    #[test]
    fn progress_is_none_without_denominator() {
        let mut job = Job::running("r1", "thumbnail_generation");
        job.current_task = Some(3);
        assert_eq!(job.progress(), None);

        job.task_count = Some(4);
        assert_eq!(job.progress(), Some(0.75));
    }

    #[test]
    fn final_task_falls_back_to_known_total() {
        let update = JobUpdate::new("r1").with_task(10);
        assert!(!update.is_final_task(None));
        assert!(update.is_final_task(Some(10)));
        assert!(!update.clone().with_task_count(11).is_final_task(Some(10)));
    }

    #[test]
    fn status_parses_case_insensitively() {
        assert_eq!("RUNNING".parse::<JobStatus>(), Ok(JobStatus::Running));
        assert_eq!(
            "Cancelled".parse::<JobStatus>(),
            Ok(JobStatus::Cancelled)
        );
        assert!("paused".parse::<JobStatus>().is_err());
        assert!(JobStatus::Failed.is_terminal());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn job_deserializes_camel_case_payload() {
        let job: Job = serde_json::from_str(
            r#"{"runnerId":"r1","kind":"library_scan","status":"Running"}"#,
        )
        .unwrap();
        assert_eq!(job.runner_id.as_str(), "r1");
        assert_eq!(job.kind, "library_scan");
        assert_eq!(job.current_task, None);
    }
}
