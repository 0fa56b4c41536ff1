use serde::{Deserialize, Serialize};

use crate::infra::constants::jobs;

/// Rate limit for high-frequency progress.
///
/// Jobs with more than `task_threshold` tasks only get one ledger update
/// per `every` raw progress events. Smaller or indeterminate jobs are never
/// sampled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressSampler {
    pub task_threshold: u64,
    pub every: u64,
}

impl Default for ProgressSampler {
    fn default() -> Self {
        Self::new(jobs::PROGRESS_TASK_THRESHOLD, jobs::PROGRESS_SAMPLE_EVERY)
    }
}

impl ProgressSampler {
    pub const fn new(task_threshold: u64, every: u64) -> Self {
        Self {
            task_threshold,
            every,
        }
    }

    /// Apply every event regardless of job size.
    pub const fn disabled() -> Self {
        Self::new(u64::MAX, 1)
    }

    /// Whether the `seen`-th raw progress event (1-based) for a job with
    /// `task_count` tasks should reach the ledger.
    pub fn admits(&self, task_count: Option<u64>, seen: u64) -> bool {
        match task_count {
            Some(total) if total > self.task_threshold => {
                self.every <= 1 || seen % self.every == 0
            }
            _ => true,
        }
    }
}
