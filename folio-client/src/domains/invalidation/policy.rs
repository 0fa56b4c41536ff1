use std::time::Duration;

use folio_model::{EventKind, PartitionSet};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::infra::constants::{invalidation, millis};

/// Per-event-class delays before invalidating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InvalidationDelays {
    pub completion_delay_ms: u64,
    pub creation_delay_ms: u64,
}

impl Default for InvalidationDelays {
    fn default() -> Self {
        Self {
            completion_delay_ms: millis(invalidation::COMPLETION_DELAY),
            creation_delay_ms: millis(invalidation::CREATION_DELAY),
        }
    }
}

impl InvalidationDelays {
    pub fn completion(&self) -> Duration {
        Duration::from_millis(self.completion_delay_ms)
    }

    pub fn creation(&self) -> Duration {
        Duration::from_millis(self.creation_delay_ms)
    }
}

/// A set of partitions to invalidate no earlier than `not_before`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidationRequest {
    pub partitions: PartitionSet,
    pub not_before: Instant,
}

impl InvalidationRequest {
    pub fn after(partitions: PartitionSet, delay: Duration) -> Self {
        Self {
            partitions,
            not_before: Instant::now() + delay,
        }
    }

    pub fn immediate(partitions: PartitionSet) -> Self {
        Self::after(partitions, Duration::ZERO)
    }
}

/// Which partitions an event of `kind` makes stale, and when to drop them.
///
/// Progress and start events change nothing the caches hold.
pub fn invalidation_for(
    kind: EventKind,
    delays: &InvalidationDelays,
) -> Option<(PartitionSet, Duration)> {
    match kind {
        EventKind::JobComplete => {
            Some((PartitionSet::JOB_COMPLETE, delays.completion()))
        }
        EventKind::JobFailed => {
            Some((PartitionSet::JOB_FAILED, Duration::ZERO))
        }
        EventKind::CreatedMedia
        | EventKind::CreatedMediaBatch
        | EventKind::CreatedSeries => {
            Some((PartitionSet::CATALOG, delays.creation()))
        }
        EventKind::JobStarted | EventKind::JobProgress => None,
    }
}
