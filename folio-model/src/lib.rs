//! Job, event and cache partition models shared across Folio crates.
#![allow(missing_docs)]

pub mod error;
pub mod events;
pub mod job;
pub mod partition;

pub use error::{ModelError, Result as ModelResult};
pub use events::{EventKind, ServerEvent};
pub use job::{Job, JobFailure, JobStatus, JobUpdate, RunnerId};
pub use partition::{CachePartition, PartitionSet};
