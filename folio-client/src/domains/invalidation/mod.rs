//! Delayed, deduplicated cache invalidation driven by stream events.

mod dispatcher;
mod policy;
mod sink;

pub use dispatcher::InvalidationDispatcher;
pub use policy::{InvalidationDelays, InvalidationRequest, invalidation_for};
pub use sink::{CacheInvalidator, LogInvalidator, PartitionGenerations};
