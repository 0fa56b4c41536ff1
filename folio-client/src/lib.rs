//! Folio client job engine
//!
//! Keeps a client-side view of the server's background jobs (library scans,
//! thumbnail generation, conversions) consistent with a server-push event
//! stream, and tells the surrounding application which cached queries to
//! refetch as jobs finish or the catalog grows.
//!
//! Notes
//! - [`engine::JobEngine`] is the entry point: it owns the connection, the
//!   job ledger and the invalidation dispatcher, and tears all of them down
//!   on [`engine::JobEngine::dispose`].
//! - UI code only ever receives read-only snapshots and a connectivity flag.

pub mod domains;
pub mod engine;
pub mod error;
pub mod infra;

pub use domains::connection::{
    ConnectionManager, ConnectionState, ConnectivityStatus, EventEnvelope,
    StreamSignal,
};
pub use domains::invalidation::{
    CacheInvalidator, InvalidationDelays, InvalidationDispatcher,
    InvalidationRequest, LogInvalidator, PartitionGenerations,
};
pub use domains::jobs::{
    DuplicateStartPolicy, FailureCallback, JobLedger, JobSnapshot, JobsHandle,
    ProgressSampler,
};
pub use engine::{JobEngine, JobEngineBuilder};
pub use error::{ClientError, DecodeError, Result};
pub use infra::config::ClientConfig;
pub use infra::transport::{
    Endpoint, SseTransport, StreamKind, Transport, TransportEvent,
};

pub use folio_model as model;
