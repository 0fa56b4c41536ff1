//! Engine domains: the stream connection, the job ledger and cache
//! invalidation. Each domain owns its state; they only meet through
//! [`connection::StreamSignal`]s fanned out by the connection manager.

pub mod connection;
pub mod invalidation;
pub mod jobs;
