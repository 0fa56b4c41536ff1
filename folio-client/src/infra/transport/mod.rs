//! Server-push transport abstraction
//!
//! A [`Transport`] knows how to open one connection to an event endpoint and
//! nothing else. Retry policy lives in the connection manager, so a
//! transport must end its stream after reporting an error rather than
//! reconnecting on its own.

mod endpoint;
mod sse;

pub use endpoint::{Endpoint, StreamKind};
pub use sse::SseTransport;

use futures::stream::BoxStream;

/// What a single connection reports to its owner.
///
/// The stream returned by [`Transport::connect`] ending is the close signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Open,
    Message(String),
    Error(String),
}

pub trait Transport: Send + Sync + 'static {
    /// Open a connection. Dropping the returned stream closes it.
    fn connect(
        &self,
        endpoint: &Endpoint,
    ) -> BoxStream<'static, TransportEvent>;
}
