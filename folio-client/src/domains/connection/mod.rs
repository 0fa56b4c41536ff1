mod envelope;
mod manager;
mod status;

pub use envelope::EventEnvelope;
pub use manager::{ConnectionManager, StreamSignal};
pub use status::{ConnectionState, ConnectivityStatus};
