use std::path::PathBuf;

use folio_model::EventKind;
use thiserror::Error;

/// Errors surfaced while configuring or starting the engine.
///
/// Once running, the engine never returns errors to its readers: transport
/// failures and bad frames are logged and reflected in connectivity state.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid server url `{url}`: {source}")]
    InvalidServerUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to read config file {path:?}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path:?}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to write config file {path:?}: {source}")]
    ConfigWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// A frame or payload that could not be turned into an event.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("frame is not a JSON event envelope: {0}")]
    Envelope(#[source] serde_json::Error),

    #[error("payload for {kind} does not match its schema: {source}")]
    Payload {
        kind: EventKind,
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, ClientError>;
