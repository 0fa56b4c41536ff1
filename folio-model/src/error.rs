use std::fmt::{self, Display};

/// Errors produced when parsing model identifiers from their wire names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    UnknownEventKind(String),
    UnknownPartition(String),
    UnknownStatus(String),
}

impl Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelError::UnknownEventKind(key) => {
                write!(f, "unknown event kind: {key}")
            }
            ModelError::UnknownPartition(name) => {
                write!(f, "unknown cache partition: {name}")
            }
            ModelError::UnknownStatus(status) => {
                write!(f, "unknown job status: {status}")
            }
        }
    }
}

impl std::error::Error for ModelError {}

pub type Result<T> = std::result::Result<T, ModelError>;
