use folio_model::{
    EventKind, Job, JobFailure, JobUpdate, RunnerId, ServerEvent,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::DecodeError;

/// The `{ key, data }` wrapper around every message on the stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub key: String,
    #[serde(default)]
    pub data: Value,
}

/// `JobComplete` payloads arrive either as a bare runner id or as a job
/// fragment.
#[derive(Deserialize)]
#[serde(untagged)]
enum CompletePayload {
    Id(RunnerId),
    Record {
        #[serde(rename = "runnerId", alias = "id")]
        runner_id: RunnerId,
    },
}

impl EventEnvelope {
    pub fn new(kind: EventKind, data: Value) -> Self {
        Self {
            key: kind.as_str().to_owned(),
            data,
        }
    }

    /// Parse one raw text frame.
    pub fn parse(frame: &str) -> Result<Self, DecodeError> {
        serde_json::from_str(frame).map_err(DecodeError::Envelope)
    }

    /// `None` for keys this client does not know.
    pub fn kind(&self) -> Option<EventKind> {
        self.key.parse().ok()
    }

    /// Decode the payload according to the envelope key.
    ///
    /// Unknown keys decode to [`ServerEvent::Unknown`]; only a known key
    /// with a payload of the wrong shape is an error.
    pub fn decode(&self) -> Result<ServerEvent, DecodeError> {
        let Some(kind) = self.kind() else {
            return Ok(ServerEvent::Unknown {
                key: self.key.clone(),
            });
        };

        Ok(match kind {
            EventKind::JobStarted => {
                ServerEvent::JobStarted(self.payload::<Job>(kind)?)
            }
            EventKind::JobProgress => {
                ServerEvent::JobProgress(self.payload::<JobUpdate>(kind)?)
            }
            EventKind::JobComplete => {
                let runner_id = match self.payload::<CompletePayload>(kind)? {
                    CompletePayload::Id(id) => id,
                    CompletePayload::Record { runner_id } => runner_id,
                };
                ServerEvent::JobComplete(runner_id)
            }
            EventKind::JobFailed => {
                ServerEvent::JobFailed(self.payload::<JobFailure>(kind)?)
            }
            EventKind::CreatedMedia => ServerEvent::CreatedMedia,
            EventKind::CreatedMediaBatch => ServerEvent::CreatedMediaBatch,
            EventKind::CreatedSeries => ServerEvent::CreatedSeries,
        })
    }

    fn payload<T: DeserializeOwned>(
        &self,
        kind: EventKind,
    ) -> Result<T, DecodeError> {
        T::deserialize(&self.data)
            .map_err(|source| DecodeError::Payload { kind, source })
    }
}
