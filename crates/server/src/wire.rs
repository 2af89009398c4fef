use std::collections::BTreeMap;

use axum::response::sse::Event;
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use stemsplit_job_manager::JobEvent;

/// A message sent to the observer. Each one becomes a single SSE event whose name is the
/// message type and whose data is the message as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WireMessage {
    Progress { value: f64 },
    Error { message: String },
    /// Artifact contents, base64 encoded.
    Done { stems: BTreeMap<String, String> },
}

impl WireMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            WireMessage::Progress { .. } => "progress",
            WireMessage::Error { .. } => "error",
            WireMessage::Done { .. } => "done",
        }
    }

    pub fn to_sse(&self) -> Result<Event, axum::Error> {
        Event::default().event(self.kind()).json_data(self)
    }
}

impl From<JobEvent> for WireMessage {
    fn from(event: JobEvent) -> Self {
        match event {
            JobEvent::Progress(value) => WireMessage::Progress { value },
            JobEvent::Error(message) => WireMessage::Error { message },
            JobEvent::Done(artifacts) => WireMessage::Done {
                stems: artifacts
                    .into_iter()
                    .map(|(name, data)| (name, STANDARD.encode(data)))
                    .collect(),
            },
        }
    }
}
