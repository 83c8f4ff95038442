//! Messages pushed by the coordination server to model clients

use serde::{Deserialize, Serialize};

use super::{require_label, require_seconds, Label};
use crate::Result;

/// Server → client messages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Compute and emit a fresh selection
    NextUtterance { io_time_start: f64 },

    /// A label for a previously emitted utterance
    Annotation {
        utterance: String,
        annotation: Label,
        io_time_start: f64,
    },

    /// Terminal: the session will receive no further work
    Finished { cause: String },
}

impl ServerMessage {
    /// Decode and validate one frame
    pub fn decode(text: &str) -> Result<Self> {
        let message: Self = serde_json::from_str(text)?;
        message.validate()?;
        Ok(message)
    }

    /// Encode one frame
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Short name of the message kind, used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::NextUtterance { .. } => "next_utterance",
            ServerMessage::Annotation { .. } => "annotation",
            ServerMessage::Finished { .. } => "finished",
        }
    }

    /// True for the terminal `finished` message
    pub fn is_terminal(&self) -> bool {
        matches!(self, ServerMessage::Finished { .. })
    }

    /// Check field values beyond what the type system enforces
    pub fn validate(&self) -> Result<()> {
        match self {
            ServerMessage::NextUtterance { io_time_start } => {
                require_seconds("io_time_start", *io_time_start)
            }
            ServerMessage::Annotation {
                annotation,
                io_time_start,
                ..
            } => {
                require_label("annotation", *annotation)?;
                require_seconds("io_time_start", *io_time_start)
            }
            ServerMessage::Finished { .. } => Ok(()),
        }
    }
}
