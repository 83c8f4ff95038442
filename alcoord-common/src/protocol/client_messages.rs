//! Messages sent by model clients to the coordination server

use serde::{Deserialize, Serialize};

use super::{require_label, require_non_empty, require_ratio, require_seconds, Label};
use crate::Result;

/// Client → server messages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Bind this connection to a (project, session) pair
    ///
    /// Resent verbatim on every reconnect.
    Register {
        project_name: String,
        model_name: String,
        /// Number of labels the client has incorporated so far
        count: u64,
    },

    /// The client's next selected utterance
    Utterance {
        utterance: String,
        /// Ground-truth label, present only in simulation mode
        #[serde(default, skip_serializing_if = "Option::is_none")]
        label: Option<Label>,
        count: u64,
        /// Total client-side seconds for this cycle
        client_time: f64,
        /// Seconds spent inside the selection strategy
        al_time: f64,
        /// Server timestamp echoed back for round-trip telemetry
        io_time_start: f64,
    },

    /// Metric snapshot after a retrain
    Scores {
        precision: f64,
        recall: f64,
        f1: f64,
        count: u64,
    },
}

impl ClientMessage {
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
            ClientMessage::Register { .. } => "register",
            ClientMessage::Utterance { .. } => "utterance",
            ClientMessage::Scores { .. } => "scores",
        }
    }

    /// Check field values beyond what the type system enforces
    pub fn validate(&self) -> Result<()> {
        match self {
            ClientMessage::Register {
                project_name,
                model_name,
                ..
            } => {
                require_non_empty("project_name", project_name)?;
                require_non_empty("model_name", model_name)
            }
            ClientMessage::Utterance {
                label,
                client_time,
                al_time,
                io_time_start,
                ..
            } => {
                if let Some(label) = label {
                    require_label("label", *label)?;
                }
                require_seconds("client_time", *client_time)?;
                require_seconds("al_time", *al_time)?;
                require_seconds("io_time_start", *io_time_start)
            }
            ClientMessage::Scores {
                precision,
                recall,
                f1,
                ..
            } => {
                require_ratio("precision", *precision)?;
                require_ratio("recall", *recall)?;
                require_ratio("f1", *f1)
            }
        }
    }
}
