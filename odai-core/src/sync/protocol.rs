//! Control messages sent over the relay connection.
//!
//! Control messages are JSON text frames. Only the client sends them today;
//! text arriving from the relay is ignored.

use serde::{Deserialize, Serialize};

use crate::channel_id::ChannelId;

/// Message types for the relay control protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlMessage {
    /// Route subsequent binary frames on this connection to and from a channel
    SetCanvas { canvas_id: String },
}

impl ControlMessage {
    /// Subscribe message for a channel
    pub fn set_canvas(id: &ChannelId) -> Self {
        ControlMessage::SetCanvas {
            canvas_id: id.as_str().to_string(),
        }
    }

    /// Encode message as JSON text.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Decode message from JSON text.
    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}
